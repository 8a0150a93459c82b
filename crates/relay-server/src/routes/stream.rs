//! Server-Sent Events 호가 스트림.
//!
//! `GET /stream/orderbook?symbol=BTCUSDT`
//!
//! 응답 본문은 업스트림 프레임마다 `data: <json>\n\n` 레코드 하나입니다.
//! 캐시된 프레임이 있으면 연결 직후 먼저 하나를 보냅니다.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use tracing::{info, warn};

use relay_core::{Subscription, Transport};

use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_rejected_subscription, SubscriberGauge};
use crate::state::AppState;
use crate::websocket::StreamQuery;

/// SSE 구독자. drop되면 팬아웃에서 해제됩니다.
struct SseClient {
    subscription: Subscription,
    _gauge: SubscriberGauge,
}

impl Drop for SseClient {
    fn drop(&mut self) {
        info!(
            symbol = %self.subscription.symbol(),
            subscriber = %self.subscription.id(),
            "SSE client disconnected"
        );
    }
}

/// SSE 핸들러.
pub async fn orderbook_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    let subscription = state
        .resolve_symbol(query.symbol.as_deref())
        .and_then(|symbol| state.hub.subscribe(&symbol, Transport::Sse))
        .map_err(|e| {
            let e = ApiError::from(e);
            record_rejected_subscription(Transport::Sse, &e.body().code);
            warn!(error = %e.body(), "SSE subscription rejected");
            e
        })?;

    info!(
        symbol = %subscription.symbol(),
        subscriber = %subscription.id(),
        "SSE client connected"
    );

    let sse = Sse::new(frame_events(subscription))
        .keep_alive(KeepAlive::new().interval(state.sse_keepalive));

    Ok(([(header::CONNECTION, "keep-alive")], sse).into_response())
}

/// 구독을 SSE 이벤트 스트림으로 변환합니다.
///
/// 구독이 끊기면 (서버 종료 등) 스트림이 끝납니다.
fn frame_events(subscription: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    let client = SseClient {
        _gauge: SubscriberGauge::open(subscription.transport(), subscription.symbol().as_str()),
        subscription,
    };

    stream::unfold(client, |mut client| async move {
        let frame = client.subscription.recv().await?;
        Some((Ok(Event::default().data(frame.to_sse_data())), client))
    })
}

/// SSE 라우터 생성.
pub fn stream_router() -> Router<Arc<AppState>> {
    Router::new().route("/orderbook", get(orderbook_stream))
}
