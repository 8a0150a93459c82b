//! WebSocket 패스스루 handler.
//!
//! 클라이언트는 `GET /ws?symbol=<SYMBOL>`로 연결하고, 업스트림에서 받은 프레임을
//! 원문 그대로, 업스트림과 같은 opcode(텍스트/바이너리)로 받습니다.
//! 클라이언트가 보내는 메시지는 무시됩니다.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn, Instrument};

use relay_core::{Frame, FrameFormat, Subscription, Transport};

use crate::error::ApiResult;
use crate::metrics::{record_delivery_failure, record_rejected_subscription, SubscriberGauge};
use crate::state::AppState;

/// 스트림 엔드포인트 쿼리 파라미터.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// 구독할 심볼 (없으면 기본 심볼)
    pub symbol: Option<String>,
}

/// WebSocket 업그레이드 핸들러.
///
/// 업그레이드 전에 구독을 등록하므로, 캐시된 프레임이 있으면
/// 소켓이 열리자마자 가장 먼저 전송됩니다.
///
/// # 엔드포인트
///
/// `GET /ws?symbol=BTCUSDT`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    let subscription = subscribe(&state, query.symbol.as_deref()).map_err(|e| {
        record_rejected_subscription(Transport::WebSocket, &e.body().code);
        warn!(error = %e.body(), "WebSocket subscription rejected");
        e
    })?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, subscription))
        .into_response())
}

fn subscribe(state: &AppState, symbol: Option<&str>) -> ApiResult<Subscription> {
    let symbol = state.resolve_symbol(symbol)?;
    Ok(state.hub.subscribe(&symbol, Transport::WebSocket)?)
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, subscription: Subscription) {
    let span = relay_core::stream_span!("ws_client", subscription.symbol(), subscription.id());

    async move {
        info!("WebSocket client connected");
        let _gauge =
            SubscriberGauge::open(subscription.transport(), subscription.symbol().as_str());

        let (sender, mut receiver) = socket.split();

        // 프레임 전송 태스크 (구독은 이 태스크가 소유)
        let mut send_task = tokio::spawn(forward_frames(subscription, sender).in_current_span());

        // 클라이언트 메시지 수신 태스크 (close 감지용)
        let mut receive_task = tokio::spawn(
            async move {
                while let Some(result) = receiver.next().await {
                    match result {
                        Ok(Message::Close(_)) => {
                            debug!("Close message received");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!(error = %e, "WebSocket receive error");
                            break;
                        }
                    }
                }
            }
            .in_current_span(),
        );

        // 하나가 끝나면 다른 것도 종료
        tokio::select! {
            _ = &mut send_task => receive_task.abort(),
            _ = &mut receive_task => send_task.abort(),
        }

        info!("WebSocket client disconnected");
    }
    .instrument(span)
    .await
}

/// 구독 채널의 프레임을 원문 그대로 소켓에 씁니다.
///
/// 쓰기가 실패하면 구독을 drop하여 팬아웃에서 제거합니다.
async fn forward_frames<S>(mut subscription: Subscription, mut sender: S)
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(frame) = subscription.recv().await {
        if let Err(e) = sender.send(to_message(&frame)).await {
            debug!(error = %e, "WebSocket write failed, dropping subscriber");
            record_delivery_failure(Transport::WebSocket);
            return;
        }
    }

    // 종료 중 팬아웃이 구독을 끊음
    let _ = sender.send(Message::Close(None)).await;
}

fn to_message(frame: &Frame) -> Message {
    match frame.format() {
        FrameFormat::Text => Message::Text(frame.raw().to_owned().into()),
        FrameFormat::Binary => Message::Binary(frame.raw().as_bytes().to_vec().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use relay_core::{FanOut, Symbol};
    use serde_json::json;

    #[tokio::test]
    async fn test_forward_frames_writes_raw_text() {
        let fanout = FanOut::shared(Symbol::default());
        fanout.publish(Frame::parse(r#"{ "bid": 100 }"#).unwrap());
        let subscription = fanout.register(Transport::WebSocket);
        fanout.publish(Frame::from_value(json!({"bid": 101})));

        let (tx, mut rx) = mpsc::unbounded::<Message>();
        let task = tokio::spawn(forward_frames(subscription, tx));

        match rx.next().await.unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{ "bid": 100 }"#),
            other => panic!("unexpected message: {:?}", other),
        }
        match rx.next().await.unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"bid":101}"#),
            other => panic!("unexpected message: {:?}", other),
        }

        fanout.close_all();
        task.await.unwrap();
        assert!(matches!(rx.next().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn test_forward_frames_keeps_binary_opcode() {
        let fanout = FanOut::shared(Symbol::default());
        let subscription = fanout.register(Transport::WebSocket);
        fanout.publish(Frame::parse_bytes(br#"{"bid":7}"#).unwrap());

        let (tx, mut rx) = mpsc::unbounded::<Message>();
        let task = tokio::spawn(forward_frames(subscription, tx));

        match rx.next().await.unwrap() {
            Message::Binary(data) => assert_eq!(&data[..], br#"{"bid":7}"#),
            other => panic!("unexpected message: {:?}", other),
        }

        fanout.close_all();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_forward_frames_drops_subscriber_on_write_failure() {
        let fanout = FanOut::shared(Symbol::default());
        let subscription = fanout.register(Transport::WebSocket);
        let (tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);

        let task = tokio::spawn(forward_frames(subscription, tx));
        fanout.publish(Frame::from_value(json!({"bid": 1})));
        task.await.unwrap();

        assert_eq!(fanout.subscriber_count(), 0);
    }
}
