//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템에서 사용하는 liveness/readiness 엔드포인트입니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::hub::ChannelStatus;
use crate::state::AppState;

/// readiness 응답.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 전체 상태 ("healthy" | "degraded" | "unhealthy")
    pub status: &'static str,

    /// 서버 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 심볼별 릴레이 채널 상태
    pub channels: Vec<ChannelStatus>,
}

/// 업스트림 연결 상태로 전체 상태를 판정합니다.
///
/// 열린 채널이 하나도 없으면 unhealthy, 일부만 열려 있으면 degraded.
pub fn overall_status(channels: &[ChannelStatus]) -> (&'static str, StatusCode) {
    let open = channels.iter().filter(|c| c.upstream.is_open()).count();
    if open == channels.len() {
        ("healthy", StatusCode::OK)
    } else if open > 0 {
        ("degraded", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// 간단한 헬스 체크 (liveness probe용).
///
/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 상세 헬스 체크 (readiness probe용).
///
/// GET /health/ready
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let channels = state.hub.snapshot();
    let (status, status_code) = overall_status(&channels);

    let response = HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        channels,
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use relay_core::Symbol;
    use relay_upstream::{ConnectionState, UpstreamStatsSnapshot};
    use tower::ServiceExt;

    fn channel(symbol: &str, upstream: ConnectionState) -> ChannelStatus {
        ChannelStatus {
            symbol: Symbol::parse(symbol).unwrap(),
            upstream,
            websocket_subscribers: 0,
            sse_subscribers: 0,
            has_latest: false,
            stats: UpstreamStatsSnapshot::default(),
        }
    }

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let app = Router::new().route("/health", get(health_check));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[test]
    fn test_overall_status() {
        assert_eq!(overall_status(&[]).0, "healthy");

        let all_open = [
            channel("BTCUSDT", ConnectionState::Open),
            channel("ETHUSDT", ConnectionState::Open),
        ];
        assert_eq!(overall_status(&all_open), ("healthy", StatusCode::OK));

        let partial = [
            channel("BTCUSDT", ConnectionState::Open),
            channel("ETHUSDT", ConnectionState::Closed),
        ];
        assert_eq!(overall_status(&partial), ("degraded", StatusCode::OK));

        let none = [channel("BTCUSDT", ConnectionState::Connecting)];
        assert_eq!(
            overall_status(&none),
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        );
    }
}
