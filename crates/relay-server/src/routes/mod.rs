//! HTTP 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 심볼별 업스트림 상태 (readiness)
//! - `/ws?symbol=` - 원문 WebSocket 패스스루
//! - `/stream/orderbook?symbol=` - Server-Sent Events
//! - `/metrics` - Prometheus 메트릭

pub mod health;
pub mod stream;

pub use health::{health_router, HealthResponse};
pub use stream::stream_router;

use axum::{extract::State, http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::middleware::metrics_layer;
use crate::state::AppState;
use crate::websocket::websocket_handler;

/// 스트림/헬스 라우터 생성 (미들웨어 제외).
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/stream", stream_router())
        .route("/ws", get(websocket_handler))
}

/// 전체 라우터 생성.
///
/// `metrics_handle`이 있으면 `/metrics`를 노출합니다.
pub fn create_router(
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
    cors_origins: &[String],
) -> Router {
    let mut router = create_api_router().with_state(state);

    if let Some(handle) = metrics_handle {
        let metrics_router = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);
        router = router.merge(metrics_router);
    }

    router
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        // 응답 헤더까지의 타임아웃 (스트림 본문에는 적용되지 않음)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(cors_layer(cors_origins))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// CORS 레이어 생성.
///
/// origin 목록이 비어 있으면 모든 origin을 허용합니다.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<_> = origins.iter().filter_map(|s| s.parse().ok()).collect();

    let allow_origin = if parsed.is_empty() {
        if !origins.is_empty() {
            warn!("CORS origins are set but none are valid, allowing any");
        }
        AllowOrigin::any()
    } else {
        info!("CORS configured with {} allowed origins", parsed.len());
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::CACHE_CONTROL,
        ])
        .max_age(Duration::from_secs(3600))
}
