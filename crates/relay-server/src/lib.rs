//! 호가 스트림 릴레이 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 심볼별 업스트림 연결과 팬아웃을 묶는 릴레이 허브
//! - 원문 WebSocket 패스스루 엔드포인트
//! - Server-Sent Events 엔드포인트
//! - 헬스 체크 엔드포인트
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`hub`]: 심볼별 릴레이 채널 (RelayHub)
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: HTTP 엔드포인트와 라우터 구성
//! - [`websocket`]: WebSocket 패스스루
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어

pub mod error;
pub mod hub;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use hub::{ChannelStatus, RelayHub};
pub use crate::metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::{create_api_router, create_router};
pub use state::AppState;
pub use websocket::websocket_handler;
