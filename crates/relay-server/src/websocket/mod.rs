//! 원문 WebSocket 패스스루.
//!
//! # 엔드포인트
//!
//! `GET /ws?symbol=BTCUSDT`
//!
//! 업스트림 프레임을 다시 프레이밍하지 않고 텍스트 메시지로 그대로 전달합니다.
//! 연결 시 캐시된 프레임이 있으면 그것을 먼저 보냅니다.

pub mod handler;

pub use handler::{websocket_handler, StreamQuery};
