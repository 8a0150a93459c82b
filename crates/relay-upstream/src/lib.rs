//! 업스트림 호가 스트림 연결.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - UpstreamConnector / UpstreamSession: 업스트림 WebSocket 추상화
//! - UpstreamManager: 심볼별 단일 연결과 단일 재연결(single-flight) 관리
//! - Lifecycle: 연결 상태 머신

pub mod connector;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod stats;

pub use connector::{SessionEvent, TungsteniteConnector, UpstreamConnector, UpstreamSession};
pub use error::*;
pub use lifecycle::{ConnectionState, Lifecycle, TerminalCause};
pub use manager::{UpstreamHandle, UpstreamManager};
pub use stats::{UpstreamStats, UpstreamStatsSnapshot};
