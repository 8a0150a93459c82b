//! # Relay Core
//!
//! 호가 스트림 릴레이의 핵심 타입과 공통 인프라를 제공합니다:
//! - 업스트림 프레임 모델 ([`Frame`])
//! - 심볼 타입 ([`Symbol`])
//! - 구독자 팬아웃과 마지막 프레임 캐시 ([`FanOut`])
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod fanout;
pub mod frame;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use fanout::{
    FanOut, FrameSink, IdleHook, SharedFanOut, SubscriberId, Subscription, Transport,
};
pub use frame::{Frame, FrameFormat};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use types::*;
