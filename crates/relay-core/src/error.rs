//! 릴레이 공통 에러 타입.
//!
//! 이 모듈은 릴레이 전반에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 릴레이 에러.
#[derive(Debug, Error)]
pub enum RelayError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 심볼
    #[error("잘못된 심볼: {0}")]
    InvalidSymbol(String),

    /// 업스트림 프레임 파싱 에러
    #[error("프레임 파싱 에러: {0}")]
    MalformedFrame(String),

    /// 동시에 릴레이할 수 있는 심볼 수 초과
    #[error("최대 {limit}개 심볼까지 릴레이할 수 있습니다")]
    CapacityExceeded {
        /// 설정된 최대 심볼 수
        limit: usize,
    },

    /// 종료 중 등으로 일시적으로 요청을 받을 수 없음
    #[error("서비스 사용 불가: {0}")]
    Unavailable(String),
}

/// 릴레이 작업을 위한 Result 타입.
pub type RelayResult<T> = Result<T, RelayError>;

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}
