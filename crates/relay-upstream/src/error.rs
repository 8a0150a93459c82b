//! 업스트림 연결 에러 타입.

use thiserror::Error;

/// 업스트림 소켓 관련 에러.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// 연결 수립 실패
    #[error("Connect failed: {0}")]
    Connect(String),

    /// 연결 중 WebSocket 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 업스트림이 연결을 닫음
    #[error("Closed by upstream: {0}")]
    Closed(String),

    /// 잘못된 업스트림 주소
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),
}

/// 업스트림 작업 Result 타입.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

impl UpstreamError {
    /// 재연결로 회복될 수 있는 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UpstreamError::InvalidUrl(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for UpstreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Url(e) => UpstreamError::InvalidUrl(e.to_string()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                UpstreamError::Closed("connection closed".to_string())
            }
            other => UpstreamError::WebSocket(other.to_string()),
        }
    }
}
