//! HTTP 에러 응답.
//!
//! 구독 요청이 거부될 때 일관된 JSON 에러 본문을 돌려줍니다.
//!
//! ```json
//! {
//!   "code": "INVALID_SYMBOL",
//!   "message": "잘못된 심볼: BTC/USDT",
//!   "timestamp": 1738300800
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use relay_core::RelayError;

/// API 에러 응답 본문.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_SYMBOL", "SYMBOL_LIMIT")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 타임스탬프가 포함된 에러 생성.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보를 덧붙입니다.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// 상태 코드와 함께 응답으로 변환되는 API 에러.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
}

impl ApiError {
    /// 상태 코드.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// 응답 본문.
    pub fn body(&self) -> &ApiErrorResponse {
        &self.body
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let (status, code) = match &err {
            RelayError::InvalidSymbol(_) => (StatusCode::BAD_REQUEST, "INVALID_SYMBOL"),
            RelayError::CapacityExceeded { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "SYMBOL_LIMIT")
            }
            RelayError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let mut body = ApiErrorResponse::new(code, err.to_string());
        if let RelayError::CapacityExceeded { limit } = err {
            body = body.with_details(serde_json::json!({ "max_symbols": limit }));
        }

        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// 핸들러 Result 타입.
pub type ApiResult<T> = Result<T, ApiError>;
