//! 호가 스트림 심볼 정의.
//!
//! 업스트림 URL 경로(`/ws/orderbook/<symbol>`)에 그대로 들어가므로
//! 허용 문자를 제한하고 대문자로 정규화합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;

/// 심볼 최대 길이.
pub const MAX_SYMBOL_LEN: usize = 32;

/// 기본 심볼.
pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

/// 거래소 호가 스트림 심볼 (예: `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// 문자열을 검증하고 정규화하여 심볼을 생성합니다.
    ///
    /// 앞뒤 공백을 제거하고 대문자로 변환합니다.
    /// ASCII 영숫자와 `_`, `-`만 허용됩니다.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RelayError::InvalidSymbol("빈 심볼".to_string()));
        }
        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(RelayError::InvalidSymbol(format!(
                "심볼 길이 초과 ({} > {}): {}",
                trimmed.len(),
                MAX_SYMBOL_LEN,
                trimmed
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RelayError::InvalidSymbol(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// 심볼 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self(DEFAULT_SYMBOL.to_string())
    }
}

impl FromStr for Symbol {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
