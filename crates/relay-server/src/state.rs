//! 모든 핸들러에서 공유되는 애플리케이션 상태.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use relay_core::{RelayResult, StreamConfig, Symbol};

use crate::hub::RelayHub;

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 심볼별 릴레이 채널
    pub hub: Arc<RelayHub>,

    /// `symbol` 쿼리가 없을 때 사용할 심볼
    pub default_symbol: Symbol,

    /// SSE keep-alive 주기
    pub sse_keepalive: Duration,

    /// 서버 버전
    pub version: String,

    /// 서버 시작 시각
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 새 상태 생성.
    pub fn new(hub: Arc<RelayHub>, stream: &StreamConfig) -> Self {
        Self {
            hub,
            default_symbol: stream.default_symbol.clone(),
            sse_keepalive: stream.sse_keepalive(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    /// 서버 업타임 (초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// 쿼리의 심볼을 정규화합니다. 없거나 비어 있으면 기본 심볼.
    pub fn resolve_symbol(&self, raw: Option<&str>) -> RelayResult<Symbol> {
        match raw.map(str::trim) {
            Some(s) if !s.is_empty() => Symbol::parse(s),
            _ => Ok(self.default_symbol.clone()),
        }
    }
}
