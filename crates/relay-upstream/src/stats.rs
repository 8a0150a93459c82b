//! 업스트림 수신 통계.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 심볼 하나의 업스트림 수신 카운터.
#[derive(Debug, Default)]
pub struct UpstreamStats {
    frames_relayed: AtomicU64,
    malformed_dropped: AtomicU64,
    reconnects: AtomicU64,
}

/// 특정 시점의 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpstreamStatsSnapshot {
    /// 팬아웃으로 넘긴 프레임 수
    pub frames_relayed: u64,
    /// JSON이 아니어서 버린 프레임 수
    pub malformed_dropped: u64,
    /// 재연결 횟수
    pub reconnects: u64,
}

impl UpstreamStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&self) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// 현재 값 스냅샷
    pub fn snapshot(&self) -> UpstreamStatsSnapshot {
        UpstreamStatsSnapshot {
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = UpstreamStats::new();
        stats.record_frame();
        stats.record_frame();
        stats.record_malformed();
        stats.record_reconnect();

        assert_eq!(
            stats.snapshot(),
            UpstreamStatsSnapshot {
                frames_relayed: 2,
                malformed_dropped: 1,
                reconnects: 1,
            }
        );
    }
}
