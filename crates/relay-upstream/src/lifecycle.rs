//! 업스트림 연결 상태 머신.
//!
//! 연결 하나의 종료 이벤트(close, error)는 여러 번 관측될 수 있지만
//! 재연결 예약은 연결당 한 번만 일어나야 합니다. [`Lifecycle::terminate`]는
//! 처음 관측된 종료 이벤트에만 재연결 지연을 돌려주고 이후 이벤트는 무시합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 업스트림 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// 아직 연결을 시도하지 않음
    Idle,
    /// 연결 시도 중
    Connecting,
    /// 연결됨, 프레임 수신 중
    Open,
    /// 연결 종료됨, 재연결 대기 중
    Closed,
    /// 매니저가 중지됨 (더 이상 재연결하지 않음)
    Stopped,
}

impl ConnectionState {
    /// 프레임을 받을 수 있는 상태인지.
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// 연결 종료 원인.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalCause {
    /// 업스트림이 정상적으로 닫음
    Closed,
    /// 수신 중 에러
    Error,
    /// 연결 수립 실패
    ConnectFailed,
}

/// 단일 업스트림 연결의 상태 전이 관리.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ConnectionState,
    reconnect_delay: Duration,
    reconnects: u64,
    last_cause: Option<TerminalCause>,
}

impl Lifecycle {
    /// 새 상태 머신 생성.
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Idle,
            reconnect_delay,
            reconnects: 0,
            last_cause: None,
        }
    }

    /// 현재 상태.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 지금까지 수행한 재연결 횟수.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// 마지막으로 재연결을 예약한 종료 원인.
    pub fn last_cause(&self) -> Option<TerminalCause> {
        self.last_cause
    }

    /// 연결 시도 시작.
    ///
    /// 중지된 상태이거나 이미 연결 중/연결됨 상태면 `false`를 반환합니다.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Closed => self.reconnects += 1,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Stopped => {
                return false
            }
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// 연결 수립 완료.
    pub fn opened(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
        }
    }

    /// 종료 이벤트 처리.
    ///
    /// 진행 중인 연결의 첫 종료 이벤트에 대해서만 재연결 지연을 반환합니다.
    pub fn terminate(&mut self, cause: TerminalCause) -> Option<Duration> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::Closed;
                self.last_cause = Some(cause);
                Some(self.reconnect_delay)
            }
            _ => None,
        }
    }

    /// 매니저 중지. 이후 어떤 이벤트도 재연결을 예약하지 않습니다.
    pub fn stop(&mut self) {
        self.state = ConnectionState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(3000);

    #[test]
    fn test_happy_path() {
        let mut lc = Lifecycle::new(DELAY);
        assert_eq!(lc.state(), ConnectionState::Idle);

        assert!(lc.begin_connect());
        assert_eq!(lc.state(), ConnectionState::Connecting);

        lc.opened();
        assert!(lc.state().is_open());
        assert_eq!(lc.reconnects(), 0);
    }

    #[test]
    fn test_close_and_error_schedule_one_reconnect() {
        let mut lc = Lifecycle::new(DELAY);
        lc.begin_connect();
        lc.opened();

        assert_eq!(lc.terminate(TerminalCause::Error), Some(DELAY));
        assert_eq!(lc.terminate(TerminalCause::Closed), None);
        assert_eq!(lc.terminate(TerminalCause::Error), None);
        assert_eq!(lc.state(), ConnectionState::Closed);
        assert_eq!(lc.last_cause(), Some(TerminalCause::Error));

        assert!(lc.begin_connect());
        assert_eq!(lc.reconnects(), 1);
    }

    #[test]
    fn test_connect_failure_schedules_reconnect() {
        let mut lc = Lifecycle::new(DELAY);
        lc.begin_connect();
        assert_eq!(lc.terminate(TerminalCause::ConnectFailed), Some(DELAY));
        assert!(lc.begin_connect());
        assert_eq!(lc.reconnects(), 1);
    }

    #[test]
    fn test_no_double_connect() {
        let mut lc = Lifecycle::new(DELAY);
        assert!(lc.begin_connect());
        assert!(!lc.begin_connect());
        lc.opened();
        assert!(!lc.begin_connect());
    }

    #[test]
    fn test_stopped_ignores_everything() {
        let mut lc = Lifecycle::new(DELAY);
        lc.begin_connect();
        lc.opened();
        lc.stop();

        assert_eq!(lc.terminate(TerminalCause::Closed), None);
        assert!(!lc.begin_connect());
        assert_eq!(lc.state(), ConnectionState::Stopped);
    }

    #[test]
    fn test_terminate_before_connect_is_ignored() {
        let mut lc = Lifecycle::new(DELAY);
        assert_eq!(lc.terminate(TerminalCause::Closed), None);
        assert_eq!(lc.state(), ConnectionState::Idle);
    }
}
