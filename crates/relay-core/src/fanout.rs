//! 구독자 팬아웃.
//!
//! 심볼 하나의 구독자 목록과 마지막 프레임(LatestFrame)을 관리하고,
//! 업스트림 프레임을 모든 구독자에게 전달합니다.
//!
//! # 전달 방식
//!
//! 각 구독자는 무제한(unbounded) 채널을 하나씩 가집니다. `publish`는 락을 잡은 채로
//! 채널에 넣기만 하므로 블로킹되지 않으며, 실제 소켓 쓰기는 트랜스포트 태스크가
//! 채널을 비우면서 수행합니다. 수신 측이 사라진 구독자는 전달 실패로 간주되어
//! 제거되고 나머지 구독자 전달에는 영향을 주지 않습니다.
//!
//! # 수명
//!
//! [`close_all`](FanOut::close_all) 이후의 팬아웃은 닫힌 상태가 되어 새 구독을 받지 않습니다.
//! 마지막 구독자가 떠나면 [`IdleHook`]이 호출되어 소유자가 채널을 정리할 수 있습니다.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::frame::Frame;
use crate::types::Symbol;

/// 구독자 ID.
pub type SubscriberId = Uuid;

/// 구독자 트랜스포트 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// 원문 WebSocket 패스스루
    WebSocket,
    /// Server-Sent Events
    Sse,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::WebSocket => write!(f, "websocket"),
            Transport::Sse => write!(f, "sse"),
        }
    }
}

/// 업스트림 프레임을 받아들이는 쪽.
///
/// 업스트림 소켓 매니저는 이 trait을 통해서만 팬아웃에 접근합니다.
pub trait FrameSink: Send + Sync {
    /// 새 프레임을 게시합니다.
    fn publish(&self, frame: Frame);

    /// 업스트림 연결이 끊겼을 때 캐시된 프레임을 무효화합니다.
    fn invalidate(&self);
}

/// 마지막 구독자가 떠났을 때 호출되는 콜백.
///
/// 팬아웃 락을 놓은 뒤 호출되므로 콜백 안에서 팬아웃 메서드를 불러도 됩니다.
pub type IdleHook = Box<dyn Fn(&Symbol) + Send + Sync>;

/// 등록된 구독자.
#[derive(Debug)]
struct Subscriber {
    transport: Transport,
    tx: mpsc::UnboundedSender<Frame>,
}

#[derive(Debug, Default)]
struct FanOutState {
    latest: Option<Frame>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    closed: bool,
}

impl FanOutState {
    /// 구독자가 방금 모두 떠났는지 (닫힌 팬아웃은 제외).
    fn became_idle(&self, before: usize) -> bool {
        before > 0 && self.subscribers.is_empty() && !self.closed
    }
}

/// 심볼 하나에 대한 구독자 팬아웃.
pub struct FanOut {
    symbol: Symbol,
    state: Mutex<FanOutState>,
    on_idle: Option<IdleHook>,
}

impl fmt::Debug for FanOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOut")
            .field("symbol", &self.symbol)
            .field("state", &self.state)
            .field("on_idle", &self.on_idle.is_some())
            .finish()
    }
}

/// 공유 가능한 팬아웃 타입.
pub type SharedFanOut = Arc<FanOut>;

impl FanOut {
    /// 새로운 팬아웃 생성.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: Mutex::new(FanOutState::default()),
            on_idle: None,
        }
    }

    /// 공유 팬아웃 생성.
    pub fn shared(symbol: Symbol) -> SharedFanOut {
        Arc::new(Self::new(symbol))
    }

    /// 마지막 구독자가 떠날 때 `hook`을 호출하는 공유 팬아웃 생성.
    pub fn with_idle_hook(symbol: Symbol, hook: IdleHook) -> SharedFanOut {
        Arc::new(Self {
            on_idle: Some(hook),
            ..Self::new(symbol)
        })
    }

    /// 이 팬아웃의 심볼.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// 새 구독자 등록.
    ///
    /// 캐시된 프레임이 있으면 등록과 같은 임계 구역 안에서 먼저 넣어 두므로,
    /// 이후 `publish`되는 프레임보다 항상 앞서 전달됩니다.
    ///
    /// 반환된 [`Subscription`]이 drop되면 자동으로 등록 해제됩니다.
    /// 이미 닫힌 팬아웃에 등록하면 곧바로 끝나는 구독이 반환됩니다.
    pub fn register(self: &Arc<Self>, transport: Transport) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            debug!(
                symbol = %self.symbol,
                subscriber = %id,
                %transport,
                "Fan-out closed, subscription ends immediately"
            );
        } else {
            if let Some(latest) = &state.latest {
                // 수신기를 아직 쥐고 있으므로 실패할 수 없음
                let _ = tx.send(latest.clone());
            }
            state.subscribers.insert(id, Subscriber { transport, tx });
            drop(state);
            debug!(symbol = %self.symbol, subscriber = %id, %transport, "Subscriber registered");
        }

        Subscription {
            id,
            transport,
            rx,
            fanout: Arc::clone(self),
        }
    }

    /// 구독자 등록 해제.
    ///
    /// 이미 없는 구독자를 해제해도 아무 일도 일어나지 않습니다.
    ///
    /// # Returns
    ///
    /// 실제로 제거되었으면 `true`
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, idle) = {
            let mut state = self.state.lock();
            let before = state.subscribers.len();
            let removed = state.subscribers.remove(&id).is_some();
            (removed, state.became_idle(before))
        };

        if removed {
            debug!(symbol = %self.symbol, subscriber = %id, "Subscriber unregistered");
        }
        if idle {
            self.notify_idle();
        }
        removed
    }

    /// 프레임 게시.
    ///
    /// LatestFrame을 갱신한 뒤 등록된 모든 구독자에게 전달합니다.
    /// 전달에 실패한 구독자는 제거됩니다.
    ///
    /// # Returns
    ///
    /// 전달에 성공한 구독자 수
    pub fn publish(&self, frame: Frame) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        state.latest = Some(frame.clone());

        let before = state.subscribers.len();
        state.subscribers.retain(|id, subscriber| {
            if subscriber.tx.send(frame.clone()).is_ok() {
                true
            } else {
                warn!(
                    symbol = %self.symbol,
                    subscriber = %id,
                    transport = %subscriber.transport,
                    "Subscriber delivery failed, removing"
                );
                false
            }
        });
        let delivered = state.subscribers.len();
        let idle = state.became_idle(before);
        drop(state);

        if delivered < before {
            debug!(
                symbol = %self.symbol,
                removed = before - delivered,
                "Dropped dead subscribers during publish"
            );
        }
        if idle {
            self.notify_idle();
        }

        delivered
    }

    fn notify_idle(&self) {
        if let Some(hook) = &self.on_idle {
            debug!(symbol = %self.symbol, "Last subscriber left");
            hook(&self.symbol);
        }
    }

    /// 캐시된 마지막 프레임.
    pub fn latest(&self) -> Option<Frame> {
        self.state.lock().latest.clone()
    }

    /// 캐시된 마지막 프레임 제거.
    pub fn clear_latest(&self) {
        self.state.lock().latest = None;
    }

    /// 모든 구독자를 해제하고 팬아웃을 닫습니다.
    ///
    /// 송신 채널이 모두 닫히므로 트랜스포트 태스크는 남은 프레임을 비운 뒤 종료됩니다.
    /// 이후의 `register`는 곧바로 끝나는 구독을 돌려주고 `publish`는 무시됩니다.
    pub fn close_all(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let count = state.subscribers.len();
        state.subscribers.clear();
        count
    }

    /// 닫힌 팬아웃인지.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// 등록된 구독자 수.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// 트랜스포트별 구독자 수.
    pub fn subscriber_count_by(&self, transport: Transport) -> usize {
        self.state
            .lock()
            .subscribers
            .values()
            .filter(|s| s.transport == transport)
            .count()
    }
}

impl FrameSink for FanOut {
    fn publish(&self, frame: Frame) {
        FanOut::publish(self, frame);
    }

    fn invalidate(&self) {
        self.clear_latest();
    }
}

/// 팬아웃에 등록된 구독 핸들.
///
/// drop 시 팬아웃에서 등록 해제됩니다.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    transport: Transport,
    rx: mpsc::UnboundedReceiver<Frame>,
    fanout: SharedFanOut,
}

impl Subscription {
    /// 구독자 ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// 트랜스포트 종류.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// 구독 중인 심볼.
    pub fn symbol(&self) -> &Symbol {
        self.fanout.symbol()
    }

    /// 다음 프레임 수신.
    ///
    /// 팬아웃에서 제거되면 `None`을 반환합니다.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// 대기 없이 프레임 수신.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.fanout.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(bid: i64) -> Frame {
        Frame::from_value(json!({"bid": bid, "ask": bid + 1}))
    }

    fn fanout() -> SharedFanOut {
        FanOut::shared(Symbol::default())
    }

    #[test]
    fn test_register_and_unregister() {
        let fanout = fanout();
        let sub = fanout.register(Transport::WebSocket);
        assert_eq!(fanout.subscriber_count(), 1);

        assert!(fanout.unregister(sub.id()));
        assert_eq!(fanout.subscriber_count(), 0);

        // 두 번째 해제는 no-op
        assert!(!fanout.unregister(sub.id()));
    }

    #[test]
    fn test_drop_unregisters() {
        let fanout = fanout();
        {
            let _sub = fanout.register(Transport::Sse);
            assert_eq!(fanout.subscriber_count_by(Transport::Sse), 1);
        }
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_updates_latest() {
        let fanout = fanout();
        assert!(fanout.latest().is_none());

        fanout.publish(frame(100));
        fanout.publish(frame(102));

        assert_eq!(fanout.latest(), Some(frame(102)));
    }

    #[test]
    fn test_late_joiner_receives_latest_first() {
        let fanout = fanout();
        fanout.publish(frame(100));

        let mut sub = fanout.register(Transport::Sse);
        fanout.publish(frame(101));

        assert_eq!(sub.try_recv(), Some(frame(100)));
        assert_eq!(sub.try_recv(), Some(frame(101)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_no_latest_means_no_initial_delivery() {
        let fanout = fanout();
        let mut sub = fanout.register(Transport::WebSocket);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_failed_subscriber_does_not_block_others() {
        let fanout = fanout();
        let mut sub_a = fanout.register(Transport::WebSocket);
        let mut sub_b = fanout.register(Transport::WebSocket);

        // 수신 측만 닫아서 쓰기 실패를 흉내낸다
        sub_a.rx.close();

        let delivered = fanout.publish(frame(100));

        assert_eq!(delivered, 1);
        assert_eq!(sub_b.try_recv(), Some(frame(100)));
        assert!(!fanout.unregister(sub_a.id()));

        fanout.publish(frame(101));
        assert_eq!(sub_b.try_recv(), Some(frame(101)));
    }

    #[test]
    fn test_clear_latest() {
        let fanout = fanout();
        fanout.publish(frame(100));
        FrameSink::invalidate(fanout.as_ref());

        let mut sub = fanout.register(Transport::Sse);
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_register_after_close_ends_immediately() {
        let fanout = fanout();
        fanout.publish(frame(1));
        fanout.close_all();

        let mut late = fanout.register(Transport::Sse);
        assert!(fanout.is_closed());
        assert_eq!(fanout.subscriber_count(), 0);
        assert_eq!(late.recv().await, None);

        assert_eq!(fanout.publish(frame(2)), 0);
    }

    #[test]
    fn test_idle_hook_fires_when_last_subscriber_leaves() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let fanout = FanOut::with_idle_hook(
            Symbol::default(),
            Box::new(move |symbol| {
                assert_eq!(symbol.as_str(), "BTCUSDT");
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let a = fanout.register(Transport::WebSocket);
        let b = fanout.register(Transport::Sse);
        drop(a);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // 닫힌 팬아웃에서는 호출되지 않는다
        let c = fanout.register(Transport::Sse);
        fanout.close_all();
        drop(c);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_all_ends_subscriptions() {
        let fanout = fanout();
        let mut sub = fanout.register(Transport::Sse);
        fanout.publish(frame(1));

        assert_eq!(fanout.close_all(), 1);
        assert_eq!(sub.recv().await, Some(frame(1)));
        assert_eq!(sub.recv().await, None);
    }
}
