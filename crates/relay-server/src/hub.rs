//! 심볼별 릴레이 채널 관리.
//!
//! 심볼마다 팬아웃 하나와 업스트림 매니저 하나를 묶어 채널로 관리합니다.
//! 채널은 처음 요청될 때 만들어지며, 최대 심볼 수를 넘으면 거부됩니다.
//!
//! 구독으로 열린 채널은 마지막 구독자가 떠나면 업스트림 연결과 함께 정리되어
//! 슬롯을 돌려줍니다. [`RelayHub::channel`]로 명시적으로 연 채널(사전 시작 심볼)은
//! 구독자가 없어도 종료 시까지 유지됩니다.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_core::{
    FanOut, FrameSink, RelayError, RelayResult, SharedFanOut, Subscription, Symbol, Transport,
    UpstreamConfig,
};
use relay_upstream::{
    ConnectionState, UpstreamConnector, UpstreamHandle, UpstreamManager, UpstreamStatsSnapshot,
};

/// 심볼 하나의 릴레이 채널.
struct SymbolChannel {
    fanout: SharedFanOut,
    upstream: UpstreamHandle,
    /// 구독자가 없어도 유지할지
    pinned: bool,
}

type ChannelMap = Mutex<HashMap<Symbol, SymbolChannel>>;

/// 심볼 채널 상태 요약.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    /// 심볼
    pub symbol: Symbol,
    /// 업스트림 연결 상태
    pub upstream: ConnectionState,
    /// WebSocket 구독자 수
    pub websocket_subscribers: usize,
    /// SSE 구독자 수
    pub sse_subscribers: usize,
    /// 캐시된 프레임 보유 여부
    pub has_latest: bool,
    /// 업스트림 수신 통계
    pub stats: UpstreamStatsSnapshot,
}

/// 심볼별 채널 레지스트리.
pub struct RelayHub {
    upstream: UpstreamConfig,
    max_symbols: usize,
    connector: Arc<dyn UpstreamConnector>,
    shutdown: CancellationToken,
    channels: Arc<ChannelMap>,
}

impl RelayHub {
    /// 새 허브 생성.
    ///
    /// 업스트림 매니저는 `shutdown`의 자식 토큰으로 실행되므로
    /// `shutdown`이 취소되면 모두 중지됩니다.
    pub fn new(
        upstream: UpstreamConfig,
        max_symbols: usize,
        connector: Arc<dyn UpstreamConnector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            upstream,
            max_symbols,
            connector,
            shutdown,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 심볼의 팬아웃을 반환합니다. 없으면 채널을 만들고 업스트림 연결을 시작합니다.
    ///
    /// 이렇게 연 채널은 고정되어 구독자가 없어도 정리되지 않습니다.
    /// tokio 런타임 안에서 호출해야 합니다.
    ///
    /// # Errors
    ///
    /// - 종료 중이면 `RelayError::Unavailable`
    /// - 최대 심볼 수를 넘으면 `RelayError::CapacityExceeded`
    pub fn channel(&self, symbol: &Symbol) -> RelayResult<SharedFanOut> {
        let mut channels = self.channels.lock();
        let channel = self.open_locked(&mut channels, symbol)?;
        channel.pinned = true;
        Ok(Arc::clone(&channel.fanout))
    }

    /// 심볼 채널에 구독자를 등록합니다.
    ///
    /// 종료 확인과 등록을 같은 락 안에서 수행하므로, 종료 신호 이후에 등록된 구독이
    /// [`close_subscribers`](Self::close_subscribers)를 피해 남는 일은 없습니다.
    pub fn subscribe(&self, symbol: &Symbol, transport: Transport) -> RelayResult<Subscription> {
        let mut channels = self.channels.lock();
        let channel = self.open_locked(&mut channels, symbol)?;
        Ok(channel.fanout.register(transport))
    }

    /// 채널 조회 또는 생성. 허브 락을 잡은 상태에서 호출합니다.
    fn open_locked<'a>(
        &self,
        channels: &'a mut HashMap<Symbol, SymbolChannel>,
        symbol: &Symbol,
    ) -> RelayResult<&'a mut SymbolChannel> {
        if self.shutdown.is_cancelled() {
            return Err(RelayError::Unavailable("relay is shutting down".to_string()));
        }

        let open = channels.len();
        match channels.entry(symbol.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                if open >= self.max_symbols {
                    warn!(%symbol, max = self.max_symbols, "Symbol limit reached");
                    return Err(RelayError::CapacityExceeded {
                        limit: self.max_symbols,
                    });
                }

                let weak = Arc::downgrade(&self.channels);
                let fanout = FanOut::with_idle_hook(
                    symbol.clone(),
                    Box::new(move |symbol| release_idle(&weak, symbol)),
                );
                let manager = UpstreamManager::new(
                    symbol.clone(),
                    &self.upstream,
                    Arc::clone(&self.connector),
                    Arc::clone(&fanout) as Arc<dyn FrameSink>,
                );
                info!(%symbol, url = manager.url(), "Opening relay channel");
                let upstream = manager.spawn(&self.shutdown);

                metrics::gauge!("relay_symbols_active").set((open + 1) as f64);
                Ok(entry.insert(SymbolChannel {
                    fanout,
                    upstream,
                    pinned: false,
                }))
            }
        }
    }

    /// 열린 채널 수.
    pub fn symbol_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// 전체 채널 상태 (심볼 순).
    pub fn snapshot(&self) -> Vec<ChannelStatus> {
        let channels = self.channels.lock();
        let mut statuses: Vec<ChannelStatus> = channels
            .iter()
            .map(|(symbol, channel)| ChannelStatus {
                symbol: symbol.clone(),
                upstream: channel.upstream.state(),
                websocket_subscribers: channel.fanout.subscriber_count_by(Transport::WebSocket),
                sse_subscribers: channel.fanout.subscriber_count_by(Transport::Sse),
                has_latest: channel.fanout.latest().is_some(),
                stats: channel.upstream.stats(),
            })
            .collect();
        statuses.sort_by(|a, b| a.symbol.as_str().cmp(b.symbol.as_str()));
        statuses
    }

    /// 모든 구독을 끊고 팬아웃을 닫습니다.
    ///
    /// 트랜스포트 태스크는 남은 프레임을 보낸 뒤 종료됩니다.
    pub fn close_subscribers(&self) -> usize {
        self.channels
            .lock()
            .values()
            .map(|channel| channel.fanout.close_all())
            .sum()
    }

    /// 모든 업스트림 연결을 닫고 구독을 끊습니다.
    pub async fn shutdown(&self) {
        let drained: Vec<(Symbol, SymbolChannel)> = {
            let mut channels = self.channels.lock();
            self.shutdown.cancel();
            channels.drain().collect()
        };
        metrics::gauge!("relay_symbols_active").set(0.0);

        for (symbol, channel) in drained {
            let closed = channel.fanout.close_all();
            channel.upstream.shutdown().await;
            info!(%symbol, subscribers = closed, "Relay channel closed");
        }
    }
}

/// 마지막 구독자가 떠난 고정되지 않은 채널을 정리합니다.
///
/// 팬아웃의 idle hook에서 호출됩니다. 그 사이 새 구독자가 들어왔으면 아무것도 하지 않습니다.
fn release_idle(channels: &Weak<ChannelMap>, symbol: &Symbol) {
    let Some(channels) = channels.upgrade() else {
        return;
    };

    let released = {
        let mut map = channels.lock();
        let idle = map
            .get(symbol)
            .is_some_and(|c| !c.pinned && c.fanout.subscriber_count() == 0);
        if !idle {
            return;
        }
        let released = map.remove(symbol);
        metrics::gauge!("relay_symbols_active").set(map.len() as f64);
        released
    };

    if let Some(channel) = released {
        channel.fanout.close_all();
        channel.upstream.cancel();
        info!(%symbol, "Relay channel released, no subscribers left");
    }
}
