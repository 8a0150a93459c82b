//! 업스트림 소켓 매니저.
//!
//! 심볼 하나에 대해 업스트림 WebSocket 연결을 하나만 유지합니다.
//!
//! - 수신한 메시지는 JSON으로 파싱하여 [`FrameSink`]에 게시합니다.
//!   파싱에 실패한 메시지는 로그를 남기고 버립니다.
//! - 연결이 닫히거나 에러가 나면 세션 정리보다 먼저 캐시된 프레임을 무효화하고,
//!   고정 지연(기본 3000ms) 후 정확히 한 번 재연결합니다. 이 과정은 무한히 반복됩니다.
//! - 새 연결을 열기 전에 이전 세션을 반드시 닫습니다.
//! - [`CancellationToken`]이 취소되면 대기 중인 재연결을 포함해 즉시 중지합니다.

use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use relay_core::{Frame, FrameSink, RelayResult, Symbol, UpstreamConfig};

use crate::connector::{SessionEvent, UpstreamConnector, UpstreamSession};
use crate::lifecycle::{ConnectionState, Lifecycle, TerminalCause};
use crate::stats::{UpstreamStats, UpstreamStatsSnapshot};

/// 심볼 하나의 업스트림 연결 관리자.
pub struct UpstreamManager {
    symbol: Symbol,
    url: String,
    lifecycle: Lifecycle,
    connector: Arc<dyn UpstreamConnector>,
    sink: Arc<dyn FrameSink>,
    state_tx: watch::Sender<ConnectionState>,
    stats: Arc<UpstreamStats>,
}

impl UpstreamManager {
    /// 새 매니저 생성. 연결은 [`run`](Self::run) 또는 [`spawn`](Self::spawn)에서 시작됩니다.
    pub fn new(
        symbol: Symbol,
        config: &UpstreamConfig,
        connector: Arc<dyn UpstreamConnector>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            url: config.url_for(&symbol),
            symbol,
            lifecycle: Lifecycle::new(config.reconnect_delay()),
            connector,
            sink,
            state_tx,
            stats: Arc::new(UpstreamStats::new()),
        }
    }

    /// 연결 대상 URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 별도 태스크에서 매니저를 실행합니다.
    ///
    /// 반환된 핸들의 토큰은 `parent`의 자식이므로 부모가 취소되면 함께 중지됩니다.
    pub fn spawn(self, parent: &CancellationToken) -> UpstreamHandle {
        let cancel = parent.child_token();
        let symbol = self.symbol.clone();
        let state_rx = self.state_tx.subscribe();
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run(cancel.clone()));

        UpstreamHandle {
            symbol,
            state_rx,
            stats,
            cancel,
            task,
        }
    }

    /// 취소될 때까지 연결/수신/재연결을 반복합니다.
    pub async fn run(mut self, cancel: CancellationToken) {
        let span = relay_core::stream_span!("upstream", self.symbol);
        async move {
            info!(url = %self.url, "Upstream manager started");

            while self.lifecycle.begin_connect() {
                self.publish_state();

                let attempt = self.lifecycle.reconnects();
                if attempt > 0 {
                    self.stats.record_reconnect();
                    counter!("relay_upstream_reconnects_total", "symbol" => self.symbol.to_string())
                        .increment(1);
                    info!(
                        attempt,
                        cause = ?self.lifecycle.last_cause(),
                        "Reconnecting to upstream"
                    );
                }

                let connected = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.connector.connect(&self.url) => result,
                };

                let cause = match connected {
                    Ok(mut session) => {
                        self.lifecycle.opened();
                        self.publish_state();
                        info!("Upstream connected");

                        let outcome = self.pump(session.as_mut(), &cancel).await;

                        // 캐시 무효화는 close 핸드셰이크보다 먼저. 이전 세션은 다음 연결 전에 닫는다
                        self.sink.invalidate();
                        session.close().await;

                        match outcome {
                            Some(cause) => cause,
                            None => break,
                        }
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(error = %e, "Upstream connect failed");
                        TerminalCause::ConnectFailed
                    }
                    Err(e) => {
                        error!(error = %e, "Upstream connect failed, will keep retrying");
                        TerminalCause::ConnectFailed
                    }
                };

                let Some(delay) = self.lifecycle.terminate(cause) else {
                    break;
                };
                self.publish_state();
                info!(
                    ?cause,
                    delay_ms = delay.as_millis() as u64,
                    "Upstream disconnected, reconnect scheduled"
                );

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.lifecycle.stop();
            self.publish_state();
            info!("Upstream manager stopped");
        }
        .instrument(span)
        .await
    }

    /// 세션이 끝날 때까지 이벤트를 처리합니다.
    ///
    /// 종료 원인을 반환하며, 취소되면 `None`.
    async fn pump(
        &self,
        session: &mut dyn UpstreamSession,
        cancel: &CancellationToken,
    ) -> Option<TerminalCause> {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return None,
                event = session.next_event() => event,
            };

            match event {
                Some(SessionEvent::Text(text)) => self.relay(Frame::parse(&text)),
                Some(SessionEvent::Binary(data)) => self.relay(Frame::parse_bytes(&data)),
                Some(SessionEvent::Closed(reason)) => {
                    info!(reason = reason.as_deref().unwrap_or("-"), "Upstream closed connection");
                    return Some(TerminalCause::Closed);
                }
                Some(SessionEvent::Error(e)) => {
                    warn!(error = %e, "Upstream socket error");
                    return Some(TerminalCause::Error);
                }
                None => {
                    info!("Upstream stream ended");
                    return Some(TerminalCause::Closed);
                }
            }
        }
    }

    fn relay(&self, parsed: RelayResult<Frame>) {
        match parsed {
            Ok(frame) => {
                self.stats.record_frame();
                counter!("relay_upstream_frames_total", "symbol" => self.symbol.to_string())
                    .increment(1);
                self.sink.publish(frame);
            }
            Err(e) => {
                self.stats.record_malformed();
                counter!("relay_upstream_malformed_total", "symbol" => self.symbol.to_string())
                    .increment(1);
                warn!(error = %e, "Dropping malformed upstream frame");
            }
        }
    }

    fn publish_state(&self) {
        let state = self.lifecycle.state();
        self.state_tx.send_replace(state);
        gauge!("relay_upstream_connected", "symbol" => self.symbol.to_string())
            .set(if state.is_open() { 1.0 } else { 0.0 });
        debug!(%state, "Upstream state changed");
    }
}

/// 실행 중인 업스트림 매니저 핸들.
#[derive(Debug)]
pub struct UpstreamHandle {
    symbol: Symbol,
    state_rx: watch::Receiver<ConnectionState>,
    stats: Arc<UpstreamStats>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl UpstreamHandle {
    /// 연결 대상 심볼.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// 현재 연결 상태.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// 상태 변경 구독.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// 수신 통계.
    pub fn stats(&self) -> UpstreamStatsSnapshot {
        self.stats.snapshot()
    }

    /// 매니저 중지를 요청합니다. 태스크는 대기 중인 재연결을 버리고 스스로 끝납니다.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 매니저를 중지하고 태스크 종료를 기다립니다.
    pub async fn shutdown(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            error!(symbol = %self.symbol, error = %e, "Upstream task panicked");
        }
    }
}
