//! 릴레이 서버 통합 테스트 공통 도구.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relay_core::{StreamConfig, Symbol, UpstreamConfig};
use relay_server::{create_router, AppState, RelayHub};
use relay_upstream::{SessionEvent, UpstreamConnector, UpstreamResult, UpstreamSession};

/// 연결될 때마다 세션 송신기를 테스트에 넘겨주는 커넥터.
///
/// 테스트가 송신기를 drop하면 해당 업스트림 세션이 끝난다.
pub struct ChannelConnector {
    sessions: mpsc::UnboundedSender<(String, mpsc::UnboundedSender<SessionEvent>)>,
}

struct ChannelSession {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

#[async_trait]
impl UpstreamConnector for ChannelConnector {
    async fn connect(&self, url: &str) -> UpstreamResult<Box<dyn UpstreamSession>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.sessions.send((url.to_string(), tx));
        Ok(Box::new(ChannelSession { rx }))
    }
}

#[async_trait]
impl UpstreamSession for ChannelSession {
    async fn next_event(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// 테스트용 릴레이 구성.
pub struct Harness {
    pub hub: Arc<RelayHub>,
    pub app: Router,
    pub sessions: mpsc::UnboundedReceiver<(String, mpsc::UnboundedSender<SessionEvent>)>,
}

impl Harness {
    pub fn new(reconnect_delay_ms: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let upstream = UpstreamConfig {
            ws_base_url: "wss://upstream.test/ws/orderbook".to_string(),
            reconnect_delay_ms,
        };
        let stream = StreamConfig {
            max_symbols: 2,
            ..StreamConfig::default()
        };

        let hub = Arc::new(RelayHub::new(
            upstream,
            stream.max_symbols,
            Arc::new(ChannelConnector { sessions: tx }),
            CancellationToken::new(),
        ));
        let state = Arc::new(AppState::new(Arc::clone(&hub), &stream));
        let app = create_router(state, None, &[]);

        Self {
            hub,
            app,
            sessions: rx,
        }
    }

    /// 다음 업스트림 연결을 기다린다.
    pub async fn next_upstream(&mut self) -> (String, mpsc::UnboundedSender<SessionEvent>) {
        tokio::time::timeout(Duration::from_secs(5), self.sessions.recv())
            .await
            .expect("upstream connect timed out")
            .expect("connector dropped")
    }

    /// 실제 TCP 리스너로 서버를 띄운다.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.app.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).unwrap()
}

pub fn text(raw: &str) -> SessionEvent {
    SessionEvent::Text(raw.to_string())
}

/// 조건이 참이 될 때까지 짧게 폴링한다.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
