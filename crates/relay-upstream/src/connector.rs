//! 업스트림 WebSocket 연결 추상화.
//!
//! 매니저는 [`UpstreamConnector`]를 통해 세션을 열고, 세션에서 [`SessionEvent`]를
//! 하나씩 꺼내 처리합니다. 실제 구현은 tokio-tungstenite 기반의
//! [`TungsteniteConnector`]이며, 테스트에서는 스크립트된 커넥터로 대체합니다.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::error::{UpstreamError, UpstreamResult};

/// 세션에서 관측되는 이벤트.
#[derive(Debug)]
pub enum SessionEvent {
    /// 텍스트 메시지
    Text(String),
    /// 바이너리 메시지
    Binary(Vec<u8>),
    /// 업스트림이 close 프레임을 보냄 (사유 포함 가능)
    Closed(Option<String>),
    /// 수신 에러
    Error(UpstreamError),
}

/// 열린 업스트림 세션.
#[async_trait]
pub trait UpstreamSession: Send {
    /// 다음 이벤트를 기다립니다.
    ///
    /// close 프레임 없이 스트림이 끝나면 `None`.
    async fn next_event(&mut self) -> Option<SessionEvent>;

    /// 세션을 닫습니다. 이미 닫힌 세션에 호출해도 됩니다.
    async fn close(&mut self);
}

/// 업스트림 세션 팩토리.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// 주어진 URL로 새 세션을 엽니다.
    async fn connect(&self, url: &str) -> UpstreamResult<Box<dyn UpstreamSession>>;
}

/// tokio-tungstenite 기반 커넥터.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl UpstreamConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> UpstreamResult<Box<dyn UpstreamSession>> {
        let (ws, response) = connect_async(url).await.map_err(|e| match UpstreamError::from(e) {
            UpstreamError::InvalidUrl(msg) => UpstreamError::InvalidUrl(msg),
            other => UpstreamError::Connect(other.to_string()),
        })?;

        debug!(url, status = %response.status(), "Upstream handshake complete");

        Ok(Box::new(TungsteniteSession { ws }))
    }
}

struct TungsteniteSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl UpstreamSession for TungsteniteSession {
    async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let event = match self.ws.next().await? {
                Ok(Message::Text(text)) => SessionEvent::Text(text.to_string()),
                Ok(Message::Binary(data)) => SessionEvent::Binary(data.to_vec()),
                Ok(Message::Close(frame)) => {
                    SessionEvent::Closed(frame.map(|f| format!("{} {}", f.code, f.reason)))
                }
                // ping 응답은 tungstenite가 읽기 중에 처리
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => SessionEvent::Error(e.into()),
            };
            return Some(event);
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "Upstream close handshake failed");
        }
    }
}
