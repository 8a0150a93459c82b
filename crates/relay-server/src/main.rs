//! 호가 스트림 릴레이 서버.
//!
//! 업스트림 호가 WebSocket을 심볼별로 하나씩 유지하고,
//! 받은 프레임을 WebSocket(`/ws`)과 SSE(`/stream/orderbook`) 구독자에게 전달합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use relay_core::logging::{init_logging, LogConfig};
use relay_core::RelayConfig;
use relay_server::hub::RelayHub;
use relay_server::routes::create_router;
use relay_server::setup_metrics_recorder;
use relay_server::state::AppState;
use relay_upstream::TungsteniteConnector;

/// 설정 로드.
///
/// `RELAY_CONFIG`가 있으면 해당 TOML 파일(+ `RELAY__` 환경 변수)을, 없으면 환경 변수만 사용합니다.
fn load_config() -> anyhow::Result<RelayConfig> {
    let _ = dotenvy::dotenv();

    let config = match std::env::var("RELAY_CONFIG") {
        Ok(path) => RelayConfig::load(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => RelayConfig::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    init_logging(LogConfig::from(&config.logging)).map_err(|e| anyhow::anyhow!(e))?;

    info!("Starting order book relay...");

    let metrics_handle = match setup_metrics_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics recorder initialized");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let addr: SocketAddr = config.server.bind_address().parse().map_err(|e| {
        error!(
            host = %config.server.host,
            port = config.server.port,
            error = %e,
            "소켓 주소 설정이 유효하지 않습니다. RELAY_HOST, RELAY_PORT 환경변수를 확인하세요."
        );
        e
    })?;

    // 전역 종료 토큰 (업스트림 매니저는 자식 토큰으로 실행)
    let shutdown_token = CancellationToken::new();

    let hub = Arc::new(RelayHub::new(
        config.upstream.clone(),
        config.stream.max_symbols,
        Arc::new(TungsteniteConnector),
        shutdown_token.child_token(),
    ));

    // 사전 시작 심볼은 구독자가 없어도 유지된다
    for symbol in &config.stream.prestart_symbols {
        hub.channel(symbol)?;
    }
    info!(
        symbols = hub.symbol_count(),
        upstream = %config.upstream.ws_base_url,
        reconnect_delay_ms = config.upstream.reconnect_delay_ms,
        "Upstream channels started"
    );

    let state = Arc::new(AppState::new(Arc::clone(&hub), &config.stream));
    let app = create_router(state, metrics_handle, &config.server.cors_origins);

    info!(%addr, "Relay server listening");
    info!("WebSocket available at ws://{}/ws?symbol={}", addr, config.stream.default_symbol);
    info!("SSE available at http://{}/stream/orderbook", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone(), Arc::clone(&hub)))
        .await?;

    info!("Server shutdown initiated, closing upstream connections...");
    shutdown_token.cancel();

    if tokio::time::timeout(Duration::from_secs(10), hub.shutdown())
        .await
        .is_err()
    {
        warn!("Upstream shutdown timeout, forcing exit");
    }

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM을 받으면 종료 토큰을 취소하고 모든 구독을 끊어
/// 열린 SSE/WebSocket 스트림이 끝나도록 합니다.
async fn shutdown_signal(shutdown_token: CancellationToken, hub: Arc<RelayHub>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    let closed = hub.close_subscribers();
    info!(subscribers = closed, "Shutdown signal propagated to subscribers");
}
