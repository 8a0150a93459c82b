//! 설정 관리.
//!
//! 환경 변수(`.env` 포함) 또는 TOML 파일에서 릴레이 설정을 로드합니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};
use crate::types::Symbol;

/// 기본 업스트림 WebSocket 주소 (심볼은 경로 마지막에 붙음).
pub const DEFAULT_UPSTREAM_WS_BASE: &str = "wss://meta-test.rasa.capital/ws/orderbook";

/// 기본 재연결 대기 시간 (밀리초).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// 릴레이 전체 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 업스트림 설정
    pub upstream: UpstreamConfig,
    /// 스트림/구독 설정
    pub stream: StreamConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 허용 CORS origin 목록 (비어 있으면 모두 허용)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3002,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// `host:port` 바인딩 주소.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 업스트림 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// 호가 스트림 기본 URL
    pub ws_base_url: String,
    /// 재연결 대기 시간 (밀리초)
    pub reconnect_delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            ws_base_url: DEFAULT_UPSTREAM_WS_BASE.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl UpstreamConfig {
    /// 심볼의 업스트림 스트림 URL.
    pub fn url_for(&self, symbol: &Symbol) -> String {
        format!("{}/{}", self.ws_base_url.trim_end_matches('/'), symbol)
    }

    /// 재연결 대기 시간을 Duration으로 반환
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// 스트림/구독 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// `symbol` 쿼리가 없을 때 사용할 심볼
    pub default_symbol: Symbol,
    /// 프로세스 시작 시 미리 연결할 심볼
    pub prestart_symbols: Vec<Symbol>,
    /// 동시에 릴레이할 수 있는 최대 심볼 수
    pub max_symbols: usize,
    /// SSE keep-alive 주기 (초)
    pub sse_keepalive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_symbol: Symbol::default(),
            prestart_symbols: vec![Symbol::default()],
            max_symbols: 64,
            sse_keepalive_secs: 15,
        }
    }
}

impl StreamConfig {
    /// SSE keep-alive 주기를 Duration으로 반환
    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_secs)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "relay_server=info,relay_upstream=info,relay_core=info,tower_http=info"
                .to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl RelayConfig {
    /// 환경변수에서 설정 로드.
    ///
    /// # 환경변수
    ///
    /// - `RELAY_HOST`, `RELAY_PORT`: 바인딩 주소 (기본값: 127.0.0.1:3002)
    /// - `CORS_ORIGINS`: 쉼표로 구분된 허용 origin 목록
    /// - `UPSTREAM_WS_BASE`: 업스트림 호가 스트림 기본 URL
    /// - `UPSTREAM_RECONNECT_DELAY_MS`: 재연결 대기 시간 (기본값: 3000)
    /// - `RELAY_DEFAULT_SYMBOL`: 기본 심볼 (기본값: BTCUSDT)
    /// - `RELAY_PRESTART_SYMBOLS`: 시작 시 연결할 심볼, 쉼표 구분 (기본값: BTCUSDT)
    /// - `RELAY_MAX_SYMBOLS`: 최대 심볼 수 (기본값: 64)
    /// - `SSE_KEEPALIVE_SECS`: SSE keep-alive 주기 (기본값: 15)
    /// - `RUST_LOG`, `LOG_FORMAT`: 로깅
    pub fn from_env() -> RelayResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let default_symbol = match std::env::var("RELAY_DEFAULT_SYMBOL") {
            Ok(raw) => Symbol::parse(&raw)
                .map_err(|e| RelayError::Config(format!("RELAY_DEFAULT_SYMBOL: {}", e)))?,
            Err(_) => defaults.stream.default_symbol.clone(),
        };

        let prestart_symbols = match std::env::var("RELAY_PRESTART_SYMBOLS") {
            Ok(raw) => parse_symbol_list(&raw)
                .map_err(|e| RelayError::Config(format!("RELAY_PRESTART_SYMBOLS: {}", e)))?,
            Err(_) => defaults.stream.prestart_symbols.clone(),
        };

        let config = Self {
            server: ServerConfig {
                host: std::env::var("RELAY_HOST").unwrap_or(defaults.server.host),
                port: env_var_parse("RELAY_PORT", defaults.server.port),
                cors_origins: std::env::var("CORS_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
            },
            upstream: UpstreamConfig {
                ws_base_url: std::env::var("UPSTREAM_WS_BASE")
                    .unwrap_or(defaults.upstream.ws_base_url),
                reconnect_delay_ms: env_var_parse(
                    "UPSTREAM_RECONNECT_DELAY_MS",
                    defaults.upstream.reconnect_delay_ms,
                ),
            },
            stream: StreamConfig {
                default_symbol,
                prestart_symbols,
                max_symbols: env_var_parse("RELAY_MAX_SYMBOLS", defaults.stream.max_symbols),
                sse_keepalive_secs: env_var_parse(
                    "SSE_KEEPALIVE_SECS",
                    defaults.stream.sse_keepalive_secs,
                ),
            },
            logging: LoggingConfig {
                level: std::env::var("RUST_LOG").unwrap_or(defaults.logging.level),
                format: std::env::var("LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// `RELAY__UPSTREAM__RECONNECT_DELAY_MS`처럼 `RELAY__` 접두사 환경 변수로
    /// 파일 값을 덮어쓸 수 있습니다.
    pub fn load<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 값 검증.
    pub fn validate(&self) -> RelayResult<()> {
        let base = &self.upstream.ws_base_url;
        if !(base.starts_with("ws://") || base.starts_with("wss://")) {
            return Err(RelayError::Config(format!(
                "업스트림 URL은 ws:// 또는 wss://로 시작해야 합니다: {}",
                base
            )));
        }
        if self.stream.max_symbols == 0 {
            return Err(RelayError::Config("max_symbols는 1 이상이어야 합니다".to_string()));
        }
        if self.stream.prestart_symbols.len() > self.stream.max_symbols {
            return Err(RelayError::Config(format!(
                "시작 심볼 수({})가 max_symbols({})를 초과합니다",
                self.stream.prestart_symbols.len(),
                self.stream.max_symbols
            )));
        }
        Ok(())
    }
}

/// 쉼표로 구분된 심볼 목록 파싱.
pub fn parse_symbol_list(raw: &str) -> RelayResult<Vec<Symbol>> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for item in split_list(raw) {
        let symbol = Symbol::parse(&item)?;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

/// 쉼표로 구분된 문자열을 공백 제거 후 분리
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.server.bind_address(), "127.0.0.1:3002");
        assert_eq!(config.upstream.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.stream.default_symbol.as_str(), "BTCUSDT");
        assert_eq!(config.stream.prestart_symbols, vec![Symbol::default()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_upstream_url_for_symbol() {
        let upstream = UpstreamConfig {
            ws_base_url: "wss://example.com/ws/orderbook/".to_string(),
            ..Default::default()
        };
        let symbol = Symbol::parse("ethusdt").unwrap();
        assert_eq!(upstream.url_for(&symbol), "wss://example.com/ws/orderbook/ETHUSDT");
    }

    #[test]
    fn test_parse_symbol_list() {
        let symbols = parse_symbol_list(" btcusdt, ETHUSDT ,,btcusdt").unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].as_str(), "BTCUSDT");
        assert_eq!(symbols[1].as_str(), "ETHUSDT");

        assert!(parse_symbol_list("BTCUSDT,BAD/ONE").is_err());
        assert!(parse_symbol_list("").unwrap().is_empty());
    }

    #[test]
    fn test_validate_rejects_http_upstream() {
        let mut config = RelayConfig::default();
        config.upstream.ws_base_url = "https://example.com".to_string();
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_validate_symbol_capacity() {
        let mut config = RelayConfig::default();
        config.stream.max_symbols = 1;
        config.stream.prestart_symbols =
            parse_symbol_list("BTCUSDT,ETHUSDT").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("relay-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
[server]
port = 4000

[upstream]
ws_base_url = "ws://localhost:9000/ws/orderbook"
reconnect_delay_ms = 500

[stream]
prestart_symbols = ["ethusdt"]
"#,
        )
        .unwrap();

        let config = RelayConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.upstream.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(config.stream.prestart_symbols[0].as_str(), "ETHUSDT");
        assert_eq!(config.stream.max_symbols, 64);
    }
}
