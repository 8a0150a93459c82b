//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! 구독자 수와 HTTP 요청 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.
//! 업스트림 수신 카운터는 `relay-upstream`에서 같은 레코더로 기록됩니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

use relay_core::Transport;

/// Prometheus 메트릭 레코더를 설치하고 렌더링 핸들을 반환합니다.
///
/// # Errors
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
        )?
        .install_recorder()
}

/// HTTP 응답 카운터 증가.
///
/// SSE와 WebSocket 요청은 응답 헤더가 나갈 때까지만 측정됩니다.
pub fn record_http_response(method: &str, route: &str, status: u16, duration_secs: f64) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration_secs);
}

/// 구독자 연결 수 증가.
pub fn increment_subscribers(transport: Transport, symbol: &str) {
    gauge!(
        "relay_subscribers_active",
        "transport" => transport.to_string(),
        "symbol" => symbol.to_string()
    )
    .increment(1.0);
    counter!("relay_subscribers_total", "transport" => transport.to_string()).increment(1);
}

/// 구독자 연결 수 감소.
pub fn decrement_subscribers(transport: Transport, symbol: &str) {
    gauge!(
        "relay_subscribers_active",
        "transport" => transport.to_string(),
        "symbol" => symbol.to_string()
    )
    .decrement(1.0);
}

/// 거부된 구독 요청 카운터 증가.
pub fn record_rejected_subscription(transport: Transport, code: &str) {
    counter!(
        "relay_subscriptions_rejected_total",
        "transport" => transport.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// 구독자 쓰기 실패 카운터 증가.
pub fn record_delivery_failure(transport: Transport) {
    counter!("relay_delivery_failures_total", "transport" => transport.to_string()).increment(1);
}

/// 연결 하나 동안 증가시킨 게이지를 끝날 때 되돌리는 가드.
pub struct SubscriberGauge {
    transport: Transport,
    symbol: String,
}

impl SubscriberGauge {
    /// 게이지를 증가시키고 가드를 반환합니다.
    pub fn open(transport: Transport, symbol: &str) -> Self {
        increment_subscribers(transport, symbol);
        Self {
            transport,
            symbol: symbol.to_string(),
        }
    }
}

impl Drop for SubscriberGauge {
    fn drop(&mut self) {
        decrement_subscribers(self.transport, &self.symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_guard_without_recorder() {
        // 레코더가 없으면 no-op이어야 한다
        let guard = SubscriberGauge::open(Transport::Sse, "BTCUSDT");
        drop(guard);
        record_rejected_subscription(Transport::WebSocket, "INVALID_SYMBOL");
        record_delivery_failure(Transport::WebSocket);
    }
}
