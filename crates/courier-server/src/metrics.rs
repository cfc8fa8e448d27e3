//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket upgrades accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Sessions currently registered (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Valid inbound messages accepted from sessions (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "messages_received_total";
/// Messages written to a recipient (counter).
pub const MESSAGES_DELIVERED_TOTAL: &str = "messages_delivered_total";
/// Messages with no live recipient or a failed write (counter, label: reason).
pub const MESSAGES_DROPPED_TOTAL: &str = "messages_dropped_total";
/// Durable log appends that failed (counter).
pub const PERSIST_FAILURES_TOTAL: &str = "persist_failures_total";
/// Rejected tokens and credentials (counter, label: surface).
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            MESSAGES_RECEIVED_TOTAL,
            MESSAGES_DELIVERED_TOTAL,
            MESSAGES_DROPPED_TOTAL,
            PERSIST_FAILURES_TOTAL,
            AUTH_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
