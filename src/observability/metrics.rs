//! Prometheus exporter setup.
//!
//! The engine records through the `metrics` facade:
//! - `balancer_selections_total{strategy}` / `balancer_selection_failures_total{strategy}`
//! - `balancer_liveness_transitions_total{to}`
//! - `balancer_servers_alive`
//! - `balancer_requests_total{outcome}` from the serving layer
//!
//! Without an installed recorder these calls are no-ops.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::core::config::MetricsSettings;
use crate::core::error::{BalancerError, BalancerResult};

/// Install the Prometheus recorder and its scrape listener when enabled
pub fn init_metrics(settings: &MetricsSettings, bind_address: &str) -> BalancerResult<()> {
    if !settings.enabled {
        return Ok(());
    }

    let addr: SocketAddr = format!("{}:{}", bind_address, settings.port)
        .parse()
        .map_err(|e| BalancerError::config(format!("Invalid metrics address: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| BalancerError::config(format!("Failed to install metrics exporter: {}", e)))?;

    describe_counter!("balancer_selections_total", "Successful server selections");
    describe_counter!("balancer_selection_failures_total", "Selections that found no live server");
    describe_counter!("balancer_liveness_transitions_total", "Server liveness changes");
    describe_counter!("balancer_requests_total", "Requests handled by outcome");
    describe_gauge!("balancer_servers_alive", "Servers alive after the last probe round");

    info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_is_noop() {
        let settings = MetricsSettings::default();
        assert!(init_metrics(&settings, "0.0.0.0").is_ok());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let settings = MetricsSettings {
            enabled: true,
            port: 9090,
        };
        assert!(init_metrics(&settings, "not an address").is_err());
    }
}
