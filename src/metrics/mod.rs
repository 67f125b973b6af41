//! Prometheus metrics module
//!
//! Metric calls go through the `metrics` facade. Only the binary installs
//! the Prometheus recorder; without it every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Gateway metrics collector
#[derive(Clone, Default)]
pub struct GatewayMetrics {
    handle: Option<Arc<PrometheusHandle>>,
}

impl GatewayMetrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;

        Self::register_metrics();

        Ok(Self {
            handle: Some(Arc::new(handle)),
        })
    }

    /// Collector that records into whatever recorder is installed, if any
    pub fn detached() -> Self {
        Self::default()
    }

    fn register_metrics() {
        describe_counter!(
            "gateway_events_received_total",
            Unit::Count,
            "Total events received from Discord"
        );
        describe_counter!(
            "gateway_dispatch_failures_total",
            Unit::Count,
            "Handler failures while dispatching events and commands"
        );
        describe_counter!(
            "gateway_errors_total",
            Unit::Count,
            "Total gateway errors"
        );

        describe_histogram!(
            "gateway_startup_duration_seconds",
            Unit::Seconds,
            "Time from start request to running"
        );

        describe_gauge!(
            "gateway_shards_ready",
            Unit::Count,
            "Number of shards in ready state"
        );
        describe_gauge!(
            "gateway_guilds_total",
            Unit::Count,
            "Guilds per shard"
        );
        describe_gauge!(
            "gateway_modules",
            Unit::Count,
            "Modules per lifecycle state"
        );
        describe_gauge!(
            "gateway_lifecycle_running",
            Unit::Count,
            "Lifecycle status (1=running, 0=stopped)"
        );
    }

    pub fn record_event(&self, shard_id: u64, event_type: &'static str) {
        counter!(
            "gateway_events_received_total",
            "shard_id" => shard_id.to_string(),
            "event_type" => event_type
        )
        .increment(1);
    }

    pub fn record_dispatch_failure(&self, kind: &'static str) {
        counter!("gateway_dispatch_failures_total", "kind" => kind).increment(1);
    }

    pub fn record_error(&self, error_type: &'static str) {
        counter!("gateway_errors_total", "error_type" => error_type).increment(1);
    }

    pub fn record_heartbeat(&self, shard_id: u64) {
        // Heartbeats are frequent, just update a gauge
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        gauge!(
            "gateway_last_heartbeat_timestamp",
            "shard_id" => shard_id.to_string()
        )
        .set(now);
    }

    pub fn set_guilds(&self, shard_id: u64, count: u64) {
        gauge!(
            "gateway_guilds_total",
            "shard_id" => shard_id.to_string()
        )
        .set(count as f64);
    }

    pub fn set_shards_ready(&self, count: usize) {
        gauge!("gateway_shards_ready").set(count as f64);
    }

    pub fn set_modules(&self, state: &'static str, count: usize) {
        gauge!("gateway_modules", "state" => state).set(count as f64);
    }

    pub fn set_running(&self, running: bool) {
        gauge!("gateway_lifecycle_running").set(if running { 1.0 } else { 0.0 });
    }

    pub fn record_startup(&self, duration: Duration) {
        histogram!("gateway_startup_duration_seconds").record(duration.as_secs_f64());
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(|handle| handle.render())
            .unwrap_or_default()
    }
}
