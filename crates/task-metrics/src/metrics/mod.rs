//! Gauge sinks for per-task resource metrics

use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::config::{MonitorConfig, SinkKind};

pub mod encoders;
pub mod statsd;

use encoders::{create_encoder, GaugeEncoder};
pub use statsd::StatsdSink;

/// Tracing target routed to the metrics file by [`crate::logging::init`]
pub const METRICS_TARGET: &str = "metrics";

/// Destination for named numeric gauges.
///
/// Fire-and-forget: implementations swallow delivery failures, a lost sample
/// must never affect the task being observed.
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &str, value: f64);
}

impl<T: MetricsSink + ?Sized> MetricsSink for Arc<T> {
    fn gauge(&self, name: &str, value: f64) {
        self.as_ref().gauge(name, value)
    }
}

/// Writes encoded gauges as events on the `metrics` tracing target
pub struct LogMetricsSink {
    encoder: Box<dyn GaugeEncoder>,
}

impl LogMetricsSink {
    pub fn new(metrics_format: &str) -> Self {
        Self {
            encoder: create_encoder(metrics_format),
        }
    }
}

impl MetricsSink for LogMetricsSink {
    fn gauge(&self, name: &str, value: f64) {
        let metrics_str = self.encoder.encode_gauge(name, value, current_time());
        tracing::info!(
            target: METRICS_TARGET,
            msg = %metrics_str,
        );
    }
}

/// Build the sink selected by configuration.
///
/// A statsd sink that cannot open its socket degrades to the log sink.
pub fn create_sink(config: &MonitorConfig) -> Arc<dyn MetricsSink> {
    match config.sink {
        SinkKind::Log => Arc::new(LogMetricsSink::new(&config.metrics_format)),
        SinkKind::Statsd => match StatsdSink::connect(
            &config.statsd_host,
            config.statsd_port,
            &config.statsd_prefix,
        ) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                tracing::warn!(
                    "failed to create statsd sink for {}:{}: {e}; falling back to log sink",
                    config.statsd_host,
                    config.statsd_port
                );
                Arc::new(LogMetricsSink::new(&config.metrics_format))
            }
        },
    }
}

pub fn current_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
