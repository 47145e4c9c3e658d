//! Plugin configuration, resolved once from the environment
//!
//! Every option is read from an environment variable through clap's `env`
//! support; there is no command line. Use [`MonitorConfig::from_env`] at plugin
//! startup, or build a [`MonitorConfig`] directly in tests.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::sampler::DEFAULT_CPU_WINDOW;

const TRUTHY_VALUES: [&str; 5] = ["true", "1", "t", "y", "yes"];

/// Errors raised while resolving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid plugin configuration: {0}")]
    InvalidArgs(#[from] clap::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where gauges are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SinkKind {
    /// Encoded lines on the `metrics` tracing target
    #[default]
    Log,
    /// StatsD gauges over UDP
    Statsd,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "custom-metrics-plugin", no_binary_name = true)]
pub struct PluginArgs {
    #[arg(
        long,
        env = "CUSTOM_METRICS_PLUGIN_ENABLED",
        default_value = "false",
        value_parser = parse_flag,
        action = clap::ArgAction::Set,
        help = "Enable per-task resource metrics; accepts true/1/t/y/yes, anything else disables"
    )]
    pub enabled: bool,

    #[arg(
        long,
        env = "CUSTOM_METRICS_PLUGIN_SLEEP_INTERVAL_SECONDS",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds to sleep between two samples of a task's process"
    )]
    pub sleep_interval_seconds: u64,

    #[arg(
        long,
        env = "CUSTOM_METRICS_PLUGIN_SINK",
        value_enum,
        default_value_t = SinkKind::Log,
        help = "Gauge destination, either 'log' or 'statsd'"
    )]
    pub sink: SinkKind,

    #[arg(
        long,
        env = "CUSTOM_METRICS_PLUGIN_METRICS_FORMAT",
        default_value = "influx",
        help = "Metrics line format for the log sink, either 'influx' or 'json'"
    )]
    pub metrics_format: String,

    #[arg(
        long,
        env = "CUSTOM_METRICS_PLUGIN_METRICS_FILE",
        value_hint = clap::ValueHint::FilePath,
        default_value = "/logs/metrics.log",
        help = "Path for metrics lines written by the log sink, e.g. /logs/metrics.log"
    )]
    pub metrics_file: PathBuf,

    #[arg(
        long,
        env = "CUSTOM_METRICS_PLUGIN_STATSD_HOST",
        default_value = "localhost"
    )]
    pub statsd_host: String,

    #[arg(long, env = "CUSTOM_METRICS_PLUGIN_STATSD_PORT", default_value_t = 8125)]
    pub statsd_port: u16,

    #[arg(
        long,
        env = "CUSTOM_METRICS_PLUGIN_STATSD_PREFIX",
        default_value = "airflow"
    )]
    pub statsd_prefix: String,
}

/// Interpret an environment flag; unknown values mean "disabled".
fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    Ok(TRUTHY_VALUES.contains(&value.trim().to_lowercase().as_str()))
}

/// Resolved plugin configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Sleep between two samples of the same task
    pub sample_interval: Duration,
    /// Window CPU usage is averaged over for one sample
    pub cpu_window: Duration,
    pub sink: SinkKind,
    pub metrics_format: String,
    pub metrics_file: PathBuf,
    pub statsd_host: String,
    pub statsd_port: u16,
    pub statsd_prefix: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_interval: Duration::from_secs(1),
            cpu_window: DEFAULT_CPU_WINDOW,
            sink: SinkKind::Log,
            metrics_format: "influx".to_string(),
            metrics_file: PathBuf::from("/logs/metrics.log"),
            statsd_host: "localhost".to_string(),
            statsd_port: 8125,
            statsd_prefix: "airflow".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Resolve configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let args = PluginArgs::try_parse_from(std::iter::empty::<String>())?;
        Ok(args.into())
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window;
        self
    }
}

impl From<PluginArgs> for MonitorConfig {
    fn from(args: PluginArgs) -> Self {
        Self {
            enabled: args.enabled,
            sample_interval: Duration::from_secs(args.sleep_interval_seconds),
            cpu_window: DEFAULT_CPU_WINDOW,
            sink: args.sink,
            metrics_format: args.metrics_format,
            metrics_file: args.metrics_file,
            statsd_host: args.statsd_host,
            statsd_port: args.statsd_port,
            statsd_prefix: args.statsd_prefix,
        }
    }
}
