//! provides logging helpers

use std::env;
use std::fmt::{self};
use std::path::Path;
use std::path::PathBuf;

use tracing::field::Field;
use tracing::field::Visit;
use tracing::Event;
use tracing::Subscriber;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::FilterExt;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::format;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use utils::logging::LOG_PATH_ENV_VAR;

use crate::config::MonitorConfig;
use crate::metrics::METRICS_TARGET;

const DEFAULT_METRICS_PREFIX: &str = "metrics.log";

/// Writes the pre-encoded metrics line carried by the event, nothing else
struct MetricsLineFormatter;

struct FieldVisitor {
    msg: String,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, _: &Field, value: &str) {
        self.msg.push_str(value);
    }

    fn record_debug(&mut self, _: &Field, value: &dyn fmt::Debug) {
        self.msg.push_str(&format!("{value:?}"));
    }
}

impl<S, N> FormatEvent<S, N> for MetricsLineFormatter
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldVisitor { msg: String::new() };
        event.record(&mut visitor);
        write!(writer, "{}", visitor.msg)?;
        Ok(())
    }
}

/// Split the configured metrics path into the rotation directory and file prefix
fn rotation_target(metrics_file: &Path) -> (PathBuf, String) {
    if metrics_file.is_dir() {
        return (metrics_file.to_path_buf(), DEFAULT_METRICS_PREFIX.to_string());
    }
    let parent = metrics_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = metrics_file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_METRICS_PREFIX);
    (parent.to_path_buf(), prefix.to_string())
}

/// An explicit path wins; otherwise the configured metrics file is used.
fn resolve_metrics_file<P: AsRef<Path>>(metrics_file: Option<P>) -> PathBuf {
    match metrics_file {
        Some(path) => path.as_ref().to_path_buf(),
        None => MonitorConfig::from_env()
            .map(|config| config.metrics_file)
            .unwrap_or_else(|_| MonitorConfig::default().metrics_file),
    }
}

/// initiate the global tracing subscriber
///
/// Human-readable logs go through the shared fmt layer; events on the
/// `metrics` target are written verbatim to a daily rolling metrics file.
/// Without an explicit `metrics_file` the path comes from
/// `CUSTOM_METRICS_PLUGIN_METRICS_FILE`, defaulting to `/logs/metrics.log`.
pub fn init<P: AsRef<Path>>(metrics_file: Option<P>) -> tracing_appender::non_blocking::WorkerGuard {
    let log_path = env::var(LOG_PATH_ENV_VAR).ok();
    let fmt_layer = utils::logging::get_fmt_layer(log_path);

    let metrics_file = resolve_metrics_file(metrics_file);
    let (rotation_dir, prefix) = rotation_target(&metrics_file);

    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt_layer = fmt_layer.with_filter(env_filter.and(filter::filter_fn(|metadata| {
        !metadata.target().eq(METRICS_TARGET)
    })));

    let (file_writer, file_guard) = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&prefix)
        .max_log_files(3)
        .build(&rotation_dir)
    {
        Ok(appender) => tracing_appender::non_blocking(appender),
        Err(err) => {
            eprintln!(
                "failed to create metrics rolling file appender at {}: {err}; falling back to stdout",
                rotation_dir.display()
            );
            tracing_appender::non_blocking(std::io::stdout())
        }
    };

    let metrics_layer = layer()
        .event_format(MetricsLineFormatter {})
        .fmt_fields(format::DefaultFields::new())
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target().eq(METRICS_TARGET)
        }));

    registry().with(fmt_layer).with(metrics_layer).init();
    file_guard
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn explicit_metrics_file_wins() {
        assert_eq!(
            resolve_metrics_file(Some("/tmp/explicit/metrics.out")),
            PathBuf::from("/tmp/explicit/metrics.out")
        );
    }

    #[test]
    fn file_path_splits_into_dir_and_prefix() {
        let (dir, prefix) = rotation_target(Path::new("/var/log/plugin/task-metrics.log"));

        assert_eq!(dir, PathBuf::from("/var/log/plugin"));
        assert_eq!(prefix, "task-metrics.log");
    }

    #[test]
    fn bare_file_name_rotates_in_cwd() {
        let (dir, prefix) = rotation_target(Path::new("metrics.out"));

        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(prefix, "metrics.out");
    }

    #[test]
    fn directory_uses_default_prefix() {
        let dir = std::env::temp_dir();

        let (rotation_dir, prefix) = rotation_target(&dir);

        assert_eq!(rotation_dir, dir);
        assert_eq!(prefix, DEFAULT_METRICS_PREFIX);
    }
}
