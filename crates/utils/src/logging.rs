//! provides logging helpers

use std::fs;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// When set, human-readable logs are appended to this file instead of stderr.
pub const LOG_PATH_ENV_VAR: &str = "CUSTOM_METRICS_PLUGIN_LOG_PATH";

/// Build the human-readable fmt layer shared by every binary in the workspace.
///
/// Logs go to `log_path` when given and writable, otherwise to stderr.
pub fn get_fmt_layer<S>(log_path: Option<String>) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let fmt_layer = layer().with_target(true);

    let Some(log_path) = log_path.filter(|p| !p.is_empty()) else {
        return fmt_layer.with_writer(std::io::stderr).boxed();
    };

    match open_log_file(Path::new(&log_path)) {
        Ok(file) => fmt_layer
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .boxed(),
        Err(err) => {
            eprintln!("failed to open log file {log_path}: {err}; logging to stderr");
            fmt_layer.with_writer(std::io::stderr).boxed()
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
