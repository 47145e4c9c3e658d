use std::fs;
use std::path::Path;

use task_metrics::metrics::LogMetricsSink;
use task_metrics::MetricsSink;

#[test]
fn metrics_file_from_environment_receives_log_sink_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let metrics_file = dir.path().join("task-metrics.log");

    std::env::set_var("CUSTOM_METRICS_PLUGIN_METRICS_FILE", &metrics_file);

    let guard = task_metrics::logging::init(None::<&Path>);
    let sink = LogMetricsSink::new("influx");
    sink.gauge("custom_metrics_cpu_usage_percent.etl.load", 42.5);
    sink.gauge("custom_metrics_cpu_usage_percent.etl.load", 0.0);
    tracing::info!("plain log lines stay out of the metrics file");
    drop(guard);

    let rotated: Vec<_> = fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("task-metrics.log")
        })
        .collect();
    assert_eq!(rotated.len(), 1);

    let contents = fs::read_to_string(rotated[0].path()).expect("read metrics file");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2, "unexpected metrics file contents: {contents}");
    assert!(lines[0].starts_with("custom_metrics_cpu_usage_percent.etl.load value=42.5 "));
    assert!(lines[1].starts_with("custom_metrics_cpu_usage_percent.etl.load value=0 "));
}
