//! Metric naming for per-task gauges

use std::fmt::Display;

use crate::task::TaskInstance;

/// CPU usage of the task's worker process, in percent
pub const CPU_USAGE_METRIC: &str = "custom_metrics_cpu_usage_percent";
/// Resident memory of the task's worker process, in bytes
pub const MEMORY_USAGE_METRIC: &str = "custom_metrics_memory_usage_bytes";

const SEPARATOR: char = '.';
const SEPARATOR_REPLACEMENT: &str = "__";

/// Metric name for `base_metric` scoped to the task instance, e.g.
/// `custom_metrics_cpu_usage_percent.my_dag.my_task`.
pub fn metric_name(task_instance: &TaskInstance, base_metric: &str) -> String {
    format_metric_name(base_metric, task_instance.dag_id(), task_instance.task_id())
}

/// Dots inside identifiers are replaced so that dashboards do not split the
/// identifier into nested hierarchy levels.
pub fn format_metric_name(
    base_metric: &str,
    dag_id: impl Display,
    task_id: impl Display,
) -> String {
    format!(
        "{base_metric}.{}.{}",
        sanitize(&dag_id.to_string()),
        sanitize(&task_id.to_string())
    )
}

fn sanitize(identifier: &str) -> String {
    identifier.replace(SEPARATOR, SEPARATOR_REPLACEMENT)
}
