//! Per-task CPU and memory metrics for worker processes of a task-execution platform.
//!
//! A monitor session is started when a task begins running, samples its worker
//! process periodically, and resets the task's gauges to zero when the task
//! succeeds, fails, or otherwise stops.

pub mod config;
pub mod humanize;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod mock;
pub mod naming;
pub mod registry;
pub mod sampler;
pub mod session;
pub mod task;

// Re-export main types
pub use config::{MonitorConfig, SinkKind};
pub use listener::{CustomMetricsPlugin, ListenerManager, Plugin, TaskListener, TaskMonitorListener};
pub use metrics::MetricsSink;
pub use registry::MonitorRegistry;
pub use sampler::{ProcessInspector, ProcessSample, ProcessSampler, SysinfoInspector};
pub use session::{MonitorSession, SessionState};
pub use task::{TaskInstance, TaskInstanceKey, TaskState};
