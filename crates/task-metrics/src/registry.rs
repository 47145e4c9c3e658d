//! Process-wide table of active monitor sessions
//!
//! Sessions are keyed by task-instance identity. Insertion goes through the
//! map's entry API and removal pops the entry before acting on it, so a
//! session is created at most once per running task and finalized at most once.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::MonitorConfig;
use crate::metrics::MetricsSink;
use crate::sampler::{ProcessInspector, ProcessSampler};
use crate::session::MonitorSession;
use crate::task::{TaskInstance, TaskInstanceKey};

pub struct MonitorRegistry {
    config: MonitorConfig,
    sink: Arc<dyn MetricsSink>,
    inspector: Arc<dyn ProcessInspector>,
    sessions: DashMap<TaskInstanceKey, MonitorSession>,
}

impl MonitorRegistry {
    pub fn new(
        config: MonitorConfig,
        sink: Arc<dyn MetricsSink>,
        inspector: Arc<dyn ProcessInspector>,
    ) -> Self {
        Self {
            config,
            sink,
            inspector,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, key: &TaskInstanceKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Start sampling a task that just began running.
    ///
    /// Returns `false` without side effects when monitoring is disabled, the
    /// task has no worker pid, or a session already exists for it.
    pub fn start_monitoring(&self, task_instance: &Arc<TaskInstance>) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let Some(pid) = task_instance.pid() else {
            tracing::warn!(
                dag_id = task_instance.dag_id(),
                task_id = task_instance.task_id(),
                "task is running without a pid, not monitoring"
            );
            return false;
        };

        match self.sessions.entry(task_instance.key().clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(key = %task_instance.key(), "task is already monitored");
                false
            }
            Entry::Vacant(entry) => {
                tracing::info!(
                    dag_id = task_instance.dag_id(),
                    task_id = task_instance.task_id(),
                    pid,
                    "Task {} in DAG {} is starting",
                    task_instance.task_id(),
                    task_instance.dag_id()
                );
                let sampler = ProcessSampler::new(self.inspector.clone(), pid, self.config.cpu_window);
                entry.insert(MonitorSession::start(
                    task_instance.clone(),
                    sampler,
                    self.sink.clone(),
                    self.config.sample_interval,
                ));
                true
            }
        }
    }

    /// Stop monitoring a task and reset its gauges.
    ///
    /// Returns `false` if no session was registered, including when another
    /// caller already finalized it.
    pub async fn finalize(&self, task_instance: &TaskInstance) -> bool {
        self.finalize_key(task_instance.key()).await
    }

    async fn finalize_key(&self, key: &TaskInstanceKey) -> bool {
        let Some((_, session)) = self.sessions.remove(key) else {
            return false;
        };
        session.finalize(self.sink.as_ref()).await;
        true
    }

    /// Shutdown cleanup: finalize sessions whose task already left the running
    /// state without a success/failure notification.
    ///
    /// Sessions of tasks that are still running are left in place. Returns the
    /// number of finalized sessions.
    pub async fn finalize_stopped(&self) -> usize {
        let stopped: Vec<TaskInstanceKey> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().task_instance().state().is_stopped())
            .map(|entry| entry.key().clone())
            .collect();

        let mut finalized = 0;
        for key in stopped {
            if self.finalize_key(&key).await {
                finalized += 1;
            }
        }
        finalized
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::mock::{MockProcessInspector, RecordingSink};
    use crate::sampler::ProcessSample;
    use crate::task::TaskState;

    struct Fixture {
        registry: Arc<MonitorRegistry>,
        inspector: Arc<MockProcessInspector>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(enabled: bool) -> Fixture {
        let inspector = Arc::new(MockProcessInspector::new());
        let sink = Arc::new(RecordingSink::new());
        let config = MonitorConfig::default()
            .enabled(enabled)
            .with_sample_interval(Duration::from_millis(5))
            .with_cpu_window(Duration::from_millis(5));
        Fixture {
            registry: Arc::new(MonitorRegistry::new(config, sink.clone(), inspector.clone())),
            inspector,
            sink,
        }
    }

    fn running_task(fixture: &Fixture, task_id: &str, pid: u32) -> Arc<TaskInstance> {
        fixture
            .inspector
            .spawn_process(pid, ProcessSample::new(10.0, 4096));
        Arc::new(
            TaskInstance::new(TaskInstanceKey::new("dag", task_id, "run"), TaskState::Running)
                .with_pid(pid),
        )
    }

    #[test(tokio::test)]
    async fn disabled_registry_never_creates_sessions() {
        let fixture = fixture(false);
        let task = running_task(&fixture, "t", 1);

        assert!(!fixture.registry.start_monitoring(&task));
        assert!(fixture.registry.is_empty());
        assert!(!fixture.registry.finalize(&task).await);
        assert!(fixture.sink.is_empty());
    }

    #[test(tokio::test)]
    async fn at_most_one_session_per_task() {
        let fixture = fixture(true);
        let task = running_task(&fixture, "t", 2);

        assert!(fixture.registry.start_monitoring(&task));
        assert!(!fixture.registry.start_monitoring(&task));

        assert_eq!(fixture.registry.len(), 1);
        assert!(fixture.registry.contains(task.key()));
        fixture.registry.finalize(&task).await;
    }

    #[test(tokio::test)]
    async fn task_without_pid_is_not_monitored() {
        let fixture = fixture(true);
        let task = Arc::new(TaskInstance::new(
            TaskInstanceKey::new("dag", "t", "run"),
            TaskState::Running,
        ));

        assert!(!fixture.registry.start_monitoring(&task));
        assert!(fixture.registry.is_empty());
    }

    #[test(tokio::test)]
    async fn second_finalize_is_a_noop() {
        let fixture = fixture(true);
        let task = running_task(&fixture, "t", 3);
        fixture.registry.start_monitoring(&task);

        assert!(fixture.registry.finalize(&task).await);
        let published = fixture.sink.len();
        assert!(!fixture.registry.finalize(&task).await);

        assert_eq!(fixture.sink.len(), published);
        assert!(fixture.registry.is_empty());
    }

    #[test(tokio::test)]
    async fn concurrent_finalize_runs_once() {
        let fixture = fixture(true);
        let task = running_task(&fixture, "t", 4);
        fixture.registry.start_monitoring(&task);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = fixture.registry.clone();
                let task = task.clone();
                tokio::spawn(async move { registry.finalize(&task).await })
            })
            .collect();
        let mut finalized = 0;
        for handle in handles {
            if handle.await.expect("join") {
                finalized += 1;
            }
        }

        assert_eq!(finalized, 1);
        let zeros = fixture
            .sink
            .gauges()
            .into_iter()
            .filter(|(_, value)| *value == 0.0)
            .count();
        assert_eq!(zeros, 2);
    }

    #[test(tokio::test)]
    async fn shutdown_finalizes_only_stopped_tasks() {
        let fixture = fixture(true);
        let skipped = running_task(&fixture, "skipped", 5);
        let retry = running_task(&fixture, "retry", 6);
        let active = running_task(&fixture, "active", 7);
        for task in [&skipped, &retry, &active] {
            assert!(fixture.registry.start_monitoring(task));
        }

        skipped.set_state(TaskState::Skipped);
        retry.set_state(TaskState::UpForRetry);

        assert_eq!(fixture.registry.finalize_stopped().await, 2);
        assert_eq!(fixture.registry.len(), 1);
        assert!(fixture.registry.contains(active.key()));
        assert_eq!(
            fixture
                .sink
                .last_value("custom_metrics_memory_usage_bytes.dag.skipped"),
            Some(0.0)
        );
        fixture.registry.finalize(&active).await;
    }
}
