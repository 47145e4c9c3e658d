//! Event listener surface exposed to the host platform
//!
//! The host delivers task state changes through [`TaskListener`]. The plugin
//! contributes a single [`TaskMonitorListener`] that drives the
//! [`MonitorRegistry`]; nothing here ever reports an error back to the host.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MonitorConfig;
use crate::metrics::create_sink;
use crate::registry::MonitorRegistry;
use crate::sampler::SysinfoInspector;
use crate::task::{TaskInstance, TaskState};

/// Name the plugin is registered under
pub const PLUGIN_NAME: &str = "CUSTOM_METRICS_PLUGIN";

/// Task lifecycle hooks; unimplemented hooks are no-ops
#[async_trait]
pub trait TaskListener: Send + Sync {
    async fn on_task_instance_running(
        &self,
        _previous_state: Option<TaskState>,
        _task_instance: &Arc<TaskInstance>,
    ) {
    }

    async fn on_task_instance_success(
        &self,
        _previous_state: Option<TaskState>,
        _task_instance: &Arc<TaskInstance>,
    ) {
    }

    async fn on_task_instance_failed(
        &self,
        _previous_state: Option<TaskState>,
        _task_instance: &Arc<TaskInstance>,
        _error: Option<&str>,
    ) {
    }

    /// The host process is about to stop
    async fn before_stopping(&self) {}
}

/// A named bundle of listeners registered with the host once at startup
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn listeners(&self) -> Vec<Arc<dyn TaskListener>>;
}

/// Listener translating task events into monitor sessions
pub struct TaskMonitorListener {
    registry: Arc<MonitorRegistry>,
}

impl TaskMonitorListener {
    pub fn new(registry: Arc<MonitorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }
}

#[async_trait]
impl TaskListener for TaskMonitorListener {
    async fn on_task_instance_running(
        &self,
        _previous_state: Option<TaskState>,
        task_instance: &Arc<TaskInstance>,
    ) {
        self.registry.start_monitoring(task_instance);
    }

    async fn on_task_instance_success(
        &self,
        _previous_state: Option<TaskState>,
        task_instance: &Arc<TaskInstance>,
    ) {
        self.registry.finalize(task_instance).await;
    }

    async fn on_task_instance_failed(
        &self,
        _previous_state: Option<TaskState>,
        task_instance: &Arc<TaskInstance>,
        _error: Option<&str>,
    ) {
        self.registry.finalize(task_instance).await;
    }

    async fn before_stopping(&self) {
        let finalized = self.registry.finalize_stopped().await;
        if finalized > 0 {
            tracing::info!("finalized {finalized} stopped task monitors before shutdown");
        }
    }
}

/// Per-task CPU and memory metrics plugin
pub struct CustomMetricsPlugin {
    listener: Arc<TaskMonitorListener>,
}

impl CustomMetricsPlugin {
    pub fn new(registry: Arc<MonitorRegistry>) -> Self {
        Self {
            listener: Arc::new(TaskMonitorListener::new(registry)),
        }
    }

    /// Build the production plugin from environment configuration.
    ///
    /// Invalid configuration disables the plugin instead of failing the host.
    pub fn from_env() -> Self {
        let config = MonitorConfig::from_env().unwrap_or_else(|e| {
            tracing::warn!("{e}; {PLUGIN_NAME} is disabled");
            MonitorConfig::default()
        });
        Self::from_config(config)
    }

    pub fn from_config(config: MonitorConfig) -> Self {
        let sink = create_sink(&config);
        let registry = MonitorRegistry::new(config, sink, Arc::new(SysinfoInspector::new()));
        Self::new(Arc::new(registry))
    }

    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        self.listener.registry()
    }
}

impl Plugin for CustomMetricsPlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn listeners(&self) -> Vec<Arc<dyn TaskListener>> {
        vec![self.listener.clone()]
    }
}

/// Host-side fan-out of task events to every registered plugin listener
#[derive(Default)]
pub struct ListenerManager {
    plugins: Vec<&'static str>,
    listeners: Vec<Arc<dyn TaskListener>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register all listeners of `plugin`. A plugin name is registered once.
    pub fn register_plugin(&mut self, plugin: &dyn Plugin) -> bool {
        if self.plugins.contains(&plugin.name()) {
            tracing::warn!("plugin {} is already registered", plugin.name());
            return false;
        }
        self.plugins.push(plugin.name());
        self.listeners.extend(plugin.listeners());
        tracing::info!("registered plugin {}", plugin.name());
        true
    }

    pub fn plugin_names(&self) -> &[&'static str] {
        &self.plugins
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub async fn notify_running(
        &self,
        previous_state: Option<TaskState>,
        task_instance: &Arc<TaskInstance>,
    ) {
        for listener in &self.listeners {
            listener
                .on_task_instance_running(previous_state, task_instance)
                .await;
        }
    }

    pub async fn notify_success(
        &self,
        previous_state: Option<TaskState>,
        task_instance: &Arc<TaskInstance>,
    ) {
        for listener in &self.listeners {
            listener
                .on_task_instance_success(previous_state, task_instance)
                .await;
        }
    }

    pub async fn notify_failed(
        &self,
        previous_state: Option<TaskState>,
        task_instance: &Arc<TaskInstance>,
        error: Option<&str>,
    ) {
        for listener in &self.listeners {
            listener
                .on_task_instance_failed(previous_state, task_instance, error)
                .await;
        }
    }

    pub async fn notify_before_stopping(&self) {
        for listener in &self.listeners {
            listener.before_stopping().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::mock::{MockProcessInspector, RecordingSink};
    use crate::task::TaskInstanceKey;

    #[derive(Default)]
    struct CountingListener {
        running: AtomicUsize,
        stopping: AtomicUsize,
    }

    #[async_trait]
    impl TaskListener for CountingListener {
        async fn on_task_instance_running(
            &self,
            _previous_state: Option<TaskState>,
            _task_instance: &Arc<TaskInstance>,
        ) {
            self.running.fetch_add(1, Ordering::SeqCst);
        }

        async fn before_stopping(&self) {
            self.stopping.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingPlugin(Arc<CountingListener>);

    impl Plugin for CountingPlugin {
        fn name(&self) -> &'static str {
            "COUNTING"
        }

        fn listeners(&self) -> Vec<Arc<dyn TaskListener>> {
            vec![self.0.clone()]
        }
    }

    fn task() -> Arc<TaskInstance> {
        Arc::new(
            TaskInstance::new(TaskInstanceKey::new("d", "t", "r"), TaskState::Running).with_pid(1),
        )
    }

    #[test(tokio::test)]
    async fn plugin_is_registered_once_by_name() {
        let registry = Arc::new(MonitorRegistry::new(
            MonitorConfig::default(),
            Arc::new(RecordingSink::new()),
            Arc::new(MockProcessInspector::new()),
        ));
        let plugin = CustomMetricsPlugin::new(registry);
        let mut manager = ListenerManager::new();

        assert!(manager.register_plugin(&plugin));
        assert!(!manager.register_plugin(&plugin));

        assert_eq!(manager.plugin_names().to_vec(), vec![PLUGIN_NAME]);
        assert_eq!(plugin.listeners().len(), 1);
    }

    #[test(tokio::test)]
    async fn unimplemented_hooks_are_noops() {
        let listener = Arc::new(CountingListener::default());
        let mut manager = ListenerManager::new();
        manager.register_plugin(&CountingPlugin(listener.clone()));
        let task = task();

        manager.notify_running(Some(TaskState::Queued), &task).await;
        manager.notify_success(Some(TaskState::Running), &task).await;
        manager
            .notify_failed(Some(TaskState::Running), &task, Some("boom"))
            .await;
        manager.notify_before_stopping().await;

        assert_eq!(listener.running.load(Ordering::SeqCst), 1);
        assert_eq!(listener.stopping.load(Ordering::SeqCst), 1);
    }

    #[test(tokio::test)]
    async fn events_reach_every_plugin() {
        let listener = Arc::new(CountingListener::default());
        let sink = Arc::new(RecordingSink::new());
        let inspector = Arc::new(MockProcessInspector::new());
        inspector.spawn_process(1, crate::sampler::ProcessSample::new(1.0, 1));
        let registry = Arc::new(MonitorRegistry::new(
            MonitorConfig::default()
                .enabled(true)
                .with_cpu_window(std::time::Duration::from_millis(1)),
            sink,
            inspector,
        ));
        let metrics_plugin = CustomMetricsPlugin::new(registry.clone());
        let mut manager = ListenerManager::new();
        manager.register_plugin(&metrics_plugin);
        manager.register_plugin(&CountingPlugin(listener.clone()));
        let task = task();

        manager.notify_running(None, &task).await;

        assert_eq!(registry.len(), 1);
        assert_eq!(listener.running.load(Ordering::SeqCst), 1);
        manager.notify_success(Some(TaskState::Running), &task).await;
        assert!(registry.is_empty());
    }
}
