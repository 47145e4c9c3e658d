//! Task instance model as seen by the monitoring plugin
//!
//! Task instances are owned by the host platform. The plugin only holds shared
//! references to read identifiers, the worker pid, and the live lifecycle state.

use std::sync::RwLock;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[display("removed")]
    Removed,
    #[display("scheduled")]
    Scheduled,
    #[display("queued")]
    Queued,
    #[display("running")]
    Running,
    #[display("success")]
    Success,
    #[display("restarting")]
    Restarting,
    #[display("failed")]
    Failed,
    #[display("up_for_retry")]
    UpForRetry,
    #[display("up_for_reschedule")]
    UpForReschedule,
    #[display("upstream_failed")]
    UpstreamFailed,
    #[display("skipped")]
    Skipped,
    #[display("deferred")]
    Deferred,
}

/// States in which the worker process is no longer doing the task's work, even
/// though no success/failure notification may ever arrive for it.
pub const STOPPED_TASK_STATES: [TaskState; 7] = [
    TaskState::Removed,
    TaskState::Restarting,
    TaskState::UpForRetry,
    TaskState::UpForReschedule,
    TaskState::UpstreamFailed,
    TaskState::Skipped,
    TaskState::Deferred,
];

impl TaskState {
    /// Whether sampling must stop for a task in this state.
    pub fn is_stopped(self) -> bool {
        STOPPED_TASK_STATES.contains(&self)
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown task state: {s}"))
    }
}

/// Stable identity of a task instance, usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("{dag_id}.{task_id} run={run_id} map_index={map_index}")]
pub struct TaskInstanceKey {
    pub dag_id: String,
    pub task_id: String,
    pub run_id: String,
    /// `-1` for unmapped tasks
    pub map_index: i64,
}

impl TaskInstanceKey {
    pub fn new(
        dag_id: impl Into<String>,
        task_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            dag_id: dag_id.into(),
            task_id: task_id.into(),
            run_id: run_id.into(),
            map_index: -1,
        }
    }

    pub fn with_map_index(mut self, map_index: i64) -> Self {
        self.map_index = map_index;
        self
    }
}

/// A task instance shared between the host and the plugin.
///
/// The host mutates `state` and `pid` as the task progresses; monitor sessions
/// read them on every sampling iteration.
#[derive(Debug)]
pub struct TaskInstance {
    key: TaskInstanceKey,
    state: RwLock<TaskState>,
    pid: RwLock<Option<u32>>,
}

impl TaskInstance {
    pub fn new(key: TaskInstanceKey, state: TaskState) -> Self {
        Self {
            key,
            state: RwLock::new(state),
            pid: RwLock::new(None),
        }
    }

    pub fn with_pid(self, pid: u32) -> Self {
        self.set_pid(Some(pid));
        self
    }

    pub fn key(&self) -> &TaskInstanceKey {
        &self.key
    }

    pub fn dag_id(&self) -> &str {
        &self.key.dag_id
    }

    pub fn task_id(&self) -> &str {
        &self.key.task_id
    }

    pub fn state(&self) -> TaskState {
        *self.state.read().expect("poisoned")
    }

    pub fn set_state(&self, state: TaskState) {
        *self.state.write().expect("poisoned") = state;
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.read().expect("poisoned")
    }

    pub fn set_pid(&self, pid: Option<u32>) {
        *self.pid.write().expect("poisoned") = pid;
    }
}
