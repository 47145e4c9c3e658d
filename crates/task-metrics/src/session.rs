//! Monitor session: one sampling loop bound to one task instance
//!
//! The loop runs as its own tokio task. The only state it shares with the
//! owning session is the cancellation token; the task instance is read-only.
//!
//! Finalizing does not wait for an in-flight CPU measurement to complete: the
//! measurement is dropped as soon as the token is cancelled, so finalize
//! returns within one scheduling step instead of up to one CPU window later.
//! The gauges are still zeroed only after the loop has exited.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::humanize::humanize;
use crate::metrics::MetricsSink;
use crate::naming::{metric_name, CPU_USAGE_METRIC, MEMORY_USAGE_METRIC};
use crate::sampler::{ProcessSample, ProcessSampler};
use crate::task::TaskInstance;

/// Observable lifecycle of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The sampling loop is active
    Running,
    /// Cancellation was requested and the loop has not exited yet
    Stopping,
    /// The loop has exited, either cancelled or on its own
    Stopped,
}

/// Active sampling loop for a single task instance
#[derive(Debug)]
pub struct MonitorSession {
    task_instance: Arc<TaskInstance>,
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MonitorSession {
    /// Spawn the sampling loop. Must be called within a tokio runtime.
    pub fn start(
        task_instance: Arc<TaskInstance>,
        sampler: ProcessSampler,
        sink: Arc<dyn MetricsSink>,
        sample_interval: Duration,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(run_sampling_loop(
            task_instance.clone(),
            sampler,
            sink,
            sample_interval,
            cancellation_token.clone(),
        ));

        Self {
            task_instance,
            cancellation_token,
            handle,
        }
    }

    pub fn task_instance(&self) -> &Arc<TaskInstance> {
        &self.task_instance
    }

    pub fn state(&self) -> SessionState {
        if self.handle.is_finished() {
            SessionState::Stopped
        } else if self.cancellation_token.is_cancelled() {
            SessionState::Stopping
        } else {
            SessionState::Running
        }
    }

    /// Stop the loop, wait for it to exit, then reset both gauges to zero.
    ///
    /// Consumes the session; zero is always the last value published for the
    /// task because the loop has exited before the reset.
    pub async fn finalize(self, sink: &dyn MetricsSink) {
        self.cancellation_token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(
                dag_id = self.task_instance.dag_id(),
                task_id = self.task_instance.task_id(),
                "sampling loop ended abnormally: {e}"
            );
        }

        publish(sink, &self.task_instance, ProcessSample::default());

        tracing::info!(
            dag_id = self.task_instance.dag_id(),
            task_id = self.task_instance.task_id(),
            "Task {} in DAG {} completed",
            self.task_instance.task_id(),
            self.task_instance.dag_id()
        );
    }
}

fn publish(sink: &dyn MetricsSink, task_instance: &TaskInstance, sample: ProcessSample) {
    sink.gauge(
        &metric_name(task_instance, CPU_USAGE_METRIC),
        sample.cpu_percent,
    );
    sink.gauge(
        &metric_name(task_instance, MEMORY_USAGE_METRIC),
        sample.resident_bytes as f64,
    );
}

async fn run_sampling_loop(
    task_instance: Arc<TaskInstance>,
    sampler: ProcessSampler,
    sink: Arc<dyn MetricsSink>,
    sample_interval: Duration,
    cancellation_token: CancellationToken,
) {
    let observed = task_instance.clone();
    let samples = sampler.into_stream(sample_interval, move || {
        let state = observed.state();
        if state.is_stopped() {
            tracing::debug!(
                dag_id = observed.dag_id(),
                task_id = observed.task_id(),
                %state,
                "task is no longer running, stop sampling"
            );
        }
        !state.is_stopped()
    });
    tokio::pin!(samples);

    loop {
        // the interval sleep and the cpu measurement both happen inside `next()`
        let sample = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            sample = samples.next() => sample,
        };
        let Some(sample) = sample else {
            break;
        };

        publish(sink.as_ref(), &task_instance, sample);

        tracing::info!(
            dag_id = task_instance.dag_id(),
            task_id = task_instance.task_id(),
            "Memory usage: {}, CPU usage: {:.2}%",
            humanize(sample.resident_bytes),
            sample.cpu_percent
        );
    }
}
