//! Process resource sampling
//!
//! A [`ProcessInspector`] reads CPU and resident memory of a single OS process;
//! a [`ProcessSampler`] binds one to a pid and turns it into a sample sequence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// Window over which CPU usage is averaged for one sample
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_secs(1);

/// Errors raised while inspecting a process
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Process not found: {pid}")]
    ProcessNotFound { pid: u32 },
}

pub type Result<T> = std::result::Result<T, SamplerError>;

/// One reading of a process' resource usage
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessSample {
    /// CPU usage averaged over the measurement window; may exceed 100 on multi-core hosts
    pub cpu_percent: f64,
    /// Resident set size in bytes
    pub resident_bytes: u64,
}

impl ProcessSample {
    pub fn new(cpu_percent: f64, resident_bytes: u64) -> Self {
        Self {
            cpu_percent,
            resident_bytes,
        }
    }
}

/// OS-level process inspection
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    /// Whether `pid` refers to a live, non-zombie process
    fn is_alive(&self, pid: u32) -> bool;

    /// Measure the process over `cpu_window`.
    ///
    /// This waits for the whole window before returning. Fails with
    /// [`SamplerError::ProcessNotFound`] if the process is gone.
    async fn sample(&self, pid: u32, cpu_window: Duration) -> Result<ProcessSample>;
}

/// Production inspector backed by `sysinfo`
#[derive(Debug, Default)]
pub struct SysinfoInspector;

impl SysinfoInspector {
    pub const fn new() -> Self {
        Self
    }

    fn refresh(system: &mut System, pid: Pid) {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
    }

    /// The process, unless it is gone or exited and waiting to be reaped
    fn running_process(system: &System, pid: Pid) -> Option<&Process> {
        system
            .process(pid)
            .filter(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }
}

#[async_trait]
impl ProcessInspector for SysinfoInspector {
    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        Self::refresh(&mut system, pid);

        Self::running_process(&system, pid).is_some()
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn sample(&self, pid: u32, cpu_window: Duration) -> Result<ProcessSample> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();

        // cpu usage is the delta between two refreshes of the same System
        Self::refresh(&mut system, sys_pid);
        if Self::running_process(&system, sys_pid).is_none() {
            return Err(SamplerError::ProcessNotFound { pid });
        }
        tokio::time::sleep(cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        Self::refresh(&mut system, sys_pid);

        let process = Self::running_process(&system, sys_pid)
            .ok_or(SamplerError::ProcessNotFound { pid })?;

        Ok(ProcessSample {
            cpu_percent: f64::from(process.cpu_usage()),
            resident_bytes: process.memory(),
        })
    }
}

/// Sampler bound to one worker process
#[derive(Clone)]
pub struct ProcessSampler {
    inspector: Arc<dyn ProcessInspector>,
    pid: u32,
    cpu_window: Duration,
}

impl ProcessSampler {
    pub fn new(inspector: Arc<dyn ProcessInspector>, pid: u32, cpu_window: Duration) -> Self {
        Self {
            inspector,
            pid,
            cpu_window,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.inspector.is_alive(self.pid)
    }

    /// Take one reading, or `None` if the process is gone by the end of it.
    ///
    /// A vanished process is an expected race with task completion and is not
    /// reported as an error.
    pub async fn next_sample(&self) -> Option<ProcessSample> {
        match self.inspector.sample(self.pid, self.cpu_window).await {
            Ok(sample) => Some(sample),
            Err(SamplerError::ProcessNotFound { .. }) => {
                tracing::debug!(pid = self.pid, "worker process exited, stop sampling");
                None
            }
        }
    }

    /// Lazy sample sequence, one reading per `interval`.
    ///
    /// Before every reading `keep_sampling` is consulted and the process is
    /// checked once for liveness. The sequence ends when either check fails or
    /// the process disappears during a reading, and cannot be restarted.
    pub fn into_stream<F>(
        self,
        interval: Duration,
        keep_sampling: F,
    ) -> impl Stream<Item = ProcessSample> + Send
    where
        F: Fn() -> bool + Send + 'static,
    {
        async_stream::stream! {
            let mut first = true;
            loop {
                if !first {
                    tokio::time::sleep(interval).await;
                }
                first = false;

                if !keep_sampling() {
                    break;
                }
                if !self.is_alive() {
                    tracing::debug!(pid = self.pid, "worker process exited, stop sampling");
                    break;
                }
                match self.next_sample().await {
                    Some(sample) => yield sample,
                    None => break,
                }
            }
        }
    }
}

impl std::fmt::Debug for ProcessSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSampler")
            .field("pid", &self.pid)
            .field("cpu_window", &self.cpu_window)
            .finish()
    }
}
