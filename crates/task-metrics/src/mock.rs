//! Test adapters for the process inspector and metrics sink traits
//!
//! Used by unit tests and by the integration tests under `tests/`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::metrics::MetricsSink;
use crate::sampler::{ProcessInspector, ProcessSample, Result, SamplerError};

#[derive(Debug, Clone, Copy)]
struct MockProcess {
    sample: ProcessSample,
    alive: bool,
    /// Samples left before the process exits on its own
    remaining_samples: Option<usize>,
    vanish_during_sample: bool,
}

/// In-memory process table standing in for the OS
#[derive(Debug, Default)]
pub struct MockProcessInspector {
    processes: Mutex<HashMap<u32, MockProcess>>,
    samples_taken: Mutex<HashMap<u32, usize>>,
    liveness_checks: Mutex<HashMap<u32, usize>>,
}

impl MockProcessInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live process reporting `sample` on every reading
    pub fn spawn_process(&self, pid: u32, sample: ProcessSample) {
        self.processes.lock().unwrap().insert(
            pid,
            MockProcess {
                sample,
                alive: true,
                remaining_samples: None,
                vanish_during_sample: false,
            },
        );
    }

    pub fn kill(&self, pid: u32) {
        if let Some(process) = self.processes.lock().unwrap().get_mut(&pid) {
            process.alive = false;
        }
    }

    /// The process exits right after its `count`-th reading
    pub fn kill_after_samples(&self, pid: u32, count: usize) {
        if let Some(process) = self.processes.lock().unwrap().get_mut(&pid) {
            process.remaining_samples = Some(count);
        }
    }

    /// The process is alive when checked but gone by the end of the next reading
    pub fn vanish_during_next_sample(&self, pid: u32) {
        if let Some(process) = self.processes.lock().unwrap().get_mut(&pid) {
            process.vanish_during_sample = true;
        }
    }

    pub fn liveness_checks(&self, pid: u32) -> usize {
        self.liveness_checks
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .unwrap_or(0)
    }

    pub fn samples_taken(&self, pid: u32) -> usize {
        self.samples_taken
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProcessInspector for MockProcessInspector {
    fn is_alive(&self, pid: u32) -> bool {
        *self.liveness_checks.lock().unwrap().entry(pid).or_default() += 1;
        self.processes
            .lock()
            .unwrap()
            .get(&pid)
            .is_some_and(|p| p.alive)
    }

    async fn sample(&self, pid: u32, cpu_window: Duration) -> Result<ProcessSample> {
        tokio::time::sleep(cpu_window).await;

        let mut processes = self.processes.lock().unwrap();
        let process = processes
            .get_mut(&pid)
            .filter(|p| p.alive)
            .ok_or(SamplerError::ProcessNotFound { pid })?;

        if process.vanish_during_sample {
            process.alive = false;
            return Err(SamplerError::ProcessNotFound { pid });
        }

        if let Some(remaining) = process.remaining_samples.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                process.alive = false;
            }
        }

        *self.samples_taken.lock().unwrap().entry(pid).or_default() += 1;
        Ok(process.sample)
    }
}

/// Sink that keeps every gauge update in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    gauges: Mutex<Vec<(String, f64)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauges(&self) -> Vec<(String, f64)> {
        self.gauges.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.gauges.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Updates published under `name`, oldest first
    pub fn values_for(&self, name: &str) -> Vec<f64> {
        self.gauges
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.values_for(name).last().copied()
    }
}

impl MetricsSink for RecordingSink {
    fn gauge(&self, name: &str, value: f64) {
        self.gauges.lock().unwrap().push((name.to_string(), value));
    }
}
