//! Background progress monitor for pipeline runs.
//!
//! Periodically logs every stage's completed count against its quota and the
//! depth of every buffer, so operators can follow a long run without
//! instrumenting the workers themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::buffer::BoundedBuffer;
use crate::metrics::MetricsCollector;

use super::stage::{StageCounter, StageState, Unit};

/// Progress of a single stage at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct StageProgress {
    pub name: String,
    pub state: StageState,
    pub completed: u64,
    pub quota: u64,
}

/// Fill level of a single buffer at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct BufferDepth {
    /// Name of the stage writing into the buffer.
    pub name: String,
    pub len: usize,
    pub capacity: usize,
}

/// Snapshot of pipeline progress counters at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// Stages in pipeline order: upstream, production, delivery.
    pub stages: Vec<StageProgress>,
    /// Buffers in pipeline order: upstream, production.
    pub buffers: Vec<BufferDepth>,
    /// Wall-clock elapsed time since `start` was taken.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Looks up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&StageProgress> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Overall completion, measured by the terminal stage.
    pub fn percent_complete(&self) -> f64 {
        match self.stages.last() {
            Some(last) if last.quota > 0 => {
                (last.completed as f64 / last.quota as f64 * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.state == StageState::Completed)
    }
}

/// Read-only view over a pipeline's counters and buffers.
///
/// Cheap to clone; every clone observes the same live state.
#[derive(Debug, Clone)]
pub struct ProgressProbe {
    stages: Vec<Arc<StageCounter>>,
    buffers: Vec<(String, Arc<BoundedBuffer<Unit>>)>,
}

impl ProgressProbe {
    pub(crate) fn new(
        stages: Vec<Arc<StageCounter>>,
        buffers: Vec<(String, Arc<BoundedBuffer<Unit>>)>,
    ) -> Self {
        Self { stages, buffers }
    }

    /// Take a snapshot of the current counter values.
    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            stages: self
                .stages
                .iter()
                .map(|s| StageProgress {
                    name: s.name().to_string(),
                    state: s.state(),
                    completed: s.completed(),
                    quota: s.quota(),
                })
                .collect(),
            buffers: self
                .buffers
                .iter()
                .map(|(name, buffer)| BufferDepth {
                    name: name.clone(),
                    len: buffer.len(),
                    capacity: buffer.capacity(),
                })
                .collect(),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that periodically logs pipeline progress.
///
/// Spawns a tokio task that wakes every `interval`, logs a summary and
/// refreshes the buffer-depth gauges. Call [`ProgressMonitor::stop`] to end it.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start a background progress monitor that logs every `interval`.
    pub fn start(probe: ProgressProbe, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();
        let metrics = MetricsCollector::new();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = probe.snapshot(start);
                for buffer in &snap.buffers {
                    metrics.set_buffer_depth(&buffer.name, buffer.len);
                }

                let stages = snap
                    .stages
                    .iter()
                    .map(|s| format!("{}={}/{}", s.name, s.completed, s.quota))
                    .collect::<Vec<_>>()
                    .join(" ");
                let buffers = snap
                    .buffers
                    .iter()
                    .map(|b| format!("{}={}/{}", b.name, b.len, b.capacity))
                    .collect::<Vec<_>>()
                    .join(" ");

                tracing::info!(
                    stages = %stages,
                    buffers = %buffers,
                    progress_pct = format!("{:.1}%", snap.percent_complete()),
                    elapsed_ms = snap.elapsed.as_millis() as u64,
                    "Pipeline progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signal the background monitor to stop and wait for it to finish.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
