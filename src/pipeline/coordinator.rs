//! Pipeline coordinator: wires bounded buffers between stages and runs one
//! worker per stage until every quota is met.
//!
//! ```text
//!   ┌────────────┐  buffer   ┌────────────┐  buffer   ┌────────────┐
//!   │ upstream 1 │──────────▶│            │           │            │
//!   └────────────┘   x r_1   │ production │──────────▶│  delivery  │
//!   ┌────────────┐  buffer   │            │  batch B  │            │
//!   │ upstream n │──────────▶│            │           │            │
//!   └────────────┘   x r_n   └────────────┘           └────────────┘
//! ```
//!
//! Upstream stage `i` produces `Q * r_i` units, production produces `Q`
//! units and delivery performs `Q / B` deliveries. Because every quota is
//! derived from the same validated configuration, total demand on each buffer
//! equals total supply and every worker terminates.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, info_span, trace, Instrument, Span};
use uuid::Uuid;

use crate::buffer::BoundedBuffer;
use crate::error::{ConfigError, PipelineError};
use crate::metrics::MetricsCollector;

use super::config::{PipelineConfig, DELIVERY_STAGE};
use super::progress::{ProgressMonitor, ProgressProbe, ProgressSnapshot};
use super::stage::{StageCounter, StageTally, Unit};

/// An upstream stage together with the buffer it fills.
#[derive(Debug, Clone)]
struct UpstreamLine {
    counter: Arc<StageCounter>,
    buffer: Arc<BoundedBuffer<Unit>>,
    ratio: u64,
}

/// Final summary of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTally {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Upstream stages in configuration order.
    pub upstream: Vec<StageTally>,
    pub production: StageTally,
    pub deliveries: StageTally,
}

impl PipelineTally {
    /// Completed count of the upstream stage called `name`.
    pub fn upstream_completed(&self, name: &str) -> Option<u64> {
        self.upstream
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.completed)
    }

    /// Whether every stage met its quota exactly.
    pub fn is_complete(&self) -> bool {
        self.upstream.iter().all(StageTally::is_complete)
            && self.production.is_complete()
            && self.deliveries.is_complete()
    }
}

/// Owns the buffers and counters of one pipeline run.
///
/// A coordinator is single-use: build it with [`new`](Self::new), call
/// [`run`](Self::run) once, and read the returned tally.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    upstream: Vec<UpstreamLine>,
    production: Arc<StageCounter>,
    products: Arc<BoundedBuffer<Unit>>,
    delivery: Arc<StageCounter>,
    probe: ProgressProbe,
    started: AtomicBool,
    metrics: MetricsCollector,
}

impl PipelineCoordinator {
    /// Validates `config` and allocates every buffer. No worker is started.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid; nothing is
    /// spawned in that case.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let upstream = config
            .upstream
            .iter()
            .map(|stage| -> Result<UpstreamLine, ConfigError> {
                Ok(UpstreamLine {
                    counter: Arc::new(StageCounter::new(&stage.name, config.quota_for(stage)?)),
                    buffer: Arc::new(BoundedBuffer::new(stage.capacity)?),
                    ratio: stage.ratio,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let production = Arc::new(StageCounter::new(
            &config.product_name,
            config.target_quantity,
        ));
        let products = Arc::new(BoundedBuffer::new(config.product_capacity)?);
        let delivery = Arc::new(StageCounter::new(DELIVERY_STAGE, config.delivery_quota()));

        let mut stages: Vec<Arc<StageCounter>> =
            upstream.iter().map(|l| Arc::clone(&l.counter)).collect();
        stages.push(Arc::clone(&production));
        stages.push(Arc::clone(&delivery));

        let mut buffers: Vec<(String, Arc<BoundedBuffer<Unit>>)> = upstream
            .iter()
            .map(|l| (l.counter.name().to_string(), Arc::clone(&l.buffer)))
            .collect();
        buffers.push((config.product_name.clone(), Arc::clone(&products)));

        Ok(Self {
            config,
            upstream,
            production,
            products,
            delivery,
            probe: ProgressProbe::new(stages, buffers),
            started: AtomicBool::new(false),
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A cloneable read-only view of this pipeline's live state.
    pub fn probe(&self) -> ProgressProbe {
        self.probe.clone()
    }

    /// Current progress of every stage and buffer.
    pub fn progress(&self) -> ProgressSnapshot {
        self.probe.snapshot(Instant::now())
    }

    /// Validates `config`, builds a coordinator and runs it once.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` for an invalid configuration, otherwise
    /// the errors of [`run`](Self::run).
    pub async fn execute(config: PipelineConfig) -> Result<PipelineTally, PipelineError> {
        Self::new(config)?.run().await
    }

    /// Runs every stage to completion and returns the final tally.
    ///
    /// Each stage gets a dedicated OS thread, so all stages run concurrently
    /// regardless of the caller's runtime flavor or blocking-pool size. This
    /// future resolves once every thread has reported back.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::AlreadyStarted` on a second call and
    /// `PipelineError::WorkerFailed` if a stage thread could not be spawned or
    /// panicked.
    pub async fn run(&self) -> Result<PipelineTally, PipelineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyStarted);
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<PipelineTally, PipelineError> {
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            target_quantity = self.config.target_quantity,
            upstream_stages = self.upstream.len(),
            batch_size = self.config.batch_size,
            deliveries = self.delivery.quota(),
            "Starting pipeline run"
        );

        let monitor = self
            .config
            .progress_interval
            .map(|interval| ProgressMonitor::start(self.probe(), interval));

        let outcome = match self.spawn_workers() {
            Ok(workers) => join_workers(workers).await,
            Err(e) => Err(e),
        };

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let duration = start.elapsed();
        if let Err(err) = outcome {
            self.metrics.record_run("failed", duration);
            return Err(err);
        }
        self.metrics.record_run("completed", duration);

        let tally = PipelineTally {
            run_id,
            started_at,
            duration_ms: duration.as_millis() as u64,
            upstream: self.upstream.iter().map(|l| l.counter.tally()).collect(),
            production: self.production.tally(),
            deliveries: self.delivery.tally(),
        };

        info!(
            produced = tally.production.completed,
            deliveries = tally.deliveries.completed,
            duration_ms = tally.duration_ms,
            "Pipeline run complete"
        );

        Ok(tally)
    }

    /// Starts one thread per stage, each inside the current `pipeline_run` span.
    fn spawn_workers(&self) -> Result<Vec<StageWorker>, PipelineError> {
        let span = Span::current();
        let mut workers = Vec::with_capacity(self.upstream.len() + 2);

        for line in &self.upstream {
            let line = line.clone();
            let stage = line.counter.name().to_string();
            let metrics = self.metrics;
            workers.push(StageWorker::spawn(
                &stage,
                span.clone(),
                move || run_upstream(&line, metrics),
            )?);
        }

        let inputs = self.upstream.clone();
        let counter = Arc::clone(&self.production);
        let products = Arc::clone(&self.products);
        let metrics = self.metrics;
        workers.push(StageWorker::spawn(
            self.production.name(),
            span.clone(),
            move || run_production(&inputs, &counter, &products, metrics),
        )?);

        let counter = Arc::clone(&self.delivery);
        let products = Arc::clone(&self.products);
        let batch_size = self.config.batch_size;
        workers.push(StageWorker::spawn(
            self.delivery.name(),
            span,
            move || run_delivery(&counter, &products, batch_size, metrics),
        )?);

        Ok(workers)
    }
}

/// A stage running on its own thread, reporting its outcome over a oneshot.
struct StageWorker {
    stage: String,
    done: oneshot::Receiver<Result<(), String>>,
}

impl StageWorker {
    fn spawn<F>(stage: &str, span: Span, body: F) -> Result<Self, PipelineError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, done) = oneshot::channel();
        std::thread::Builder::new()
            .name(format!("stage-{stage}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| span.in_scope(body)));
                let _ = tx.send(outcome.map_err(|payload| panic_message(&*payload)));
            })
            .map_err(|e| PipelineError::WorkerFailed {
                stage: stage.to_string(),
                message: format!("failed to spawn thread: {e}"),
            })?;

        Ok(Self {
            stage: stage.to_string(),
            done,
        })
    }
}

/// Awaits every worker, then reports the first failure, if any.
async fn join_workers(workers: Vec<StageWorker>) -> Result<(), PipelineError> {
    let mut failure = None;
    for worker in workers {
        let outcome = worker
            .done
            .await
            .unwrap_or_else(|_| Err("worker exited without reporting".to_string()));
        if let Err(message) = outcome {
            error!(stage = %worker.stage, error = %message, "Stage worker failed");
            failure.get_or_insert(PipelineError::WorkerFailed {
                stage: worker.stage,
                message,
            });
        }
    }

    failure.map_or(Ok(()), Err)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Produces the stage's whole quota into its buffer.
fn run_upstream(line: &UpstreamLine, metrics: MetricsCollector) {
    let counter = &line.counter;
    counter.start();
    metrics.stage_started();
    debug!(stage = counter.name(), quota = counter.quota(), "Upstream stage started");

    for seq in 0..counter.quota() {
        line.buffer.put(Unit { seq });
        counter.record();
        metrics.record_unit(counter.name());
    }

    counter.finish();
    metrics.stage_finished();
    debug!(stage = counter.name(), "Upstream stage completed");
}

/// Turns `ratio` units from every input into one product, `quota` times.
fn run_production(
    inputs: &[UpstreamLine],
    counter: &StageCounter,
    products: &BoundedBuffer<Unit>,
    metrics: MetricsCollector,
) {
    counter.start();
    metrics.stage_started();
    debug!(stage = counter.name(), quota = counter.quota(), "Production stage started");

    for seq in 0..counter.quota() {
        for input in inputs {
            for _ in 0..input.ratio {
                input.buffer.take();
            }
        }
        products.put(Unit { seq });
        counter.record();
        metrics.record_unit(counter.name());
    }

    counter.finish();
    metrics.stage_finished();
    debug!(stage = counter.name(), "Production stage completed");
}

/// Withdraws `batch_size` products per delivery until the quota is met.
fn run_delivery(
    counter: &StageCounter,
    products: &BoundedBuffer<Unit>,
    batch_size: u64,
    metrics: MetricsCollector,
) {
    counter.start();
    metrics.stage_started();
    debug!(stage = counter.name(), quota = counter.quota(), "Delivery stage started");

    while counter.remaining() > 0 {
        for _ in 0..batch_size {
            products.take();
        }
        let delivered = counter.record();
        metrics.record_delivery();
        trace!(delivery = delivered, "Delivery dispatched");
    }

    counter.finish();
    metrics.stage_finished();
    debug!(stage = counter.name(), "Delivery stage completed");
}
