//! Sampling supervisor
//!
//! One concurrent task per active source. Each task polls its driver on
//! the source class's cadence, pushes the reading into the rolling
//! store, runs the evaluator, and appends any resulting alerts. Poll
//! failures are retried after a fixed backoff and never kill the loop.
//! Cancellation is cooperative: the task observes its token at every
//! suspension point and exits promptly, and `stop_source` waits a
//! bounded time for that exit so "stopped" means no further writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::driver::{SourceDescriptor, SourceDriver};
use crate::metrics::EngineCounters;
use crate::registry::SourceRegistry;
use crate::rules::AlertEvaluator;
use crate::store::RollingStore;
use crate::types::{ConnectionState, Severity};

/// Shared collaborators handed to every sampling task
pub(crate) struct SamplingContext {
    pub registry: Arc<SourceRegistry>,
    pub store: Arc<RollingStore>,
    pub evaluator: Arc<AlertEvaluator>,
    pub counters: EngineCounters,
    pub cadence: Duration,
    pub backoff: Duration,
}

struct SamplingTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the sampling task for every running source
pub struct SamplingSupervisor {
    tasks: Mutex<HashMap<String, SamplingTask>>,
    stop_wait: Duration,
}

impl SamplingSupervisor {
    pub fn new(stop_wait: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            stop_wait,
        }
    }

    /// Whether a source currently has a live sampling task
    pub async fn is_running(&self, source_id: &str) -> bool {
        let tasks = self.tasks.lock().await;
        tasks
            .get(source_id)
            .map_or(false, |t| !t.handle.is_finished())
    }

    /// Number of live sampling tasks
    pub async fn running_count(&self) -> usize {
        let tasks = self.tasks.lock().await;
        tasks.values().filter(|t| !t.handle.is_finished()).count()
    }

    /// Spawn the sampling task for a source
    ///
    /// Idempotent: a source that is already running spawns nothing and
    /// returns false.
    pub(crate) async fn start_source(
        &self,
        descriptor: SourceDescriptor,
        driver: Box<dyn SourceDriver>,
        ctx: SamplingContext,
    ) -> bool {
        let mut tasks = self.tasks.lock().await;

        if let Some(existing) = tasks.get(&descriptor.source_id) {
            if !existing.handle.is_finished() {
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let source_id = descriptor.source_id.clone();

        let handle = tokio::spawn(async move {
            sampling_loop(descriptor, driver, ctx, task_cancel).await;
        });

        debug!(source_id = %source_id, "sampling task started");
        tasks.insert(source_id, SamplingTask { cancel, handle });
        true
    }

    /// Cancel a source's task and wait a bounded time for it to exit
    ///
    /// Returns true when a task was stopped. A task that fails to exit
    /// within the timeout is logged as a leak; the call still returns.
    pub async fn stop_source(&self, source_id: &str, counters: &EngineCounters) -> bool {
        let task = {
            let mut tasks = self.tasks.lock().await;
            tasks.remove(source_id)
        };

        let Some(task) = task else {
            return false;
        };

        task.cancel.cancel();
        match tokio::time::timeout(self.stop_wait, task.handle).await {
            Ok(_) => {
                debug!(source_id = %source_id, "sampling task stopped");
            }
            Err(_) => {
                counters.tasks_leaked.inc();
                warn!(
                    source_id = %source_id,
                    timeout_ms = self.stop_wait.as_millis() as u64,
                    "sampling task did not exit within the stop timeout, leaking it"
                );
            }
        }
        true
    }

    /// Stop every running task; returns the number stopped
    pub async fn stop_all(&self, counters: &EngineCounters) -> usize {
        let ids: Vec<String> = {
            let tasks = self.tasks.lock().await;
            tasks.keys().cloned().collect()
        };

        let mut stopped = 0;
        for id in ids {
            if self.stop_source(&id, counters).await {
                stopped += 1;
            }
        }
        stopped
    }
}

/// The per-source sampling loop
///
/// Storage happens before evaluation so a failed evaluation still
/// leaves the reading in history.
async fn sampling_loop(
    descriptor: SourceDescriptor,
    driver: Box<dyn SourceDriver>,
    ctx: SamplingContext,
    cancel: CancellationToken,
) {
    info!(
        source_id = %descriptor.source_id,
        subject_id = %descriptor.subject_id,
        class = %descriptor.class,
        cadence_ms = ctx.cadence.as_millis() as u64,
        "sampling loop running"
    );

    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = driver.poll() => polled,
        };

        let wait = match polled {
            Ok(Some(reading)) => {
                ctx.registry.touch(&descriptor.source_id, &reading).await;
                ctx.store.append_reading(reading.clone()).await;
                ctx.counters.readings_ingested.inc();

                match ctx.evaluator.evaluate(&reading) {
                    Ok(alerts) => {
                        if !alerts.is_empty() {
                            for alert in &alerts {
                                match alert.severity {
                                    Severity::Critical => error!(
                                        subject_id = %alert.subject_id,
                                        alert_id = %alert.id,
                                        "CRITICAL alert: {}",
                                        alert.message
                                    ),
                                    Severity::High => warn!(
                                        subject_id = %alert.subject_id,
                                        alert_id = %alert.id,
                                        "HIGH alert: {}",
                                        alert.message
                                    ),
                                    _ => info!(
                                        subject_id = %alert.subject_id,
                                        alert_id = %alert.id,
                                        "alert: {}",
                                        alert.message
                                    ),
                                }
                                if alert.severity == Severity::Critical {
                                    ctx.counters.alerts_critical.inc();
                                }
                            }
                            ctx.counters.alerts_raised.inc_by(alerts.len() as u64);
                            ctx.store.append_alerts(alerts).await;
                        }
                    }
                    Err(e) => {
                        // the reading is already stored; only alerting is lost
                        ctx.counters.evaluation_failures.inc();
                        warn!(
                            source_id = %descriptor.source_id,
                            "rule evaluation failed, reading kept: {}",
                            e
                        );
                    }
                }

                ctx.cadence
            }
            Ok(None) => ctx.cadence,
            Err(e) => {
                ctx.counters.poll_failures.inc();
                ctx.registry
                    .mark_connection(&descriptor.source_id, ConnectionState::Disconnected)
                    .await;
                warn!(
                    source_id = %descriptor.source_id,
                    "poll failed, retrying after backoff: {}",
                    e
                );
                ctx.backoff
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!(source_id = %descriptor.source_id, "sampling loop exited");
}
