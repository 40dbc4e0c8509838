//! Monitoring engine facade
//!
//! Composition root owning the source registry, rolling store, alert
//! evaluator, and sampling supervisor. This is the call surface an
//! embedding API layer talks to: register, start, stop, status,
//! acknowledge, statistics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::info;

use crate::config::EngineConfig;
use crate::driver::{DriverRegistry, SourceDescriptor};
use crate::error::{EngineError, Result};
use crate::metrics::MetricsCollector;
use crate::registry::SourceRegistry;
use crate::rules::{AlertEvaluator, RuleTable};
use crate::store::RollingStore;
use crate::supervisor::{SamplingContext, SamplingSupervisor};
use crate::types::{
    EngineStatistics, HealthStatus, SourceClass, SourceRecord, SourceStatus, SubjectStatus,
};

/// The monitoring engine
pub struct MonitoringEngine {
    config: EngineConfig,
    registry: Arc<SourceRegistry>,
    store: Arc<RollingStore>,
    evaluator: Arc<AlertEvaluator>,
    drivers: DriverRegistry,
    supervisor: SamplingSupervisor,
    metrics: Arc<MetricsCollector>,
    started_at: Instant,
}

/// Builder for engines with a custom rule table or driver overrides
pub struct MonitoringEngineBuilder {
    config: EngineConfig,
    table: RuleTable,
    drivers: DriverRegistry,
}

impl MonitoringEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            table: RuleTable::reference(),
            drivers: DriverRegistry::simulated(),
        }
    }

    /// Replace the reference rule table
    pub fn rule_table(mut self, table: RuleTable) -> Self {
        self.table = table;
        self
    }

    /// Replace the driver registry
    pub fn drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn build(self) -> Result<MonitoringEngine> {
        self.config.validate()?;

        let metrics = Arc::new(MetricsCollector::new()?);
        let store = Arc::new(RollingStore::new(
            self.config.history.per_subject_cap,
            self.config.history.alert_cap,
        ));

        Ok(MonitoringEngine {
            registry: Arc::new(SourceRegistry::new()),
            store,
            evaluator: Arc::new(AlertEvaluator::new(self.table)),
            drivers: self.drivers,
            supervisor: SamplingSupervisor::new(self.config.sampling.stop_wait()),
            metrics,
            started_at: Instant::now(),
            config: self.config,
        })
    }
}

impl MonitoringEngine {
    /// Create an engine with the reference rule table and simulated drivers
    pub fn new(config: EngineConfig) -> Result<Self> {
        MonitoringEngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> MonitoringEngineBuilder {
        MonitoringEngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Register a source for a subject
    ///
    /// No polling starts here; the registry entry is created inactive.
    /// Registering an already-registered id returns the existing record.
    pub async fn register_source(
        &self,
        source_id: &str,
        class: &str,
        subject_id: &str,
    ) -> Result<SourceRecord> {
        let source_id = source_id.trim();
        let subject_id = subject_id.trim();

        if source_id.is_empty() {
            return Err(EngineError::InvalidRegistration {
                reason: "empty source id".to_string(),
            });
        }
        if subject_id.is_empty() {
            return Err(EngineError::InvalidRegistration {
                reason: "empty subject id".to_string(),
            });
        }

        let class = SourceClass::parse(class).ok_or_else(|| EngineError::InvalidSourceClass {
            class: class.to_string(),
        })?;

        let record = self.registry.register(source_id, class, subject_id).await;
        self.metrics
            .counters()
            .subjects_monitored
            .set(self.registry.subject_count().await as i64);

        info!(
            source_id = %source_id,
            subject_id = %subject_id,
            class = %class,
            "source registered"
        );
        Ok(record)
    }

    /// Start monitoring every source registered for a subject
    ///
    /// Idempotent per source: sources already running are left alone.
    /// Returns the number of the subject's sources running after the
    /// call, so a repeated start reports the same count.
    pub async fn start(&self, subject_id: &str) -> Result<usize> {
        let records = self.registry.records_for(subject_id).await;
        if records.is_empty() {
            return Err(EngineError::UnknownSubject {
                subject_id: subject_id.to_string(),
            });
        }

        let mut running = 0;
        for record in records {
            let descriptor = SourceDescriptor {
                source_id: record.id.clone(),
                subject_id: record.subject_id.clone(),
                class: record.class,
            };
            let driver = self.drivers.create(&descriptor);
            let ctx = SamplingContext {
                registry: self.registry.clone(),
                store: self.store.clone(),
                evaluator: self.evaluator.clone(),
                counters: self.metrics.counters().clone(),
                cadence: self.config.sampling.cadence.interval(record.class),
                backoff: self.config.sampling.failure_backoff(),
            };

            self.supervisor.start_source(descriptor, driver, ctx).await;
            self.registry.mark_active(&record.id, true).await;
            running += 1;
        }

        self.refresh_gauges().await;
        info!(subject_id = %subject_id, sources = running, "monitoring started");
        Ok(running)
    }

    /// Stop monitoring a subject
    ///
    /// Idempotent and lenient: an unknown or already-stopped subject is
    /// treated as stopped. Returns the number of tasks actually stopped.
    /// Blocks at most the configured stop timeout per source task.
    pub async fn stop(&self, subject_id: &str) -> usize {
        let ids = self.registry.sources_for(subject_id).await;
        if ids.is_empty() {
            return 0;
        }

        let stops = ids.iter().map(|id| async move {
            let stopped = self
                .supervisor
                .stop_source(id, self.metrics.counters())
                .await;
            self.registry.mark_active(id, false).await;
            stopped
        });
        let stopped = join_all(stops).await.into_iter().filter(|s| *s).count();

        self.refresh_gauges().await;
        if stopped > 0 {
            info!(subject_id = %subject_id, sources = stopped, "monitoring stopped");
        }
        stopped
    }

    /// Aggregate real-time status for a subject
    pub async fn status(&self, subject_id: &str) -> Result<SubjectStatus> {
        let records = self.registry.records_for(subject_id).await;
        if records.is_empty() {
            return Err(EngineError::UnknownSubject {
                subject_id: subject_id.to_string(),
            });
        }

        let mut latest = BTreeMap::new();
        let mut sources = Vec::with_capacity(records.len());
        for record in &records {
            sources.push(SourceStatus::from(record));
            if let Some(reading) = &record.last_reading {
                // keep the newest reading when two sources share a class
                let newer = latest
                    .get(&record.class)
                    .map_or(true, |existing: &crate::types::Reading| {
                        reading.timestamp > existing.timestamp
                    });
                if newer {
                    latest.insert(record.class, reading.clone());
                }
            }
        }

        Ok(SubjectStatus {
            subject_id: subject_id.to_string(),
            generated_at: Utc::now(),
            sources,
            latest,
            active_alerts: self.store.unresolved_count(subject_id).await,
            recent_alerts: self
                .store
                .recent_alerts_for(subject_id, self.config.history.recent_alerts)
                .await,
            trend: self
                .store
                .recent_readings(subject_id, self.config.history.trend_window)
                .await,
        })
    }

    /// Acknowledge an alert
    ///
    /// Returns false when the id is unknown or already evicted; repeat
    /// acknowledgement returns true.
    pub async fn acknowledge(&self, alert_id: &str, user_id: &str) -> bool {
        let acknowledged = self.store.acknowledge(alert_id, user_id).await;
        if acknowledged {
            info!(alert_id = %alert_id, user_id = %user_id, "alert acknowledged");
        }
        acknowledged
    }

    /// Aggregate engine statistics
    pub async fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            active_sources: self.registry.active_count().await,
            subjects_monitored: self.registry.subject_count().await,
            unacknowledged_alerts: self.store.unacknowledged_count().await,
            total_readings: self.registry.total_readings().await,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Engine health summary
    pub async fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            running_tasks: self.supervisor.running_count().await,
            alert_log_len: self.store.alert_log_len().await,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Stop and remove one source
    ///
    /// Idempotent: unknown ids are a no-op. Returns true when a registry
    /// entry was removed.
    pub async fn deregister_source(&self, source_id: &str) -> bool {
        self.supervisor
            .stop_source(source_id, self.metrics.counters())
            .await;
        let removed = self.registry.deregister(source_id).await.is_some();
        self.refresh_gauges().await;
        removed
    }

    /// Stop a subject and drop its sources and history
    pub async fn purge_subject(&self, subject_id: &str) {
        self.stop(subject_id).await;
        let removed = self.registry.purge_subject(subject_id).await;
        self.store.purge_subject(subject_id).await;
        self.refresh_gauges().await;
        info!(subject_id = %subject_id, sources = removed.len(), "subject purged");
    }

    /// Stop every running sampling task
    ///
    /// Registry entries survive shutdown, but none remain active.
    pub async fn shutdown(&self) {
        let stopped = self.supervisor.stop_all(self.metrics.counters()).await;
        for subject in self.registry.subject_ids().await {
            for id in self.registry.sources_for(&subject).await {
                self.registry.mark_active(&id, false).await;
            }
        }
        self.refresh_gauges().await;
        info!(tasks = stopped, "engine shut down");
    }

    async fn refresh_gauges(&self) {
        let counters = self.metrics.counters();
        counters
            .active_sources
            .set(self.registry.active_count().await as i64);
        counters
            .subjects_monitored
            .set(self.registry.subject_count().await as i64);
    }
}
