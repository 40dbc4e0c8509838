//! Metrics for the Vigil monitoring engine
//!
//! Prometheus counters and gauges covering ingestion, alerting, and
//! task lifecycle. The engine is a library component, so there is no
//! metrics server here; `export` renders the text format for whatever
//! surface embeds the engine.

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Metrics collector owning the Prometheus registry
pub struct MetricsCollector {
    registry: Registry,
    counters: EngineCounters,
}

/// Engine counters, cloned into every sampling task
#[derive(Clone)]
pub struct EngineCounters {
    // Ingestion
    pub readings_ingested: IntCounter,
    pub poll_failures: IntCounter,
    pub evaluation_failures: IntCounter,

    // Alerting
    pub alerts_raised: IntCounter,
    pub alerts_critical: IntCounter,

    // Task lifecycle
    pub tasks_leaked: IntCounter,

    // Current state
    pub active_sources: IntGauge,
    pub subjects_monitored: IntGauge,
}

impl EngineCounters {
    fn new(registry: &Registry) -> Result<Self> {
        let readings_ingested = IntCounter::with_opts(Opts::new(
            "vigil_readings_ingested_total",
            "Readings stored in the rolling history",
        ))?;
        let poll_failures = IntCounter::with_opts(Opts::new(
            "vigil_poll_failures_total",
            "Driver polls that failed and were retried",
        ))?;
        let evaluation_failures = IntCounter::with_opts(Opts::new(
            "vigil_evaluation_failures_total",
            "Readings whose rule evaluation failed",
        ))?;
        let alerts_raised = IntCounter::with_opts(Opts::new(
            "vigil_alerts_raised_total",
            "Alerts appended to the global log",
        ))?;
        let alerts_critical = IntCounter::with_opts(Opts::new(
            "vigil_alerts_critical_total",
            "Critical-severity alerts raised",
        ))?;
        let tasks_leaked = IntCounter::with_opts(Opts::new(
            "vigil_tasks_leaked_total",
            "Sampling tasks that did not exit within the stop timeout",
        ))?;
        let active_sources = IntGauge::with_opts(Opts::new(
            "vigil_active_sources",
            "Sources currently marked active",
        ))?;
        let subjects_monitored = IntGauge::with_opts(Opts::new(
            "vigil_subjects_monitored",
            "Subjects with at least one registered source",
        ))?;

        registry.register(Box::new(readings_ingested.clone()))?;
        registry.register(Box::new(poll_failures.clone()))?;
        registry.register(Box::new(evaluation_failures.clone()))?;
        registry.register(Box::new(alerts_raised.clone()))?;
        registry.register(Box::new(alerts_critical.clone()))?;
        registry.register(Box::new(tasks_leaked.clone()))?;
        registry.register(Box::new(active_sources.clone()))?;
        registry.register(Box::new(subjects_monitored.clone()))?;

        Ok(Self {
            readings_ingested,
            poll_failures,
            evaluation_failures,
            alerts_raised,
            alerts_critical,
            tasks_leaked,
            active_sources,
            subjects_monitored,
        })
    }
}

impl MetricsCollector {
    /// Create a collector with a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let counters = EngineCounters::new(&registry)?;
        Ok(Self { registry, counters })
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn export(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(crate::error::EngineError::Metrics)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
