//! Core value types for the Vigil monitoring engine
//!
//! Readings are immutable once constructed; alerts mutate only through
//! acknowledgement. Source records live in the registry and are updated
//! by the sampling task that owns the source.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known parameter names produced by the built-in drivers and
/// referenced by the default rule table.
pub mod parameters {
    pub const HEART_RATE: &str = "heart_rate";
    pub const SPO2: &str = "spo2";
    pub const SYSTOLIC_BP: &str = "systolic_bp";
    pub const DIASTOLIC_BP: &str = "diastolic_bp";
    pub const TEMPERATURE: &str = "temperature";
    pub const RESPIRATORY_RATE: &str = "respiratory_rate";
    pub const GLUCOSE: &str = "glucose";
}

/// Alert severity levels, ordered least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source class, determining the sampling cadence and the parameter set
/// the source produces
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    PulseOximeter,
    BloodPressure,
    Temperature,
    Respiratory,
    Glucose,
}

impl SourceClass {
    /// All known classes, used by the cadence table and driver registry
    pub const ALL: [SourceClass; 5] = [
        SourceClass::PulseOximeter,
        SourceClass::BloodPressure,
        SourceClass::Temperature,
        SourceClass::Respiratory,
        SourceClass::Glucose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceClass::PulseOximeter => "pulse_oximeter",
            SourceClass::BloodPressure => "blood_pressure",
            SourceClass::Temperature => "temperature",
            SourceClass::Respiratory => "respiratory",
            SourceClass::Glucose => "glucose",
        }
    }

    /// Parse a class from its registration string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pulse_oximeter" => Some(SourceClass::PulseOximeter),
            "blood_pressure" => Some(SourceClass::BloodPressure),
            "temperature" => Some(SourceClass::Temperature),
            "respiratory" => Some(SourceClass::Respiratory),
            "glucose" => Some(SourceClass::Glucose),
            _ => None,
        }
    }
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a source as observed by its sampling task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// One timestamped, multi-parameter sample from a source
///
/// Immutable once constructed. The parameter map is sparse: a source
/// reports only the parameters its class produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub subject_id: String,
    pub source_id: String,
    pub class: SourceClass,
    pub timestamp: DateTime<Utc>,
    pub parameters: BTreeMap<String, f64>,
}

impl Reading {
    /// Create an empty reading stamped with the current time
    pub fn new(
        subject_id: impl Into<String>,
        source_id: impl Into<String>,
        class: SourceClass,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            source_id: source_id.into(),
            class,
            timestamp: Utc::now(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }
}

/// A severity-tagged notification produced when a reading breaches a
/// rule-table boundary
///
/// Every alert embeds the reading that caused it. `acknowledged` is the
/// only state that changes after creation, and only false to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub subject_id: String,
    pub source_id: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub resolved: bool,
}

/// Registry entry for one registered source
///
/// `subject_id` is immutable after registration. Sources are never
/// deleted on stop, only deactivated; removal requires an explicit
/// deregistration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub class: SourceClass,
    pub subject_id: String,
    pub active: bool,
    pub connection: ConnectionState,
    pub battery_level: f64,
    pub last_reading: Option<Reading>,
    pub total_readings: u64,
}

impl SourceRecord {
    pub fn new(
        id: impl Into<String>,
        class: SourceClass,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            class,
            subject_id: subject_id.into(),
            active: false,
            connection: ConnectionState::Connected,
            battery_level: 100.0,
            last_reading: None,
            total_readings: 0,
        }
    }
}

/// Per-source slice of a subject status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub id: String,
    pub class: SourceClass,
    pub active: bool,
    pub connection: ConnectionState,
    pub battery_level: f64,
    pub last_reading_at: Option<DateTime<Utc>>,
}

impl From<&SourceRecord> for SourceStatus {
    fn from(record: &SourceRecord) -> Self {
        Self {
            id: record.id.clone(),
            class: record.class,
            active: record.active,
            connection: record.connection,
            battery_level: record.battery_level,
            last_reading_at: record.last_reading.as_ref().map(|r| r.timestamp),
        }
    }
}

/// Aggregated real-time status for one subject
#[derive(Debug, Clone, Serialize)]
pub struct SubjectStatus {
    pub subject_id: String,
    pub generated_at: DateTime<Utc>,

    /// Registry state of every source registered for the subject
    pub sources: Vec<SourceStatus>,

    /// Most recent reading per source class
    pub latest: BTreeMap<SourceClass, Reading>,

    /// Count of unresolved alerts for the subject
    pub active_alerts: usize,

    /// Unresolved alerts, most recent first, bounded slice
    pub recent_alerts: Vec<Alert>,

    /// Short trend window from the rolling history, oldest first
    pub trend: Vec<Reading>,
}

/// Aggregate engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    pub active_sources: usize,
    pub subjects_monitored: usize,
    pub unacknowledged_alerts: usize,
    pub total_readings: u64,
    pub uptime_seconds: u64,
}

/// Engine health summary
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub running_tasks: usize,
    pub alert_log_len: usize,
    pub uptime_seconds: u64,
}
