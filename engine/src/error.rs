//! Error handling for the Vigil monitoring engine
//!
//! This module provides the error types for all engine operations,
//! including source registration, rule evaluation, driver acquisition,
//! and configuration loading.

use thiserror::Error;

/// The main error type for the monitoring engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rule evaluation errors
    #[error("Rule evaluation error: {0}")]
    Rule(#[from] RuleError),

    /// Driver acquisition errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metrics registration errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No sources are registered for the requested subject
    #[error("Unknown subject: {subject_id}")]
    UnknownSubject { subject_id: String },

    /// Registration was attempted with a class the engine does not know
    #[error("Invalid source class: {class}")]
    InvalidSourceClass { class: String },

    /// Registration was attempted with an unusable identifier
    #[error("Invalid source registration: {reason}")]
    InvalidRegistration { reason: String },
}

/// Rule table and evaluator errors
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Malformed value for parameter {parameter}: {value}")]
    MalformedValue { parameter: String, value: f64 },
}

/// Source driver errors
///
/// Driver failures are consumed by the sampling loop and retried with a
/// fixed backoff; they are never surfaced to engine callers.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Acquisition failed: {reason}")]
    Acquisition { reason: String },

    #[error("Source disconnected")]
    Disconnected,
}

/// Configuration related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;

/// A specialized result type for rule evaluation
pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// A specialized result type for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl EngineError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors are retried or degraded around internally;
    /// non-recoverable ones are reported to the caller as-is.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Driver(_) => true,
            EngineError::Rule(_) => true,
            EngineError::Config(_) => false,
            EngineError::Metrics(_) => false,
            EngineError::Serialization(_) => false,
            EngineError::UnknownSubject { .. } => false,
            EngineError::InvalidSourceClass { .. } => false,
            EngineError::InvalidRegistration { .. } => false,
        }
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Rule(_) => "rule",
            EngineError::Driver(_) => "driver",
            EngineError::Config(_) => "config",
            EngineError::Metrics(_) => "metrics",
            EngineError::Serialization(_) => "serialization",
            EngineError::UnknownSubject { .. } => "unknown_subject",
            EngineError::InvalidSourceClass { .. } => "invalid_class",
            EngineError::InvalidRegistration { .. } => "invalid_registration",
        }
    }
}
