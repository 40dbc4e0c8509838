//! Threshold rule table and alert evaluator
//!
//! The rule table is data, not code: each entry is a boundary rule
//! `(parameter, comparator, threshold, severity, message template)`.
//! Rules for the same parameter are kept in priority order so that the
//! most severe matching boundary wins where boundaries overlap, and only
//! the first match emits an alert for that parameter on a given reading.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RuleError, RuleResult};
use crate::types::{parameters, Alert, Reading, Severity};

/// Boundary comparison direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Matches when the observed value is below the threshold
    Below,
    /// Matches when the observed value is above the threshold
    Above,
}

impl Comparator {
    fn matches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Below => value < threshold,
            Comparator::Above => value > threshold,
        }
    }
}

/// One threshold boundary for one parameter
///
/// The message template may reference `{value}` and `{threshold}`;
/// both are substituted when the alert is rendered.
#[derive(Debug, Clone)]
pub struct BoundaryRule {
    pub parameter: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub severity: Severity,
    pub template: String,
}

impl BoundaryRule {
    fn render(&self, value: f64) -> String {
        self.template
            .replace("{value}", &format_number(value))
            .replace("{threshold}", &format_number(self.threshold))
    }
}

fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Ordered collection of boundary rules
///
/// Insertion order is evaluation order per parameter. Extending the
/// table never requires touching the evaluator.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<BoundaryRule>,
}

impl RuleTable {
    /// An empty table; no reading will ever alert
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a boundary rule
    ///
    /// For overlapping boundaries on the same parameter, insert the more
    /// severe boundary first.
    pub fn with_rule(
        mut self,
        parameter: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        severity: Severity,
        template: impl Into<String>,
    ) -> Self {
        self.rules.push(BoundaryRule {
            parameter: parameter.into(),
            comparator,
            threshold,
            severity,
            template: template.into(),
        });
        self
    }

    /// The reference threshold table
    pub fn reference() -> Self {
        RuleTable::empty()
            .with_rule(
                parameters::HEART_RATE,
                Comparator::Below,
                50.0,
                Severity::High,
                "Bradycardia detected: heart rate {value} bpm (below {threshold})",
            )
            .with_rule(
                parameters::HEART_RATE,
                Comparator::Above,
                120.0,
                Severity::High,
                "Tachycardia detected: heart rate {value} bpm (above {threshold})",
            )
            // critical boundary first so SpO2 below 85 never reports as high
            .with_rule(
                parameters::SPO2,
                Comparator::Below,
                85.0,
                Severity::Critical,
                "Severe hypoxemia detected: SpO2 {value}% (below {threshold})",
            )
            .with_rule(
                parameters::SPO2,
                Comparator::Below,
                88.0,
                Severity::High,
                "Hypoxemia detected: SpO2 {value}% (below {threshold})",
            )
            .with_rule(
                parameters::SYSTOLIC_BP,
                Comparator::Above,
                180.0,
                Severity::High,
                "Hypertension detected: systolic {value} mmHg (above {threshold})",
            )
            .with_rule(
                parameters::SYSTOLIC_BP,
                Comparator::Below,
                90.0,
                Severity::High,
                "Hypotension detected: systolic {value} mmHg (below {threshold})",
            )
            .with_rule(
                parameters::TEMPERATURE,
                Comparator::Above,
                101.5,
                Severity::Medium,
                "Fever detected: temperature {value}\u{b0}F (above {threshold})",
            )
            .with_rule(
                parameters::TEMPERATURE,
                Comparator::Below,
                96.0,
                Severity::Medium,
                "Hypothermia detected: temperature {value}\u{b0}F (below {threshold})",
            )
    }

    /// Rules for one parameter, in priority order
    pub fn rules_for<'a>(
        &'a self,
        parameter: &'a str,
    ) -> impl Iterator<Item = &'a BoundaryRule> {
        self.rules.iter().filter(move |r| r.parameter == parameter)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Evaluates readings against a rule table
///
/// Alert ids come from a monotonic sequence, never from timestamps, so
/// alerts raised in the same instant still get unique ids.
pub struct AlertEvaluator {
    table: RuleTable,
    sequence: AtomicU64,
}

impl AlertEvaluator {
    pub fn new(table: RuleTable) -> Self {
        Self {
            table,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Evaluate one reading, producing zero or more alerts
    ///
    /// Each out-of-range parameter emits at most one alert (the first
    /// matching boundary in table order). Independent parameters each
    /// emit their own alert. A non-finite parameter value fails the
    /// whole evaluation; the caller stores the reading regardless.
    pub fn evaluate(&self, reading: &Reading) -> RuleResult<Vec<Alert>> {
        let mut alerts = Vec::new();

        for (parameter, &value) in &reading.parameters {
            if !value.is_finite() {
                return Err(RuleError::MalformedValue {
                    parameter: parameter.clone(),
                    value,
                });
            }

            for rule in self.table.rules_for(parameter) {
                if rule.comparator.matches(value, rule.threshold) {
                    alerts.push(self.build_alert(rule, value, reading));
                    break;
                }
            }
        }

        Ok(alerts)
    }

    fn build_alert(&self, rule: &BoundaryRule, value: f64, reading: &Reading) -> Alert {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Alert {
            id: format!("alrt-{:06}", seq),
            subject_id: reading.subject_id.clone(),
            source_id: reading.source_id.clone(),
            severity: rule.severity,
            message: rule.render(value),
            timestamp: reading.timestamp,
            reading: reading.clone(),
            acknowledged: false,
            acknowledged_by: None,
            resolved: false,
        }
    }
}
