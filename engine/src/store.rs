//! Bounded rolling storage for readings and alerts
//!
//! One fixed-capacity queue per subject for readings, one global queue
//! for alerts. Eviction is strict FIFO by insertion order and O(1)
//! amortized. Appends from many sampling tasks and reads from status
//! queries are serialized by a single lock per store; no I/O or
//! evaluation happens inside the critical section.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use crate::types::{Alert, Reading};

/// Bounded per-subject reading history plus the global alert log
pub struct RollingStore {
    inner: RwLock<StoreInner>,
    per_subject_cap: usize,
    alert_cap: usize,
}

struct StoreInner {
    readings: HashMap<String, VecDeque<Reading>>,
    alerts: VecDeque<Alert>,
}

impl RollingStore {
    pub fn new(per_subject_cap: usize, alert_cap: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                readings: HashMap::new(),
                alerts: VecDeque::new(),
            }),
            per_subject_cap,
            alert_cap,
        }
    }

    /// Append a reading to its subject's history, evicting the oldest
    /// entry once the cap is reached
    pub async fn append_reading(&self, reading: Reading) {
        let mut inner = self.inner.write().await;
        let history = inner
            .readings
            .entry(reading.subject_id.clone())
            .or_insert_with(VecDeque::new);

        if history.len() == self.per_subject_cap {
            history.pop_front();
        }
        history.push_back(reading);
    }

    /// Append one alert to the global log
    pub async fn append_alert(&self, alert: Alert) {
        let mut inner = self.inner.write().await;
        Self::push_alert(&mut inner.alerts, alert, self.alert_cap);
    }

    /// Append a batch of alerts under one lock acquisition, preserving
    /// their order
    pub async fn append_alerts(&self, alerts: Vec<Alert>) {
        if alerts.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;
        for alert in alerts {
            Self::push_alert(&mut inner.alerts, alert, self.alert_cap);
        }
    }

    fn push_alert(log: &mut VecDeque<Alert>, alert: Alert, cap: usize) {
        if log.len() == cap {
            log.pop_front();
        }
        log.push_back(alert);
    }

    /// The most recent `n` readings for a subject, oldest first
    pub async fn recent_readings(&self, subject_id: &str, n: usize) -> Vec<Reading> {
        let inner = self.inner.read().await;
        match inner.readings.get(subject_id) {
            Some(history) => {
                let skip = history.len().saturating_sub(n);
                history.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Retained history length for a subject
    pub async fn history_len(&self, subject_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner.readings.get(subject_id).map_or(0, |h| h.len())
    }

    /// Unresolved alerts across all subjects, most recent first, at most `n`
    pub async fn recent_alerts(&self, n: usize) -> Vec<Alert> {
        let inner = self.inner.read().await;
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| !a.resolved)
            .take(n)
            .cloned()
            .collect()
    }

    /// Unresolved alerts for a subject, most recent first, at most `n`
    pub async fn recent_alerts_for(&self, subject_id: &str, n: usize) -> Vec<Alert> {
        let inner = self.inner.read().await;
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| a.subject_id == subject_id && !a.resolved)
            .take(n)
            .cloned()
            .collect()
    }

    /// Count of unresolved alerts for a subject
    pub async fn unresolved_count(&self, subject_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .alerts
            .iter()
            .filter(|a| a.subject_id == subject_id && !a.resolved)
            .count()
    }

    /// Count of unacknowledged alerts across all subjects
    pub async fn unacknowledged_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.alerts.iter().filter(|a| !a.acknowledged).count()
    }

    /// Current length of the global alert log
    pub async fn alert_log_len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.alerts.len()
    }

    /// Mark an alert acknowledged
    ///
    /// Returns false when the id is unknown or already evicted. Repeat
    /// acknowledgement of the same alert returns true and keeps the
    /// original acknowledger.
    pub async fn acknowledge(&self, alert_id: &str, user_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        // recent alerts are the likely targets, so search newest first
        match inner.alerts.iter_mut().rev().find(|a| a.id == alert_id) {
            Some(alert) => {
                if !alert.acknowledged {
                    alert.acknowledged = true;
                    alert.acknowledged_by = Some(user_id.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Drop a subject's history; its alerts age out of the global log
    /// through normal eviction
    pub async fn purge_subject(&self, subject_id: &str) {
        let mut inner = self.inner.write().await;
        inner.readings.remove(subject_id);
    }
}
