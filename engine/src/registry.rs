//! Source registry
//!
//! Maps source ids to their records and keeps the reverse index from
//! subject id to the set of sources registered for it. A subject has no
//! lifecycle object of its own: it exists exactly as long as it has an
//! entry in the reverse index.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::RwLock;

use crate::types::{ConnectionState, Reading, SourceClass, SourceRecord};

/// Shared registry of sources and their owning subjects
pub struct SourceRegistry {
    inner: RwLock<RegistryInner>,
}

struct RegistryInner {
    sources: HashMap<String, SourceRecord>,
    // BTreeSet keeps per-subject source iteration stable
    by_subject: HashMap<String, BTreeSet<String>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                sources: HashMap::new(),
                by_subject: HashMap::new(),
            }),
        }
    }

    /// Register a source, creating its subject entry lazily
    ///
    /// Re-registering an existing id is harmless: the existing record is
    /// returned unchanged, since a source's subject binding is immutable
    /// after registration.
    pub async fn register(
        &self,
        source_id: &str,
        class: SourceClass,
        subject_id: &str,
    ) -> SourceRecord {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.sources.get(source_id) {
            return existing.clone();
        }

        let record = SourceRecord::new(source_id, class, subject_id);
        inner.sources.insert(source_id.to_string(), record.clone());
        inner
            .by_subject
            .entry(subject_id.to_string())
            .or_insert_with(BTreeSet::new)
            .insert(source_id.to_string());

        record
    }

    /// Remove a source; unknown ids are a no-op
    pub async fn deregister(&self, source_id: &str) -> Option<SourceRecord> {
        let mut inner = self.inner.write().await;
        let record = inner.sources.remove(source_id)?;

        if let Some(ids) = inner.by_subject.get_mut(&record.subject_id) {
            ids.remove(source_id);
            if ids.is_empty() {
                inner.by_subject.remove(&record.subject_id);
            }
        }

        Some(record)
    }

    pub async fn get(&self, source_id: &str) -> Option<SourceRecord> {
        let inner = self.inner.read().await;
        inner.sources.get(source_id).cloned()
    }

    /// Source ids registered for a subject, in stable order
    pub async fn sources_for(&self, subject_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .by_subject
            .get(subject_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Full records for a subject's sources, in stable order
    pub async fn records_for(&self, subject_id: &str) -> Vec<SourceRecord> {
        let inner = self.inner.read().await;
        match inner.by_subject.get(subject_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.sources.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn mark_active(&self, source_id: &str, active: bool) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.sources.get_mut(source_id) {
            record.active = active;
        }
    }

    pub async fn mark_connection(&self, source_id: &str, state: ConnectionState) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.sources.get_mut(source_id) {
            record.connection = state;
        }
    }

    /// Record a successful poll: last reading, reading count, connection
    pub async fn touch(&self, source_id: &str, reading: &Reading) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.sources.get_mut(source_id) {
            record.last_reading = Some(reading.clone());
            record.total_readings += 1;
            record.connection = ConnectionState::Connected;
        }
    }

    /// Count of sources currently marked active
    pub async fn active_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.sources.values().filter(|r| r.active).count()
    }

    /// Count of subjects with at least one registered source
    pub async fn subject_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.by_subject.len()
    }

    /// Ids of every subject with at least one registered source
    pub async fn subject_ids(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.by_subject.keys().cloned().collect()
    }

    /// Total readings ingested across all sources
    pub async fn total_readings(&self) -> u64 {
        let inner = self.inner.read().await;
        inner.sources.values().map(|r| r.total_readings).sum()
    }

    /// Remove a subject and all its sources; returns the removed ids
    pub async fn purge_subject(&self, subject_id: &str) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let ids: Vec<String> = inner
            .by_subject
            .remove(subject_id)
            .map(|ids| ids.into_iter().collect())
            .unwrap_or_default();

        for id in &ids {
            inner.sources.remove(id);
        }

        ids
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
