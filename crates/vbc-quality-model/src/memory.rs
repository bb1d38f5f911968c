//! In-memory fact store
//!
//! Every mutation builds a fresh [`FactSnapshot`] under a bumped version, so
//! snapshots already handed out never change.

use crate::bundle::FactBundle;
use crate::provider::{FactStore, FactStoreResult};
use crate::snapshot::{FactSnapshot, SnapshotVersion};
use parking_lot::RwLock;
use std::sync::Arc;
use vbc_quality_types::{ClinicalEvent, Patient};

/// Fact store holding its tables in memory
#[derive(Clone)]
pub struct InMemoryFactStore {
    current: Arc<RwLock<Arc<FactSnapshot>>>,
}

impl Default for InMemoryFactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFactStore {
    /// Create an empty store at version 0
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(FactSnapshot::empty(SnapshotVersion(0))))),
        }
    }

    /// Create a store populated from a bundle
    pub fn from_bundle(bundle: FactBundle) -> FactStoreResult<Self> {
        let store = Self::new();
        store.replace(bundle)?;
        Ok(store)
    }

    /// Replace all facts with the bundle's contents
    pub fn replace(&self, bundle: FactBundle) -> FactStoreResult<SnapshotVersion> {
        let mut current = self.current.write();
        let version = current.version().next();
        let (patients, events) = bundle.into_parts();
        let snapshot = FactSnapshot::build(version, patients, events)?;
        log::info!(
            "Fact store replaced: {} patients, {} events ({})",
            snapshot.patient_count(),
            snapshot.event_count(),
            version
        );
        *current = Arc::new(snapshot);
        Ok(version)
    }

    /// Append patients and events to the current facts
    pub fn extend(
        &self,
        patients: impl IntoIterator<Item = Patient>,
        events: impl IntoIterator<Item = ClinicalEvent>,
    ) -> FactStoreResult<SnapshotVersion> {
        let mut current = self.current.write();
        let version = current.version().next();
        let snapshot = FactSnapshot::build(
            version,
            current.patients().cloned().chain(patients),
            current.all_events().cloned().chain(events),
        )?;
        log::debug!("Fact store extended to {}", version);
        *current = Arc::new(snapshot);
        Ok(version)
    }

    /// Append a single event
    pub fn insert_event(&self, event: impl Into<ClinicalEvent>) -> FactStoreResult<SnapshotVersion> {
        self.extend(std::iter::empty(), std::iter::once(event.into()))
    }
}

impl FactStore for InMemoryFactStore {
    fn snapshot(&self) -> FactStoreResult<Arc<FactSnapshot>> {
        Ok(Arc::clone(&self.current.read()))
    }

    fn current_version(&self) -> FactStoreResult<SnapshotVersion> {
        Ok(self.current.read().version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use vbc_quality_types::{EventId, LabResult, PatientId, Sex};

    fn lab(id: &str) -> LabResult {
        LabResult {
            id: EventId::new(id),
            patient_id: PatientId::new("p1"),
            code: "4548-4".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            value: "7.2".to_string(),
            unit: Some("%".to_string()),
        }
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_writes() {
        let store = InMemoryFactStore::new();
        store
            .extend(
                vec![Patient::new("p1", NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(), Sex::Male)],
                vec![],
            )
            .unwrap();

        let before = store.snapshot().unwrap();
        let version = store.insert_event(lab("lab-1")).unwrap();

        assert_eq!(before.event_count(), 0);
        assert_eq!(store.snapshot().unwrap().event_count(), 1);
        assert_eq!(store.current_version().unwrap(), version);
        assert!(version > before.version());
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let store = InMemoryFactStore::new();
        store.insert_event(lab("lab-1")).unwrap();
        let version = store.current_version().unwrap();

        assert!(store.insert_event(lab("lab-1")).is_err());
        assert_eq!(store.current_version().unwrap(), version);
    }
}
