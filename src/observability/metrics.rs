//! Operational counters
//!
//! Counters only, monotonic, Relaxed ordering.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by every `DocumentStore` that is handed the same registry
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    documents_created: AtomicU64,
    documents_stored: AtomicU64,
    documents_deleted: AtomicU64,
    duplicates_rejected: AtomicU64,
    stores_skipped: AtomicU64,
    batches_rolled_back: AtomicU64,
    selections: AtomicU64,
    degraded_selections: AtomicU64,
    hashes_assigned: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_documents_created(&self) {
        self.documents_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_documents_stored(&self) {
        self.documents_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_documents_deleted(&self) {
        self.documents_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicates_rejected(&self) {
        self.duplicates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stores_skipped(&self) {
        self.stores_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_rolled_back(&self) {
        self.batches_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a selection; `degraded` when the winner was not reachable
    pub fn record_selection(&self, degraded: bool) {
        self.selections.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_selections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_hashes_assigned(&self) {
        self.hashes_assigned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_created: self.documents_created.load(Ordering::Relaxed),
            documents_stored: self.documents_stored.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
            duplicates_rejected: self.duplicates_rejected.load(Ordering::Relaxed),
            stores_skipped: self.stores_skipped.load(Ordering::Relaxed),
            batches_rolled_back: self.batches_rolled_back.load(Ordering::Relaxed),
            selections: self.selections.load(Ordering::Relaxed),
            degraded_selections: self.degraded_selections.load(Ordering::Relaxed),
            hashes_assigned: self.hashes_assigned.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub documents_created: u64,
    pub documents_stored: u64,
    pub documents_deleted: u64,
    pub duplicates_rejected: u64,
    pub stores_skipped: u64,
    pub batches_rolled_back: u64,
    pub selections: u64,
    pub degraded_selections: u64,
    pub hashes_assigned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.documents_created, 0);
        assert_eq!(snapshot.selections, 0);
    }

    #[test]
    fn test_selection_counters() {
        let metrics = MetricsRegistry::new();
        metrics.record_selection(false);
        metrics.record_selection(true);
        metrics.increment_duplicates_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.selections, 2);
        assert_eq!(snapshot.degraded_selections, 1);
        assert_eq!(snapshot.duplicates_rejected, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = MetricsRegistry::new();
        metrics.increment_documents_stored();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["documents_stored"], 1);
    }
}
