//! Observable events of the document store

use std::fmt;

use super::logger::Severity;

/// Typed events emitted by the registry and the session façade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Topology
    /// Registry built from configuration
    RegistryLoaded,
    /// Registry topology replaced
    RegistryReloaded,

    // Selection
    /// A storage was chosen for a write
    StorageSelected,
    /// The best candidate is not reachable; returned anyway
    StorageDegraded,

    // Documents
    /// Empty variant reserved
    DocumentCreated,
    /// Variant created with content
    DocumentStored,
    /// Create of an existing variant refused
    DuplicateRejected,
    /// Store of an existing variant skipped
    StoreSkipped,
    /// All variants of a uid removed
    DocumentDeleted,
    /// Integrity hash assigned
    HashAssigned,
    /// A half-written variant could not be removed
    CleanupFailed,

    // Batches
    /// Batch failed; documents created by it were removed
    BatchRolledBack,
    /// A rollback step could not remove a created document
    RollbackFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::RegistryLoaded => "REGISTRY_LOADED",
            Event::RegistryReloaded => "REGISTRY_RELOADED",
            Event::StorageSelected => "STORAGE_SELECTED",
            Event::StorageDegraded => "STORAGE_DEGRADED",
            Event::DocumentCreated => "DOCUMENT_CREATED",
            Event::DocumentStored => "DOCUMENT_STORED",
            Event::DuplicateRejected => "DOCUMENT_DUPLICATE_REJECTED",
            Event::StoreSkipped => "DOCUMENT_STORE_SKIPPED",
            Event::DocumentDeleted => "DOCUMENT_DELETED",
            Event::HashAssigned => "DOCUMENT_HASH_ASSIGNED",
            Event::CleanupFailed => "DOCUMENT_CLEANUP_FAILED",
            Event::BatchRolledBack => "BATCH_ROLLED_BACK",
            Event::RollbackFailed => "BATCH_ROLLBACK_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::StorageSelected | Event::HashAssigned | Event::StoreSkipped => Severity::Trace,
            Event::StorageDegraded | Event::BatchRolledBack | Event::DuplicateRejected => {
                Severity::Warn
            }
            Event::RollbackFailed | Event::CleanupFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
