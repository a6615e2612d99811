//! # Document Store Errors
//!
//! Absence (unknown uid, mime, domain, pool or feature) is never an error:
//! lookups answer with `None`, an empty collection or `false`. The variants
//! below cover client mistakes, broken invariants, configuration problems and
//! infrastructure faults.

use thiserror::Error;

/// Result type for document store operations
pub type DocStoreResult<T> = Result<T, DocStoreError>;

/// Coarse classification used by callers to decide between retry, failover
/// and rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is malformed
    Client,
    /// The operation would break a once-only or uniqueness rule
    Invariant,
    /// The registry configuration is unusable
    Configuration,
    /// A back-end could not be reached or failed mid-operation
    Infrastructure,
}

/// Document store errors
#[derive(Debug, Clone, Error)]
pub enum DocStoreError {
    // Client errors
    #[error("Invalid document UID: {0:?}")]
    InvalidUid(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unusable content for document {uid}: {reason}")]
    UnusableContent { uid: String, reason: String },

    // Invariant violations
    #[error("Document already exists: {uid} ({mime})")]
    DuplicateDocument { uid: String, mime: String },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document content already written: {0}")]
    ContentAlreadyWritten(String),

    #[error("Document sink already closed: {0}")]
    SinkClosed(String),

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown storage provider type: {0}")]
    UnknownProvider(String),

    #[error("No storage configured for domain: {0}")]
    NoStorage(String),

    // Infrastructure
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocStoreError {
    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            DocStoreError::InvalidUid(_)
            | DocStoreError::InvalidArgument(_)
            | DocStoreError::UnusableContent { .. } => ErrorCategory::Client,
            DocStoreError::DuplicateDocument { .. }
            | DocStoreError::DocumentNotFound(_)
            | DocStoreError::ContentAlreadyWritten(_)
            | DocStoreError::SinkClosed(_) => ErrorCategory::Invariant,
            DocStoreError::Config(_)
            | DocStoreError::UnknownProvider(_)
            | DocStoreError::NoStorage(_) => ErrorCategory::Configuration,
            DocStoreError::Io(_) | DocStoreError::Internal(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            DocStoreError::InvalidUid(_) => 400,
            DocStoreError::InvalidArgument(_) => 400,
            DocStoreError::UnusableContent { .. } => 422,
            DocStoreError::DuplicateDocument { .. } => 409,
            DocStoreError::DocumentNotFound(_) => 404,
            DocStoreError::ContentAlreadyWritten(_) => 409,
            DocStoreError::SinkClosed(_) => 409,
            DocStoreError::Config(_) => 500,
            DocStoreError::UnknownProvider(_) => 500,
            DocStoreError::NoStorage(_) => 503,
            DocStoreError::Io(_) => 503,
            DocStoreError::Internal(_) => 500,
        }
    }

    /// Infrastructure faults may succeed on a later call, after the next
    /// selection has re-probed availability.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Infrastructure
    }
}
