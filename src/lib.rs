//! docstore - availability-aware document storage
//!
//! Domains group named stores; pools group interchangeable stores across
//! domains. A `DocumentStore` session places writes on the best available
//! store and searches the feature-qualified stores of its domain on reads.

pub mod availability;
pub mod backend;
pub mod cli;
pub mod document;
pub mod errors;
pub mod feature;
pub mod observability;
pub mod registry;
pub mod store;

pub use availability::Availability;
pub use backend::{DocumentContent, DocumentKey, DocumentStorage, DEFAULT_MIME_TYPE};
pub use document::{BaseDocument, ContentState, DocumentSink};
pub use errors::{DocStoreError, DocStoreResult, ErrorCategory};
pub use feature::Feature;
pub use registry::{DocumentStorageRegistry, RegistryConfig};
pub use store::DocumentStore;
