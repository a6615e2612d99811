//! # Document Storage Back-ends
//!
//! The capability contract every physical store implements, the shared value
//! types that cross it, and the bundled `filesystem` and `memory` providers.

pub mod filesystem;
pub mod memory;
pub mod probe;

use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::availability::Availability;
use crate::document::BaseDocument;
use crate::errors::{DocStoreError, DocStoreResult};
use crate::feature::Feature;

pub use filesystem::FileSystemStorage;
pub use memory::InMemoryStorage;
pub use probe::{FixedFreeSpace, FreeSpaceProbe, UnmonitoredFreeSpace};

/// Canonical MIME marker for content of unspecified type
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Normalize an optional MIME type; missing or empty means generic binary.
pub fn resolve_mime(mime: Option<&str>) -> String {
    match mime {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => DEFAULT_MIME_TYPE.to_string(),
    }
}

/// Reject UIDs that could escape a storage namespace.
pub fn validate_uid(uid: &str) -> DocStoreResult<()> {
    if uid.is_empty() || uid == "." || uid == ".." {
        return Err(DocStoreError::InvalidUid(uid.to_string()));
    }
    if uid.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(DocStoreError::InvalidUid(uid.to_string()));
    }
    Ok(())
}

/// Order MIME variants for an unqualified lookup: the default variant first,
/// the rest lexically.
pub fn order_variants(mimes: &mut [String]) {
    mimes.sort_by(|a, b| {
        (a.as_str() != DEFAULT_MIME_TYPE)
            .cmp(&(b.as_str() != DEFAULT_MIME_TYPE))
            .then_with(|| a.cmp(b))
    });
}

/// A document variant: a uid plus its resolved MIME type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub uid: String,
    pub mime: String,
}

impl DocumentKey {
    /// Validate the uid and resolve the MIME type
    pub fn new(uid: &str, mime: Option<&str>) -> DocStoreResult<Self> {
        validate_uid(uid)?;
        Ok(Self {
            uid: uid.to_string(),
            mime: resolve_mime(mime),
        })
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uid, self.mime)
    }
}

/// What a back-end knows about one stored variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInfo {
    pub key: DocumentKey,
    /// Content length, -1 while no content has been committed
    pub size: i64,
    pub availability: Availability,
    pub hash: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl VariantInfo {
    pub fn is_materialized(&self) -> bool {
        self.size >= 0
    }
}

/// Content handed to a store call
#[derive(Debug, Clone)]
enum ContentSource {
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

/// Content accessor for `store_document`: the bytes plus their MIME type
#[derive(Debug, Clone)]
pub struct DocumentContent {
    source: ContentSource,
    mime_type: String,
}

impl DocumentContent {
    pub fn from_bytes(data: impl Into<Vec<u8>>, mime: Option<&str>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            source: ContentSource::Bytes(Arc::from(data)),
            mime_type: resolve_mime(mime),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, mime: Option<&str>) -> Self {
        Self {
            source: ContentSource::File(path.into()),
            mime_type: resolve_mime(mime),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Open a fresh reader over the content
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match &self.source {
            ContentSource::Bytes(data) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            ContentSource::File(path) => Ok(Box::new(io::BufReader::new(std::fs::File::open(
                path,
            )?))),
        }
    }
}

/// A pending write into a back-end. Nothing becomes visible until `commit`;
/// dropping the writer discards the bytes.
pub trait DocumentWriter: Write + Send {
    /// Publish the written bytes as the variant's content
    fn commit(self: Box<Self>) -> DocStoreResult<VariantInfo>;
}

/// Capability contract of a physical document store
pub trait DocumentStorage: Send + Sync + fmt::Debug {
    /// Name, unique within its domain
    fn name(&self) -> &str;

    /// Provider family, e.g. `filesystem`
    fn storage_type(&self) -> &str;

    fn pool(&self) -> Option<&str>;

    fn features(&self) -> &[Feature];

    fn has_feature(&self, requested: &Feature) -> bool {
        self.features().iter().any(|granted| requested.matches(granted))
    }

    /// Live health of the store itself
    fn storage_availability(&self) -> Availability;

    /// Reachability of `uid` (best of its variants) through this store
    fn availability(&self, uid: &str) -> DocStoreResult<Availability>;

    /// Reserve a new, empty variant. Fails with `DuplicateDocument` if the
    /// variant already exists.
    fn create_document(&self, key: &DocumentKey) -> DocStoreResult<VariantInfo>;

    /// Create a variant and fill it from `content`. Returns `None` without
    /// touching anything if the variant already exists.
    fn store_document(
        &self,
        key: &DocumentKey,
        content: &mut dyn Read,
    ) -> DocStoreResult<Option<VariantInfo>>;

    /// Look up a variant; `mime == None` picks the default variant first.
    fn retrieve_document(&self, uid: &str, mime: Option<&str>)
        -> DocStoreResult<Option<VariantInfo>>;

    /// Independent reader positioned at the start of the content
    fn open_reader(&self, key: &DocumentKey) -> DocStoreResult<Box<dyn Read + Send>>;

    /// Writer for a reserved variant that has no content yet
    fn open_writer(&self, key: &DocumentKey) -> DocStoreResult<Box<dyn DocumentWriter>>;

    /// Remove every variant of `uid`; `true` if anything was removed
    fn delete_document(&self, uid: &str) -> DocStoreResult<bool>;

    /// Remove one variant; `true` if it existed
    fn delete_variant(&self, key: &DocumentKey) -> DocStoreResult<bool>;

    /// Assign the write-once integrity hash. Returns `false` when the
    /// document is not in this store, has no content yet, or already has a
    /// hash.
    fn set_hash(&self, document: &BaseDocument, hash: &str) -> DocStoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_uid() {
        assert!(validate_uid("1.2.840.10008.1").is_ok());
        assert!(validate_uid("report-2024_a").is_ok());
        assert!(validate_uid("").is_err());
        assert!(validate_uid("a/b").is_err());
        assert!(validate_uid("a\\b").is_err());
        assert!(validate_uid("a\0b").is_err());
        assert!(validate_uid("a\nb").is_err());
        assert!(validate_uid("..").is_err());
    }

    #[test]
    fn test_resolve_mime() {
        assert_eq!(resolve_mime(None), DEFAULT_MIME_TYPE);
        assert_eq!(resolve_mime(Some("")), DEFAULT_MIME_TYPE);
        assert_eq!(resolve_mime(Some("application/dicom")), "application/dicom");
    }

    #[test]
    fn test_order_variants_default_first() {
        let mut mimes = vec![
            "text/xml".to_string(),
            DEFAULT_MIME_TYPE.to_string(),
            "application/dicom".to_string(),
        ];
        order_variants(&mut mimes);
        assert_eq!(mimes, vec![DEFAULT_MIME_TYPE, "application/dicom", "text/xml"]);
    }

    #[test]
    fn test_content_reader_is_fresh() {
        let content = DocumentContent::from_bytes(b"abc".to_vec(), None);
        let mut first = String::new();
        content.open().unwrap().read_to_string(&mut first).unwrap();
        let mut second = String::new();
        content.open().unwrap().read_to_string(&mut second).unwrap();
        assert_eq!(first, "abc");
        assert_eq!(second, "abc");
        assert_eq!(content.mime_type(), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_missing_file_content_is_unusable() {
        let content = DocumentContent::from_file("/nonexistent/docstore/content", Some("text/plain"));
        assert!(content.open().is_err());
    }
}
