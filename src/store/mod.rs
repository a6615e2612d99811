//! # Document Store
//!
//! Session façade bound to one domain. Writes go to the store chosen by
//! availability among a pool's members, or to the domain default. Reads,
//! deletes and availability queries search the domain's stores that carry
//! every configured retrieve feature, in configuration order.

pub mod hashing;
pub mod selection;

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::{Arc, RwLock};

use crate::availability::Availability;
use crate::backend::{
    validate_uid, DocumentContent, DocumentKey, DocumentStorage, DEFAULT_MIME_TYPE,
};
use crate::document::BaseDocument;
use crate::errors::{DocStoreError, DocStoreResult};
use crate::feature::Feature;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::registry::DocumentStorageRegistry;

pub use hashing::{sha256_hex, to_hex_string, HashingReader};
pub use selection::select_storage_by_availability;

/// Per-domain document session, shared by concurrent callers
#[derive(Debug)]
pub struct DocumentStore {
    registry: Arc<DocumentStorageRegistry>,
    domain: String,
    retrieve_features: RwLock<BTreeSet<Feature>>,
    metrics: Arc<MetricsRegistry>,
}

impl DocumentStore {
    pub fn new(registry: Arc<DocumentStorageRegistry>, domain: impl Into<String>) -> Self {
        Self {
            registry,
            domain: domain.into(),
            retrieve_features: RwLock::new(BTreeSet::new()),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Share counters with other sessions
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn registry(&self) -> &Arc<DocumentStorageRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    // ---- Pool / domain resolution ----

    /// Best member of `pool`; `None` for no pool or an unknown pool
    pub fn storage_from_pool(&self, pool: Option<&str>) -> Option<Arc<dyn DocumentStorage>> {
        let pool = pool?;
        let members = self.registry.storages_of_pool(pool);
        let (storage, availability) = select_storage_by_availability(&members)?;
        self.record_selection(&storage, availability, Some(pool));
        Some(storage)
    }

    /// Best member of `pool`, falling back to the domain default
    pub fn select_from_pool_or_domain(&self, pool: Option<&str>) -> Option<Arc<dyn DocumentStorage>> {
        self.storage_from_pool(pool).or_else(|| {
            let storage = self.registry.storage(Some(&self.domain), None)?;
            let availability = storage.storage_availability();
            self.record_selection(&storage, availability, None);
            Some(storage)
        })
    }

    fn record_selection(
        &self,
        storage: &Arc<dyn DocumentStorage>,
        availability: Availability,
        pool: Option<&str>,
    ) {
        let degraded = !availability.is_reachable();
        self.metrics.record_selection(degraded);
        let event = if degraded {
            Event::StorageDegraded
        } else {
            Event::StorageSelected
        };
        log_event_with_fields(
            event,
            &[
                ("domain", self.domain.as_str()),
                ("pool", pool.unwrap_or("")),
                ("storage", storage.name()),
                ("availability", availability.as_str()),
            ],
        );
    }

    fn write_target(&self, pool: Option<&str>) -> DocStoreResult<Arc<dyn DocumentStorage>> {
        self.select_from_pool_or_domain(pool)
            .ok_or_else(|| DocStoreError::NoStorage(format!("domain '{}'", self.domain)))
    }

    // ---- Retrieve features ----

    /// Replace the retrieve feature set
    pub fn set_retrieve_features<I>(&self, features: I)
    where
        I: IntoIterator<Item = Feature>,
    {
        let features: BTreeSet<Feature> = features.into_iter().collect();
        let mut current = self
            .retrieve_features
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = features;
    }

    pub fn retrieve_features(&self) -> Vec<Feature> {
        self.retrieve_features
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Stores of the bound domain granted every retrieve feature
    pub fn retrieve_doc_storages(&self) -> Vec<Arc<dyn DocumentStorage>> {
        let features = self.retrieve_features();
        self.registry
            .storages_of_domain(&self.domain)
            .into_iter()
            .filter(|storage| features.iter().all(|f| storage.has_feature(f)))
            .collect()
    }

    // ---- Create / store ----

    /// Reserve an empty variant in the domain default store
    pub fn create_document(&self, uid: &str, mime: Option<&str>) -> DocStoreResult<BaseDocument> {
        self.create_document_in_pool(None, uid, mime)
    }

    /// Reserve an empty variant in the best store of `pool`
    pub fn create_document_in_pool(
        &self,
        pool: Option<&str>,
        uid: &str,
        mime: Option<&str>,
    ) -> DocStoreResult<BaseDocument> {
        let key = DocumentKey::new(uid, mime)?;
        let storage = self.write_target(pool)?;

        match storage.create_document(&key) {
            Ok(info) => {
                self.metrics.increment_documents_created();
                log_event_with_fields(Event::DocumentCreated, &self.key_fields(&key, &storage));
                Ok(BaseDocument::from_variant(info, storage))
            }
            Err(e @ DocStoreError::DuplicateDocument { .. }) => {
                self.metrics.increment_duplicates_rejected();
                log_event_with_fields(Event::DuplicateRejected, &self.key_fields(&key, &storage));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Store content under `uid`. `None` if that exact variant exists.
    pub fn store_document(
        &self,
        uid: &str,
        content: &DocumentContent,
    ) -> DocStoreResult<Option<BaseDocument>> {
        self.store_document_in_pool(None, uid, content)
    }

    pub fn store_document_in_pool(
        &self,
        pool: Option<&str>,
        uid: &str,
        content: &DocumentContent,
    ) -> DocStoreResult<Option<BaseDocument>> {
        let key = DocumentKey::new(uid, Some(content.mime_type()))?;
        let storage = self.write_target(pool)?;
        let reader = open_content(uid, content)?;
        self.store_into(&storage, &key, reader)
    }

    /// Store a batch into one store. Either every new variant is created or
    /// none is left behind. Already existing variants map to `None`.
    pub fn store_documents(
        &self,
        pool: Option<&str>,
        items: &BTreeMap<String, DocumentContent>,
    ) -> DocStoreResult<BTreeMap<String, Option<BaseDocument>>> {
        let mut prepared = Vec::with_capacity(items.len());
        for (uid, content) in items {
            let key = DocumentKey::new(uid, Some(content.mime_type()))?;
            prepared.push((key, open_content(uid, content)?));
        }

        let storage = self.write_target(pool)?;
        let mut created: Vec<DocumentKey> = Vec::new();
        let mut results = BTreeMap::new();

        for (key, reader) in prepared {
            match self.store_into(&storage, &key, reader) {
                Ok(Some(document)) => {
                    created.push(key.clone());
                    results.insert(key.uid, Some(document));
                }
                Ok(None) => {
                    results.insert(key.uid, None);
                }
                Err(e) => {
                    self.roll_back(&storage, &created, &key, &e);
                    return Err(e);
                }
            }
        }
        Ok(results)
    }

    fn store_into(
        &self,
        storage: &Arc<dyn DocumentStorage>,
        key: &DocumentKey,
        reader: Box<dyn Read + Send>,
    ) -> DocStoreResult<Option<BaseDocument>> {
        let mut hashing = HashingReader::new(reader);
        let Some(info) = storage.store_document(key, &mut hashing)? else {
            self.metrics.increment_stores_skipped();
            log_event_with_fields(Event::StoreSkipped, &self.key_fields(key, storage));
            return Ok(None);
        };

        let document = BaseDocument::from_variant(info, Arc::clone(storage));
        let hash = hashing.finalize_hex();
        match storage.set_hash(&document, &hash) {
            Ok(true) => {
                self.metrics.increment_hashes_assigned();
                log_event_with_fields(Event::HashAssigned, &self.key_fields(key, storage));
            }
            Ok(false) => {}
            Err(e) => {
                self.discard_variant(storage, key);
                return Err(e);
            }
        }

        self.metrics.increment_documents_stored();
        let size = document.size().to_string();
        let mut fields = self.key_fields(key, storage).to_vec();
        fields.push(("size", size.as_str()));
        log_event_with_fields(Event::DocumentStored, &fields);
        Ok(Some(document))
    }

    /// Remove a variant this session created. A failed removal is logged.
    fn discard_variant(&self, storage: &Arc<dyn DocumentStorage>, key: &DocumentKey) {
        if let Err(e) = storage.delete_variant(key) {
            let message = e.to_string();
            let mut fields = self.key_fields(key, storage).to_vec();
            fields.push(("error", message.as_str()));
            log_event_with_fields(Event::RollbackFailed, &fields);
        }
    }

    fn roll_back(
        &self,
        storage: &Arc<dyn DocumentStorage>,
        created: &[DocumentKey],
        failed: &DocumentKey,
        cause: &DocStoreError,
    ) {
        for key in created {
            self.discard_variant(storage, key);
        }
        self.metrics.increment_batches_rolled_back();
        let removed = created.len().to_string();
        let cause = cause.to_string();
        log_event_with_fields(
            Event::BatchRolledBack,
            &[
                ("domain", self.domain.as_str()),
                ("storage", storage.name()),
                ("failed_uid", failed.uid.as_str()),
                ("removed", removed.as_str()),
                ("error", cause.as_str()),
            ],
        );
    }

    // ---- Retrieve / delete ----

    /// Find a variant among the retrieve stores. `mime == None` prefers the
    /// default variant in any store over other variants.
    pub fn get_document(&self, uid: &str, mime: Option<&str>) -> DocStoreResult<Option<BaseDocument>> {
        validate_uid(uid)?;
        find_document(&self.retrieve_doc_storages(), uid, mime)
    }

    /// Find a variant among the members of `pool`
    pub fn get_document_in_pool(
        &self,
        pool: &str,
        uid: &str,
        mime: Option<&str>,
    ) -> DocStoreResult<Option<BaseDocument>> {
        validate_uid(uid)?;
        find_document(&self.registry.storages_of_pool(pool), uid, mime)
    }

    /// Remove every variant of `uid` from the retrieve stores
    pub fn delete_document(&self, uid: &str) -> DocStoreResult<bool> {
        validate_uid(uid)?;
        self.delete_from(&self.retrieve_doc_storages(), uid, None)
    }

    /// Remove every variant of `uid` from the members of `pool`
    pub fn delete_document_in_pool(&self, uid: &str, pool: &str) -> DocStoreResult<bool> {
        validate_uid(uid)?;
        self.delete_from(&self.registry.storages_of_pool(pool), uid, Some(pool))
    }

    fn delete_from(
        &self,
        storages: &[Arc<dyn DocumentStorage>],
        uid: &str,
        pool: Option<&str>,
    ) -> DocStoreResult<bool> {
        let mut removed = false;
        for storage in storages {
            if storage.delete_document(uid)? {
                removed = true;
                self.metrics.increment_documents_deleted();
                log_event_with_fields(
                    Event::DocumentDeleted,
                    &[
                        ("domain", self.domain.as_str()),
                        ("pool", pool.unwrap_or("")),
                        ("storage", storage.name()),
                        ("uid", uid),
                    ],
                );
            }
        }
        Ok(removed)
    }

    /// Best availability of `uid` over the retrieve stores
    pub fn get_availability(&self, uid: &str) -> DocStoreResult<Availability> {
        if validate_uid(uid).is_err() {
            return Ok(Availability::NoneExistent);
        }
        let mut best = Availability::NoneExistent;
        for storage in self.retrieve_doc_storages() {
            best = best.min(storage.availability(uid)?);
        }
        Ok(best)
    }

    // ---- Commit extension points ----

    /// Reserved; always succeeds
    pub fn commit_document(&self, _document: &BaseDocument) -> DocStoreResult<bool> {
        Ok(true)
    }

    /// Reserved; always succeeds
    pub fn commit_document_from_storages(
        &self,
        _document: &BaseDocument,
        _storages: &[Arc<dyn DocumentStorage>],
    ) -> DocStoreResult<bool> {
        Ok(true)
    }

    // ---- Hashing ----

    /// Hash the committed content of `document` and assign it. `None` when
    /// the storage refuses: no content yet, gone, or already hashed.
    pub fn hash_document(&self, document: &BaseDocument) -> DocStoreResult<Option<String>> {
        let (Some(storage), Some(key)) = (document.storage(), document.key()) else {
            return Ok(None);
        };
        match storage.retrieve_document(&key.uid, Some(&key.mime))? {
            Some(info) if info.is_materialized() => {}
            _ => return Ok(None),
        }
        let mut hashing = HashingReader::new(document.open_reader()?);
        std::io::copy(&mut hashing, &mut std::io::sink())
            .map_err(|e| DocStoreError::Io(e.to_string()))?;
        let hash = hashing.finalize_hex();

        if !storage.set_hash(document, &hash)? {
            return Ok(None);
        }
        self.metrics.increment_hashes_assigned();
        log_event_with_fields(Event::HashAssigned, &self.key_fields(key, storage));
        Ok(Some(hash))
    }

    fn key_fields<'a>(
        &'a self,
        key: &'a DocumentKey,
        storage: &'a Arc<dyn DocumentStorage>,
    ) -> [(&'static str, &'a str); 4] {
        [
            ("domain", self.domain.as_str()),
            ("storage", storage.name()),
            ("uid", key.uid.as_str()),
            ("mime", key.mime.as_str()),
        ]
    }
}

fn open_content(uid: &str, content: &DocumentContent) -> DocStoreResult<Box<dyn Read + Send>> {
    content.open().map_err(|e| DocStoreError::UnusableContent {
        uid: uid.to_string(),
        reason: e.to_string(),
    })
}

fn find_document(
    storages: &[Arc<dyn DocumentStorage>],
    uid: &str,
    mime: Option<&str>,
) -> DocStoreResult<Option<BaseDocument>> {
    let passes = match mime {
        Some(_) => vec![mime],
        None => vec![Some(DEFAULT_MIME_TYPE), None],
    };
    for pass in passes {
        for storage in storages {
            if let Some(info) = storage.retrieve_document(uid, pass)? {
                return Ok(Some(BaseDocument::from_variant(info, Arc::clone(storage))));
            }
        }
    }
    Ok(None)
}
