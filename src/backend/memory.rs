//! # In-Memory Backend

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{
    order_variants, resolve_mime, validate_uid, DocumentKey, DocumentStorage, DocumentWriter,
    VariantInfo,
};
use crate::availability::Availability;
use crate::document::BaseDocument;
use crate::errors::{DocStoreError, DocStoreResult};
use crate::feature::Feature;

/// Provider type name
pub const TYPE_NAME: &str = "memory";

#[derive(Debug, Clone)]
struct MemVariant {
    data: Option<Arc<[u8]>>,
    hash: Option<String>,
    created_at: DateTime<Utc>,
}

/// uid -> mime -> variant
type VariantTable = HashMap<String, BTreeMap<String, MemVariant>>;

/// Process-memory document storage
///
/// Reports `INMEMORY` until the optional byte budget is exhausted.
#[derive(Debug)]
pub struct InMemoryStorage {
    name: String,
    pool: Option<String>,
    features: Vec<Feature>,
    max_size: Option<u64>,
    documents: Arc<RwLock<VariantTable>>,
}

impl InMemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool: None,
            features: Vec::new(),
            max_size: None,
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    /// Byte budget after which the storage reports `UNAVAILABLE`
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Bytes currently held
    pub fn used_bytes(&self) -> u64 {
        self.documents
            .read()
            .map(|docs| {
                docs.values()
                    .flat_map(|variants| variants.values())
                    .filter_map(|v| v.data.as_ref())
                    .map(|d| d.len() as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn read_table(&self) -> DocStoreResult<RwLockReadGuard<'_, VariantTable>> {
        self.documents
            .read()
            .map_err(|_| DocStoreError::Internal("Lock poisoned".into()))
    }

    fn write_table(&self) -> DocStoreResult<RwLockWriteGuard<'_, VariantTable>> {
        write_table(&self.documents)
    }
}

fn write_table(table: &RwLock<VariantTable>) -> DocStoreResult<RwLockWriteGuard<'_, VariantTable>> {
    table
        .write()
        .map_err(|_| DocStoreError::Internal("Lock poisoned".into()))
}

fn variant_info(key: DocumentKey, variant: &MemVariant) -> VariantInfo {
    match &variant.data {
        Some(data) => VariantInfo {
            key,
            size: data.len() as i64,
            availability: Availability::InMemory,
            hash: variant.hash.clone(),
            created_at: Some(variant.created_at),
        },
        None => VariantInfo {
            key,
            size: -1,
            availability: Availability::Unavailable,
            hash: None,
            created_at: Some(variant.created_at),
        },
    }
}

impl DocumentStorage for InMemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage_type(&self) -> &str {
        TYPE_NAME
    }

    fn pool(&self) -> Option<&str> {
        self.pool.as_deref()
    }

    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn storage_availability(&self) -> Availability {
        match self.max_size {
            Some(max) if self.used_bytes() >= max => Availability::Unavailable,
            _ => Availability::InMemory,
        }
    }

    fn availability(&self, uid: &str) -> DocStoreResult<Availability> {
        let docs = self.read_table()?;
        let best = docs
            .get(uid)
            .into_iter()
            .flat_map(|variants| variants.values())
            .map(|v| {
                if v.data.is_some() {
                    Availability::InMemory
                } else {
                    Availability::Unavailable
                }
            })
            .min();
        Ok(best.unwrap_or(Availability::NoneExistent))
    }

    fn create_document(&self, key: &DocumentKey) -> DocStoreResult<VariantInfo> {
        let mut docs = self.write_table()?;
        let variants = docs.entry(key.uid.clone()).or_default();
        if variants.contains_key(&key.mime) {
            return Err(DocStoreError::DuplicateDocument {
                uid: key.uid.clone(),
                mime: key.mime.clone(),
            });
        }
        let variant = MemVariant {
            data: None,
            hash: None,
            created_at: Utc::now(),
        };
        let info = variant_info(key.clone(), &variant);
        variants.insert(key.mime.clone(), variant);
        Ok(info)
    }

    fn store_document(
        &self,
        key: &DocumentKey,
        content: &mut dyn Read,
    ) -> DocStoreResult<Option<VariantInfo>> {
        let exists = |docs: &VariantTable| {
            docs.get(&key.uid)
                .map(|variants| variants.contains_key(&key.mime))
                .unwrap_or(false)
        };

        if exists(&*self.read_table()?) {
            return Ok(None);
        }

        let mut buffer = Vec::new();
        content
            .read_to_end(&mut buffer)
            .map_err(|e| DocStoreError::Io(e.to_string()))?;

        let mut docs = self.write_table()?;
        if exists(&*docs) {
            return Ok(None);
        }
        let variant = MemVariant {
            data: Some(Arc::from(buffer)),
            hash: None,
            created_at: Utc::now(),
        };
        let info = variant_info(key.clone(), &variant);
        docs.entry(key.uid.clone())
            .or_default()
            .insert(key.mime.clone(), variant);
        Ok(Some(info))
    }

    fn retrieve_document(
        &self,
        uid: &str,
        mime: Option<&str>,
    ) -> DocStoreResult<Option<VariantInfo>> {
        let docs = self.read_table()?;
        let variants = match docs.get(uid) {
            Some(v) => v,
            None => return Ok(None),
        };

        let chosen = match mime {
            Some(m) => {
                let mime = resolve_mime(Some(m));
                variants.contains_key(&mime).then_some(mime)
            }
            None => {
                let mut mimes: Vec<String> = variants.keys().cloned().collect();
                order_variants(&mut mimes);
                mimes.into_iter().next()
            }
        };

        Ok(chosen.and_then(|mime| {
            let variant = variants.get(&mime)?;
            Some(variant_info(
                DocumentKey {
                    uid: uid.to_string(),
                    mime,
                },
                variant,
            ))
        }))
    }

    fn open_reader(&self, key: &DocumentKey) -> DocStoreResult<Box<dyn Read + Send>> {
        let docs = self.read_table()?;
        let data = docs
            .get(&key.uid)
            .and_then(|variants| variants.get(&key.mime))
            .and_then(|v| v.data.clone())
            .ok_or_else(|| DocStoreError::DocumentNotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_writer(&self, key: &DocumentKey) -> DocStoreResult<Box<dyn DocumentWriter>> {
        let docs = self.read_table()?;
        let variant = docs
            .get(&key.uid)
            .and_then(|variants| variants.get(&key.mime))
            .ok_or_else(|| DocStoreError::DocumentNotFound(key.to_string()))?;
        if variant.data.is_some() {
            return Err(DocStoreError::ContentAlreadyWritten(key.to_string()));
        }
        Ok(Box::new(MemWriter {
            key: key.clone(),
            buffer: Vec::new(),
            documents: Arc::clone(&self.documents),
        }))
    }

    fn delete_document(&self, uid: &str) -> DocStoreResult<bool> {
        let mut docs = self.write_table()?;
        Ok(docs.remove(uid).map(|v| !v.is_empty()).unwrap_or(false))
    }

    fn delete_variant(&self, key: &DocumentKey) -> DocStoreResult<bool> {
        let mut docs = self.write_table()?;
        let Some(variants) = docs.get_mut(&key.uid) else {
            return Ok(false);
        };
        let removed = variants.remove(&key.mime).is_some();
        if variants.is_empty() {
            docs.remove(&key.uid);
        }
        Ok(removed)
    }

    fn set_hash(&self, document: &BaseDocument, hash: &str) -> DocStoreResult<bool> {
        let Some(key) = document.key() else {
            return Ok(false);
        };
        if validate_uid(&key.uid).is_err() {
            return Ok(false);
        }

        let mut docs = self.write_table()?;
        let Some(variant) = docs.get_mut(&key.uid).and_then(|v| v.get_mut(&key.mime)) else {
            return Ok(false);
        };
        if variant.data.is_none() || variant.hash.is_some() {
            return Ok(false);
        }
        variant.hash = Some(hash.to_string());
        drop(docs);

        document.record_hash(hash);
        Ok(true)
    }
}

/// Buffers writes and publishes them into the table on commit
struct MemWriter {
    key: DocumentKey,
    buffer: Vec<u8>,
    documents: Arc<RwLock<VariantTable>>,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DocumentWriter for MemWriter {
    fn commit(self: Box<Self>) -> DocStoreResult<VariantInfo> {
        let MemWriter {
            key,
            buffer,
            documents,
        } = *self;

        let mut docs = write_table(&documents)?;
        let variant = docs
            .get_mut(&key.uid)
            .and_then(|variants| variants.get_mut(&key.mime))
            .ok_or_else(|| DocStoreError::DocumentNotFound(key.to_string()))?;
        if variant.data.is_some() {
            return Err(DocStoreError::ContentAlreadyWritten(key.to_string()));
        }
        variant.data = Some(Arc::from(buffer));
        Ok(variant_info(key, variant))
    }
}
