//! # Filesystem Backend
//!
//! Layout under `base_dir`, one directory per uid:
//!
//! ```text
//! <uid>/<mime>.meta      variant marker (JSON), created exactly once
//! <uid>/<mime>.dat       committed content
//! <uid>/<mime>.sha256    write-once integrity hash
//! <uid>/<mime>.part-*    in-flight writer output
//! ```
//!
//! Create-if-absent steps publish a fully written temp file with a hard link,
//! which fails if the target exists. Two racing creators therefore see
//! exactly one success.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::probe::FreeSpaceProbe;
use super::{
    order_variants, resolve_mime, validate_uid, DocumentKey, DocumentStorage, DocumentWriter,
    VariantInfo,
};
use crate::availability::Availability;
use crate::document::BaseDocument;
use crate::errors::{DocStoreError, DocStoreResult};
use crate::feature::Feature;
use crate::observability::{log_event_with_fields, Event};

/// Provider type name
pub const TYPE_NAME: &str = "filesystem";

/// Free space below which the storage reports `UNAVAILABLE` (1 MiB)
pub const DEFAULT_MIN_FREE_SPACE: u64 = 1024 * 1024;

const META_EXT: &str = "meta";
const DATA_EXT: &str = "dat";
const HASH_EXT: &str = "sha256";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VariantMeta {
    uid: String,
    mime: String,
    created_at: DateTime<Utc>,
}

/// Filesystem-backed document storage
#[derive(Debug)]
pub struct FileSystemStorage {
    name: String,
    pool: Option<String>,
    features: Vec<Feature>,
    base_dir: PathBuf,
    min_free_space: u64,
    probe: Arc<dyn FreeSpaceProbe>,
}

impl FileSystemStorage {
    pub fn new(
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        probe: Arc<dyn FreeSpaceProbe>,
    ) -> Self {
        Self {
            name: name.into(),
            pool: None,
            features: Vec::new(),
            base_dir: base_dir.into(),
            min_free_space: DEFAULT_MIN_FREE_SPACE,
            probe,
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

    pub fn with_min_free_space(mut self, bytes: u64) -> Self {
        self.min_free_space = bytes;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn document_dir(&self, uid: &str) -> PathBuf {
        self.base_dir.join(uid)
    }

    fn variant_path(&self, key: &DocumentKey, ext: &str) -> PathBuf {
        self.document_dir(&key.uid)
            .join(format!("{}.{}", encode_mime(&key.mime), ext))
    }

    fn read_meta(&self, path: &Path) -> DocStoreResult<Option<VariantMeta>> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| DocStoreError::Io(format!("corrupt marker {}: {}", path.display(), e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    /// Every variant marker of `uid`
    fn list_variants(&self, uid: &str) -> DocStoreResult<Vec<VariantMeta>> {
        let entries = match fs::read_dir(self.document_dir(uid)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut metas = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            if let Some(meta) = self.read_meta(&path)? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }

    fn variant_info(&self, key: &DocumentKey, meta: &VariantMeta) -> DocStoreResult<VariantInfo> {
        let size = match fs::metadata(self.variant_path(key, DATA_EXT)) {
            Ok(m) => m.len() as i64,
            Err(e) if e.kind() == io::ErrorKind::NotFound => -1,
            Err(e) => return Err(io_err(e)),
        };
        let hash = match fs::read_to_string(self.variant_path(key, HASH_EXT)) {
            Ok(h) => Some(h),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_err(e)),
        };
        Ok(VariantInfo {
            key: key.clone(),
            size,
            availability: if size >= 0 {
                Availability::Online
            } else {
                Availability::Unavailable
            },
            hash,
            created_at: Some(meta.created_at),
        })
    }

    fn fill_variant(&self, key: &DocumentKey, content: &mut dyn Read) -> DocStoreResult<VariantInfo> {
        let mut writer = self.open_writer(key)?;
        io::copy(content, &mut writer).map_err(io_err)?;
        writer.commit()
    }
}

fn io_err(e: io::Error) -> DocStoreError {
    DocStoreError::Io(e.to_string())
}

/// File-name-safe MIME encoding. Dots are escaped so the extension split is
/// unambiguous.
fn encode_mime(mime: &str) -> String {
    let mut out = String::with_capacity(mime.len());
    for b in mime.bytes() {
        if b.is_ascii_alphanumeric() || b"-+_=".contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Atomically create `target` holding `bytes`. `Ok(false)` if it exists.
fn publish_new(target: &Path, bytes: &[u8]) -> io::Result<bool> {
    let tmp = target.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    let result = write_file(&tmp, bytes).and_then(|()| match fs::hard_link(&tmp, target) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    });
    let _ = fs::remove_file(&tmp);
    result
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn remove_if_present(path: &Path) -> DocStoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(e)),
    }
}

impl DocumentStorage for FileSystemStorage {
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
        match self.probe.free_space(&self.base_dir) {
            Some(free) if free >= 0 && (free as u64) < self.min_free_space => {
                Availability::Unavailable
            }
            _ => Availability::Online,
        }
    }

    fn availability(&self, uid: &str) -> DocStoreResult<Availability> {
        if validate_uid(uid).is_err() {
            return Ok(Availability::NoneExistent);
        }
        let metas = self.list_variants(uid)?;
        if metas.is_empty() {
            return Ok(Availability::NoneExistent);
        }
        for meta in &metas {
            let key = DocumentKey {
                uid: meta.uid.clone(),
                mime: meta.mime.clone(),
            };
            if self.variant_path(&key, DATA_EXT).exists() {
                return Ok(Availability::Online);
            }
        }
        Ok(Availability::Unavailable)
    }

    fn create_document(&self, key: &DocumentKey) -> DocStoreResult<VariantInfo> {
        validate_uid(&key.uid)?;
        fs::create_dir_all(self.document_dir(&key.uid)).map_err(io_err)?;

        let meta = VariantMeta {
            uid: key.uid.clone(),
            mime: key.mime.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&meta).map_err(|e| DocStoreError::Internal(e.to_string()))?;

        if !publish_new(&self.variant_path(key, META_EXT), &json).map_err(io_err)? {
            return Err(DocStoreError::DuplicateDocument {
                uid: key.uid.clone(),
                mime: key.mime.clone(),
            });
        }

        Ok(VariantInfo {
            key: key.clone(),
            size: -1,
            availability: Availability::Unavailable,
            hash: None,
            created_at: Some(meta.created_at),
        })
    }

    fn store_document(
        &self,
        key: &DocumentKey,
        content: &mut dyn Read,
    ) -> DocStoreResult<Option<VariantInfo>> {
        let created = match self.create_document(key) {
            Ok(info) => info,
            Err(DocStoreError::DuplicateDocument { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        match self.fill_variant(key, content) {
            Ok(info) => Ok(Some(VariantInfo {
                created_at: created.created_at,
                ..info
            })),
            Err(e) => {
                if let Err(cleanup) = self.delete_variant(key) {
                    let message = cleanup.to_string();
                    log_event_with_fields(
                        Event::CleanupFailed,
                        &[
                            ("storage", self.name.as_str()),
                            ("uid", key.uid.as_str()),
                            ("mime", key.mime.as_str()),
                            ("error", message.as_str()),
                        ],
                    );
                }
                Err(e)
            }
        }
    }

    fn retrieve_document(
        &self,
        uid: &str,
        mime: Option<&str>,
    ) -> DocStoreResult<Option<VariantInfo>> {
        if validate_uid(uid).is_err() {
            return Ok(None);
        }

        let key = match mime {
            Some(m) => DocumentKey {
                uid: uid.to_string(),
                mime: resolve_mime(Some(m)),
            },
            None => {
                let mut mimes: Vec<String> =
                    self.list_variants(uid)?.into_iter().map(|m| m.mime).collect();
                order_variants(&mut mimes);
                match mimes.into_iter().next() {
                    Some(mime) => DocumentKey {
                        uid: uid.to_string(),
                        mime,
                    },
                    None => return Ok(None),
                }
            }
        };

        match self.read_meta(&self.variant_path(&key, META_EXT))? {
            Some(meta) => self.variant_info(&key, &meta).map(Some),
            None => Ok(None),
        }
    }

    fn open_reader(&self, key: &DocumentKey) -> DocStoreResult<Box<dyn Read + Send>> {
        validate_uid(&key.uid)?;
        match File::open(self.variant_path(key, DATA_EXT)) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DocStoreError::DocumentNotFound(key.to_string()))
            }
            Err(e) => Err(io_err(e)),
        }
    }

    fn open_writer(&self, key: &DocumentKey) -> DocStoreResult<Box<dyn DocumentWriter>> {
        validate_uid(&key.uid)?;
        let meta_path = self.variant_path(key, META_EXT);
        let data_path = self.variant_path(key, DATA_EXT);
        if !meta_path.exists() {
            return Err(DocStoreError::DocumentNotFound(key.to_string()));
        }
        if data_path.exists() {
            return Err(DocStoreError::ContentAlreadyWritten(key.to_string()));
        }

        let part_path = self.document_dir(&key.uid).join(format!(
            "{}.part-{}",
            encode_mime(&key.mime),
            Uuid::new_v4().simple()
        ));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part_path)
            .map_err(io_err)?;

        Ok(Box::new(FileWriter {
            key: key.clone(),
            file: Some(BufWriter::new(file)),
            part_path,
            data_path,
            meta_path,
            committed: false,
        }))
    }

    fn delete_document(&self, uid: &str) -> DocStoreResult<bool> {
        if validate_uid(uid).is_err() {
            return Ok(false);
        }
        let dir = self.document_dir(uid);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_err(e)),
        };

        let mut removed = false;
        for entry in entries {
            let path = entry.map_err(io_err)?.path();
            let was_marker = path.extension().and_then(|e| e.to_str()) == Some(META_EXT);
            if remove_if_present(&path)? && was_marker {
                removed = true;
            }
        }
        let _ = fs::remove_dir(&dir);
        Ok(removed)
    }

    fn delete_variant(&self, key: &DocumentKey) -> DocStoreResult<bool> {
        if validate_uid(&key.uid).is_err() {
            return Ok(false);
        }
        let existed = remove_if_present(&self.variant_path(key, META_EXT))?;
        remove_if_present(&self.variant_path(key, DATA_EXT))?;
        remove_if_present(&self.variant_path(key, HASH_EXT))?;
        let _ = fs::remove_dir(self.document_dir(&key.uid));
        Ok(existed)
    }

    fn set_hash(&self, document: &BaseDocument, hash: &str) -> DocStoreResult<bool> {
        let Some(key) = document.key() else {
            return Ok(false);
        };
        if validate_uid(&key.uid).is_err() {
            return Ok(false);
        }
        if !self.variant_path(key, META_EXT).exists() || !self.variant_path(key, DATA_EXT).exists()
        {
            return Ok(false);
        }
        if !publish_new(&self.variant_path(key, HASH_EXT), hash.as_bytes()).map_err(io_err)? {
            return Ok(false);
        }
        document.record_hash(hash);
        Ok(true)
    }
}

/// Streams into a `.part` file and hard-links it into place on commit
struct FileWriter {
    key: DocumentKey,
    file: Option<BufWriter<File>>,
    part_path: PathBuf,
    data_path: PathBuf,
    meta_path: PathBuf,
    committed: bool,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "writer already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl DocumentWriter for FileWriter {
    fn commit(mut self: Box<Self>) -> DocStoreResult<VariantInfo> {
        let file = self
            .file
            .take()
            .ok_or_else(|| DocStoreError::Internal("writer already committed".into()))?;
        let file = file.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        drop(file);

        // The variant may have been deleted while the write was in flight.
        if !self.meta_path.exists() {
            return Err(DocStoreError::DocumentNotFound(self.key.to_string()));
        }
        match fs::hard_link(&self.part_path, &self.data_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(DocStoreError::ContentAlreadyWritten(self.key.to_string()));
            }
            Err(e) => return Err(io_err(e)),
        }
        let _ = fs::remove_file(&self.part_path);
        self.committed = true;

        Ok(VariantInfo {
            key: self.key.clone(),
            size: size as i64,
            availability: Availability::Online,
            hash: None,
            created_at: None,
        })
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.part_path);
        }
    }
}
