//! # Documents
//!
//! `BaseDocument` is the value returned by every create/store/get call. Its
//! readable stream is re-opened on each request; its writable sink is opened
//! at most once per instance and is unusable after close.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};

use crate::availability::Availability;
use crate::backend::{DocumentKey, DocumentStorage, DocumentWriter, VariantInfo};
use crate::errors::{DocStoreError, DocStoreResult};

/// Where a document instance is in its content lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    /// Reserved, nothing written yet
    NoContent,
    /// This instance holds an open sink
    OpenForWrite,
    /// This instance's sink was closed (committed or failed)
    Closed,
    /// Content was committed before this instance was obtained
    Stored,
}

#[derive(Debug)]
enum Phase {
    NoContent,
    OpenForWrite(Arc<DocumentSink>),
    Closed,
    Stored,
}

#[derive(Debug)]
struct DocumentState {
    phase: Phase,
    size: i64,
    availability: Option<Availability>,
    hash: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A stored document variant as seen by one caller
#[derive(Debug)]
pub struct BaseDocument {
    key: Option<DocumentKey>,
    storage: Option<Arc<dyn DocumentStorage>>,
    created_at: Option<DateTime<Utc>>,
    state: Arc<Mutex<DocumentState>>,
}

impl BaseDocument {
    /// The "no such document" value
    pub fn null() -> Self {
        Self {
            key: None,
            storage: None,
            created_at: None,
            state: Arc::new(Mutex::new(DocumentState {
                phase: Phase::NoContent,
                size: -1,
                availability: None,
                hash: None,
            })),
        }
    }

    /// Wrap a back-end's view of a variant
    pub fn from_variant(info: VariantInfo, storage: Arc<dyn DocumentStorage>) -> Self {
        let phase = if info.is_materialized() {
            Phase::Stored
        } else {
            Phase::NoContent
        };
        Self {
            key: Some(info.key),
            storage: Some(storage),
            created_at: info.created_at,
            state: Arc::new(Mutex::new(DocumentState {
                phase,
                size: info.size,
                availability: Some(info.availability),
                hash: info.hash,
            })),
        }
    }

    pub fn is_null(&self) -> bool {
        self.key.is_none()
    }

    pub fn key(&self) -> Option<&DocumentKey> {
        self.key.as_ref()
    }

    pub fn uid(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.uid.as_str())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.mime.as_str())
    }

    pub fn storage(&self) -> Option<&Arc<dyn DocumentStorage>> {
        self.storage.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Content length, -1 until content is materialized
    pub fn size(&self) -> i64 {
        lock(&self.state).size
    }

    /// Availability snapshot taken when the instance was produced, updated
    /// when this instance's sink closes
    pub fn availability(&self) -> Option<Availability> {
        lock(&self.state).availability
    }

    pub fn hash(&self) -> Option<String> {
        lock(&self.state).hash.clone()
    }

    pub fn content_state(&self) -> ContentState {
        match lock(&self.state).phase {
            Phase::NoContent => ContentState::NoContent,
            Phase::OpenForWrite(_) => ContentState::OpenForWrite,
            Phase::Closed => ContentState::Closed,
            Phase::Stored => ContentState::Stored,
        }
    }

    fn bound(&self) -> DocStoreResult<(&DocumentKey, &Arc<dyn DocumentStorage>)> {
        match (&self.key, &self.storage) {
            (Some(key), Some(storage)) => Ok((key, storage)),
            _ => Err(DocStoreError::DocumentNotFound("null document".into())),
        }
    }

    /// Open a new, independent reader at the start of the content
    pub fn open_reader(&self) -> DocStoreResult<Box<dyn Read + Send>> {
        let (key, storage) = self.bound()?;
        storage.open_reader(key)
    }

    /// Read the whole content
    pub fn read_all(&self) -> DocStoreResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.open_reader()?
            .read_to_end(&mut buffer)
            .map_err(|e| DocStoreError::Io(e.to_string()))?;
        Ok(buffer)
    }

    /// The writable sink. Returns the same sink until it is closed; fails
    /// afterwards, and for documents whose content already exists.
    pub fn writer(&self) -> DocStoreResult<Arc<DocumentSink>> {
        let (key, storage) = self.bound()?;
        let mut state = lock(&self.state);
        match &state.phase {
            Phase::OpenForWrite(sink) => return Ok(Arc::clone(sink)),
            Phase::Closed => return Err(DocStoreError::SinkClosed(key.to_string())),
            Phase::Stored => return Err(DocStoreError::ContentAlreadyWritten(key.to_string())),
            Phase::NoContent => {}
        }

        let writer = storage.open_writer(key)?;
        let sink = Arc::new(DocumentSink {
            key: key.clone(),
            writer: Mutex::new(Some(writer)),
            document: Arc::downgrade(&self.state),
        });
        state.phase = Phase::OpenForWrite(Arc::clone(&sink));
        Ok(sink)
    }

    /// Set the in-memory hash once; `false` if one is already present.
    pub(crate) fn record_hash(&self, hash: &str) -> bool {
        let mut state = lock(&self.state);
        if state.hash.is_some() {
            return false;
        }
        state.hash = Some(hash.to_string());
        true
    }
}

impl Default for BaseDocument {
    fn default() -> Self {
        Self::null()
    }
}

/// Single-use writable sink of a document instance
pub struct DocumentSink {
    key: DocumentKey,
    writer: Mutex<Option<Box<dyn DocumentWriter>>>,
    document: Weak<Mutex<DocumentState>>,
}

impl DocumentSink {
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.writer).is_none()
    }

    /// Append bytes. A failed write discards everything written so far and
    /// closes the sink.
    pub fn write_all(&self, buf: &[u8]) -> DocStoreResult<()> {
        let mut guard = lock(&self.writer);
        let writer = guard
            .as_mut()
            .ok_or_else(|| DocStoreError::SinkClosed(self.key.to_string()))?;
        if let Err(e) = writer.write_all(buf) {
            *guard = None;
            drop(guard);
            self.mark_closed(None);
            return Err(DocStoreError::Io(e.to_string()));
        }
        Ok(())
    }

    /// Commit the written bytes. Returns the content length.
    pub fn close(&self) -> DocStoreResult<u64> {
        let writer = lock(&self.writer)
            .take()
            .ok_or_else(|| DocStoreError::SinkClosed(self.key.to_string()))?;
        let result = writer.commit();
        self.mark_closed(result.as_ref().ok());
        result.map(|info| info.size.max(0) as u64)
    }

    fn mark_closed(&self, committed: Option<&VariantInfo>) {
        let Some(state) = self.document.upgrade() else {
            return;
        };
        let mut state = lock(&state);
        state.phase = Phase::Closed;
        if let Some(info) = committed {
            state.size = info.size;
            state.availability = Some(info.availability);
        }
    }
}

impl fmt::Debug for DocumentSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSink")
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Write for &DocumentSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DocumentSink::write_all(*self, buf)
            .map(|()| buf.len())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::Other, "sink closed"));
        }
        Ok(())
    }
}
