//! Concurrency Tests
//!
//! - Concurrent create of one (uid, mime): exactly one success
//! - Concurrent hash assignment: exactly one success
//! - Readers never observe a half-applied reload
//! - Retrieve feature changes are never torn

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use docstore::backend::UnmonitoredFreeSpace;
use docstore::registry::{
    DocumentStorageRegistry, DomainConfig, RegistryConfig, StorageConfig, StorageProviders,
};
use docstore::{DocStoreError, DocumentStorage as _, DocumentStore, Feature};
use tempfile::TempDir;

const THREADS: usize = 8;

fn providers() -> StorageProviders {
    StorageProviders::with_defaults(Arc::new(UnmonitoredFreeSpace))
}

fn config(temp: &TempDir, default: &str) -> RegistryConfig {
    RegistryConfig::new().with_domain(
        DomainConfig::new("xds")
            .with_default(default)
            .with_storage(
                StorageConfig::new("fs1", "filesystem")
                    .with_feature(Feature::new("retrieve"))
                    .with_property("base_dir", temp.path().join("fs1").to_string_lossy().to_string()),
            )
            .with_storage(
                StorageConfig::new("mem1", "memory")
                    .with_feature(Feature::new("retrieve"))
                    .with_feature(Feature::new("fast")),
            ),
    )
}

fn open_store(temp: &TempDir, default: &str) -> Arc<DocumentStore> {
    let registry = DocumentStorageRegistry::from_config(&config(temp, default), providers()).unwrap();
    Arc::new(DocumentStore::new(Arc::new(registry), "xds"))
}

fn race_create(store: Arc<DocumentStore>) {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.create_document("1.2.3", Some("application/dicom"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(DocStoreError::DuplicateDocument { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, THREADS - 1);
}

#[test]
fn test_concurrent_create_filesystem() {
    let temp = TempDir::new().unwrap();
    race_create(open_store(&temp, "fs1"));
}

#[test]
fn test_concurrent_create_memory() {
    let temp = TempDir::new().unwrap();
    race_create(open_store(&temp, "mem1"));
}

#[test]
fn test_concurrent_set_hash() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp, "fs1");
    let doc = store.create_document("1.2.3", None).unwrap();
    let sink = doc.writer().unwrap();
    sink.write_all(b"content").unwrap();
    sink.close().unwrap();

    let storage = doc.storage().unwrap().clone();
    let barrier = Barrier::new(THREADS);
    let successes = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let (doc, storage, barrier) = (&doc, &storage, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    storage.set_hash(doc, &format!("hash-{}", i)).unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|set| *set)
            .count()
    });
    assert_eq!(successes, 1);

    let persisted = store.get_document("1.2.3", None).unwrap().unwrap().hash().unwrap();
    assert_eq!(doc.hash(), Some(persisted));
}

#[test]
fn test_reload_is_atomic_for_readers() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp, "fs1");
    let registry = Arc::clone(store.registry());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut reads = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let snapshot = registry.snapshot();
                    let domain = snapshot.domain("xds").unwrap();
                    let default = domain.default_storage().unwrap();
                    assert!(default.name() == "fs1" || default.name() == "mem1");
                    assert_eq!(domain.storages().len(), 2);
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for i in 0..50 {
        let default = if i % 2 == 0 { "mem1" } else { "fs1" };
        registry.reload(&config(&temp, default)).unwrap();
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(registry.storage(Some("xds"), None).unwrap().name(), "fs1");
}

#[test]
fn test_retrieve_features_never_torn() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp, "fs1");
    let stop = Arc::new(AtomicBool::new(false));
    let wide = vec![Feature::new("retrieve")];
    let narrow = vec![Feature::new("retrieve"), Feature::new("fast")];
    store.set_retrieve_features(wide.clone());

    let reader = {
        let store = Arc::clone(&store);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let features = store.retrieve_features();
                assert!(features.len() == 1 || features.len() == 2, "{:?}", features);
                let visible = store.retrieve_doc_storages().len();
                assert!(visible == 1 || visible == 2);
            }
        })
    };

    for i in 0..200 {
        let next = if i % 2 == 0 { narrow.clone() } else { wide.clone() };
        store.set_retrieve_features(next);
    }
    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();

    assert_eq!(store.retrieve_features(), wide);
}
