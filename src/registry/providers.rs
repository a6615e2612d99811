//! Storage providers
//!
//! A provider turns one `StorageConfig` into a live `DocumentStorage`. The
//! registry looks providers up by the configured `type`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::{filesystem, memory, DocumentStorage, FileSystemStorage, FreeSpaceProbe, InMemoryStorage};
use crate::errors::{DocStoreError, DocStoreResult};

use super::config::StorageConfig;

/// Factory for one storage type
pub trait StorageProvider: Send + Sync {
    /// Value of the `type` key this provider serves
    fn type_name(&self) -> &str;

    fn create(&self, config: &StorageConfig) -> DocStoreResult<Arc<dyn DocumentStorage>>;
}

/// `filesystem` stores
///
/// Properties: `base_dir` (required), `min_free_space` (bytes, optional).
pub struct FileSystemProvider {
    probe: Arc<dyn FreeSpaceProbe>,
}

impl FileSystemProvider {
    pub fn new(probe: Arc<dyn FreeSpaceProbe>) -> Self {
        Self { probe }
    }
}

impl StorageProvider for FileSystemProvider {
    fn type_name(&self) -> &str {
        filesystem::TYPE_NAME
    }

    fn create(&self, config: &StorageConfig) -> DocStoreResult<Arc<dyn DocumentStorage>> {
        let base_dir = config.string_property("base_dir")?;
        let mut storage = FileSystemStorage::new(&config.name, base_dir, Arc::clone(&self.probe))
            .with_features(config.features.clone());
        if let Some(pool) = &config.pool {
            storage = storage.with_pool(pool);
        }
        if let Some(min_free) = config.u64_property("min_free_space")? {
            storage = storage.with_min_free_space(min_free);
        }
        Ok(Arc::new(storage))
    }
}

/// `memory` stores
///
/// Properties: `max_size` (bytes, optional).
#[derive(Debug, Default)]
pub struct InMemoryProvider;

impl StorageProvider for InMemoryProvider {
    fn type_name(&self) -> &str {
        memory::TYPE_NAME
    }

    fn create(&self, config: &StorageConfig) -> DocStoreResult<Arc<dyn DocumentStorage>> {
        let mut storage = InMemoryStorage::new(&config.name).with_features(config.features.clone());
        if let Some(pool) = &config.pool {
            storage = storage.with_pool(pool);
        }
        if let Some(max_size) = config.u64_property("max_size")? {
            storage = storage.with_max_size(max_size);
        }
        Ok(Arc::new(storage))
    }
}

/// Provider lookup by type name
#[derive(Default)]
pub struct StorageProviders {
    providers: BTreeMap<String, Arc<dyn StorageProvider>>,
}

impl StorageProviders {
    /// No providers
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled `filesystem` and `memory` providers
    pub fn with_defaults(probe: Arc<dyn FreeSpaceProbe>) -> Self {
        let mut providers = Self::new();
        providers.register(Arc::new(FileSystemProvider::new(probe)));
        providers.register(Arc::new(InMemoryProvider));
        providers
    }

    /// Add or replace the provider for its type name
    pub fn register(&mut self, provider: Arc<dyn StorageProvider>) {
        self.providers
            .insert(provider.type_name().to_string(), provider);
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn StorageProvider>> {
        self.providers.get(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn create(&self, config: &StorageConfig) -> DocStoreResult<Arc<dyn DocumentStorage>> {
        let provider = self
            .get(&config.storage_type)
            .ok_or_else(|| DocStoreError::UnknownProvider(config.storage_type.clone()))?;
        let storage = provider.create(config)?;
        if storage.name() != config.name || storage.storage_type() != config.storage_type {
            return Err(DocStoreError::Config(format!(
                "provider '{}' returned storage '{}' of type '{}' for '{}'",
                config.storage_type,
                storage.name(),
                storage.storage_type(),
                config.name
            )));
        }
        Ok(storage)
    }
}

impl fmt::Debug for StorageProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageProviders")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::Availability;
    use crate::backend::{FixedFreeSpace, UnmonitoredFreeSpace};
    use crate::feature::Feature;
    use tempfile::TempDir;

    #[test]
    fn test_default_type_names() {
        let providers = StorageProviders::with_defaults(Arc::new(UnmonitoredFreeSpace));
        assert_eq!(providers.type_names(), vec!["filesystem", "memory"]);
        assert!(providers.get("s3").is_none());
    }

    #[test]
    fn test_unknown_provider() {
        let providers = StorageProviders::with_defaults(Arc::new(UnmonitoredFreeSpace));
        let result = providers.create(&StorageConfig::new("x", "tape"));
        assert!(matches!(result, Err(DocStoreError::UnknownProvider(t)) if t == "tape"));
    }

    #[test]
    fn test_filesystem_requires_base_dir() {
        let providers = StorageProviders::with_defaults(Arc::new(UnmonitoredFreeSpace));
        let result = providers.create(&StorageConfig::new("fs1", "filesystem"));
        assert!(matches!(result, Err(DocStoreError::Config(_))));
    }

    #[test]
    fn test_filesystem_properties_applied() {
        let temp = TempDir::new().unwrap();
        let probe = Arc::new(FixedFreeSpace::new());
        probe.set(temp.path(), 2048);
        let providers = StorageProviders::with_defaults(probe);

        let config = StorageConfig::new("fs1", "filesystem")
            .with_pool("primary")
            .with_feature(Feature::new("retrieve"))
            .with_property("base_dir", temp.path().to_string_lossy().to_string())
            .with_property("min_free_space", 4096);
        let storage = providers.create(&config).unwrap();

        assert_eq!(storage.name(), "fs1");
        assert_eq!(storage.storage_type(), "filesystem");
        assert_eq!(storage.pool(), Some("primary"));
        assert!(storage.has_feature(&Feature::new("retrieve")));
        assert_eq!(storage.storage_availability(), Availability::Unavailable);
    }

    #[test]
    fn test_memory_provider() {
        let providers = StorageProviders::with_defaults(Arc::new(UnmonitoredFreeSpace));
        let storage = providers
            .create(&StorageConfig::new("mem", "memory").with_property("max_size", 10))
            .unwrap();
        assert_eq!(storage.storage_type(), "memory");
        assert_eq!(storage.pool(), None);
        assert_eq!(storage.storage_availability(), Availability::InMemory);
    }
}
