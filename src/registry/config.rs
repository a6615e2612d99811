//! Registry configuration
//!
//! One JSON document lists the domains, their stores, pools and granted
//! features. Provider-specific settings live in each store's `properties`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{DocStoreError, DocStoreResult};
use crate::feature::Feature;
use crate::observability::Severity;

/// Top-level configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One storage domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,

    /// Store used when no name or pool is given (optional, default first store)
    #[serde(default)]
    pub default_storage: Option<String>,

    #[serde(default)]
    pub storages: Vec<StorageConfig>,
}

/// One physical store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub name: String,

    /// Provider type name, e.g. "filesystem"
    #[serde(rename = "type")]
    pub storage_type: String,

    #[serde(default)]
    pub pool: Option<String>,

    #[serde(default)]
    pub features: Vec<Feature>,

    /// Provider-specific settings
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl StorageConfig {
    pub fn new(name: impl Into<String>, storage_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_type: storage_type.into(),
            pool: None,
            features: Vec::new(),
            properties: Map::new(),
        }
    }

    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// A required string property
    pub fn string_property(&self, key: &str) -> DocStoreResult<&str> {
        match self.properties.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
            Some(_) => Err(self.property_error(key, "must be a non-empty string")),
            None => Err(self.property_error(key, "is required")),
        }
    }

    /// An optional non-negative integer property
    pub fn u64_property(&self, key: &str) -> DocStoreResult<Option<u64>> {
        match self.properties.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.property_error(key, "must be a non-negative integer")),
        }
    }

    fn property_error(&self, key: &str, problem: &str) -> DocStoreError {
        DocStoreError::Config(format!(
            "storage '{}': property '{}' {}",
            self.name, key, problem
        ))
    }
}

impl DomainConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_storage: None,
            storages: Vec::new(),
        }
    }

    pub fn with_default(mut self, storage: impl Into<String>) -> Self {
        self.default_storage = Some(storage.into());
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storages.push(storage);
        self
    }

    /// Name of the store used for unqualified lookups
    pub fn default_storage_name(&self) -> Option<&str> {
        self.default_storage
            .as_deref()
            .or_else(|| self.storages.first().map(|s| s.name.as_str()))
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self {
            log_level: default_log_level(),
            domains: Vec::new(),
        }
    }

    pub fn with_domain(mut self, domain: DomainConfig) -> Self {
        self.domains.push(domain);
        self
    }

    /// Load and validate configuration from file
    pub fn load(path: &Path) -> DocStoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DocStoreError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(content: &str) -> DocStoreResult<Self> {
        let config: RegistryConfig = serde_json::from_str(content)
            .map_err(|e| DocStoreError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn severity(&self) -> DocStoreResult<Severity> {
        self.log_level
            .parse()
            .map_err(|_| DocStoreError::Config(format!("Invalid log_level: '{}'", self.log_level)))
    }

    /// Structural checks. Provider types and properties are checked when the
    /// registry instantiates the stores.
    pub fn validate(&self) -> DocStoreResult<()> {
        self.severity()?;

        let mut domain_names = HashSet::new();
        let mut typed_names = HashSet::new();

        for domain in &self.domains {
            if domain.name.is_empty() {
                return Err(DocStoreError::Config("domain name must not be empty".into()));
            }
            if !domain_names.insert(domain.name.as_str()) {
                return Err(DocStoreError::Config(format!(
                    "duplicate domain '{}'",
                    domain.name
                )));
            }
            if domain.storages.is_empty() {
                return Err(DocStoreError::Config(format!(
                    "domain '{}' has no storages",
                    domain.name
                )));
            }

            let mut storage_names = HashSet::new();
            for storage in &domain.storages {
                if storage.name.is_empty() {
                    return Err(DocStoreError::Config(format!(
                        "domain '{}': storage name must not be empty",
                        domain.name
                    )));
                }
                if storage.pool.as_deref() == Some("") {
                    return Err(DocStoreError::Config(format!(
                        "storage '{}': pool name must not be empty",
                        storage.name
                    )));
                }
                if !storage_names.insert(storage.name.as_str()) {
                    return Err(DocStoreError::Config(format!(
                        "domain '{}': duplicate storage '{}'",
                        domain.name, storage.name
                    )));
                }
                if !typed_names.insert((storage.storage_type.as_str(), storage.name.as_str())) {
                    return Err(DocStoreError::Config(format!(
                        "storage '{}' of type '{}' is configured twice",
                        storage.name, storage.storage_type
                    )));
                }
            }

            if let Some(default) = &domain.default_storage {
                if !storage_names.contains(default.as_str()) {
                    return Err(DocStoreError::Config(format!(
                        "domain '{}': default_storage '{}' is not configured",
                        domain.name, default
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "domains": [
            { "name": "xds", "default_storage": "fs2",
              "storages": [
                { "name": "fs1", "type": "filesystem", "pool": "primary",
                  "features": [ { "name": "retrieve" }, { "name": "tier", "parameter": "hot" } ],
                  "properties": { "base_dir": "/tmp/fs1", "min_free_space": 4096 } },
                { "name": "fs2", "type": "filesystem",
                  "properties": { "base_dir": "/tmp/fs2" } }
              ] },
            { "name": "wado", "storages": [ { "name": "mem", "type": "memory" } ] }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = RegistryConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.domains.len(), 2);

        let xds = &config.domains[0];
        assert_eq!(xds.default_storage_name(), Some("fs2"));
        assert_eq!(xds.storages[0].storage_type, "filesystem");
        assert_eq!(xds.storages[0].pool.as_deref(), Some("primary"));
        assert_eq!(
            xds.storages[0].features[1],
            Feature::with_parameter("tier", "hot")
        );
        assert_eq!(xds.storages[0].u64_property("min_free_space").unwrap(), Some(4096));
        assert_eq!(xds.storages[1].u64_property("min_free_space").unwrap(), None);

        assert_eq!(config.domains[1].default_storage_name(), Some("mem"));
    }

    #[test]
    fn test_invalid_json() {
        let result = RegistryConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(DocStoreError::Config(_))));
    }

    #[test]
    fn test_missing_default_storage() {
        let config = RegistryConfig::new().with_domain(
            DomainConfig::new("xds")
                .with_default("nope")
                .with_storage(StorageConfig::new("mem", "memory")),
        );
        assert!(matches!(config.validate(), Err(DocStoreError::Config(_))));
    }

    #[test]
    fn test_domain_without_storages() {
        let config = RegistryConfig::new().with_domain(DomainConfig::new("xds"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let same_domain = RegistryConfig::new().with_domain(
            DomainConfig::new("xds")
                .with_storage(StorageConfig::new("a", "memory"))
                .with_storage(StorageConfig::new("a", "filesystem")),
        );
        assert!(same_domain.validate().is_err());

        let across_domains = RegistryConfig::new()
            .with_domain(DomainConfig::new("one").with_storage(StorageConfig::new("a", "memory")))
            .with_domain(DomainConfig::new("two").with_storage(StorageConfig::new("a", "memory")));
        assert!(across_domains.validate().is_err());

        let other_type = RegistryConfig::new()
            .with_domain(DomainConfig::new("one").with_storage(StorageConfig::new("a", "memory")))
            .with_domain(
                DomainConfig::new("two").with_storage(StorageConfig::new("a", "filesystem")),
            );
        assert!(other_type.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = RegistryConfig::new()
            .with_domain(DomainConfig::new("xds").with_storage(StorageConfig::new("m", "memory")));
        config.log_level = "loud".into();
        assert!(config.validate().is_err());
        config.log_level = "warn".into();
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_property_errors() {
        let storage = StorageConfig::new("fs", "filesystem").with_property("min_free_space", -1);
        assert!(storage.string_property("base_dir").is_err());
        assert!(storage.u64_property("min_free_space").is_err());
    }
}
