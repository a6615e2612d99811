//! Registry Topology Tests
//!
//! - Lookups by (type, name), (domain, name), domain, pool and features
//! - Domains isolate names; pools span domains
//! - Absence is None / empty, never an error
//! - Reload swaps the whole topology

use std::sync::Arc;

use docstore::backend::UnmonitoredFreeSpace;
use docstore::registry::{
    DocumentStorageRegistry, DomainConfig, RegistryConfig, StorageConfig, StorageProviders,
};
use docstore::{DocStoreError, Feature};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn providers() -> StorageProviders {
    StorageProviders::with_defaults(Arc::new(UnmonitoredFreeSpace))
}

fn fs_storage(temp: &TempDir, name: &str) -> StorageConfig {
    StorageConfig::new(name, "filesystem")
        .with_property("base_dir", temp.path().join(name).to_string_lossy().to_string())
}

/// Two domains: "xds" with two pools, "wado" with no pool at all.
fn archive_config(temp: &TempDir) -> RegistryConfig {
    RegistryConfig::new()
        .with_domain(
            DomainConfig::new("xds")
                .with_default("fs2")
                .with_storage(
                    fs_storage(temp, "fs1")
                        .with_pool("primary")
                        .with_feature(Feature::new("retrieve")),
                )
                .with_storage(
                    fs_storage(temp, "fs2")
                        .with_pool("primary")
                        .with_feature(Feature::new("retrieve"))
                        .with_feature(Feature::with_parameter("tier", "hot")),
                )
                .with_storage(StorageConfig::new("mem1", "memory").with_pool("cache")),
        )
        .with_domain(
            DomainConfig::new("wado")
                .with_storage(fs_storage(temp, "fs3").with_feature(Feature::new("retrieve"))),
        )
}

fn names(storages: &[Arc<dyn docstore::DocumentStorage>]) -> Vec<String> {
    storages.iter().map(|s| s.name().to_string()).collect()
}

// =============================================================================
// Lookups
// =============================================================================

#[test]
fn test_storage_of_type_requires_exact_type() {
    let temp = TempDir::new().unwrap();
    let registry = DocumentStorageRegistry::from_config(&archive_config(&temp), providers()).unwrap();

    let fs1 = registry.storage_of_type("filesystem", "fs1").unwrap();
    assert_eq!(fs1.name(), "fs1");
    assert_eq!(fs1.storage_type(), "filesystem");

    assert!(registry.storage_of_type("memory", "fs1").is_none());
    assert!(registry.storage_of_type("tape", "fs1").is_none());
    assert!(registry.storage_of_type("filesystem", "missing").is_none());
}

#[test]
fn test_storage_by_domain_and_name() {
    let temp = TempDir::new().unwrap();
    let registry = DocumentStorageRegistry::from_config(&archive_config(&temp), providers()).unwrap();

    assert_eq!(registry.storage(Some("xds"), None).unwrap().name(), "fs2");
    assert_eq!(registry.storage(Some("wado"), None).unwrap().name(), "fs3");
    assert_eq!(registry.storage(Some("xds"), Some("mem1")).unwrap().name(), "mem1");

    // Domains are isolation boundaries
    assert!(registry.storage(Some("xds"), Some("fs3")).is_none());
    assert!(registry.storage(Some("wado"), Some("fs1")).is_none());

    assert!(registry.storage(None, Some("fs1")).is_none());
    assert!(registry.storage(None, None).is_none());
    assert!(registry.storage(Some("unknown"), None).is_none());
    assert!(registry.storage(Some("xds"), Some("unknown")).is_none());
}

#[test]
fn test_storages_of_domain_and_pool() {
    let temp = TempDir::new().unwrap();
    let registry = DocumentStorageRegistry::from_config(&archive_config(&temp), providers()).unwrap();

    assert_eq!(names(&registry.storages_of_domain("xds")), vec!["fs1", "fs2", "mem1"]);
    assert_eq!(names(&registry.storages_of_domain("wado")), vec!["fs3"]);
    assert!(registry.storages_of_domain("unknown").is_empty());

    assert_eq!(names(&registry.storages_of_pool("primary")), vec!["fs1", "fs2"]);
    assert_eq!(names(&registry.storages_of_pool("cache")), vec!["mem1"]);
    assert!(registry.storages_of_pool("unknown").is_empty());

    assert_eq!(registry.domains(), vec!["wado", "xds"]);
    assert_eq!(registry.pools(), vec!["cache", "primary"]);
}

#[test]
fn test_storages_by_features() {
    let temp = TempDir::new().unwrap();
    let registry = DocumentStorageRegistry::from_config(&archive_config(&temp), providers()).unwrap();

    let retrieve = registry.storages_by_features(&[Feature::new("retrieve")]);
    assert_eq!(retrieve.len(), 2);
    assert_eq!(names(&retrieve["xds"]), vec!["fs1", "fs2"]);
    assert_eq!(names(&retrieve["wado"]), vec!["fs3"]);

    // Unparameterized request matches any parameter
    let tier = registry.storages_by_features(&[Feature::new("tier")]);
    assert_eq!(names(&tier["xds"]), vec!["fs2"]);
    assert!(!tier.contains_key("wado"));

    let cold = registry.storages_by_features(&[Feature::with_parameter("tier", "cold")]);
    assert!(cold.is_empty());

    assert!(registry.storages_by_features(&[]).is_empty());
    assert!(registry.storages_by_features(&[Feature::new("unknown")]).is_empty());
}

#[test]
fn test_provider_type_names() {
    let registry = DocumentStorageRegistry::empty(providers());
    let names = registry.provider_type_names();
    assert_eq!(names, vec!["filesystem", "memory"]);
}

// =============================================================================
// Configuration Errors
// =============================================================================

#[test]
fn test_unknown_provider_type_rejected() {
    let config = RegistryConfig::new()
        .with_domain(DomainConfig::new("xds").with_storage(StorageConfig::new("t1", "tape")));
    let result = DocumentStorageRegistry::from_config(&config, providers());
    assert!(matches!(result, Err(DocStoreError::UnknownProvider(_))));
}

#[test]
fn test_config_file_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("docstore.json");
    let base = temp.path().join("fs1");
    std::fs::write(
        &path,
        format!(
            r#"{{
                "log_level": "warn",
                "domains": [
                    {{ "name": "xds", "storages": [
                        {{ "name": "fs1", "type": "filesystem", "pool": "primary",
                           "features": [ {{ "name": "retrieve" }} ],
                           "properties": {{ "base_dir": {:?} }} }}
                    ] }}
                ]
            }}"#,
            base.to_string_lossy()
        ),
    )
    .unwrap();

    let config = RegistryConfig::load(&path).unwrap();
    let registry = DocumentStorageRegistry::from_config(&config, providers()).unwrap();
    assert_eq!(registry.storage(Some("xds"), None).unwrap().pool(), Some("primary"));
    assert_eq!(registry.features(), vec![Feature::new("retrieve")]);

    assert!(matches!(
        RegistryConfig::load(&temp.path().join("missing.json")),
        Err(DocStoreError::Config(_))
    ));
}

// =============================================================================
// Reload
// =============================================================================

#[test]
fn test_reload_replaces_topology() {
    let temp = TempDir::new().unwrap();
    let registry = DocumentStorageRegistry::from_config(&archive_config(&temp), providers()).unwrap();
    let before = registry.snapshot();

    let next = RegistryConfig::new().with_domain(
        DomainConfig::new("iid").with_storage(StorageConfig::new("mem9", "memory")),
    );
    registry.reload(&next).unwrap();

    assert_eq!(registry.domains(), vec!["iid"]);
    assert!(registry.storage(Some("xds"), None).is_none());
    assert!(registry.storages_of_pool("primary").is_empty());

    // Holders of the old snapshot keep a consistent view
    assert!(before.domain("xds").is_some());
    assert_eq!(before.storages_of_pool("primary").len(), 2);
}
