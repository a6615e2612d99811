//! # Document Storage Registry
//!
//! Configuration-derived topology of domains, pools and stores.
//!
//! The topology is immutable once built. `reload` builds a complete new
//! topology and swaps it in; readers holding the previous snapshot finish
//! against it.

pub mod config;
pub mod providers;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::backend::DocumentStorage;
use crate::errors::DocStoreResult;
use crate::feature::Feature;
use crate::observability::{log_event_with_fields, Event};

pub use config::{DomainConfig, RegistryConfig, StorageConfig};
pub use providers::{FileSystemProvider, InMemoryProvider, StorageProvider, StorageProviders};

/// Stores of one domain, in configuration order
#[derive(Debug)]
pub struct DomainTopology {
    name: String,
    default_storage: String,
    storages: Vec<Arc<dyn DocumentStorage>>,
}

impl DomainTopology {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storages(&self) -> &[Arc<dyn DocumentStorage>] {
        &self.storages
    }

    pub fn storage(&self, name: &str) -> Option<&Arc<dyn DocumentStorage>> {
        self.storages.iter().find(|s| s.name() == name)
    }

    pub fn default_storage(&self) -> Option<&Arc<dyn DocumentStorage>> {
        self.storage(&self.default_storage)
    }
}

/// One immutable view of the configured stores
#[derive(Debug, Default)]
pub struct Topology {
    domains: BTreeMap<String, DomainTopology>,
    pools: BTreeMap<String, Vec<Arc<dyn DocumentStorage>>>,
    by_type: HashMap<(String, String), Arc<dyn DocumentStorage>>,
    features: BTreeSet<Feature>,
}

impl Topology {
    /// Instantiate every configured store through its provider
    pub fn build(config: &RegistryConfig, providers: &StorageProviders) -> DocStoreResult<Self> {
        config.validate()?;

        let mut topology = Topology::default();
        for domain in &config.domains {
            let mut storages = Vec::with_capacity(domain.storages.len());
            for storage_config in &domain.storages {
                let storage = providers.create(storage_config)?;

                if let Some(pool) = storage.pool() {
                    topology
                        .pools
                        .entry(pool.to_string())
                        .or_default()
                        .push(Arc::clone(&storage));
                }
                topology.features.extend(storage.features().iter().cloned());
                topology.by_type.insert(
                    (storage.storage_type().to_string(), storage.name().to_string()),
                    Arc::clone(&storage),
                );
                storages.push(storage);
            }

            let default_storage = domain
                .default_storage_name()
                .unwrap_or_default()
                .to_string();
            topology.domains.insert(
                domain.name.clone(),
                DomainTopology {
                    name: domain.name.clone(),
                    default_storage,
                    storages,
                },
            );
        }
        Ok(topology)
    }

    pub fn domain(&self, name: &str) -> Option<&DomainTopology> {
        self.domains.get(name)
    }

    pub fn domain_names(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    pub fn pool_names(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }

    pub fn storage_count(&self) -> usize {
        self.by_type.len()
    }

    pub fn storage_of_type(&self, storage_type: &str, name: &str) -> Option<&Arc<dyn DocumentStorage>> {
        self.by_type
            .get(&(storage_type.to_string(), name.to_string()))
    }

    pub fn storages_of_pool(&self, pool: &str) -> &[Arc<dyn DocumentStorage>] {
        self.pools.get(pool).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Per domain, the stores granted at least one of `features`
    pub fn storages_by_features(
        &self,
        features: &[Feature],
    ) -> BTreeMap<String, Vec<Arc<dyn DocumentStorage>>> {
        let mut result = BTreeMap::new();
        if features.is_empty() {
            return result;
        }
        for (name, domain) in &self.domains {
            let matching: Vec<_> = domain
                .storages
                .iter()
                .filter(|s| features.iter().any(|f| s.has_feature(f)))
                .cloned()
                .collect();
            if !matching.is_empty() {
                result.insert(name.clone(), matching);
            }
        }
        result
    }
}

/// Registry of configured document storages
#[derive(Debug)]
pub struct DocumentStorageRegistry {
    providers: StorageProviders,
    topology: RwLock<Arc<Topology>>,
}

impl DocumentStorageRegistry {
    /// A registry with no domains
    pub fn empty(providers: StorageProviders) -> Self {
        Self {
            providers,
            topology: RwLock::new(Arc::new(Topology::default())),
        }
    }

    pub fn from_config(config: &RegistryConfig, providers: StorageProviders) -> DocStoreResult<Self> {
        let topology = Topology::build(config, &providers)?;
        log_topology(Event::RegistryLoaded, &topology);
        Ok(Self {
            providers,
            topology: RwLock::new(Arc::new(topology)),
        })
    }

    /// Replace the topology. On error the current topology stays in place.
    pub fn reload(&self, config: &RegistryConfig) -> DocStoreResult<()> {
        let topology = Arc::new(Topology::build(config, &self.providers)?);
        log_topology(Event::RegistryReloaded, &topology);
        let mut current = self
            .topology
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = topology;
        Ok(())
    }

    /// The current topology
    pub fn snapshot(&self) -> Arc<Topology> {
        let current = self
            .topology
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }

    pub fn storage_of_type(&self, storage_type: &str, name: &str) -> Option<Arc<dyn DocumentStorage>> {
        self.snapshot().storage_of_type(storage_type, name).cloned()
    }

    /// `name == None` resolves to the domain default
    pub fn storage(&self, domain: Option<&str>, name: Option<&str>) -> Option<Arc<dyn DocumentStorage>> {
        let snapshot = self.snapshot();
        let domain = snapshot.domain(domain?)?;
        match name {
            Some(name) => domain.storage(name).cloned(),
            None => domain.default_storage().cloned(),
        }
    }

    pub fn storages_of_domain(&self, domain: &str) -> Vec<Arc<dyn DocumentStorage>> {
        self.snapshot()
            .domain(domain)
            .map(|d| d.storages.clone())
            .unwrap_or_default()
    }

    /// Members of `pool` across all domains
    pub fn storages_of_pool(&self, pool: &str) -> Vec<Arc<dyn DocumentStorage>> {
        self.snapshot().storages_of_pool(pool).to_vec()
    }

    pub fn storages_by_features(
        &self,
        features: &[Feature],
    ) -> BTreeMap<String, Vec<Arc<dyn DocumentStorage>>> {
        self.snapshot().storages_by_features(features)
    }

    pub fn domains(&self) -> Vec<String> {
        self.snapshot().domain_names()
    }

    pub fn pools(&self) -> Vec<String> {
        self.snapshot().pool_names()
    }

    /// Every feature granted to some store
    pub fn features(&self) -> Vec<Feature> {
        self.snapshot().features.iter().cloned().collect()
    }

    pub fn provider_type_names(&self) -> Vec<String> {
        self.providers.type_names()
    }
}

fn log_topology(event: Event, topology: &Topology) {
    let domains = topology.domains.len().to_string();
    let storages = topology.storage_count().to_string();
    let pools = topology.pools.len().to_string();
    log_event_with_fields(
        event,
        &[
            ("domains", domains.as_str()),
            ("storages", storages.as_str()),
            ("pools", pools.as_str()),
        ],
    );
}
