//! CLI command implementations
//!
//! Every command loads the configuration, builds the registry, runs one
//! operation and prints one JSON response.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend::{DocumentContent, DocumentStorage, UnmonitoredFreeSpace};
use crate::document::BaseDocument;
use crate::observability::{LogTarget, Logger, Severity};
use crate::registry::{DocumentStorageRegistry, RegistryConfig, StorageProviders};
use crate::store::DocumentStore;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_content, write_response};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cli: Cli) -> CliResult<()> {
    // stdout carries the response or the document bytes
    Logger::set_target(LogTarget::Stderr);
    let log_level = cli.log_level.as_deref();
    match cli.command {
        Command::Check { config } => check(&config, log_level),
        Command::Domains { config } => domains(&config, log_level),
        Command::Select {
            config,
            domain,
            pool,
        } => select(&config, log_level, &domain, pool.as_deref()),
        Command::Put {
            config,
            domain,
            file,
            uid,
            mime,
            pool,
        } => {
            let session = open_session(&config, log_level, &domain)?;
            let uid = uid.unwrap_or_else(|| Uuid::new_v4().to_string());
            let content = DocumentContent::from_file(file, mime.as_deref());
            write_response(put(&session, &uid, &content, pool.as_deref())?)
        }
        Command::Get {
            config,
            domain,
            uid,
            mime,
            out,
        } => {
            let session = open_session(&config, log_level, &domain)?;
            let document = get(&session, &uid, mime.as_deref())?;
            let content = document.read_all()?;
            write_content(out.as_deref(), &content)?;
            if out.is_some() {
                write_response(document_json(&document))?;
            }
            Ok(())
        }
        Command::Delete {
            config,
            domain,
            uid,
            pool,
        } => {
            let session = open_session(&config, log_level, &domain)?;
            write_response(delete(&session, &uid, pool.as_deref())?)
        }
        Command::Availability {
            config,
            domain,
            uid,
        } => {
            let session = open_session(&config, log_level, &domain)?;
            let availability = session.get_availability(&uid)?;
            write_response(json!({ "uid": uid, "availability": availability }))
        }
    }
}

/// Load config, apply the log level, build the registry
pub fn load_registry(
    config_path: &Path,
    log_level: Option<&str>,
) -> CliResult<(RegistryConfig, Arc<DocumentStorageRegistry>)> {
    let config = RegistryConfig::load(config_path)?;
    let severity = match log_level {
        Some(level) => level
            .parse::<Severity>()
            .map_err(|e| CliError::config_error(e.to_string()))?,
        None => config.severity()?,
    };
    Logger::set_min_severity(severity);

    let providers = StorageProviders::with_defaults(Arc::new(UnmonitoredFreeSpace));
    let registry = DocumentStorageRegistry::from_config(&config, providers)?;
    Ok((config, Arc::new(registry)))
}

fn open_session(config_path: &Path, log_level: Option<&str>, domain: &str) -> CliResult<DocumentStore> {
    let (_, registry) = load_registry(config_path, log_level)?;
    if !registry.domains().iter().any(|d| d.as_str() == domain) {
        return Err(CliError::not_found(format!("domain '{}'", domain)));
    }
    Ok(DocumentStore::new(registry, domain))
}

/// Validate the configuration and instantiate every store
pub fn check(config_path: &Path, log_level: Option<&str>) -> CliResult<()> {
    let (config, registry) = load_registry(config_path, log_level)?;
    let storages: usize = config.domains.iter().map(|d| d.storages.len()).sum();
    write_response(json!({
        "valid": true,
        "domains": registry.domains(),
        "pools": registry.pools(),
        "storages": storages,
        "providers": registry.provider_type_names(),
    }))
}

/// Topology with live availability
pub fn domains(config_path: &Path, log_level: Option<&str>) -> CliResult<()> {
    let (_, registry) = load_registry(config_path, log_level)?;
    let snapshot = registry.snapshot();
    let domains: Vec<Value> = registry
        .domains()
        .iter()
        .filter_map(|name| snapshot.domain(name))
        .map(|domain| {
            json!({
                "name": domain.name(),
                "default_storage": domain.default_storage().map(|s| s.name()),
                "storages": domain.storages().iter().map(storage_json).collect::<Vec<_>>(),
            })
        })
        .collect();
    write_response(json!({ "domains": domains }))
}

pub fn select(
    config_path: &Path,
    log_level: Option<&str>,
    domain: &str,
    pool: Option<&str>,
) -> CliResult<()> {
    let session = open_session(config_path, log_level, domain)?;
    let storage = session
        .select_from_pool_or_domain(pool)
        .ok_or_else(|| CliError::not_found(format!("storage for domain '{}'", domain)))?;
    write_response(storage_json(&storage))
}

pub fn put(
    session: &DocumentStore,
    uid: &str,
    content: &DocumentContent,
    pool: Option<&str>,
) -> CliResult<Value> {
    Ok(match session.store_document_in_pool(pool, uid, content)? {
        Some(document) => {
            let mut response = document_json(&document);
            response["created"] = Value::Bool(true);
            response
        }
        None => json!({ "uid": uid, "mime": content.mime_type(), "created": false }),
    })
}

pub fn get(session: &DocumentStore, uid: &str, mime: Option<&str>) -> CliResult<BaseDocument> {
    session
        .get_document(uid, mime)?
        .ok_or_else(|| CliError::not_found(format!("document '{}'", uid)))
}

pub fn delete(session: &DocumentStore, uid: &str, pool: Option<&str>) -> CliResult<Value> {
    let removed = match pool {
        Some(pool) => session.delete_document_in_pool(uid, pool)?,
        None => session.delete_document(uid)?,
    };
    Ok(json!({ "uid": uid, "removed": removed }))
}

fn storage_json(storage: &Arc<dyn DocumentStorage>) -> Value {
    json!({
        "name": storage.name(),
        "type": storage.storage_type(),
        "pool": storage.pool(),
        "features": storage.features(),
        "availability": storage.storage_availability(),
    })
}

fn document_json(document: &BaseDocument) -> Value {
    json!({
        "uid": document.uid(),
        "mime": document.mime_type(),
        "size": document.size(),
        "hash": document.hash(),
        "availability": document.availability(),
        "storage": document.storage().map(|s| s.name().to_string()),
        "created_at": document.created_at(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir) -> std::path::PathBuf {
        let config = json!({
            "log_level": "error",
            "domains": [
                { "name": "xds",
                  "storages": [
                    { "name": "fs1", "type": "filesystem",
                      "properties": { "base_dir": temp.path().join("fs1").to_string_lossy() } }
                  ] }
            ]
        });
        let path = temp.path().join("docstore.json");
        fs::write(&path, serde_json::to_vec(&config).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_put_then_delete() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp);
        let session = open_session(&config, None, "xds").unwrap();

        let file = temp.path().join("report.txt");
        fs::write(&file, b"report").unwrap();
        let content = DocumentContent::from_file(&file, Some("text/plain"));

        let first = put(&session, "1.2.3", &content, None).unwrap();
        assert_eq!(first["created"], true);
        assert_eq!(first["size"], 6);
        assert_eq!(first["availability"], "ONLINE");

        let second = put(&session, "1.2.3", &content, None).unwrap();
        assert_eq!(second["created"], false);

        assert_eq!(delete(&session, "1.2.3", None).unwrap()["removed"], true);
        assert_eq!(delete(&session, "1.2.3", None).unwrap()["removed"], false);
    }

    #[test]
    fn test_get_stored_content() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp);
        let session = open_session(&config, None, "xds").unwrap();

        let file = temp.path().join("image.dcm");
        fs::write(&file, b"\x00DICM\xff").unwrap();
        put(&session, "1.2.3", &DocumentContent::from_file(&file, None), None).unwrap();

        let document = get(&session, "1.2.3", None).unwrap();
        assert_eq!(document.read_all().unwrap(), b"\x00DICM\xff");

        let err = get(&session, "9.9.9", None).unwrap_err();
        assert_eq!(err.code_str(), "DOCSTORE_CLI_NOT_FOUND");
    }

    #[test]
    fn test_unknown_domain() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp);
        let err = open_session(&config, None, "wado").unwrap_err();
        assert_eq!(err.code_str(), "DOCSTORE_CLI_NOT_FOUND");
    }

    #[test]
    fn test_bad_log_level_override() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp);
        assert!(load_registry(&config, Some("loud")).is_err());
    }
}
