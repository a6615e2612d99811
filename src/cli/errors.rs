//! CLI-specific error types

use std::fmt;
use std::io;

use crate::errors::{DocStoreError, ErrorCategory};

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file or topology error
    ConfigError,
    /// I/O error (stdin/stdout, local files)
    IoError,
    /// Rejected request (bad uid, duplicate, ...)
    RequestError,
    /// Storage back-end fault
    StorageError,
    /// Document not found
    NotFound,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DOCSTORE_CLI_CONFIG_ERROR",
            Self::IoError => "DOCSTORE_CLI_IO_ERROR",
            Self::RequestError => "DOCSTORE_CLI_REQUEST_ERROR",
            Self::StorageError => "DOCSTORE_CLI_STORAGE_ERROR",
            Self::NotFound => "DOCSTORE_CLI_NOT_FOUND",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(CliErrorCode::NotFound, format!("{} not found", what))
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<DocStoreError> for CliError {
    fn from(e: DocStoreError) -> Self {
        let code = match (&e, e.category()) {
            (DocStoreError::DocumentNotFound(_), _) => CliErrorCode::NotFound,
            (_, ErrorCategory::Configuration) => CliErrorCode::ConfigError,
            (_, ErrorCategory::Client) | (_, ErrorCategory::Invariant) => {
                CliErrorCode::RequestError
            }
            (_, ErrorCategory::Infrastructure) => CliErrorCode::StorageError,
        };
        Self::new(code, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
