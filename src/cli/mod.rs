//! CLI module for docstore
//!
//! Provides command-line interface for:
//! - check: validate configuration and instantiate stores
//! - domains: list the topology with live availability
//! - select: show the store a write would use
//! - put / get / delete: document operations
//! - availability: document reachability

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, domains, load_registry, run, run_command, select};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_content, write_response};
