//! CLI argument definitions using clap
//!
//! Commands:
//! - docstore check --config <path>
//! - docstore domains --config <path>
//! - docstore select --domain <d> [--pool <p>]
//! - docstore put --domain <d> --file <f> [--uid <u>] [--mime <m>] [--pool <p>]
//! - docstore get --domain <d> --uid <u> [--mime <m>] [--out <f>]
//! - docstore delete --domain <d> --uid <u> [--pool <p>]
//! - docstore availability --domain <d> --uid <u>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docstore - availability-aware document storage
#[derive(Parser, Debug)]
#[command(name = "docstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity; overrides the config's log_level
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate the configuration, instantiate every store
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./docstore.json")]
        config: PathBuf,
    },

    /// List domains with their stores and live availability
    Domains {
        /// Path to configuration file
        #[arg(long, default_value = "./docstore.json")]
        config: PathBuf,
    },

    /// Show which store a write would go to
    Select {
        #[arg(long, default_value = "./docstore.json")]
        config: PathBuf,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        pool: Option<String>,
    },

    /// Store a file as a document
    Put {
        #[arg(long, default_value = "./docstore.json")]
        config: PathBuf,

        #[arg(long)]
        domain: String,

        /// File holding the content
        #[arg(long)]
        file: PathBuf,

        /// Document uid (generated when omitted)
        #[arg(long)]
        uid: Option<String>,

        #[arg(long)]
        mime: Option<String>,

        #[arg(long)]
        pool: Option<String>,
    },

    /// Fetch a document
    Get {
        #[arg(long, default_value = "./docstore.json")]
        config: PathBuf,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        uid: String,

        #[arg(long)]
        mime: Option<String>,

        /// Write content here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Delete every variant of a document
    Delete {
        #[arg(long, default_value = "./docstore.json")]
        config: PathBuf,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        uid: String,

        #[arg(long)]
        pool: Option<String>,
    },

    /// Report the availability of a document
    Availability {
        #[arg(long, default_value = "./docstore.json")]
        config: PathBuf,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        uid: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
