//! Command definitions.

pub mod completions;
pub mod patch;
pub mod serve;
pub mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::logging::LogFormat;

/// gitward - GitOps sync and patch engine.
#[derive(Debug, Parser)]
#[command(name = "gitward", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = gitward_core::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log level, overridden by RUST_LOG.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the GitOps API and reconcile repositories periodically.
    Serve,

    /// Run one reconciliation pass.
    Sync {
        /// Only reconcile this repository.
        #[arg(long)]
        repository: Option<String>,
    },

    /// Apply or delete the objects in a local file through a GitOps API.
    Patch {
        /// API resource as NAMESPACE/NAME.
        #[arg(long)]
        api: String,

        /// Delete the objects instead of applying them.
        #[arg(long)]
        delete: bool,

        /// JSON or YAML file with one or more objects.
        file: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
