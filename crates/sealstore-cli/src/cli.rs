use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "sealstore",
    about = "Local key-value store encrypted at rest",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Path to the store file (overrides the config file).
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Seal with a generated master key wrapped by the OS keyring
    /// (or by SEALSTORE_WRAP_SECRET when set) instead of SEALSTORE_SECRET.
    #[arg(long, global = true)]
    pub wrapped: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the value stored under a key.
    Get { key: String },
    /// Store a value (parsed as JSON, otherwise kept as a string).
    Set { key: String, value: String },
    /// Remove a key.
    Delete { key: String },
    /// Add to a numeric value (non-numbers count as 0).
    Add {
        key: String,
        #[arg(allow_hyphen_values = true)]
        amount: f64,
    },
    /// Subtract from a numeric value (non-numbers count as 0).
    Subtract {
        key: String,
        #[arg(allow_hyphen_values = true)]
        amount: f64,
    },
    /// Append to a list (non-lists start empty).
    Push { key: String, value: String },
    /// List stored keys.
    List,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
