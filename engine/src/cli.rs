//! CLI interface for ReportMate module management
//!
//! Defines all commands and global flags using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ReportMate module manager
///
/// Manages module repositories, installs and screens modules, serves the
/// module API and runs client sessions against it.
#[derive(Parser, Debug)]
#[command(name = "reportmate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the module API until interrupted
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage module repositories
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Install a module from a repository
    Install {
        /// Module id
        module_id: String,

        /// Repository id
        #[arg(short, long, default_value = "official")]
        repository: String,
    },

    /// Uninstall a module
    Uninstall {
        /// Module id
        module_id: String,
    },

    /// Show the enabled-module set
    Enabled,

    /// List modules available from enabled repositories
    Discover,

    /// Start a client session against the module API and print module states
    Load {
        /// Load only these modules instead of the enabled-set
        modules: Vec<String>,

        /// Override the configured API base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
    },
}

/// Repository management actions
#[derive(Subcommand, Debug)]
pub enum RepoAction {
    /// List all repositories
    List,

    /// Register a repository
    Add {
        /// Display name
        name: String,

        /// Repository URL (https://github.com/<owner>/<name>)
        url: String,

        /// Branch to fetch from
        #[arg(short, long)]
        branch: Option<String>,

        /// Repository hosts several modules under `modules/<id>/`
        #[arg(long)]
        registry: bool,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Remove a repository
    Remove {
        /// Repository id
        id: String,
    },

    /// Enable a repository
    Enable {
        /// Repository id
        id: String,
    },

    /// Disable a repository
    Disable {
        /// Repository id
        id: String,
    },
}
