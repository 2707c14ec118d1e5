//! Error types and handling
//!
//! Every failure in the module subsystem is a [`ModuleError`]. Each variant
//! belongs to one [`ErrorKind`], which decides how callers react: not-found
//! conditions are no-ops or 404s, validation and security failures are never
//! retried, transport failures can be retried by repeating the whole call.
//!
//! All errors implement [`ModuleErrorExt`], which provides a user-facing hint
//! and tells whether the failure is recoverable.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{ErrorKind, ModuleError, ModuleErrorExt};
//!
//! let error = ModuleError::MissingDependencies {
//!     module_id: "a".to_string(),
//!     missing: vec!["b".to_string(), "c".to_string()],
//! };
//! assert_eq!(error.kind(), ErrorKind::Compatibility);
//! assert!(error.is_recoverable());
//! assert!(error.to_string().contains("b, c"));
//! ```

use thiserror::Error;

/// Trait for module error extensions
pub trait ModuleErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error can be resolved by retrying or by caller action
    fn is_recoverable(&self) -> bool;
}

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Security,
    Compatibility,
    Execution,
    Transport,
    Storage,
}

/// Main module subsystem error type
#[derive(Debug, Error)]
pub enum ModuleError {
    // Not found
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    // Validation
    #[error("Repository is disabled: {0}")]
    RepositoryDisabled(String),

    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Security
    #[error("Module {module_id} rejected by security screening: {reason}")]
    SecurityRejected { module_id: String, reason: String },

    // Compatibility
    #[error("Module {module_id} is not compatible with host version {host_version}: {reason}")]
    IncompatibleModule {
        module_id: String,
        host_version: String,
        reason: String,
    },

    #[error("Module {module_id} has missing dependencies: {}", .missing.join(", "))]
    MissingDependencies {
        module_id: String,
        missing: Vec<String>,
    },

    // Execution
    #[error("Module execution failed: {0}")]
    Execution(String),

    // Transport
    #[error("Transport error: {0}")]
    Transport(String),

    // Local storage
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RepositoryNotFound(_) | Self::ModuleNotFound(_) => ErrorKind::NotFound,
            Self::RepositoryDisabled(_) | Self::ManifestInvalid(_) | Self::Validation(_) => {
                ErrorKind::Validation
            }
            Self::SecurityRejected { .. } => ErrorKind::Security,
            Self::IncompatibleModule { .. } | Self::MissingDependencies { .. } => {
                ErrorKind::Compatibility
            }
            Self::Execution(_) => ErrorKind::Execution,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Storage(_) | Self::Config(_) | Self::Io(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl ModuleErrorExt for ModuleError {
    fn user_hint(&self) -> &str {
        match self {
            Self::RepositoryNotFound(_) => "Register the repository before installing from it",
            Self::ModuleNotFound(_) => "Check the module id and the repository branch",
            Self::RepositoryDisabled(_) => "Enable the repository first",
            Self::ManifestInvalid(_) => "The module manifest is malformed. Contact its author",
            Self::Validation(_) => "Check the request parameters",
            Self::SecurityRejected { .. } => {
                "Module failed security verification and will not be loaded"
            }
            Self::IncompatibleModule { .. } => {
                "Upgrade the dashboard or pick a compatible module version"
            }
            Self::MissingDependencies { .. } => "Install and load the listed dependencies first",
            Self::Execution(_) => "Module code failed to start. Check module logs",
            Self::Transport(_) => "Network operation failed. Check your connection and retry",
            Self::Storage(_) | Self::Io(_) => "Module storage operation failed",
            Self::Config(_) => "Check your config.toml file for errors",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::SecurityRejected { .. } | Self::ManifestInvalid(_) | Self::Validation(_)
        )
    }
}
