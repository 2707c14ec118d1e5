//! ReportMate module SDK
//!
//! Shared data model for the module subsystem: manifests, repository records,
//! HTTP wire bodies and the error taxonomy. Used by the server-side installer,
//! the HTTP surface and the client runtime.

/// Error types and handling
pub mod errors;

/// Manifest types
pub mod manifest;

/// Repository records and wire bodies
pub mod types;

pub use errors::{ErrorKind, ModuleError, ModuleErrorExt};
pub use manifest::{Category, ModuleManifest};
pub use types::{
    ErrorResponse, InstallRequest, ModuleRepository, NewRepository, RepositoryKind,
    SuccessResponse, ToggleRequest,
};
