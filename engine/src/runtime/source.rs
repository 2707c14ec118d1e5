//! Where a runtime session gets modules from

use async_trait::async_trait;
use sdk::errors::ModuleError;
use sdk::manifest::ModuleManifest;

/// Server-side operations a runtime session depends on
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Ids in the persisted enabled-set
    async fn enabled_modules(&self) -> Result<Vec<String>, ModuleError>;

    /// Installed manifest; `ModuleNotFound` when not installed
    async fn fetch_manifest(&self, module_id: &str) -> Result<ModuleManifest, ModuleError>;

    /// Installed code bundle; `ModuleNotFound` when not installed
    async fn fetch_bundle(&self, module_id: &str) -> Result<String, ModuleError>;

    /// Persist the enabled flag
    async fn set_enabled(&self, module_id: &str, enabled: bool) -> Result<(), ModuleError>;

    async fn install(&self, module_id: &str, repository_id: &str) -> Result<(), ModuleError>;

    async fn uninstall(&self, module_id: &str) -> Result<(), ModuleError>;
}
