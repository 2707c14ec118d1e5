//! File-backed module store
//!
//! Layout under the modules directory:
//!
//! ```text
//! config.json                  {"enabledModules": [...]}
//! repositories.json            [ModuleRepository, ...]
//! installed/<id>/manifest.json
//! installed/<id>/bundle.rhai
//! ```
//!
//! Module directories live apart from the records, so no module id can
//! alias `config.json`, `repositories.json` or their temporary siblings.
//!
//! Read-modify-write updates of the enabled-set and the repository list are
//! serialized by an async lock, so concurrent requests inside one server
//! process never lose updates. Writers in other processes still race (last
//! writer wins). Every file is written to a temporary sibling first and
//! renamed into place.

use sdk::errors::ModuleError;
use sdk::manifest::{validate_module_id, ModuleManifest};
use sdk::types::ModuleRepository;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const CONFIG_FILE: &str = "config.json";
const REPOSITORIES_FILE: &str = "repositories.json";
const MANIFEST_FILE: &str = "manifest.json";
const BUNDLE_FILE: &str = "bundle.rhai";
const INSTALLED_DIR: &str = "installed";

/// Persisted configuration record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulesConfig {
    #[serde(default)]
    pub enabled_modules: Vec<String>,
}

/// File-backed store for repositories, enabled-set and installed modules
#[derive(Debug)]
pub struct ModuleStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl ModuleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default location (~/.reportmate/modules)
    pub fn default_root() -> Result<PathBuf, ModuleError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ModuleError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(".reportmate").join("modules"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage directory of one module. Rejects ids that could escape the root.
    pub fn module_dir(&self, module_id: &str) -> Result<PathBuf, ModuleError> {
        validate_module_id(module_id)?;
        Ok(self.root.join(INSTALLED_DIR).join(module_id))
    }

    // ---- enabled-set -------------------------------------------------

    pub async fn load_config(&self) -> Result<ModulesConfig, ModuleError> {
        Ok(self
            .read_json::<ModulesConfig>(&self.root.join(CONFIG_FILE))
            .await?
            .unwrap_or_default())
    }

    pub async fn enabled_modules(&self) -> Result<Vec<String>, ModuleError> {
        Ok(self.load_config().await?.enabled_modules)
    }

    /// Apply `update` to the enabled-set under the write lock. The record is
    /// only rewritten when `update` reports a change.
    pub async fn update_enabled<F>(&self, update: F) -> Result<Vec<String>, ModuleError>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load_config().await?;
        if update(&mut config.enabled_modules) {
            self.write_json(&self.root.join(CONFIG_FILE), &config)
                .await?;
        }
        Ok(config.enabled_modules)
    }

    // ---- repositories --------------------------------------------------

    /// Load the repository list; `None` when no record has been written yet
    pub async fn load_repositories(&self) -> Result<Option<Vec<ModuleRepository>>, ModuleError> {
        self.read_json(&self.root.join(REPOSITORIES_FILE)).await
    }

    /// Apply `update` to the repository list under the write lock.
    ///
    /// `seed` provides the list used when no record exists yet.
    pub async fn update_repositories<F, R>(
        &self,
        seed: impl FnOnce() -> Vec<ModuleRepository>,
        update: F,
    ) -> Result<R, ModuleError>
    where
        F: FnOnce(&mut Vec<ModuleRepository>) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let mut repositories = match self.load_repositories().await? {
            Some(list) => list,
            None => seed(),
        };
        let result = update(&mut repositories);
        self.write_json(&self.root.join(REPOSITORIES_FILE), &repositories)
            .await?;
        Ok(result)
    }

    // ---- installed modules -------------------------------------------

    /// Persist manifest and code bundle of a module, replacing earlier files
    pub async fn write_module(
        &self,
        manifest: &ModuleManifest,
        code: &str,
    ) -> Result<PathBuf, ModuleError> {
        let dir = self.module_dir(&manifest.id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let json = manifest
            .to_json()
            .map_err(|e| ModuleError::Storage(format!("Failed to serialize manifest: {}", e)))?;
        write_atomic(&dir.join(MANIFEST_FILE), json.as_bytes()).await?;
        write_atomic(&dir.join(BUNDLE_FILE), code.as_bytes()).await?;
        Ok(dir)
    }

    pub async fn read_manifest(
        &self,
        module_id: &str,
    ) -> Result<Option<ModuleManifest>, ModuleError> {
        let path = self.module_dir(module_id)?.join(MANIFEST_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => ModuleManifest::from_json(&contents).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_bundle(&self, module_id: &str) -> Result<Option<String>, ModuleError> {
        let path = self.module_dir(module_id)?.join(BUNDLE_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(code) => Ok(Some(code)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Both manifest and bundle are present
    pub async fn is_installed(&self, module_id: &str) -> Result<bool, ModuleError> {
        let dir = self.module_dir(module_id)?;
        Ok(tokio::fs::try_exists(dir.join(MANIFEST_FILE)).await?
            && tokio::fs::try_exists(dir.join(BUNDLE_FILE)).await?)
    }

    /// Remove a module's directory. Missing state is not an error.
    pub async fn remove_module(&self, module_id: &str) -> Result<bool, ModuleError> {
        let dir = self.module_dir(module_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ---- helpers -------------------------------------------------------

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
    ) -> Result<Option<T>, ModuleError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents).map(Some).map_err(|e| {
            ModuleError::Storage(format!("Corrupt record {}: {}", path.display(), e))
        })
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), ModuleError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| ModuleError::Storage(format!("Failed to serialize record: {}", e)))?;
        tokio::fs::create_dir_all(&self.root).await?;
        write_atomic(path, json.as_bytes()).await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ModuleError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
