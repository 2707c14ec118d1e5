//! Module installer and uninstaller

use sdk::errors::ModuleError;
use sdk::manifest::ModuleManifest;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::registry::RepositoryRegistry;
use crate::resolver::ManifestResolver;
use crate::store::ModuleStore;
use crate::verifier::Screener;
use crate::TrustTier;

/// Result of a successful install
#[derive(Debug, Clone)]
pub struct InstalledModule {
    pub manifest: ModuleManifest,
    pub path: PathBuf,
    pub trust: TrustTier,
}

/// Server-side installer over the module store
#[derive(Debug, Clone)]
pub struct Installer {
    store: Arc<ModuleStore>,
    registry: RepositoryRegistry,
    resolver: ManifestResolver,
    screener: Screener,
}

impl Installer {
    pub fn new(
        store: Arc<ModuleStore>,
        resolver: ManifestResolver,
        screener: Screener,
    ) -> Self {
        Self {
            registry: RepositoryRegistry::new(Arc::clone(&store)),
            store,
            resolver,
            screener,
        }
    }

    pub fn registry(&self) -> &RepositoryRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ModuleStore {
        &self.store
    }

    /// Install `module_id` from the repository `repository_id`.
    ///
    /// Nothing is written unless the code passes screening. Re-installing
    /// overwrites the persisted files and leaves the enabled-set unchanged.
    pub async fn install(
        &self,
        module_id: &str,
        repository_id: &str,
    ) -> Result<InstalledModule, ModuleError> {
        let result = self.install_inner(module_id, repository_id).await;
        if let Err(e) = &result {
            error!("Install of {} from {} failed: {}", module_id, repository_id, e);
        }
        result
    }

    async fn install_inner(
        &self,
        module_id: &str,
        repository_id: &str,
    ) -> Result<InstalledModule, ModuleError> {
        sdk::manifest::validate_module_id(module_id)?;

        let repo = self
            .registry
            .get(repository_id)
            .await?
            .ok_or_else(|| ModuleError::RepositoryNotFound(repository_id.to_string()))?;
        if !repo.enabled {
            return Err(ModuleError::RepositoryDisabled(repository_id.to_string()));
        }

        info!("Installing {} from {} ({})", module_id, repo.name, repo.url);

        let manifest_path = ManifestResolver::manifest_path(repo.kind, module_id);
        let mut manifest = self
            .resolver
            .resolve_at(&repo.url, &repo.branch, &manifest_path)
            .await?
            .ok_or_else(|| {
                ModuleError::ModuleNotFound(format!("{} in {}", module_id, repo.url))
            })?;

        if manifest.id != module_id {
            return Err(ModuleError::Validation(format!(
                "Manifest at {} declares id '{}', expected '{}'",
                manifest_path, manifest.id, module_id
            )));
        }

        let entry_path = ManifestResolver::entry_path(repo.kind, &manifest);
        let code = self
            .resolver
            .client()
            .fetch_file(&repo.url, &repo.branch, &entry_path)
            .await?
            .ok_or_else(|| {
                ModuleError::ModuleNotFound(format!("{} has no code at {}", module_id, entry_path))
            })?;

        self.screener.check(&manifest, &code)?;

        if manifest.repository.is_empty() {
            manifest.repository = repo.url.clone();
        }
        manifest.official = repo.official;

        let path = self.store.write_module(&manifest, &code).await?;
        self.store
            .update_enabled(|set| {
                if set.iter().any(|id| id == module_id) {
                    false
                } else {
                    set.push(module_id.to_string());
                    true
                }
            })
            .await?;

        let trust = TrustTier::for_repository(&repo);
        info!(
            "Installed {} v{} ({:?}) to {}",
            manifest.id,
            manifest.version,
            trust,
            path.display()
        );

        Ok(InstalledModule {
            manifest,
            path,
            trust,
        })
    }

    /// Remove a module's files and drop it from the enabled-set.
    /// Succeeds when the module was never installed.
    pub async fn uninstall(&self, module_id: &str) -> Result<(), ModuleError> {
        let removed = self.store.remove_module(module_id).await?;
        self.store
            .update_enabled(|set| {
                let before = set.len();
                set.retain(|id| id != module_id);
                before != set.len()
            })
            .await?;

        if removed {
            info!("Uninstalled {}", module_id);
        } else {
            warn!("Uninstall of {}: nothing was installed", module_id);
        }
        Ok(())
    }

    /// Add or remove a module in the enabled-set. Only installed modules can
    /// be enabled.
    pub async fn set_enabled(&self, module_id: &str, enabled: bool) -> Result<(), ModuleError> {
        if enabled && !self.store.is_installed(module_id).await? {
            return Err(ModuleError::ModuleNotFound(module_id.to_string()));
        }

        self.store
            .update_enabled(|set| {
                let present = set.iter().any(|id| id == module_id);
                match (enabled, present) {
                    (true, false) => {
                        set.push(module_id.to_string());
                        true
                    }
                    (false, true) => {
                        set.retain(|id| id != module_id);
                        true
                    }
                    _ => false,
                }
            })
            .await?;

        info!(
            "Module {} {}",
            module_id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub async fn enabled_modules(&self) -> Result<Vec<String>, ModuleError> {
        self.store.enabled_modules().await
    }

    pub async fn installed_manifest(
        &self,
        module_id: &str,
    ) -> Result<Option<ModuleManifest>, ModuleError> {
        self.store.read_manifest(module_id).await
    }

    pub async fn installed_bundle(&self, module_id: &str) -> Result<Option<String>, ModuleError> {
        self.store.read_bundle(module_id).await
    }

    /// Modules available from official discovery and the enabled repositories
    pub async fn available(&self) -> Result<Vec<ModuleManifest>, ModuleError> {
        let repositories = self.registry.list().await?;
        Ok(self.resolver.discover(&repositories).await)
    }
}
