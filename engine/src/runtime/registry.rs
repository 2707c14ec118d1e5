//! Module runtime registry
//!
//! Owns the loaded-module table of one client session. Each module moves
//! through `manifest → compatibility → dependencies → code → screening →
//! execution`; any failing step leaves a record with `loaded == false` and the
//! reason, so failures stay visible to callers.
//!
//! Concurrent `load` calls for the same id share one in-flight attempt: the
//! manifest and code are fetched once and the script is evaluated once.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reportmate_modules::Screener;
use sdk::errors::{ErrorKind, ModuleError};
use sdk::manifest::{Category, ModuleManifest};
use semver::Version;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use super::compat;
use super::sandbox::{ModuleInstance, Sandbox};
use super::source::ModuleSource;

/// Runtime state of one module
#[derive(Debug, Clone)]
pub struct ModuleRuntime {
    pub manifest: ModuleManifest,
    pub loaded: bool,
    pub enabled: bool,
    pub instance: Option<Arc<ModuleInstance>>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub last_loaded: Option<DateTime<Utc>>,
}

impl ModuleRuntime {
    fn loaded(manifest: ModuleManifest, instance: ModuleInstance) -> Self {
        Self {
            manifest,
            loaded: true,
            enabled: true,
            instance: Some(Arc::new(instance)),
            error: None,
            error_kind: None,
            last_loaded: Some(Utc::now()),
        }
    }

    fn failed(manifest: ModuleManifest, err: &ModuleError) -> Self {
        Self {
            manifest,
            loaded: false,
            enabled: false,
            instance: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            last_loaded: None,
        }
    }
}

type LoadFuture = Shared<BoxFuture<'static, bool>>;

struct Inner {
    source: Arc<dyn ModuleSource>,
    sandbox: Sandbox,
    screener: Screener,
    host_version: Version,
    modules: RwLock<HashMap<String, ModuleRuntime>>,
    inflight: Mutex<HashMap<String, LoadFuture>>,
}

/// Cloneable handle to a session's loaded-module table
#[derive(Clone)]
pub struct ModuleRuntimeRegistry {
    inner: Arc<Inner>,
}

impl ModuleRuntimeRegistry {
    pub fn new(
        source: Arc<dyn ModuleSource>,
        sandbox: Sandbox,
        screener: Screener,
        host_version: Version,
    ) -> Self {
        info!("Initializing module runtime (host version {})", host_version);
        Self {
            inner: Arc::new(Inner {
                source,
                sandbox,
                screener,
                host_version,
                modules: RwLock::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn host_version(&self) -> &Version {
        &self.inner.host_version
    }

    /// Load every module in the server's enabled-set.
    ///
    /// Modules that fail on compatibility (typically a dependency listed later
    /// in the set) are retried while each round loads at least one module.
    /// Returns the number of loaded modules.
    pub async fn initialize(&self) -> Result<usize, ModuleError> {
        let mut pending = self.inner.source.enabled_modules().await?;
        info!("Initializing {} enabled module(s)", pending.len());

        loop {
            let mut retry = Vec::new();
            let mut progressed = false;

            for id in pending {
                if self.load(&id).await {
                    progressed = true;
                } else if self
                    .module(&id)
                    .await
                    .is_some_and(|m| m.error_kind == Some(ErrorKind::Compatibility))
                {
                    retry.push(id);
                }
            }

            if retry.is_empty() || !progressed {
                break;
            }
            pending = retry;
        }

        let loaded = self
            .inner
            .modules
            .read()
            .await
            .values()
            .filter(|m| m.loaded)
            .count();
        info!("{} module(s) loaded", loaded);
        Ok(loaded)
    }

    /// Load a module. Returns `true` once the module is loaded; failures are
    /// recorded in the module's runtime entry.
    pub async fn load(&self, module_id: &str) -> bool {
        if self.is_loaded(module_id).await {
            return true;
        }

        let attempt = {
            let mut inflight = self.inner.inflight.lock().await;
            match inflight.get(module_id) {
                Some(attempt) => attempt.clone(),
                None => {
                    // Another attempt may have finished between the check above and the lock
                    if self.is_loaded(module_id).await {
                        return true;
                    }

                    let inner = Arc::clone(&self.inner);
                    let id = module_id.to_string();
                    let attempt = async move {
                        let ok = inner.load_uncached(&id).await;
                        inner.inflight.lock().await.remove(&id);
                        ok
                    }
                    .boxed()
                    .shared();

                    inflight.insert(module_id.to_string(), attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Persist the enabled flag through the server, then flip the local flag
    /// and run the module's `on_enable` / `on_disable` hook. Modules are never
    /// unloaded.
    pub async fn toggle_module(&self, module_id: &str, enabled: bool) -> bool {
        if let Err(e) = self.inner.source.set_enabled(module_id, enabled).await {
            error!("Failed to toggle module {}: {}", module_id, e);
            return false;
        }

        let instance = {
            let mut modules = self.inner.modules.write().await;
            match modules.get_mut(module_id) {
                Some(runtime) => {
                    runtime.enabled = enabled;
                    runtime.instance.clone()
                }
                None => None,
            }
        };

        if let Some(instance) = instance {
            let hook = if enabled { "on_enable" } else { "on_disable" };
            if let Err(e) = instance.call_hook(hook) {
                warn!("Module {} hook {} failed: {}", module_id, hook, e);
            }
        }

        info!(
            "Module {} {}",
            module_id,
            if enabled { "enabled" } else { "disabled" }
        );
        true
    }

    /// Install through the server, then load
    pub async fn install(&self, module_id: &str, repository_id: &str) -> bool {
        if let Err(e) = self.inner.source.install(module_id, repository_id).await {
            error!("Failed to install module {}: {}", module_id, e);
            return false;
        }
        self.load(module_id).await
    }

    /// Drop the runtime entry, then uninstall through the server
    pub async fn uninstall(&self, module_id: &str) -> bool {
        self.inner.modules.write().await.remove(module_id);

        match self.inner.source.uninstall(module_id).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to uninstall module {}: {}", module_id, e);
                false
            }
        }
    }

    /// Snapshot of every runtime entry, sorted by id
    pub async fn get_loaded_modules(&self) -> Vec<ModuleRuntime> {
        let mut list: Vec<ModuleRuntime> =
            self.inner.modules.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
        list
    }

    /// Loaded modules of one category
    pub async fn modules_by_category(&self, category: Category) -> Vec<ModuleRuntime> {
        self.get_loaded_modules()
            .await
            .into_iter()
            .filter(|m| m.loaded && m.manifest.category == category)
            .collect()
    }

    pub async fn module(&self, module_id: &str) -> Option<ModuleRuntime> {
        self.inner.modules.read().await.get(module_id).cloned()
    }

    pub async fn is_loaded(&self, module_id: &str) -> bool {
        self.inner
            .modules
            .read()
            .await
            .get(module_id)
            .is_some_and(|m| m.loaded)
    }
}

impl Inner {
    async fn load_uncached(&self, module_id: &str) -> bool {
        info!("Loading module {}", module_id);

        let manifest = match self.source.fetch_manifest(module_id).await {
            Ok(manifest) => manifest,
            Err(e) => {
                self.record_failure(ModuleManifest::placeholder(module_id), e)
                    .await;
                return false;
            }
        };

        match self.prepare(module_id, &manifest).await {
            Ok(instance) => {
                info!("Loaded module {} v{}", manifest.id, manifest.version);
                self.modules.write().await.insert(
                    module_id.to_string(),
                    ModuleRuntime::loaded(manifest, instance),
                );
                true
            }
            Err(e) => {
                self.record_failure(manifest, e).await;
                false
            }
        }
    }

    async fn prepare(
        &self,
        module_id: &str,
        manifest: &ModuleManifest,
    ) -> Result<ModuleInstance, ModuleError> {
        if manifest.id != module_id {
            return Err(ModuleError::Validation(format!(
                "manifest declares id '{}', expected '{}'",
                manifest.id, module_id
            )));
        }

        compat::check_compatibility(manifest, &self.host_version)?;

        {
            let modules = self.modules.read().await;
            let is_loaded = |id: &str| modules.get(id).is_some_and(|m| m.loaded);
            compat::check_dependencies(manifest, is_loaded)?;
            for peer in compat::unloaded_peers(manifest, is_loaded) {
                warn!("Module {} expects peer {} which is not loaded", module_id, peer);
            }
        }

        let code = self.source.fetch_bundle(module_id).await?;
        self.screener.check(manifest, &code)?;
        self.sandbox.execute(&code, manifest)
    }

    async fn record_failure(&self, manifest: ModuleManifest, err: ModuleError) {
        error!("Failed to load module {}: {}", manifest.id, err);
        let id = manifest.id.clone();
        self.modules
            .write()
            .await
            .insert(id, ModuleRuntime::failed(manifest, &err));
    }
}
