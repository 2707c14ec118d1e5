//! Fetches and validates module manifests from repositories

use sdk::errors::ModuleError;
use sdk::manifest::ModuleManifest;
use sdk::types::{ModuleRepository, RepositoryKind};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::source::SourceClient;

/// Manifest file name inside a module directory
pub const MANIFEST_PATH: &str = "manifest.json";

/// Module index file of multi-module repositories
pub const INDEX_PATH: &str = "modules.json";

#[derive(Debug, Deserialize)]
struct ModuleIndex {
    #[serde(default)]
    modules: Vec<serde_json::Value>,
}

/// Resolves manifests from remote repositories. Stateless: every call re-fetches.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    client: SourceClient,
}

impl ManifestResolver {
    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SourceClient {
        &self.client
    }

    /// Resolve the root manifest of a single-module repository.
    ///
    /// Returns `Ok(None)` when the remote has no manifest at that ref and
    /// `ManifestInvalid` when the document lacks `id`, `name` or `version`.
    pub async fn resolve(
        &self,
        repo_url: &str,
        git_ref: &str,
    ) -> Result<Option<ModuleManifest>, ModuleError> {
        self.resolve_at(repo_url, git_ref, MANIFEST_PATH).await
    }

    /// Resolve a manifest stored at `path` inside the repository
    pub async fn resolve_at(
        &self,
        repo_url: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<ModuleManifest>, ModuleError> {
        match self.client.fetch_file(repo_url, git_ref, path).await? {
            Some(body) => ModuleManifest::from_json(&body).map(Some),
            None => Ok(None),
        }
    }

    /// Manifest location of `module_id` inside a repository of the given kind
    pub fn manifest_path(kind: RepositoryKind, module_id: &str) -> String {
        match kind {
            RepositoryKind::Single => MANIFEST_PATH.to_string(),
            RepositoryKind::Registry => format!("modules/{}/{}", module_id, MANIFEST_PATH),
        }
    }

    /// Code entry point path, relative to the repository root
    pub fn entry_path(kind: RepositoryKind, manifest: &ModuleManifest) -> String {
        match kind {
            RepositoryKind::Single => manifest.main.clone(),
            RepositoryKind::Registry => format!("modules/{}/{}", manifest.id, manifest.main),
        }
    }

    /// Manifests listed in the `modules.json` index of a multi-module repository.
    /// Entries that fail validation are skipped.
    pub async fn fetch_index(
        &self,
        repo: &ModuleRepository,
    ) -> Result<Vec<ModuleManifest>, ModuleError> {
        let Some(body) = self
            .client
            .fetch_file(&repo.url, &repo.branch, INDEX_PATH)
            .await?
        else {
            return Err(ModuleError::ModuleNotFound(format!(
                "{} has no {}",
                repo.url, INDEX_PATH
            )));
        };

        let index: ModuleIndex = serde_json::from_str(&body)
            .map_err(|e| ModuleError::ManifestInvalid(format!("{}: {}", INDEX_PATH, e)))?;

        Ok(index
            .modules
            .into_iter()
            .filter_map(|value| match ModuleManifest::from_value(value) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!("Skipping index entry in {}: {}", repo.url, e);
                    None
                }
            })
            .collect())
    }

    /// Discover official single-module repositories (`<prefix><name>`) of an organisation
    pub async fn discover_official(
        &self,
        org: &str,
        prefix: &str,
    ) -> Result<Vec<ModuleManifest>, ModuleError> {
        let repos = self.client.list_org_repositories(org).await?;
        let mut manifests = Vec::new();

        for repo in repos.into_iter().filter(|r| r.name.starts_with(prefix)) {
            let branch = repo.default_branch.as_deref().unwrap_or("main");
            match self.resolve(&repo.html_url, branch).await {
                Ok(Some(mut manifest)) => {
                    manifest.official = true;
                    manifest.repository = repo.html_url.clone();
                    manifests.push(manifest);
                }
                Ok(None) => debug!("{} has no manifest, skipping", repo.name),
                Err(e) => warn!("Failed to load manifest from {}: {}", repo.name, e),
            }
        }

        Ok(manifests)
    }

    /// All modules available from official discovery plus the enabled repositories.
    /// Individual source failures are logged and skipped.
    pub async fn discover(&self, repositories: &[ModuleRepository]) -> Vec<ModuleManifest> {
        let settings = self.client.settings();
        let mut all = match self
            .discover_official(&settings.official_org, &settings.module_prefix)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!("Official module discovery failed: {}", e);
                Vec::new()
            }
        };

        for repo in repositories.iter().filter(|r| r.enabled) {
            let found = match repo.kind {
                RepositoryKind::Single => self
                    .resolve(&repo.url, &repo.branch)
                    .await
                    .map(|m| m.into_iter().collect()),
                RepositoryKind::Registry => self.fetch_index(repo).await,
            };
            match found {
                Ok(manifests) => all.extend(manifests.into_iter().map(|mut m| {
                    if m.repository.is_empty() {
                        m.repository = repo.url.clone();
                    }
                    m
                })),
                Err(e) => warn!("Failed to fetch modules from {}: {}", repo.name, e),
            }
        }

        all
    }
}
