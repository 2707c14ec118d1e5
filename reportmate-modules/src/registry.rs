//! Registry of module source locations and their trust flags

use sdk::errors::ModuleError;
use sdk::types::{ModuleRepository, NewRepository, RepositoryKind, DEFAULT_BRANCH};
use std::sync::Arc;
use tracing::info;

use crate::source::{validate_git_ref, RepoLocation};
use crate::store::ModuleStore;

/// Sources registered when no repositories record exists yet
pub fn default_repositories() -> Vec<ModuleRepository> {
    vec![
        ModuleRepository {
            id: "official".to_string(),
            name: "Official ReportMate Modules".to_string(),
            url: "https://github.com/reportmate/reportmate-modules".to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            official: true,
            verified: true,
            enabled: true,
            kind: RepositoryKind::Registry,
            description: Some("Official modules maintained by the ReportMate team".to_string()),
            author: None,
            version: None,
            last_updated: None,
        },
        ModuleRepository {
            id: "community".to_string(),
            name: "Community Modules".to_string(),
            url: "https://github.com/reportmate/community-modules".to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            official: false,
            verified: true,
            enabled: true,
            kind: RepositoryKind::Registry,
            description: Some("Community-contributed modules".to_string()),
            author: None,
            version: None,
            last_updated: None,
        },
    ]
}

/// Registry of module repositories persisted in the module store
#[derive(Debug, Clone)]
pub struct RepositoryRegistry {
    store: Arc<ModuleStore>,
}

impl RepositoryRegistry {
    pub fn new(store: Arc<ModuleStore>) -> Self {
        Self { store }
    }

    /// All registered repositories (seeded with the defaults on first use)
    pub async fn list(&self) -> Result<Vec<ModuleRepository>, ModuleError> {
        match self.store.load_repositories().await? {
            Some(list) => Ok(list),
            None => {
                self.store
                    .update_repositories(default_repositories, |list| list.clone())
                    .await
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ModuleRepository>, ModuleError> {
        Ok(self.list().await?.into_iter().find(|r| r.id == id))
    }

    /// Register a repository and return its server-assigned id.
    ///
    /// Duplicate URLs are not detected; callers that care de-duplicate first.
    pub async fn add(&self, repo: NewRepository) -> Result<String, ModuleError> {
        if repo.name.trim().is_empty() {
            return Err(ModuleError::Validation(
                "Repository name must not be empty".to_string(),
            ));
        }
        RepoLocation::parse(&repo.url)?;

        let branch = repo
            .branch
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        validate_git_ref(&branch)?;

        let entry = ModuleRepository {
            id: uuid::Uuid::new_v4().to_string(),
            name: repo.name,
            url: repo.url,
            branch,
            official: false,
            verified: false,
            enabled: repo.enabled,
            kind: repo.kind,
            description: repo.description,
            author: repo.author,
            version: None,
            last_updated: None,
        };
        let id = entry.id.clone();

        info!("Registering repository {} ({})", entry.name, entry.url);
        self.store
            .update_repositories(default_repositories, move |list| list.push(entry))
            .await?;
        Ok(id)
    }

    /// Remove a repository. Absent ids are not an error.
    pub async fn remove(&self, id: &str) -> Result<(), ModuleError> {
        let removed = self
            .store
            .update_repositories(default_repositories, |list| {
                let before = list.len();
                list.retain(|r| r.id != id);
                before != list.len()
            })
            .await?;

        if removed {
            info!("Removed repository {}", id);
        }
        Ok(())
    }

    /// Enable or disable a repository
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), ModuleError> {
        let found = self
            .store
            .update_repositories(default_repositories, |list| {
                list.iter_mut()
                    .find(|r| r.id == id)
                    .map(|r| r.enabled = enabled)
                    .is_some()
            })
            .await?;

        if found {
            info!(
                "Repository {} {}",
                id,
                if enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        } else {
            Err(ModuleError::RepositoryNotFound(id.to_string()))
        }
    }
}
