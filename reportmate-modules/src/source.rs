//! Remote code-hosting client
//!
//! Converts human-facing repository URLs (`https://github.com/<owner>/<repo>`)
//! into raw-content URLs and fetches files and API listings.

use reqwest::{StatusCode, Url};
use sdk::errors::ModuleError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("reportmate-modules/", env!("CARGO_PKG_VERSION"));

/// Remote source settings (the `[sources]` config section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Base URL serving raw file content at a ref
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    /// Base URL of the code-hosting REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Organisation hosting official modules
    #[serde(default = "default_official_org")]
    pub official_org: String,

    /// Repository name prefix of official single-module repositories
    #[serde(default = "default_module_prefix")]
    pub module_prefix: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            raw_base_url: default_raw_base_url(),
            api_base_url: default_api_base_url(),
            official_org: default_official_org(),
            module_prefix: default_module_prefix(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_official_org() -> String {
    "reportmate".to_string()
}

fn default_module_prefix() -> String {
    "reportmate-module-".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

/// Owner/name pair parsed from a repository URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub owner: String,
    pub name: String,
}

impl RepoLocation {
    /// Parse `https://github.com/<owner>/<repo>[.git][/]`
    pub fn parse(repo_url: &str) -> Result<Self, ModuleError> {
        let invalid = || {
            ModuleError::Validation(format!(
                "'{}' is not a recognized repository URL (expected https://github.com/<owner>/<repo>)",
                repo_url
            ))
        };

        let url = Url::parse(repo_url.trim()).map_err(|_| invalid())?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid());
        }
        match url.host_str() {
            Some("github.com") | Some("www.github.com") => {}
            _ => return Err(invalid()),
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid());
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let (owner, name) = match segments.as_slice() {
            [owner, name] => (*owner, *name),
            _ => return Err(invalid()),
        };
        let name = name.strip_suffix(".git").unwrap_or(name);

        let valid_segment = |s: &str| {
            !s.is_empty()
                && s != "."
                && s != ".."
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid_segment(owner) || !valid_segment(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

/// Check a branch or tag name before it becomes part of a raw-content path.
///
/// Segments are `/`-separated and limited to ASCII alphanumerics and `-_.+`;
/// empty, `.` and `..` segments are rejected, so the ref cannot climb out of
/// its repository and needs no escaping.
pub fn validate_git_ref(git_ref: &str) -> Result<(), ModuleError> {
    let valid_segment = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
    };

    if git_ref.len() <= 255 && git_ref.split('/').all(valid_segment) {
        Ok(())
    } else {
        Err(ModuleError::Validation(format!(
            "'{}' is not a valid branch name",
            git_ref
        )))
    }
}

/// HTTP client for raw content and repository listings
#[derive(Debug, Clone)]
pub struct SourceClient {
    http: reqwest::Client,
    settings: SourceSettings,
}

impl SourceClient {
    pub fn new(settings: SourceSettings) -> Result<Self, ModuleError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .build()
            .map_err(|e| ModuleError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Raw-content URL of `path` in `repo_url` at `git_ref`
    pub fn raw_url(&self, repo_url: &str, git_ref: &str, path: &str) -> Result<String, ModuleError> {
        let location = RepoLocation::parse(repo_url)?;
        validate_git_ref(git_ref)?;
        Ok(format!(
            "{}/{}/{}/{}/{}",
            self.settings.raw_base_url.trim_end_matches('/'),
            location.owner,
            location.name,
            git_ref,
            path.trim_start_matches('/')
        ))
    }

    /// Fetch a raw file; `None` when the remote answers with a non-success status
    pub async fn fetch_file(
        &self,
        repo_url: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>, ModuleError> {
        let url = self.raw_url(repo_url, git_ref, path)?;
        self.get_text(&url).await
    }

    /// GET a URL as text; `None` on non-success status
    pub async fn get_text(&self, url: &str) -> Result<Option<String>, ModuleError> {
        tracing::debug!("Fetching {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ModuleError::Transport(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            tracing::debug!("GET {} returned {}", url, response.status());
            return Ok(None);
        }

        response
            .text()
            .await
            .map(Some)
            .map_err(|e| ModuleError::Transport(format!("Failed to read {}: {}", url, e)))
    }

    /// List repositories of an organisation through the code-hosting API
    pub async fn list_org_repositories(&self, org: &str) -> Result<Vec<RemoteRepo>, ModuleError> {
        let url = format!(
            "{}/orgs/{}/repos?per_page=100",
            self.settings.api_base_url.trim_end_matches('/'),
            org
        );
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ModuleError::Transport(format!("GET {} failed: {}", url, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ModuleError::RepositoryNotFound(org.to_string())),
            status if !status.is_success() => Err(ModuleError::Transport(format!(
                "Repository listing for '{}' failed with status {}",
                org, status
            ))),
            _ => response
                .json()
                .await
                .map_err(|e| ModuleError::Transport(format!("Invalid repository listing: {}", e))),
        }
    }
}

/// Repository entry returned by the code-hosting API
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRepo {
    pub name: String,
    pub html_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository_urls() {
        let loc = RepoLocation::parse("https://github.com/acme/reportmate-module-demo").unwrap();
        assert_eq!(loc.owner, "acme");
        assert_eq!(loc.name, "reportmate-module-demo");

        let loc = RepoLocation::parse("https://github.com/acme/demo.git/").unwrap();
        assert_eq!(loc.name, "demo");
    }

    #[test]
    fn test_reject_unrecognized_layouts() {
        for url in [
            "not a url",
            "ftp://github.com/acme/demo",
            "https://gitlab.com/acme/demo",
            "https://github.com/acme",
            "https://github.com/acme/demo/tree/main",
            "https://github.com/acme/demo?tab=readme",
        ] {
            assert!(RepoLocation::parse(url).is_err(), "{}", url);
        }
    }

    #[test]
    fn test_raw_url_conversion() {
        let client = SourceClient::new(SourceSettings::default()).unwrap();
        let url = client
            .raw_url("https://github.com/acme/reportmate-module-demo/", "main", "manifest.json")
            .unwrap();
        assert_eq!(
            url,
            "https://raw.githubusercontent.com/acme/reportmate-module-demo/main/manifest.json"
        );

        let url = client
            .raw_url("https://github.com/acme/demo", "release/v1.2", "index.rhai")
            .unwrap();
        assert!(url.ends_with("/acme/demo/release/v1.2/index.rhai"));
    }

    #[test]
    fn test_git_refs_cannot_leave_the_repository() {
        for git_ref in ["main", "v1.0.0", "feature/new-widget", "release+1"] {
            assert!(validate_git_ref(git_ref).is_ok(), "{}", git_ref);
        }
        for git_ref in [
            "",
            "../../evil/payload/main",
            "main/../../other",
            "./main",
            "main//x",
            "/main",
            "main?x=1",
            "main#frag",
            "main\\..\\x",
            "ma in",
            "%2e%2e",
        ] {
            assert!(validate_git_ref(git_ref).is_err(), "{}", git_ref);
        }

        let client = SourceClient::new(SourceSettings::default()).unwrap();
        assert!(matches!(
            client.raw_url("https://github.com/acme/demo", "../../evil/payload/main", "manifest.json"),
            Err(ModuleError::Validation(_))
        ));
    }
}
