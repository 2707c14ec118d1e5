//! HTTP client for the module API
//!
//! Implements [`ModuleSource`] so a runtime session can load modules from a
//! running server.

use async_trait::async_trait;
use reqwest::StatusCode;
use sdk::errors::ModuleError;
use sdk::manifest::{validate_module_id, ModuleManifest};
use sdk::types::{ErrorResponse, InstallRequest, ToggleRequest};
use std::time::Duration;

use crate::runtime::source::ModuleSource;

/// Module API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ModuleError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModuleError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn module_url(&self, module_id: &str, suffix: &str) -> Result<String, ModuleError> {
        validate_module_id(module_id)?;
        Ok(format!("{}/{}{}", self.base_url, module_id, suffix))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, ModuleError> {
        let response = request
            .send()
            .await
            .map_err(|e| ModuleError::Transport(format!("{} failed: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        match status {
            StatusCode::NOT_FOUND => Err(ModuleError::ModuleNotFound(message)),
            StatusCode::BAD_REQUEST => Err(ModuleError::Validation(message)),
            _ => Err(ModuleError::Transport(format!("{} failed: {}", what, message))),
        }
    }

    async fn text(response: reqwest::Response) -> Result<String, ModuleError> {
        response
            .text()
            .await
            .map_err(|e| ModuleError::Transport(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl ModuleSource for ApiClient {
    async fn enabled_modules(&self) -> Result<Vec<String>, ModuleError> {
        let url = format!("{}/enabled", self.base_url);
        let response = self.send(self.http.get(&url), "GET /enabled").await?;
        response
            .json()
            .await
            .map_err(|e| ModuleError::Transport(format!("Invalid enabled-set: {}", e)))
    }

    async fn fetch_manifest(&self, module_id: &str) -> Result<ModuleManifest, ModuleError> {
        let url = self.module_url(module_id, "/manifest")?;
        let response = self.send(self.http.get(&url), "GET manifest").await?;
        ModuleManifest::from_json(&Self::text(response).await?)
    }

    async fn fetch_bundle(&self, module_id: &str) -> Result<String, ModuleError> {
        let url = self.module_url(module_id, "/bundle")?;
        let response = self.send(self.http.get(&url), "GET bundle").await?;
        Self::text(response).await
    }

    async fn set_enabled(&self, module_id: &str, enabled: bool) -> Result<(), ModuleError> {
        let url = self.module_url(module_id, "/toggle")?;
        self.send(
            self.http.post(&url).json(&ToggleRequest { enabled }),
            "POST toggle",
        )
        .await?;
        Ok(())
    }

    async fn install(&self, module_id: &str, repository_id: &str) -> Result<(), ModuleError> {
        let url = format!("{}/install", self.base_url);
        let body = InstallRequest {
            module_id: module_id.to_string(),
            repository_id: repository_id.to_string(),
        };
        self.send(self.http.post(&url).json(&body), "POST /install")
            .await?;
        Ok(())
    }

    async fn uninstall(&self, module_id: &str) -> Result<(), ModuleError> {
        let url = self.module_url(module_id, "")?;
        self.send(self.http.delete(&url), "DELETE module").await?;
        Ok(())
    }
}
