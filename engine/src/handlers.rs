//! Command handlers for CLI operations
//!
//! Server-side commands build an [`Installer`] over the configured store;
//! `load` builds a client session that talks to the module API over HTTP.

use anyhow::{Context, Result};
use api_server::ApiServer;
use reportmate_modules::{Installer, ManifestResolver, ModuleStore, Screener, SourceClient};
use sdk::types::{NewRepository, RepositoryKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RepoAction;
use crate::client::ApiClient;
use crate::config::Config;
use crate::runtime::compat::parse_version;
use crate::runtime::{ModuleRuntime, ModuleRuntimeRegistry, Sandbox, SandboxSettings};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the server-side installer from configuration
pub fn build_installer(config: &Config) -> Result<Installer> {
    let store = Arc::new(ModuleStore::new(config.modules_dir()));
    let client = SourceClient::new(config.sources.clone()).context("Failed to create source client")?;
    let screener = Screener::new(config.security.clone()).context("Invalid security policy")?;
    Ok(Installer::new(store, ManifestResolver::new(client), screener))
}

/// Build a client session against the module API at `api_url`
pub fn build_runtime(config: &Config, api_url: &str) -> Result<ModuleRuntimeRegistry> {
    let timeout = Duration::from_secs(config.sources.fetch_timeout_secs);
    let client = ApiClient::new(api_url, timeout).context("Failed to create API client")?;
    let sandbox = Sandbox::new(SandboxSettings {
        max_operations: config.runtime.max_operations,
        components: config.runtime.components.clone(),
        fetch_timeout: timeout,
    });
    let screener = Screener::new(config.security.clone()).context("Invalid security policy")?;
    let host_version =
        parse_version(&config.runtime.host_version).context("Invalid host version")?;

    Ok(ModuleRuntimeRegistry::new(
        Arc::new(client),
        sandbox,
        screener,
        host_version,
    ))
}

/// Serve the module API until Ctrl-C
pub async fn handle_serve(config: &Config, port: Option<u16>) -> Result<()> {
    let installer = build_installer(config)?;
    let mut addr = config.server_addr().context("Invalid server address")?;
    if let Some(port) = port {
        addr.set_port(port);
    }

    let server = ApiServer::start(installer, addr)
        .await
        .context("Failed to start module API")?;
    println!("Module API listening on http://{}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    server.stop().await;
    Ok(())
}

/// Repository management
pub async fn handle_repo(action: RepoAction, config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let registry = installer.registry();

    match action {
        RepoAction::List => {
            let repos = registry.list().await.context("Failed to list repositories")?;
            match format {
                OutputFormat::Text => {
                    println!("Repositories:");
                    println!();
                    for repo in &repos {
                        println!(
                            "  {} ({}) {} [{}]{}",
                            repo.id,
                            repo.name,
                            repo.url,
                            if repo.enabled { "enabled" } else { "disabled" },
                            if repo.official { " official" } else { "" }
                        );
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&repos)?);
                }
            }
        }
        RepoAction::Add {
            name,
            url,
            branch,
            registry: is_registry,
            description,
        } => {
            let mut repo = NewRepository::new(name, url);
            if let Some(branch) = branch {
                repo = repo.with_branch(branch);
            }
            if is_registry {
                repo = repo.with_kind(RepositoryKind::Registry);
            }
            repo.description = description;

            let id = registry.add(repo).await.context("Failed to add repository")?;
            print_result(format, &format!("Added repository {}", id), json!({ "id": id }));
        }
        RepoAction::Remove { id } => {
            registry.remove(&id).await.context("Failed to remove repository")?;
            print_result(format, &format!("Removed repository {}", id), json!({ "id": id }));
        }
        RepoAction::Enable { id } => {
            registry
                .set_enabled(&id, true)
                .await
                .context("Failed to enable repository")?;
            print_result(format, &format!("Enabled repository {}", id), json!({ "id": id }));
        }
        RepoAction::Disable { id } => {
            registry
                .set_enabled(&id, false)
                .await
                .context("Failed to disable repository")?;
            print_result(format, &format!("Disabled repository {}", id), json!({ "id": id }));
        }
    }

    Ok(())
}

/// Install a module into the local store
pub async fn handle_install(
    module_id: &str,
    repository_id: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let installer = build_installer(config)?;
    let installed = installer
        .install(module_id, repository_id)
        .await
        .with_context(|| format!("Failed to install {}", module_id))?;

    print_result(
        format,
        &format!(
            "Installed {} v{} ({:?}) into {}",
            installed.manifest.id,
            installed.manifest.version,
            installed.trust,
            installed.path.display()
        ),
        json!({
            "id": installed.manifest.id,
            "version": installed.manifest.version,
            "path": installed.path,
        }),
    );
    Ok(())
}

pub async fn handle_uninstall(module_id: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    installer
        .uninstall(module_id)
        .await
        .with_context(|| format!("Failed to uninstall {}", module_id))?;
    print_result(
        format,
        &format!("Uninstalled {}", module_id),
        json!({ "id": module_id }),
    );
    Ok(())
}

pub async fn handle_enabled(config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let enabled = installer
        .enabled_modules()
        .await
        .context("Failed to read enabled modules")?;

    match format {
        OutputFormat::Text => {
            if enabled.is_empty() {
                println!("No modules enabled.");
            }
            for id in &enabled {
                println!("  {}", id);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&enabled)?),
    }
    Ok(())
}

/// List modules published by enabled repositories
pub async fn handle_discover(config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let available = installer
        .available()
        .await
        .context("Failed to discover modules")?;

    match format {
        OutputFormat::Text => {
            println!("Available Modules:");
            println!();
            for manifest in &available {
                println!(
                    "  {} v{} [{}] {}",
                    manifest.id,
                    manifest.version,
                    manifest.category.as_str(),
                    manifest.description
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&available)?),
    }
    Ok(())
}

/// Run a client session and print the resulting module states
pub async fn handle_load(
    modules: &[String],
    api_url: Option<&str>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let api_url = api_url.unwrap_or(&config.runtime.api_url);
    let registry = build_runtime(config, api_url)?;

    if modules.is_empty() {
        registry
            .initialize()
            .await
            .with_context(|| format!("Failed to read enabled modules from {}", api_url))?;
    } else {
        for id in modules {
            registry.load(id).await;
        }
    }

    let states = registry.get_loaded_modules().await;
    match format {
        OutputFormat::Text => {
            println!("Modules (host v{}):", registry.host_version());
            println!();
            for state in &states {
                match &state.error {
                    None => println!(
                        "  {} v{}: loaded [{}]",
                        state.manifest.id,
                        state.manifest.version,
                        export_list(state).join(", ")
                    ),
                    Some(error) => println!("  {}: failed ({})", state.manifest.id, error),
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = states.iter().map(runtime_summary).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn export_list(state: &ModuleRuntime) -> Vec<String> {
    state
        .instance
        .as_ref()
        .map(|instance| instance.export_names())
        .unwrap_or_default()
}

/// JSON view of a runtime entry
pub fn runtime_summary(state: &ModuleRuntime) -> serde_json::Value {
    json!({
        "id": state.manifest.id,
        "version": state.manifest.version,
        "category": state.manifest.category.as_str(),
        "loaded": state.loaded,
        "enabled": state.enabled,
        "exports": export_list(state),
        "error": state.error,
        "errorKind": state.error_kind.map(|kind| format!("{:?}", kind)),
        "lastLoaded": state.last_loaded.map(|t| t.to_rfc3339()),
    })
}

fn print_result(format: OutputFormat, text: &str, value: serde_json::Value) {
    match format {
        OutputFormat::Text => println!("{}", text),
        OutputFormat::Json => {
            let mut output = json!({ "success": true });
            if let (Some(output), Some(extra)) = (output.as_object_mut(), value.as_object()) {
                output.extend(extra.clone());
            }
            println!("{}", output);
        }
    }
}
