// ReportMate module manager
// Main entry point for the reportmate binary

use clap::Parser;
use reportmate_engine::cli::{Cli, Command};
use reportmate_engine::config::Config;
use reportmate_engine::handlers::{
    handle_discover, handle_enabled, handle_install, handle_load, handle_repo, handle_serve,
    handle_uninstall, OutputFormat,
};
use reportmate_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(path) => Config::load_or_create_at(path)?,
        None => Config::load_or_create()?,
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!("ReportMate v{}", env!("CARGO_PKG_VERSION"));

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Serve { port } => handle_serve(&config, port).await,
        Command::Repo { action } => {
            tracing::debug!("Repository management: {:?}", action);
            handle_repo(action, &config, format).await
        }
        Command::Install {
            module_id,
            repository,
        } => handle_install(&module_id, &repository, &config, format).await,
        Command::Uninstall { module_id } => handle_uninstall(&module_id, &config, format).await,
        Command::Enabled => handle_enabled(&config, format).await,
        Command::Discover => handle_discover(&config, format).await,
        Command::Load { modules, api_url } => {
            handle_load(&modules, api_url.as_deref(), &config, format).await
        }
    }
}
