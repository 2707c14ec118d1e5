//! Configuration management
//!
//! Configuration is stored in TOML format at ~/.reportmate/config.toml and is
//! created with defaults on first use.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory (module store root)
//! - **server**: Bind address and port of the module API
//! - **sources**: Raw-content and API base URLs, official organisation, fetch timeout
//! - **security**: Checksum/signature policy and trusted signing keys
//! - **runtime**: Client session settings (server URL, host version, sandbox limits)
//!
//! # Examples
//!
//! ```no_run
//! use reportmate_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Modules stored in {:?}", config.modules_dir());
//! println!("Host version: {}", config.runtime.host_version);
//! # Ok(())
//! # }
//! ```

use reportmate_modules::{SecurityPolicy, SourceSettings};
use sdk::errors::ModuleError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Module API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote code-hosting sources
    #[serde(default)]
    pub sources: SourceSettings,

    /// Screening policy
    #[serde(default)]
    pub security: SecurityPolicy,

    /// Client runtime session
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Module API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Client runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base URL of the module API the session talks to
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Version of the running host, checked against module compatibility ranges
    #[serde(default = "default_host_version")]
    pub host_version: String,

    /// Operation budget of one module evaluation
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// UI component names exposed to modules through `ui`
    #[serde(default = "default_components")]
    pub components: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            host_version: default_host_version(),
            max_operations: default_max_operations(),
            components: default_components(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.reportmate")
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3737
}

fn default_api_url() -> String {
    "http://127.0.0.1:3737/api/modules".to_string()
}

fn default_host_version() -> String {
    "1.0.0".to_string()
}

fn default_max_operations() -> u64 {
    1_000_000
}

fn default_components() -> Vec<String> {
    ["Card", "Table", "Chart", "Badge", "Button", "Stat", "List"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Load configuration from the default location (~/.reportmate/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ModuleError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load `path`, writing a default configuration there first if it is missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, ModuleError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ModuleError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ModuleError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ModuleError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    fn create_default(path: &Path) -> Result<Self, ModuleError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ModuleError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        // Written before path expansion so the file keeps the portable `~` form
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| ModuleError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)
            .map_err(|e| ModuleError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.reportmate/config.toml)
    pub fn default_config_path() -> Result<PathBuf, ModuleError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ModuleError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".reportmate").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            server: ServerConfig::default(),
            sources: SourceSettings::default(),
            security: SecurityPolicy::default(),
            runtime: RuntimeConfig::default(),
        }
    }

    /// Root of the module store
    pub fn modules_dir(&self) -> PathBuf {
        self.core.data_dir.join("modules")
    }

    /// Socket address of the module API
    pub fn server_addr(&self) -> Result<SocketAddr, ModuleError> {
        let ip: IpAddr = self.server.bind.parse().map_err(|_| {
            ModuleError::Config(format!("Invalid bind address '{}'", self.server.bind))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Validate fields and expand `~` in paths
    fn validate_and_process(&mut self) -> Result<(), ModuleError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ModuleError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        self.server_addr()?;

        if semver::Version::parse(&self.runtime.host_version).is_err() {
            return Err(ModuleError::Config(format!(
                "host_version '{}' is not a semantic version",
                self.runtime.host_version
            )));
        }

        if self.runtime.max_operations == 0 {
            return Err(ModuleError::Config(
                "max_operations must be greater than 0".to_string(),
            ));
        }

        if self.sources.fetch_timeout_secs == 0 {
            return Err(ModuleError::Config(
                "fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (name, url) in [
            ("runtime.api_url", &self.runtime.api_url),
            ("sources.raw_base_url", &self.sources.raw_base_url),
            ("sources.api_base_url", &self.sources.api_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ModuleError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, ModuleError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ModuleError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ModuleError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| ModuleError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
