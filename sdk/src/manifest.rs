//! Manifest types for dashboard module metadata

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::errors::ModuleError;

/// Permission a module must declare before the sandbox grants `fetch`
pub const NETWORK_PERMISSION: &str = "network";

/// Default code entry point when a manifest does not name one
pub const DEFAULT_ENTRY_POINT: &str = "index.rhai";

/// Module category (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Core,
    #[default]
    Widget,
    Integration,
    Security,
    Hardware,
    Software,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Widget => "widget",
            Self::Integration => "integration",
            Self::Security => "security",
            Self::Hardware => "hardware",
            Self::Software => "software",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(Self::Core),
            "widget" => Ok(Self::Widget),
            "integration" => Ok(Self::Integration),
            "security" => Ok(Self::Security),
            "hardware" => Ok(Self::Hardware),
            "software" => Ok(Self::Software),
            other => Err(ModuleError::Validation(format!(
                "Unknown module category '{}'",
                other
            ))),
        }
    }
}

/// Declarative descriptor of a module.
///
/// Only `id`, `name` and `version` are mandatory in the wire document; every
/// other field falls back to an empty/neutral value. Field names follow the
/// camelCase layout used by module repositories (`minVersion`,
/// `peerDependencies`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    /// Origin repository URL
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub official: bool,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<Vec<String>>,
    /// Code entry point, relative to the manifest
    #[serde(default = "default_entry_point")]
    pub main: String,
    /// Stylesheet entry point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_config: Option<serde_json::Value>,
    /// Minimum compatible host version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    /// Maximum compatible host version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<String>,
    /// SHA-256 of the code bundle (hex, optional `sha256:` prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Ed25519 signature over the code bundle (hex, optional `ed25519:` prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

impl ModuleManifest {
    /// Placeholder manifest recorded when resolution itself failed
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            version: String::new(),
            description: String::new(),
            author: String::new(),
            repository: String::new(),
            official: false,
            category: Category::default(),
            tags: Vec::new(),
            dependencies: Vec::new(),
            peer_dependencies: None,
            main: default_entry_point(),
            styles: None,
            permissions: Vec::new(),
            config_schema: None,
            default_config: None,
            min_version: None,
            max_version: None,
            checksum: None,
            signature: None,
        }
    }

    /// Parse and validate a manifest document.
    ///
    /// A document that is valid JSON but lacks `id`, `name` or `version`
    /// (or carries them empty) is `ManifestInvalid`.
    pub fn from_json(json: &str) -> Result<Self, ModuleError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ModuleError::ManifestInvalid(format!("not a JSON document: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed manifest document
    pub fn from_value(value: serde_json::Value) -> Result<Self, ModuleError> {
        let missing: Vec<&str> = ["id", "name", "version"]
            .into_iter()
            .filter(|field| {
                value
                    .get(*field)
                    .and_then(|v| v.as_str())
                    .map_or(true, |s| s.trim().is_empty())
            })
            .collect();

        if !missing.is_empty() {
            return Err(ModuleError::ManifestInvalid(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let manifest: ModuleManifest = serde_json::from_value(value)
            .map_err(|e| ModuleError::ManifestInvalid(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize manifest to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Structural checks beyond presence of the required fields
    pub fn validate(&self) -> Result<(), ModuleError> {
        validate_module_id(&self.id)
            .map_err(|e| ModuleError::ManifestInvalid(format!("id: {}", e)))?;
        validate_relative_path(&self.main)
            .map_err(|e| ModuleError::ManifestInvalid(format!("entry point: {}", e)))?;
        if let Some(styles) = &self.styles {
            validate_relative_path(styles)
                .map_err(|e| ModuleError::ManifestInvalid(format!("styles: {}", e)))?;
        }
        Ok(())
    }

    /// Whether the manifest grants the given permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Module ids double as storage keys, so they must stay inside one directory.
pub fn validate_module_id(id: &str) -> Result<(), ModuleError> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(ModuleError::Validation(format!("Invalid module id '{}'", id)))
    }
}

fn validate_relative_path(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("path is empty".to_string());
    }
    let p = Path::new(path);
    if p.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
        return Err(format!("absolute path '{}' is not allowed", path));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(format!("path '{}' escapes the module directory", path));
    }
    Ok(())
}
