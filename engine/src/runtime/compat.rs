//! Version compatibility and dependency checks
//!
//! Compatibility ranges are inclusive on both ends. Versions are read as
//! semver, with short forms padded (`1` and `1.0` both mean `1.0.0`) and an
//! optional leading `v`.

use sdk::errors::ModuleError;
use sdk::manifest::ModuleManifest;
use semver::Version;

/// Parse a possibly abbreviated version string
pub fn parse_version(raw: &str) -> Result<Version, ModuleError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    // Pad only the numeric core; pre-release and build suffixes stay attached
    let split = trimmed
        .find(|c| c == '-' || c == '+')
        .unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => trimmed.to_string(),
    };

    Version::parse(&padded)
        .map_err(|e| ModuleError::ManifestInvalid(format!("invalid version '{}': {}", raw, e)))
}

/// Check that `host` lies inside the manifest's `[min_version, max_version]`
pub fn check_compatibility(manifest: &ModuleManifest, host: &Version) -> Result<(), ModuleError> {
    let incompatible = |reason: String| ModuleError::IncompatibleModule {
        module_id: manifest.id.clone(),
        host_version: host.to_string(),
        reason,
    };

    if let Some(min) = manifest.min_version.as_deref() {
        let min = parse_version(min).map_err(|e| incompatible(e.to_string()))?;
        if *host < min {
            return Err(incompatible(format!("requires at least {}", min)));
        }
    }

    if let Some(max) = manifest.max_version.as_deref() {
        let max = parse_version(max).map_err(|e| incompatible(e.to_string()))?;
        if *host > max {
            return Err(incompatible(format!("supports at most {}", max)));
        }
    }

    Ok(())
}

/// Require every declared dependency to be loaded. All absent ids are
/// reported in one error, in declaration order.
pub fn check_dependencies<F>(manifest: &ModuleManifest, is_loaded: F) -> Result<(), ModuleError>
where
    F: Fn(&str) -> bool,
{
    let missing: Vec<String> = manifest
        .dependencies
        .iter()
        .filter(|dep| !is_loaded(dep.as_str()))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ModuleError::MissingDependencies {
            module_id: manifest.id.clone(),
            missing,
        })
    }
}

/// Peer dependencies that are not loaded (advisory only)
pub fn unloaded_peers<F>(manifest: &ModuleManifest, is_loaded: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    manifest
        .peer_dependencies
        .iter()
        .flatten()
        .filter(|peer| !is_loaded(peer.as_str()))
        .cloned()
        .collect()
}
