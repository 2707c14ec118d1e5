//! ReportMate module repositories and installer
//!
//! This crate handles the server side of module management: the repository
//! registry, manifest resolution against remote code hosting, static
//! screening of fetched code, and the file-backed store of installed modules
//! and the enabled-set.

pub mod installer;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod store;
pub mod verifier;

pub use installer::{InstalledModule, Installer};
pub use registry::RepositoryRegistry;
pub use resolver::ManifestResolver;
pub use source::{SourceClient, SourceSettings};
pub use store::ModuleStore;
pub use verifier::{Screener, SecurityPolicy, Verdict};

use sdk::types::ModuleRepository;

/// Module trust tier, derived from the flags of the repository it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTier {
    /// Official repository maintained by the ReportMate team
    Official,
    /// Verified community repository
    Community,
    /// User-added repository
    Unverified,
}

impl TrustTier {
    pub fn for_repository(repo: &ModuleRepository) -> Self {
        if repo.official {
            TrustTier::Official
        } else if repo.verified {
            TrustTier::Community
        } else {
            TrustTier::Unverified
        }
    }
}
