//! Module screening: static risk patterns, SHA-256 checksums and Ed25519 signatures
//!
//! The pattern scan is a heuristic: it rejects well-known risky constructs but
//! cannot prove code safe. Checksums and signatures are optional in the
//! manifest; [`SecurityPolicy`] can make them mandatory.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use regex::Regex;
use sdk::errors::ModuleError;
use sdk::manifest::ModuleManifest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Screening policy (the `[security]` config section)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Reject modules whose manifest declares no checksum
    #[serde(default)]
    pub require_checksum: bool,

    /// Reject modules whose manifest declares no signature
    #[serde(default)]
    pub require_signature: bool,

    /// Hex-encoded Ed25519 public keys trusted to sign module bundles
    #[serde(default)]
    pub trusted_keys: Vec<String>,
}

/// Screening outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// DOM event names whose `on<name>` properties and attributes run code
macro_rules! dom_events {
    () => {
        r"(?:click|dblclick|contextmenu|load|unload|beforeunload|error|abort|mouse[a-z]*|key[a-z]*|focus[a-z]*|blur|submit|reset|change|input|select|scroll|resize|wheel|drag[a-z]*|drop|touch[a-z]*|pointer[a-z]*|message|hashchange|popstate|animation[a-z]*|transition[a-z]*)\b"
    };
}

/// Denylist entries: (description, pattern)
const RISK_PATTERNS: &[(&str, &str)] = &[
    ("dynamic evaluation", r"\beval\s*\("),
    ("dynamic function construction", r"\bFunction\s*\("),
    ("document.write sink", r"document\s*\.\s*write"),
    ("innerHTML assignment", r"\.\s*innerHTML\s*\+?=[^=]"),
    ("outerHTML assignment", r"\.\s*outerHTML\s*\+?=[^=]"),
    ("insertAdjacentHTML sink", r"insertAdjacentHTML"),
    ("script tag", r"(?i)<\s*/?\s*script\b|\bscript\s*>"),
    (
        "event handler assignment",
        concat!(r"(?i)\.\s*on", dom_events!(), r"\s*=[^=]"),
    ),
    (
        "inline event handler attribute",
        concat!(r"(?i)<[^>]*\son", dom_events!(), r#"\s*=\s*["'{]"#),
    ),
];

/// Static screener for fetched module code
#[derive(Debug, Clone)]
pub struct Screener {
    patterns: Vec<(&'static str, Regex)>,
    policy: SecurityPolicy,
    trusted_keys: Vec<VerifyingKey>,
}

impl Screener {
    /// Compile the denylist and parse the trusted keys
    pub fn new(policy: SecurityPolicy) -> Result<Self, ModuleError> {
        let patterns = RISK_PATTERNS
            .iter()
            .map(|(name, pattern)| {
                Regex::new(pattern)
                    .map(|re| (*name, re))
                    .map_err(|e| ModuleError::Config(format!("Bad risk pattern {}: {}", name, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let trusted_keys = policy
            .trusted_keys
            .iter()
            .map(|key| parse_public_key(key))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            policy,
            trusted_keys,
        })
    }

    /// Run every check; the first failing one decides the verdict
    pub fn screen(&self, manifest: &ModuleManifest, code: &str) -> Verdict {
        if let Some(name) = self.scan(code) {
            tracing::warn!("Module {} contains a risky construct: {}", manifest.id, name);
            return Verdict::Rejected(format!("code contains {}", name));
        }

        match &manifest.checksum {
            Some(expected) => {
                if let Err(e) = verify_hash(code.as_bytes(), expected) {
                    tracing::error!("Module {} checksum mismatch", manifest.id);
                    return Verdict::Rejected(e);
                }
            }
            None if self.policy.require_checksum => {
                return Verdict::Rejected("manifest declares no checksum".to_string());
            }
            None => {
                tracing::debug!("Module {} declares no checksum, skipping", manifest.id);
            }
        }

        match &manifest.signature {
            Some(signature) if !self.trusted_keys.is_empty() => {
                if let Err(e) = self.verify_signature(code.as_bytes(), signature) {
                    tracing::error!("Module {} signature rejected: {}", manifest.id, e);
                    return Verdict::Rejected(e);
                }
            }
            Some(_) => {
                if self.policy.require_signature {
                    return Verdict::Rejected(
                        "no trusted keys configured to verify the signature".to_string(),
                    );
                }
                tracing::debug!("No trusted keys configured, signature of {} not checked", manifest.id);
            }
            None if self.policy.require_signature => {
                return Verdict::Rejected("manifest declares no signature".to_string());
            }
            None => {}
        }

        Verdict::Accepted
    }

    /// Screen and convert a rejection into `SecurityRejected`
    pub fn check(&self, manifest: &ModuleManifest, code: &str) -> Result<(), ModuleError> {
        match self.screen(manifest, code) {
            Verdict::Accepted => Ok(()),
            Verdict::Rejected(reason) => Err(ModuleError::SecurityRejected {
                module_id: manifest.id.clone(),
                reason,
            }),
        }
    }

    /// Name of the first denylisted construct found in `code`
    pub fn scan(&self, code: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(code))
            .map(|(name, _)| *name)
    }

    fn verify_signature(&self, data: &[u8], signature: &str) -> Result<(), String> {
        let hex_sig = signature.strip_prefix("ed25519:").unwrap_or(signature);
        let bytes = hex::decode(hex_sig.trim()).map_err(|_| "signature is not hex".to_string())?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| "signature must be 64 bytes".to_string())?;
        let signature = Signature::from_bytes(&bytes);

        if self
            .trusted_keys
            .iter()
            .any(|key| key.verify(data, &signature).is_ok())
        {
            Ok(())
        } else {
            Err("signature does not match any trusted key".to_string())
        }
    }
}

fn parse_public_key(key: &str) -> Result<VerifyingKey, ModuleError> {
    let hex_key = key.strip_prefix("ed25519:").unwrap_or(key);
    let bytes = hex::decode(hex_key.trim())
        .map_err(|_| ModuleError::Config(format!("Trusted key '{}' is not hex", key)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ModuleError::Config(format!("Trusted key '{}' must be 32 bytes", key)))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| ModuleError::Config(format!("Invalid trusted key '{}': {}", key, e)))
}

/// Verify that the SHA-256 hash of `data` matches `expected`
/// (hex, optional `sha256:` prefix, case-insensitive)
pub fn verify_hash(data: &[u8], expected: &str) -> Result<(), String> {
    let expected = expected
        .strip_prefix("sha256:")
        .unwrap_or(expected)
        .trim()
        .to_ascii_lowercase();
    let computed = compute_hash(data);

    if computed != expected {
        return Err(format!(
            "checksum mismatch: expected {}, got {}",
            expected, computed
        ));
    }

    Ok(())
}

/// Compute the SHA-256 hash of `data` and return hex string
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    const CLEAN: &str = r#"
        let refresh = 30;
        #{ title: "Disk usage", refresh: refresh, on_enable: || log("enabled") }
    "#;

    fn manifest() -> ModuleManifest {
        let mut m = ModuleManifest::placeholder("demo");
        m.name = "Demo".to_string();
        m.version = "1.0.0".to_string();
        m
    }

    fn screener() -> Screener {
        Screener::new(SecurityPolicy::default()).unwrap()
    }

    #[test]
    fn test_compute_and_verify_hash() {
        let data = b"hello world";
        let hash = compute_hash(data);
        assert!(verify_hash(data, &hash).is_ok());
        assert!(verify_hash(data, &format!("sha256:{}", hash.to_uppercase())).is_ok());
    }

    #[test]
    fn test_verify_hash_mismatch() {
        let data = b"hello world";
        let result = verify_hash(
            data,
            "0000000000000000000000000000000000000000000000000000000000000000",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_clean_code_accepted() {
        assert_eq!(screener().screen(&manifest(), CLEAN), Verdict::Accepted);
    }

    #[test]
    fn test_denylisted_constructs_rejected() {
        let samples = [
            "eval(\"1 + 1\")",
            "let f = new Function('return 1')",
            "document.write('<b>x</b>')",
            "el.innerHTML = data",
            "el.outerHTML= data",
            "node.insertAdjacentHTML('beforeend', x)",
            "<script src=x></script>",
            "button.onclick = steal",
            r#"<img src=x onerror="alert(1)">"#,
        ];
        let screener = screener();
        for code in samples {
            assert!(screener.scan(code).is_some(), "not caught: {}", code);
        }
    }

    #[test]
    fn test_common_identifiers_not_flagged() {
        let screener = screener();
        assert!(screener.scan("let one = 1; let connection = one;").is_none());
        assert!(screener.scan("if node.online == true { 1 }").is_none());
        assert!(screener.scan("let evaluation = 3;").is_none());
        assert!(screener
            .scan("let device = #{}; device.online = true; #{ status: device }")
            .is_none());
        assert!(screener.scan("state.onboarding = false; state.one = 1;").is_none());
        assert!(screener.scan("stats.onload_count = 2;").is_none());
        assert!(screener.scan(r#"<div online="yes">"#).is_none());
    }

    #[test]
    fn test_dom_event_handlers_flagged() {
        let screener = screener();
        for code in [
            "el.onmouseover = run",
            "window . onload = init",
            "input.ONKEYDOWN = log",
            r#"<body onload='go()'>"#,
        ] {
            assert!(screener.scan(code).is_some(), "{}", code);
        }
    }

    #[test]
    fn test_pattern_rejected_even_with_valid_checksum() {
        let code = "eval(\"40 + 2\")";
        let mut m = manifest();
        m.checksum = Some(compute_hash(code.as_bytes()));
        assert!(!screener().screen(&m, code).is_accepted());
    }

    #[test]
    fn test_checksum_mismatch_is_security_rejection() {
        let mut m = manifest();
        m.checksum = Some(compute_hash(b"something else"));
        let err = screener().check(&m, CLEAN).unwrap_err();
        assert!(matches!(err, ModuleError::SecurityRejected { .. }));
    }

    #[test]
    fn test_required_checksum() {
        let screener = Screener::new(SecurityPolicy {
            require_checksum: true,
            ..SecurityPolicy::default()
        })
        .unwrap();
        assert!(!screener.screen(&manifest(), CLEAN).is_accepted());

        let mut m = manifest();
        m.checksum = Some(compute_hash(CLEAN.as_bytes()));
        assert!(screener.screen(&m, CLEAN).is_accepted());
    }

    #[test]
    fn test_signature_verification() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let policy = SecurityPolicy {
            trusted_keys: vec![hex::encode(signing.verifying_key().to_bytes())],
            ..SecurityPolicy::default()
        };
        let screener = Screener::new(policy).unwrap();

        let mut m = manifest();
        m.signature = Some(format!(
            "ed25519:{}",
            hex::encode(signing.sign(CLEAN.as_bytes()).to_bytes())
        ));
        assert!(screener.screen(&m, CLEAN).is_accepted());

        let tampered = format!("{}\n// extra", CLEAN);
        assert!(!screener.screen(&m, &tampered).is_accepted());
    }

    #[test]
    fn test_invalid_trusted_key_is_config_error() {
        let result = Screener::new(SecurityPolicy {
            trusted_keys: vec!["zz".to_string()],
            ..SecurityPolicy::default()
        });
        assert!(matches!(result, Err(ModuleError::Config(_))));
    }
}
