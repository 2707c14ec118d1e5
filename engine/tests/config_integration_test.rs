//! Integration tests for configuration management
//!
//! Verify that a config file is created on first use, that every section
//! round-trips through TOML and that invalid values are rejected on load.

use reportmate_engine::config::Config;
use std::fs;

#[test]
fn test_first_use_writes_default_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let config = Config::load_or_create_at(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.server.port, 3737);

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("data_dir = \"~/.reportmate\""));
    assert!(written.contains("[runtime]"));

    // Second load reads the file back
    let again = Config::load_or_create_at(&path).unwrap();
    assert_eq!(again.core.data_dir, config.core.data_dir);
}

#[test]
fn test_full_config_toml_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[core]
log_level = "debug"
data_dir = "/var/lib/reportmate"

[server]
bind = "0.0.0.0"
port = 8080

[sources]
raw_base_url = "https://raw.example.com"
api_base_url = "https://api.example.com"
official_org = "acme"
module_prefix = "acme-module-"
fetch_timeout_secs = 5

[security]
require_checksum = true
require_signature = false
trusted_keys = []

[runtime]
api_url = "http://10.0.0.2:8080/api/modules"
host_version = "2.1.0"
max_operations = 5000
components = ["Card"]
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.modules_dir(), dir_join("/var/lib/reportmate", "modules"));
    assert_eq!(config.server_addr().unwrap().to_string(), "0.0.0.0:8080");
    assert_eq!(config.sources.official_org, "acme");
    assert_eq!(config.sources.fetch_timeout_secs, 5);
    assert!(config.security.require_checksum);
    assert_eq!(config.runtime.host_version, "2.1.0");
    assert_eq!(config.runtime.components, vec!["Card"]);
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[server]\nport = 9000\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.bind, "127.0.0.1");
    assert_eq!(config.core.log_level, "info");
    assert!(!config.security.require_signature);
    assert_eq!(config.runtime.max_operations, 1_000_000);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        "[core]\nlog_level = \"loud\"\n",
        "[server]\nbind = \"not-an-ip\"\n",
        "[runtime]\nhost_version = \"one\"\n",
        "[runtime]\nmax_operations = 0\n",
        "[runtime]\napi_url = \"ftp://example.com\"\n",
        "[sources]\nfetch_timeout_secs = 0\n",
    ];

    for (i, contents) in cases.iter().enumerate() {
        let path = dir.path().join(format!("bad-{}.toml", i));
        fs::write(&path, contents).unwrap();
        assert!(
            Config::load_from_path(&path).is_err(),
            "expected rejection for {:?}",
            contents
        );
    }
}

fn dir_join(base: &str, child: &str) -> std::path::PathBuf {
    std::path::Path::new(base).join(child)
}
