//! Integration tests for the module installer
//!
//! Remote code hosting is served by a wiremock server; the module store lives
//! in a temporary directory.

use proptest::prelude::*;
use reportmate_modules::verifier::{compute_hash, verify_hash};
use reportmate_modules::{
    Installer, ManifestResolver, ModuleStore, Screener, SecurityPolicy, SourceClient,
    SourceSettings, TrustTier,
};
use sdk::errors::ModuleError;
use sdk::types::{NewRepository, RepositoryKind};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEMO_REPO: &str = "https://github.com/acme/reportmate-module-demo";
const DEMO_CODE: &str = r#"#{ title: "Demo", refresh: 30 }"#;

struct Fixture {
    _dir: TempDir,
    server: MockServer,
    installer: Installer,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let settings = SourceSettings {
        raw_base_url: server.uri(),
        api_base_url: server.uri(),
        ..SourceSettings::default()
    };
    let resolver = ManifestResolver::new(SourceClient::new(settings).unwrap());
    let screener = Screener::new(SecurityPolicy::default()).unwrap();
    let installer = Installer::new(Arc::new(ModuleStore::new(dir.path())), resolver, screener);

    Fixture {
        _dir: dir,
        server,
        installer,
    }
}

async fn serve(server: &MockServer, file: &str, body: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(file))
        .respond_with(body)
        .mount(server)
        .await;
}

async fn serve_demo(server: &MockServer, manifest: serde_json::Value, code: &str) {
    serve(
        server,
        "/acme/reportmate-module-demo/main/manifest.json",
        ResponseTemplate::new(200).set_body_json(manifest),
    )
    .await;
    serve(
        server,
        "/acme/reportmate-module-demo/main/index.rhai",
        ResponseTemplate::new(200).set_body_string(code),
    )
    .await;
}

async fn add_demo_repo(installer: &Installer) -> String {
    installer
        .registry()
        .add(NewRepository::new("Demo", DEMO_REPO))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_install_is_idempotent() {
    let fx = fixture().await;
    serve_demo(
        &fx.server,
        json!({ "id": "demo", "name": "Demo", "version": "1.0.0" }),
        DEMO_CODE,
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;

    let first = fx.installer.install("demo", &repo_id).await.unwrap();
    assert_eq!(first.trust, TrustTier::Unverified);
    assert_eq!(first.manifest.repository, DEMO_REPO);

    fx.installer.install("demo", &repo_id).await.unwrap();

    assert_eq!(fx.installer.enabled_modules().await.unwrap(), vec!["demo"]);
    assert_eq!(
        fx.installer.installed_bundle("demo").await.unwrap().as_deref(),
        Some(DEMO_CODE)
    );
    assert_eq!(
        fx.installer
            .installed_manifest("demo")
            .await
            .unwrap()
            .unwrap()
            .version,
        "1.0.0"
    );
}

#[tokio::test]
async fn test_checksum_mismatch_persists_nothing() {
    let fx = fixture().await;
    serve_demo(
        &fx.server,
        json!({
            "id": "demo", "name": "Demo", "version": "1.0.0",
            "checksum": compute_hash(b"different code")
        }),
        DEMO_CODE,
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;

    let err = fx.installer.install("demo", &repo_id).await.unwrap_err();
    assert!(matches!(err, ModuleError::SecurityRejected { .. }));
    assert!(fx.installer.installed_manifest("demo").await.unwrap().is_none());
    assert!(fx.installer.enabled_modules().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_denylisted_code_rejected_despite_valid_checksum() {
    let fx = fixture().await;
    let code = r#"let x = eval("1 + 1"); #{ value: x }"#;
    serve_demo(
        &fx.server,
        json!({
            "id": "demo", "name": "Demo", "version": "1.0.0",
            "checksum": format!("sha256:{}", compute_hash(code.as_bytes()))
        }),
        code,
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;

    let err = fx.installer.install("demo", &repo_id).await.unwrap_err();
    assert!(matches!(err, ModuleError::SecurityRejected { .. }));
    assert!(!fx.installer.store().is_installed("demo").await.unwrap());
}

#[tokio::test]
async fn test_unknown_and_disabled_repositories() {
    let fx = fixture().await;

    let err = fx.installer.install("demo", "nope").await.unwrap_err();
    assert!(matches!(err, ModuleError::RepositoryNotFound(_)));

    let repo_id = add_demo_repo(&fx.installer).await;
    fx.installer
        .registry()
        .set_enabled(&repo_id, false)
        .await
        .unwrap();
    let err = fx.installer.install("demo", &repo_id).await.unwrap_err();
    assert!(matches!(err, ModuleError::RepositoryDisabled(_)));
}

#[tokio::test]
async fn test_missing_manifest_is_module_not_found() {
    let fx = fixture().await;
    serve(&fx.server, "/acme/reportmate-module-demo/main/manifest.json", ResponseTemplate::new(404)).await;
    let repo_id = add_demo_repo(&fx.installer).await;

    let err = fx.installer.install("demo", &repo_id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_missing_code_is_module_not_found() {
    let fx = fixture().await;
    serve(
        &fx.server,
        "/acme/reportmate-module-demo/main/manifest.json",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "id": "demo", "name": "Demo", "version": "1.0.0" })),
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;

    let err = fx.installer.install("demo", &repo_id).await.unwrap_err();
    assert!(matches!(err, ModuleError::ModuleNotFound(_)));
}

#[tokio::test]
async fn test_manifest_id_mismatch_is_validation_error() {
    let fx = fixture().await;
    serve_demo(
        &fx.server,
        json!({ "id": "other", "name": "Other", "version": "1.0.0" }),
        DEMO_CODE,
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;

    let err = fx.installer.install("demo", &repo_id).await.unwrap_err();
    assert!(matches!(err, ModuleError::Validation(_)));
}

#[tokio::test]
async fn test_install_from_registry_repository() {
    let fx = fixture().await;
    serve(
        &fx.server,
        "/acme/modules/main/modules/disk/manifest.json",
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "disk", "name": "Disk", "version": "2.1.0", "main": "widget.rhai"
        })),
    )
    .await;
    serve(
        &fx.server,
        "/acme/modules/main/modules/disk/widget.rhai",
        ResponseTemplate::new(200).set_body_string(DEMO_CODE),
    )
    .await;

    let repo_id = fx
        .installer
        .registry()
        .add(
            NewRepository::new("Acme index", "https://github.com/acme/modules")
                .with_kind(RepositoryKind::Registry),
        )
        .await
        .unwrap();

    let installed = fx.installer.install("disk", &repo_id).await.unwrap();
    assert_eq!(installed.manifest.version, "2.1.0");
    assert!(fx.installer.store().is_installed("disk").await.unwrap());
}

#[tokio::test]
async fn test_uninstall_converges() {
    let fx = fixture().await;
    serve_demo(
        &fx.server,
        json!({ "id": "demo", "name": "Demo", "version": "1.0.0" }),
        DEMO_CODE,
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;
    fx.installer.install("demo", &repo_id).await.unwrap();

    fx.installer.uninstall("demo").await.unwrap();
    fx.installer.uninstall("demo").await.unwrap();
    fx.installer.uninstall("never-installed").await.unwrap();

    assert!(fx.installer.installed_manifest("demo").await.unwrap().is_none());
    assert!(fx.installer.enabled_modules().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enable_requires_installed_module() {
    let fx = fixture().await;
    let err = fx.installer.set_enabled("ghost", true).await.unwrap_err();
    assert!(matches!(err, ModuleError::ModuleNotFound(_)));

    serve_demo(
        &fx.server,
        json!({ "id": "demo", "name": "Demo", "version": "1.0.0" }),
        DEMO_CODE,
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;
    fx.installer.install("demo", &repo_id).await.unwrap();

    fx.installer.set_enabled("demo", false).await.unwrap();
    assert!(fx.installer.enabled_modules().await.unwrap().is_empty());
    fx.installer.set_enabled("demo", true).await.unwrap();
    fx.installer.set_enabled("demo", true).await.unwrap();
    assert_eq!(fx.installer.enabled_modules().await.unwrap(), vec!["demo"]);
}

#[tokio::test]
async fn test_record_named_module_ids_leave_the_store_usable() {
    let fx = fixture().await;
    serve_demo(
        &fx.server,
        json!({ "id": "config.json", "name": "Config", "version": "1.0.0" }),
        DEMO_CODE,
    )
    .await;
    let repo_id = add_demo_repo(&fx.installer).await;

    fx.installer.uninstall("repositories.json").await.unwrap();
    fx.installer.uninstall("config.json.tmp").await.unwrap();

    fx.installer.install("config.json", &repo_id).await.unwrap();
    assert_eq!(
        fx.installer.enabled_modules().await.unwrap(),
        vec!["config.json"]
    );
    assert!(fx.installer.registry().get(&repo_id).await.unwrap().is_some());

    fx.installer.uninstall("config.json").await.unwrap();
    assert!(fx.installer.enabled_modules().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_branch_cannot_redirect_to_another_repository() {
    let fx = fixture().await;
    serve(
        &fx.server,
        "/evil/payload/main/manifest.json",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "id": "demo", "name": "Demo", "version": "1.0.0" })),
    )
    .await;
    serve(
        &fx.server,
        "/evil/payload/main/index.rhai",
        ResponseTemplate::new(200).set_body_string(DEMO_CODE),
    )
    .await;

    let err = fx
        .installer
        .registry()
        .add(
            NewRepository::new("Trusted", "https://github.com/acme/demo")
                .with_branch("../../evil/payload/main"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ModuleError::Validation(_)));
    assert!(fx
        .installer
        .registry()
        .list()
        .await
        .unwrap()
        .iter()
        .all(|r| r.url != "https://github.com/acme/demo"));
}

proptest! {
    #[test]
    fn prop_checksum_accepts_only_matching_code(
        code in "[ -~]{0,200}",
        other in "[ -~]{0,200}",
    ) {
        let hash = compute_hash(code.as_bytes());
        prop_assert!(verify_hash(code.as_bytes(), &hash).is_ok());
        let upper = format!("sha256:{}", hash.to_uppercase());
        prop_assert!(verify_hash(code.as_bytes(), &upper).is_ok());
        if other != code {
            prop_assert!(verify_hash(other.as_bytes(), &hash).is_err());
        }
    }
}
