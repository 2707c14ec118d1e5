//! Module management HTTP API
//!
//! Exposes the server-side installer over REST. All routes are mounted under
//! `/api/modules`.
//!
//! # Endpoints
//!
//! - GET /repositories - List registered repositories
//! - POST /repositories - Register a repository, returns the assigned id
//! - DELETE /repositories/:id - Remove a repository
//! - GET /enabled - Ids in the enabled-set
//! - GET /available - Manifests discovered across enabled repositories
//! - GET /:module_id/manifest - Installed manifest
//! - GET /:module_id/bundle - Installed code bundle (`text/x-rhai`)
//! - POST /install - Install `{moduleId, repositoryId}`
//! - POST /:module_id/toggle - Enable or disable `{enabled}`
//! - DELETE /:module_id - Uninstall

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use reportmate_modules::Installer;
use sdk::errors::ModuleError;
use sdk::manifest::validate_module_id;
use sdk::types::{ErrorResponse, InstallRequest, NewRepository, SuccessResponse, ToggleRequest};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

/// Mount point of the module routes
pub const API_PREFIX: &str = "/api/modules";

/// Content type of served code bundles
pub const BUNDLE_CONTENT_TYPE: &str = "text/x-rhai";

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    installer: Arc<Installer>,
}

impl AppState {
    pub fn new(installer: Installer) -> Self {
        Self {
            installer: Arc::new(installer),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let modules = Router::new()
        .route("/repositories", get(list_repositories).post(add_repository))
        .route("/repositories/:id", delete(remove_repository))
        .route("/enabled", get(enabled_modules))
        .route("/available", get(available_modules))
        .route("/install", post(install_module))
        .route("/:module_id", delete(uninstall_module))
        .route("/:module_id/manifest", get(module_manifest))
        .route("/:module_id/bundle", get(module_bundle))
        .route("/:module_id/toggle", post(toggle_module));

    Router::new()
        .nest(API_PREFIX, modules)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), ModuleError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ModuleError::from)
}

/// Running API server with a shutdown handle
pub struct ApiServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ApiServer {
    /// Bind `addr` and serve in a background task
    pub async fn start(installer: Installer, addr: SocketAddr) -> Result<Self, ModuleError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ModuleError::Transport(format!("Failed to bind {}: {}", addr, e)))?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = AppState::new(installer);

        let handle = tokio::spawn(async move {
            tracing::info!("Module API listening on http://{}{}", addr, API_PREFIX);

            let shutdown = async move {
                shutdown_rx.await.ok();
                tracing::info!("Module API shutting down gracefully");
            };
            if let Err(e) = serve(listener, state, shutdown).await {
                tracing::error!("Module API error: {}", e);
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and wait for in-flight requests to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            tracing::error!("Module API task failed: {}", e);
        }
    }
}

// ---- responses -------------------------------------------------------------

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(err: &ModuleError) -> StatusCode {
    match err {
        ModuleError::Validation(_) | ModuleError::ManifestInvalid(_) => StatusCode::BAD_REQUEST,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: ModuleError) -> Response {
    error_response(status_for(&err), err.to_string())
}

fn bad_body(rejection: JsonRejection) -> Response {
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

fn ok() -> Response {
    Json(SuccessResponse::ok()).into_response()
}

// ---- repositories ----------------------------------------------------------

async fn list_repositories(State(state): State<AppState>) -> Response {
    match state.installer.registry().list().await {
        Ok(list) => Json(list).into_response(),
        Err(e) => failure(e),
    }
}

async fn add_repository(
    State(state): State<AppState>,
    body: Result<Json<NewRepository>, JsonRejection>,
) -> Response {
    let Json(repo) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    match state.installer.registry().add(repo).await {
        Ok(id) => Json(SuccessResponse::with_id(id)).into_response(),
        Err(e) => failure(e),
    }
}

async fn remove_repository(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.installer.registry().remove(&id).await {
        Ok(()) => ok(),
        Err(e) => failure(e),
    }
}

// ---- modules ---------------------------------------------------------------

async fn enabled_modules(State(state): State<AppState>) -> Response {
    match state.installer.enabled_modules().await {
        Ok(ids) => Json(ids).into_response(),
        Err(e) => failure(e),
    }
}

async fn available_modules(State(state): State<AppState>) -> Response {
    match state.installer.available().await {
        Ok(manifests) => Json(manifests).into_response(),
        Err(e) => failure(e),
    }
}

async fn module_manifest(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
) -> Response {
    match state.installer.installed_manifest(&module_id).await {
        Ok(Some(manifest)) => Json(manifest).into_response(),
        Ok(None) | Err(ModuleError::Validation(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("Module not found: {}", module_id))
        }
        Err(e) => failure(e),
    }
}

async fn module_bundle(State(state): State<AppState>, Path(module_id): Path<String>) -> Response {
    match state.installer.installed_bundle(&module_id).await {
        Ok(Some(code)) => ([(header::CONTENT_TYPE, BUNDLE_CONTENT_TYPE)], code).into_response(),
        Ok(None) | Err(ModuleError::Validation(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("Module not found: {}", module_id))
        }
        Err(e) => failure(e),
    }
}

async fn install_module(
    State(state): State<AppState>,
    body: Result<Json<InstallRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    if let Err(e) = validate_module_id(&request.module_id) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state
        .installer
        .install(&request.module_id, &request.repository_id)
        .await
    {
        Ok(_) => ok(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn toggle_module(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
    body: Result<Json<ToggleRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    match state
        .installer
        .set_enabled(&module_id, request.enabled)
        .await
    {
        Ok(()) => ok(),
        Err(e) => failure(e),
    }
}

async fn uninstall_module(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
) -> Response {
    match state.installer.uninstall(&module_id).await {
        Ok(()) => ok(),
        Err(ModuleError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
