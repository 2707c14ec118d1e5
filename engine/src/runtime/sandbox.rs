//! Script sandbox for module code
//!
//! Modules are Rhai scripts evaluated by a dedicated engine per module. The
//! engine starts with no host access beyond an explicit binding table:
//!
//! - `ui`: constant map of host UI component names
//! - `module`: constant map with the module's `id`, `name` and `version`
//! - `log(msg)`, `warn(msg)`, `error(msg)`, `print`, `debug`: routed to `tracing`
//! - `fetch(url)`: only registered for manifests granting the `network` permission
//!
//! `eval` is disabled, `import` resolves nothing, and operation, call-depth and
//! size limits bound every evaluation.
//!
//! # Export contract
//!
//! A script either evaluates to an object map (the default export) or defines
//! a variable `exports` holding one. Anything else is an execution error.
//!
//! ```no_run
//! use reportmate_engine::runtime::sandbox::{Sandbox, SandboxSettings};
//! use sdk::manifest::ModuleManifest;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = ModuleManifest::from_json(r#"{"id":"demo","name":"Demo","version":"1.0.0"}"#)?;
//! let sandbox = Sandbox::new(SandboxSettings::default());
//! let instance = sandbox.execute(r#"#{ title: "Demo", on_enable: || log("on") }"#, &manifest)?;
//! instance.call_hook("on_enable")?;
//! # Ok(())
//! # }
//! ```

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Map, Position, Scope, AST};
use sdk::errors::ModuleError;
use sdk::manifest::{ModuleManifest, NETWORK_PERMISSION};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_FN_EXPR_DEPTH: usize = 32;
const MAX_STRING_SIZE: usize = 1 << 20;
const MAX_COLLECTION_SIZE: usize = 10_000;

/// Sandbox limits and host bindings
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub max_operations: u64,
    pub components: Vec<String>,
    pub fetch_timeout: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            components: Vec::new(),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Network access granted to modules with the `network` permission
pub trait NetworkCapability: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, String>;
}

/// Blocking HTTP GET on a helper thread
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    timeout: Duration,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl NetworkCapability for HttpNetwork {
    fn fetch(&self, url: &str) -> Result<String, String> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("fetch only supports http(s) URLs, got '{}'", url));
        }

        let url = url.to_string();
        let timeout = self.timeout;

        // The blocking client must not run on an async worker thread
        std::thread::spawn(move || -> Result<String, String> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| e.to_string())?;
            client
                .get(&url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.text())
                .map_err(|e| format!("GET {} failed: {}", url, e))
        })
        .join()
        .map_err(|_| "fetch worker panicked".to_string())?
    }
}

/// Builds an isolated engine per module and evaluates its code
#[derive(Clone)]
pub struct Sandbox {
    settings: SandboxSettings,
    network: Arc<dyn NetworkCapability>,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    pub fn new(settings: SandboxSettings) -> Self {
        let network = Arc::new(HttpNetwork::new(settings.fetch_timeout));
        Self { settings, network }
    }

    /// Use a custom network capability for `fetch`
    pub fn with_network(settings: SandboxSettings, network: Arc<dyn NetworkCapability>) -> Self {
        Self { settings, network }
    }

    /// Evaluate `code` for `manifest` and collect its exports
    pub fn execute(&self, code: &str, manifest: &ModuleManifest) -> Result<ModuleInstance, ModuleError> {
        let engine = self.build_engine(manifest);
        let mut scope = self.bindings(manifest);

        let ast = engine.compile_with_scope(&scope, code).map_err(|e| {
            ModuleError::Execution(format!("{}: parse error: {}", manifest.id, e))
        })?;

        let result = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| ModuleError::Execution(format!("{}: {}", manifest.id, e)))?;

        let exports = match result.try_cast::<Map>() {
            Some(map) => map,
            None => scope.get_value::<Map>("exports").ok_or_else(|| {
                ModuleError::Execution(format!(
                    "{}: script must evaluate to an object map or define `exports`",
                    manifest.id
                ))
            })?,
        };

        debug!(
            "Module {} exports: {}",
            manifest.id,
            exports.keys().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(ModuleInstance {
            module_id: manifest.id.clone(),
            engine,
            ast,
            exports,
        })
    }

    fn build_engine(&self, manifest: &ModuleManifest) -> Engine {
        let mut engine = Engine::new();

        engine.disable_symbol("eval");
        engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());
        engine.set_max_operations(self.settings.max_operations);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_COLLECTION_SIZE);
        engine.set_max_map_size(MAX_COLLECTION_SIZE);

        let id = manifest.id.clone();
        engine.on_print(move |text| info!(target: "module", module = %id, "{}", text));
        let id = manifest.id.clone();
        engine.on_debug(move |text, _source, pos: Position| {
            debug!(target: "module", module = %id, "{} @ {}", text, pos)
        });

        let id = manifest.id.clone();
        engine.register_fn("log", move |msg: Dynamic| {
            info!(target: "module", module = %id, "{}", msg)
        });
        let id = manifest.id.clone();
        engine.register_fn("warn", move |msg: Dynamic| {
            warn!(target: "module", module = %id, "{}", msg)
        });
        let id = manifest.id.clone();
        engine.register_fn("error", move |msg: Dynamic| {
            error!(target: "module", module = %id, "{}", msg)
        });

        if manifest.has_permission(NETWORK_PERMISSION) {
            let network = Arc::clone(&self.network);
            engine.register_fn(
                "fetch",
                move |url: &str| -> Result<String, Box<EvalAltResult>> {
                    network.fetch(url).map_err(|e| e.into())
                },
            );
        }

        engine
    }

    fn bindings(&self, manifest: &ModuleManifest) -> Scope<'static> {
        let mut ui = Map::new();
        for name in &self.settings.components {
            ui.insert(name.as_str().into(), Dynamic::from(name.clone()));
        }

        let mut module = Map::new();
        module.insert("id".into(), Dynamic::from(manifest.id.clone()));
        module.insert("name".into(), Dynamic::from(manifest.name.clone()));
        module.insert("version".into(), Dynamic::from(manifest.version.clone()));

        let mut scope = Scope::new();
        scope.push_constant("ui", ui);
        scope.push_constant("module", module);
        scope
    }
}

/// An evaluated module: its engine, compiled script and exports
pub struct ModuleInstance {
    module_id: String,
    engine: Engine,
    ast: AST,
    exports: Map,
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("module_id", &self.module_id)
            .field("exports", &self.export_names())
            .finish_non_exhaustive()
    }
}

impl ModuleInstance {
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn exports(&self) -> &Map {
        &self.exports
    }

    pub fn export(&self, name: &str) -> Option<&Dynamic> {
        self.exports.get(name)
    }

    pub fn export_names(&self) -> Vec<String> {
        self.exports.keys().map(|k| k.to_string()).collect()
    }

    /// Invoke a lifecycle hook (`on_enable`, `on_disable`).
    ///
    /// Looks for a function pointer in the exports first, then for a
    /// zero-argument script function of that name. Returns `false` when the
    /// module defines neither.
    pub fn call_hook(&self, name: &str) -> Result<bool, ModuleError> {
        if let Some(value) = self.exports.get(name) {
            let Some(fn_ptr) = value.clone().try_cast::<FnPtr>() else {
                return Err(ModuleError::Execution(format!(
                    "{}: export '{}' is not a function",
                    self.module_id, name
                )));
            };
            fn_ptr
                .call::<Dynamic>(&self.engine, &self.ast, ())
                .map_err(|e| ModuleError::Execution(format!("{}.{}: {}", self.module_id, name, e)))?;
            return Ok(true);
        }

        let defined = self
            .ast
            .iter_functions()
            .any(|f| f.name == name && f.params.is_empty());
        if !defined {
            return Ok(false);
        }

        // Top-level statements already ran during `execute`
        let options = CallFnOptions::new().eval_ast(false);
        let mut scope = Scope::new();
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut scope, &self.ast, name, ())
            .map_err(|e| ModuleError::Execution(format!("{}.{}: {}", self.module_id, name, e)))?;
        Ok(true)
    }
}
