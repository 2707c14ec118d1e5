//! Client-side module runtime
//!
//! - [`registry`]: loaded-module table with at-most-once loading per id
//! - [`compat`]: host-version ranges and dependency checks
//! - [`sandbox`]: Rhai engine that evaluates module code
//! - [`source`]: the server operations a session depends on

pub mod compat;
pub mod registry;
pub mod sandbox;
pub mod source;

pub use registry::{ModuleRuntime, ModuleRuntimeRegistry};
pub use sandbox::{ModuleInstance, NetworkCapability, Sandbox, SandboxSettings};
pub use source::ModuleSource;
