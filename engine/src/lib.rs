//! ReportMate Engine Library
//!
//! Configuration, telemetry, the client-side module runtime and the CLI.
//! It is used by both the main binary and integration tests.

/// Command-line interface
pub mod cli;

/// HTTP client for the module API
pub mod client;

/// Configuration management module
pub mod config;

/// Command handlers module
pub mod handlers;

/// Client-side module runtime
pub mod runtime;

/// Telemetry and observability
pub mod telemetry;
