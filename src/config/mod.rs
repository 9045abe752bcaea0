//! Application configuration.
//!
//! ## Loading order
//!
//! 1. CLI flags (`--bind-address`, `--database-url`, ...)
//! 2. Environment variables (optionally loaded from a `.env` file via
//!    `dotenvy`)
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(AppConfig::from_env(cli_overrides)?);
//! let weights = &config::get().scheduler.weights;
//! ```

mod app_config;

pub use app_config::*;

use std::sync::OnceLock;

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Initialize the global application configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: AppConfig) {
    if APP_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global application configuration.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
pub fn get() -> &'static AppConfig {
    APP_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    APP_CONFIG.get().is_some()
}
