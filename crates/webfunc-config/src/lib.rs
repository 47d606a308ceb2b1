//! Layered configuration for webfunc.
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. `WEBFUNC_*` environment variables (`WEBFUNC_BIND_ADDR`,
//!    `WEBFUNC_MODULE`, `WEBFUNC_MOUNT_PATH`, `WEBFUNC_TIMEOUT_MS`,
//!    `WEBFUNC_LOG_LEVEL`)
//! 2. The file passed with `--config`
//! 3. The user file (`~/.config/webfunc/config.toml` on Linux)
//! 4. Embedded defaults (`defaults.toml`)
//!
//! ```rust,no_run
//! use webfunc_config::ConfigLoader;
//!
//! let loaded = ConfigLoader::from_environment().load().unwrap();
//! println!("listening on {}", loaded.config.server.bind_addr);
//! ```
//!
//! The only webfunc crate this depends on is `webfunc-vfs`, for the reserved
//! file names; the binary maps these types onto sandbox and telemetry
//! settings.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, LoadedConfig, load_file, user_config_path};
pub use types::{Config, LoggingSection, SandboxSection, ServerSection};
