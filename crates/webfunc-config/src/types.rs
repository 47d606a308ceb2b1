//! Configuration struct definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP front end.
    pub server: ServerSection,
    /// Guest execution.
    pub sandbox: SandboxSection,
    /// Logging.
    pub logging: LoggingSection,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address, `host:port`.
    pub bind_addr: String,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_owned(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// `[sandbox]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Path of the WASM module to serve.
    pub module: Option<PathBuf>,
    /// Guest path the virtual filesystem is mounted at.
    pub mount_path: String,
    /// Value of `WEBFUNC_MODE` inside the guest.
    pub mode: String,
    /// Exported function called per request.
    pub entrypoint: String,
    /// Per-request execution limit in milliseconds.
    pub timeout_ms: u64,
    /// Guest memory ceiling in 64 KiB pages.
    pub max_memory_pages: u32,
    /// Link WASI imports.
    pub wasi: bool,
    /// Extra writable output files besides `status_code`.
    pub outputs: Vec<String>,
}

impl SandboxSection {
    /// `timeout_ms` as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            module: None,
            mount_path: "/var/webfunc".to_owned(),
            mode: "HTTP".to_owned(),
            entrypoint: "handle".to_owned(),
            timeout_ms: 30_000,
            max_memory_pages: 1024,
            wasi: true,
            outputs: Vec::new(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base filter, e.g. `info` or `webfunc_sandbox=debug`.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Write rolling log files here instead of stderr.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directory: None,
        }
    }
}
