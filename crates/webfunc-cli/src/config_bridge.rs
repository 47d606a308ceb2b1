//! Maps `webfunc_config::Config` onto sandbox and telemetry settings.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use webfunc_config::Config;
use webfunc_sandbox::{SandboxSession, SessionConfig, WasmEngine, WasmEngineConfig};
use webfunc_telemetry::{FileRotation, LogConfig, LogFormat};

/// Logging settings from `[logging]`.
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or(LogFormat::Compact);

    let log_config = LogConfig::new(&cfg.logging.level).with_format(format);
    match &cfg.logging.directory {
        Some(dir) => log_config.with_file_logging(dir, FileRotation::Daily),
        None => log_config,
    }
}

/// Per-request session settings from `[sandbox]`.
pub(crate) fn to_session_config(cfg: &Config) -> SessionConfig {
    SessionConfig {
        mount_path: cfg.sandbox.mount_path.clone(),
        mode: cfg.sandbox.mode.clone(),
        timeout: Some(cfg.sandbox.timeout()),
        extra_outputs: cfg.sandbox.outputs.clone(),
    }
}

/// Engine tunables from `[sandbox]`.
pub(crate) fn to_engine_config(cfg: &Config) -> WasmEngineConfig {
    WasmEngineConfig {
        entrypoint: cfg.sandbox.entrypoint.clone(),
        max_memory_pages: cfg.sandbox.max_memory_pages,
        wasi: cfg.sandbox.wasi,
    }
}

/// Load the module (`module` overrides `sandbox.module`), check it exports the
/// entrypoint, and wrap it in a session.
pub(crate) fn build_session(cfg: &Config, module: Option<&Path>) -> Result<SandboxSession> {
    let path = module
        .or(cfg.sandbox.module.as_deref())
        .context("no WASM module given; pass --module or set sandbox.module / WEBFUNC_MODULE")?;

    let engine = WasmEngine::from_file(path, to_engine_config(cfg))?;
    engine
        .preflight()
        .with_context(|| format!("{} is not a usable handler", path.display()))?;

    Ok(SandboxSession::new(Arc::new(engine), to_session_config(cfg)))
}
