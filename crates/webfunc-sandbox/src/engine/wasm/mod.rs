//! Extism-backed execution engine.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use extism::{CancelHandle, Manifest, PluginBuilder, UserData, Wasm};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webfunc_vfs::VirtualFileSystem;

use crate::engine::wasm::host::register_host_functions;
use crate::engine::wasm::host_state::HostState;
use crate::engine::{CleanExit, ExecutionEngine, Invocation};
use crate::error::{SandboxError, SandboxResult};

/// Host functions exposed to guests.
pub mod host;
/// State shared by the host functions of one plugin instance.
pub mod host_state;

/// Tunables for [`WasmEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmEngineConfig {
    /// Exported function called for every request.
    pub entrypoint: String,
    /// Linear memory ceiling in 64 KiB pages.
    pub max_memory_pages: u32,
    /// Link WASI preview 1 imports.
    pub wasi: bool,
}

impl Default for WasmEngineConfig {
    fn default() -> Self {
        Self {
            entrypoint: "handle".into(),
            max_memory_pages: 1024, // 64MB
            wasi: true,
        }
    }
}

/// Executes WASM modules in Extism/Wasmtime.
///
/// Each `execute` call instantiates a fresh plugin with its own
/// [`HostState`], so no guest state survives between requests. The mounted
/// filesystem and stdio are reachable only through the `webfunc_*` host
/// functions.
pub struct WasmEngine {
    module: Arc<[u8]>,
    config: WasmEngineConfig,
}

impl WasmEngine {
    /// Create an engine for the module bytes in `module`.
    #[must_use]
    pub fn new(module: impl Into<Vec<u8>>, config: WasmEngineConfig) -> Self {
        Self {
            module: module.into().into(),
            config,
        }
    }

    /// Read the module from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Io`] if the file cannot be read.
    pub fn from_file(path: &Path, config: WasmEngineConfig) -> SandboxResult<Self> {
        let module = std::fs::read(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to read WASM module {}: {e}", path.display()),
            )
        })?;
        info!(path = %path.display(), size = module.len(), "Loaded WASM module");
        Ok(Self::new(module, config))
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &WasmEngineConfig {
        &self.config
    }

    /// Instantiate the module once against an empty filesystem and check that
    /// the entrypoint is exported.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::EngineInit`] if the module does not compile,
    /// link, or export the entrypoint.
    pub fn preflight(&self) -> SandboxResult<()> {
        let invocation = Invocation {
            filesystem: Arc::new(VirtualFileSystem::new()),
            mount_path: String::new(),
            stdin: Vec::new(),
            stdout: Box::new(io::sink()),
            stderr: Box::new(io::sink()),
            random: Box::new(rand::rngs::OsRng),
            env: std::collections::BTreeMap::new(),
            timeout: None,
            cancel: None,
        };
        let (plugin, _) = self.instantiate(invocation)?;
        if !plugin.function_exists(&self.config.entrypoint) {
            return Err(SandboxError::EngineInit(format!(
                "module does not export `{}`",
                self.config.entrypoint
            )));
        }
        Ok(())
    }

    fn instantiate(
        &self,
        invocation: Invocation,
    ) -> SandboxResult<(extism::Plugin, UserData<HostState>)> {
        let env = invocation.env.clone();
        let timeout = invocation.timeout;

        // TODO: compile once per engine with extism's `CompiledPlugin` instead
        // of per request.
        let mut manifest = Manifest::new([Wasm::data(self.module.to_vec())])
            .with_memory_max(self.config.max_memory_pages);
        if let Some(timeout) = timeout {
            manifest = manifest.with_timeout(timeout);
        }
        for (key, value) in env {
            manifest = manifest.with_config_key(key, value);
        }

        let user_data = UserData::new(HostState::from_invocation(invocation));
        let builder = PluginBuilder::new(manifest).with_wasi(self.config.wasi);
        let builder = register_host_functions(builder, user_data.clone());

        let plugin = builder.build().map_err(|e| {
            SandboxError::EngineInit(format!("Failed to build Extism plugin: {e}"))
        })?;
        Ok((plugin, user_data))
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("module_len", &self.module.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ExecutionEngine for WasmEngine {
    fn execute(&self, invocation: Invocation) -> SandboxResult<CleanExit> {
        let timeout = invocation.timeout;
        let cancel = invocation.cancel.clone();
        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(SandboxError::Cancelled);
        }

        let (mut plugin, user_data) = self.instantiate(invocation)?;
        let _watcher = cancel
            .clone()
            .and_then(|token| CancelWatcher::spawn(token, plugin.cancel_handle()));

        debug!(entrypoint = %self.config.entrypoint, "Calling guest");
        let started = Instant::now();
        let input: &[u8] = &[];
        let result = plugin.call::<&[u8], Vec<u8>>(&self.config.entrypoint, input);
        let elapsed = started.elapsed();

        if let Some(code) = recorded_exit(&user_data)? {
            debug!(code, ?elapsed, "Guest exited");
            return Ok(CleanExit(code));
        }

        match result {
            Ok(output) => {
                if !output.is_empty() {
                    forward_output(&user_data, &output)?;
                }
                debug!(?elapsed, "Guest returned");
                Ok(CleanExit::SUCCESS)
            },
            Err(e) => {
                if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                    return Err(SandboxError::Cancelled);
                }
                if let Some(limit) = timeout.filter(|limit| elapsed >= *limit) {
                    return Err(SandboxError::DeadlineExceeded(limit));
                }
                warn!(error = %e, ?elapsed, "Guest faulted");
                Err(SandboxError::ExecutionFault(format!("{e:#}")))
            },
        }
    }
}

fn recorded_exit(user_data: &UserData<HostState>) -> SandboxResult<Option<u32>> {
    let ud = user_data
        .get()
        .map_err(|e| SandboxError::ExecutionFault(e.to_string()))?;
    let state = ud.lock().map_err(|e| {
        SandboxError::ExecutionFault(format!("host state lock poisoned: {e}"))
    })?;
    Ok(state.exit_code())
}

/// The entrypoint's return value is treated as trailing stdout.
fn forward_output(user_data: &UserData<HostState>, output: &[u8]) -> SandboxResult<()> {
    let ud = user_data
        .get()
        .map_err(|e| SandboxError::ExecutionFault(e.to_string()))?;
    let mut state = ud.lock().map_err(|e| {
        SandboxError::ExecutionFault(format!("host state lock poisoned: {e}"))
    })?;
    state.write_stdout(output)?;
    Ok(())
}

/// Cancels a running plugin when the caller's token fires.
///
/// Requires a tokio runtime on the current thread (true inside
/// `spawn_blocking`). Dropping the watcher stops it.
struct CancelWatcher {
    done: CancellationToken,
}

impl CancelWatcher {
    fn spawn(token: CancellationToken, handle: CancelHandle) -> Option<Self> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime; cancellation relies on the manifest timeout");
            return None;
        };
        let done = CancellationToken::new();
        let finished = done.clone();
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    if let Err(e) = handle.cancel() {
                        warn!(error = %e, "Failed to cancel guest");
                    }
                },
                () = finished.cancelled() => {},
            }
        });
        Some(Self { done })
    }
}

impl Drop for CancelWatcher {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn invocation(cancel: Option<CancellationToken>) -> Invocation {
        Invocation {
            filesystem: Arc::new(VirtualFileSystem::new()),
            mount_path: "/var/webfunc".into(),
            stdin: Vec::new(),
            stdout: Box::new(io::sink()),
            stderr: Box::new(io::sink()),
            random: Box::new(rand::rngs::OsRng),
            env: BTreeMap::new(),
            timeout: Some(std::time::Duration::from_secs(1)),
            cancel,
        }
    }

    #[test]
    fn default_config() {
        let config = WasmEngineConfig::default();
        assert_eq!(config.entrypoint, "handle");
        assert_eq!(config.max_memory_pages, 1024);
        assert!(config.wasi);
    }

    #[test]
    fn missing_module_file_is_io_error() {
        let err = WasmEngine::from_file(
            Path::new("/nonexistent/module.wasm"),
            WasmEngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SandboxError::Io(_)));
        assert!(err.to_string().contains("module.wasm"));
    }

    #[test]
    fn invalid_module_fails_to_initialize() {
        let engine = WasmEngine::new(b"not wasm".to_vec(), WasmEngineConfig::default());
        let err = engine.execute(invocation(None)).unwrap_err();
        assert!(matches!(err, SandboxError::EngineInit(_)));
        assert!(matches!(engine.preflight(), Err(SandboxError::EngineInit(_))));
    }

    fn wat_engine(source: &str) -> WasmEngine {
        WasmEngine::new(wat::parse_str(source).unwrap(), WasmEngineConfig::default())
    }

    const EXIT_TWO: &str = r#"
        (module
          (import "extism:host/env" "alloc" (func $alloc (param i64) (result i64)))
          (import "extism:host/env" "store_u64" (func $store_u64 (param i64 i64)))
          (import "extism:host/user" "webfunc_exit" (func $exit (param i64)))
          (func (export "handle") (result i32)
            (local $code i64)
            (local.set $code (call $alloc (i64.const 8)))
            (call $store_u64 (local.get $code) (i64.const 2))
            (call $exit (local.get $code))
            (i32.const 0)))
    "#;

    const TRAP: &str = r#"
        (module
          (func (export "handle") (result i32)
            unreachable))
    "#;

    const SPIN: &str = r#"
        (module
          (func (export "handle") (result i32)
            (loop $forever (br $forever))
            (i32.const 0)))
    "#;

    /// Opens the status file by its absolute guest path, writes `404` through
    /// the handle, and prints `hi`.
    const STATUS_AND_STDOUT: &str = r#"
        (module
          (import "extism:host/env" "alloc" (func $alloc (param i64) (result i64)))
          (import "extism:host/env" "store_u8" (func $store_u8 (param i64 i32)))
          (import "extism:host/env" "load_u8" (func $load_u8 (param i64) (result i32)))
          (import "extism:host/env" "store_u64" (func $store_u64 (param i64 i64)))
          (import "extism:host/env" "load_u64" (func $load_u64 (param i64) (result i64)))
          (import "extism:host/user" "webfunc_open" (func $open (param i64) (result i64)))
          (import "extism:host/user" "webfunc_write" (func $write (param i64 i64) (result i64)))
          (import "extism:host/user" "webfunc_stdout" (func $stdout (param i64)))
          (memory 1)
          (data (i32.const 0) "/var/webfunc/status_code")
          (data (i32.const 32) "404")
          (data (i32.const 48) "hi")
          (func $copy (param $src i32) (param $len i32) (result i64)
            (local $dst i64) (local $i i32)
            (local.set $dst (call $alloc (i64.extend_i32_u (local.get $len))))
            (block $done
              (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                (call $store_u8
                  (i64.add (local.get $dst) (i64.extend_i32_u (local.get $i)))
                  (i32.load8_u (i32.add (local.get $src) (local.get $i))))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $next)))
            (local.get $dst))
          (func (export "handle") (result i32)
            (local $res i64) (local $handle i64)
            (local.set $res (call $open (call $copy (i32.const 0) (i32.const 24))))
            (if (i32.ne (call $load_u8 (local.get $res)) (i32.const 0)) (then unreachable))
            (local.set $handle (call $alloc (i64.const 8)))
            (call $store_u64
              (local.get $handle)
              (call $load_u64 (i64.add (local.get $res) (i64.const 1))))
            (local.set $res (call $write (local.get $handle) (call $copy (i32.const 32) (i32.const 3))))
            (if (i32.ne (call $load_u8 (local.get $res)) (i32.const 0)) (then unreachable))
            (call $stdout (call $copy (i32.const 48) (i32.const 2)))
            (i32.const 0)))
    "#;

    #[test]
    fn guest_exit_is_clean_exit_with_code() {
        let engine = wat_engine(EXIT_TWO);
        let exit = engine.execute(invocation(None)).unwrap();
        assert_eq!(exit, CleanExit(2));
    }

    #[test]
    fn guest_trap_is_execution_fault() {
        let engine = wat_engine(TRAP);
        let err = engine.execute(invocation(None)).unwrap_err();
        assert!(matches!(err, SandboxError::ExecutionFault(_)), "{err:?}");
    }

    #[test]
    fn runaway_guest_hits_deadline() {
        let engine = wat_engine(SPIN);
        let mut inv = invocation(None);
        inv.timeout = Some(std::time::Duration::from_millis(300));
        let err = engine.execute(inv).unwrap_err();
        assert!(
            matches!(err, SandboxError::DeadlineExceeded(limit) if limit == std::time::Duration::from_millis(300)),
            "{err:?}"
        );
    }

    #[test]
    fn guest_writes_status_and_stdout_through_host_functions() {
        use crate::request::RequestMetadata;
        use crate::session::{SandboxSession, SessionConfig};
        use crate::tee::SharedBuffer;

        let engine = wat_engine(STATUS_AND_STDOUT);
        assert!(engine.preflight().is_ok());

        let session = SandboxSession::new(Arc::new(engine), SessionConfig::default());
        let sink = SharedBuffer::new();
        let report = session
            .run(&RequestMetadata::new("GET", "/"), Vec::new(), sink.clone(), None)
            .unwrap();

        assert_eq!(report.exit_code, 0);
        assert_eq!(report.status_code(), Some(404));
        assert_eq!(report.stdout, b"hi");
        assert_eq!(sink.snapshot(), b"hi");
    }

    #[test]
    fn cancelled_before_start() {
        let engine = WasmEngine::new(b"not wasm".to_vec(), WasmEngineConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        let err = engine.execute(invocation(Some(token))).unwrap_err();
        assert!(matches!(err, SandboxError::Cancelled));
    }
}
