//! Execution engine trait for sandboxed guests.
//!
//! The session layer never talks to a WASM runtime directly. It hands an
//! [`Invocation`] (mounted filesystem, stdio, environment, limits) to an
//! [`ExecutionEngine`] and interprets the [`CleanExit`] or error it gets back.

#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod wasm;

#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedEngine;
pub use wasm::{WasmEngine, WasmEngineConfig};

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio_util::sync::CancellationToken;
use webfunc_vfs::FileSystem;

use crate::error::SandboxResult;

/// Normal guest termination carrying its exit code.
///
/// This is not an error: a guest that exits with a non-zero code still
/// completed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CleanExit(pub u32);

impl CleanExit {
    /// The guest returned from its entrypoint without calling exit.
    pub const SUCCESS: Self = Self(0);

    /// The exit code.
    #[must_use]
    pub fn code(self) -> u32 {
        self.0
    }
}

/// Everything an engine needs to run one guest execution.
pub struct Invocation {
    /// Filesystem exposed under `mount_path`.
    pub filesystem: Arc<dyn FileSystem>,
    /// Absolute guest path the filesystem is mounted at.
    pub mount_path: String,
    /// Bytes the guest reads from standard input.
    pub stdin: Vec<u8>,
    /// Guest standard output.
    pub stdout: Box<dyn Write + Send>,
    /// Guest standard error.
    pub stderr: Box<dyn Write + Send>,
    /// Source for guest random requests.
    pub random: Box<dyn RngCore + Send>,
    /// Environment assignments.
    pub env: BTreeMap<String, String>,
    /// Wall-clock limit for the execution.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation from the caller.
    pub cancel: Option<CancellationToken>,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("mount_path", &self.mount_path)
            .field("stdin_len", &self.stdin.len())
            .field("env", &self.env)
            .field("timeout", &self.timeout)
            .field("has_cancel", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// A runtime capable of executing one sandboxed guest per call.
///
/// Implementations must not retain the invocation's filesystem or writers
/// after `execute` returns.
pub trait ExecutionEngine: Send + Sync {
    /// Run the guest to completion.
    ///
    /// # Errors
    ///
    /// - [`crate::SandboxError::ExecutionFault`] on abnormal termination.
    /// - [`crate::SandboxError::DeadlineExceeded`] when `timeout` elapses.
    /// - [`crate::SandboxError::Cancelled`] when `cancel` fires.
    /// - [`crate::SandboxError::EngineInit`] if the module cannot be loaded.
    fn execute(&self, invocation: Invocation) -> SandboxResult<CleanExit>;
}
