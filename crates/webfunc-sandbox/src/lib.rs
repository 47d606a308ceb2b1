//! Webfunc Sandbox - per-request guest execution.
//!
//! A [`SandboxSession`] turns one inbound request into one guest execution:
//!
//! 1. [`SandboxFilesystemBuilder`] renders the request into a fresh
//!    [`webfunc_vfs::VirtualFileSystem`] (`headers`, `method`, `path`,
//!    `query`, plus an empty writable `status_code`).
//! 2. An [`ExecutionEngine`] runs the guest with that filesystem mounted,
//!    the request body on stdin, and stdout teed to the caller's sink.
//! 3. The resulting [`SessionReport`] carries captured stdout and stderr, the
//!    exit code, and the terminal content of every writable file.
//!
//! [`WasmEngine`] is the production engine (Extism). Guests reach the
//! filesystem through the `webfunc_*` host functions.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Request-to-filesystem population.
pub mod builder;
/// Execution engines.
pub mod engine;
/// Sandbox error types.
pub mod error;
/// Request metadata.
pub mod request;
/// Session orchestration.
pub mod session;
/// Output tee and capture buffers.
pub mod tee;

pub use builder::SandboxFilesystemBuilder;
#[cfg(any(test, feature = "test-support"))]
pub use engine::ScriptedEngine;
pub use engine::{CleanExit, ExecutionEngine, Invocation, WasmEngine, WasmEngineConfig};
pub use error::{SandboxError, SandboxResult};
pub use request::RequestMetadata;
pub use session::{SandboxSession, SessionConfig, SessionReport};
pub use tee::{SharedBuffer, TeeWriter};
pub use webfunc_vfs as vfs;
