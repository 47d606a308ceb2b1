use std::time::Duration;

use thiserror::Error;
use webfunc_vfs::VfsError;

/// Errors that can occur while preparing or running a sandbox session.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Populating or reading the virtual filesystem failed.
    #[error("virtual filesystem error: {0}")]
    Vfs(#[from] VfsError),

    /// The guest terminated abnormally (trap, panic, host function failure).
    #[error("guest execution fault: {0}")]
    ExecutionFault(String),

    /// The guest ran past its deadline.
    #[error("guest exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    /// The caller cancelled the execution.
    #[error("guest execution cancelled")]
    Cancelled,

    /// The engine could not instantiate the module.
    #[error("engine initialization failed: {0}")]
    EngineInit(String),

    /// Reading the module or writing an output stream failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
