//! An engine that runs a Rust closure in place of a WASM guest.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::{CleanExit, ExecutionEngine, Invocation};
use crate::error::SandboxResult;

type Script = dyn Fn(&mut Invocation) -> SandboxResult<CleanExit> + Send + Sync;

/// Runs a closure against each [`Invocation`].
///
/// The closure sees the same mounted filesystem, stdio writers and
/// environment a WASM guest would, which makes session behavior testable
/// without compiling a module.
pub struct ScriptedEngine {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    /// Create an engine that runs `script` for every execution.
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&mut Invocation) -> SandboxResult<CleanExit> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of completed `execute` calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn execute(&self, mut invocation: Invocation) -> SandboxResult<CleanExit> {
        let result = (self.script)(&mut invocation);
        self.calls.fetch_add(1, Ordering::SeqCst);
        result
    }
}
