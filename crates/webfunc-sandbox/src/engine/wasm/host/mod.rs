/// Virtual filesystem operations for guests.
pub mod fs;
/// Standard input, output and error.
pub mod stdio;
/// Randomness and process exit.
pub mod sys;
/// Utility functions for WASM host implementations.
pub mod util;

use extism::{PluginBuilder, UserData};
use webfunc_vfs::contract::host_fn;

use crate::engine::wasm::host_state::HostState;

/// Registry of the host functions exposed to the WASM runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasmHostFunction {
    /// `webfunc_open`
    Open,
    /// `webfunc_read`
    Read,
    /// `webfunc_write`
    Write,
    /// `webfunc_stat`
    Stat,
    /// `webfunc_close`
    Close,
    /// `webfunc_readdir`
    Readdir,
    /// `webfunc_stdin`
    Stdin,
    /// `webfunc_stdout`
    Stdout,
    /// `webfunc_stderr`
    Stderr,
    /// `webfunc_random`
    Random,
    /// `webfunc_exit`
    Exit,
}

impl WasmHostFunction {
    /// Every registered function, in registration order.
    pub const ALL: [Self; 11] = [
        Self::Open,
        Self::Read,
        Self::Write,
        Self::Stat,
        Self::Close,
        Self::Readdir,
        Self::Stdin,
        Self::Stdout,
        Self::Stderr,
        Self::Random,
        Self::Exit,
    ];

    /// Import name seen by the guest.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => host_fn::OPEN,
            Self::Read => host_fn::READ,
            Self::Write => host_fn::WRITE,
            Self::Stat => host_fn::STAT,
            Self::Close => host_fn::CLOSE,
            Self::Readdir => host_fn::READDIR,
            Self::Stdin => host_fn::STDIN,
            Self::Stdout => host_fn::STDOUT,
            Self::Stderr => host_fn::STDERR,
            Self::Random => host_fn::RANDOM,
            Self::Exit => host_fn::EXIT,
        }
    }

    /// Number of memory-handle arguments.
    #[must_use]
    pub fn arg_count(self) -> usize {
        match self {
            Self::Readdir => 0,
            Self::Open
            | Self::Stat
            | Self::Close
            | Self::Stdin
            | Self::Stdout
            | Self::Stderr
            | Self::Random
            | Self::Exit => 1,
            Self::Read | Self::Write => 2,
        }
    }

    /// Whether the function returns a memory handle.
    #[must_use]
    pub fn returns_value(self) -> bool {
        !matches!(self, Self::Stdout | Self::Stderr | Self::Exit)
    }
}

/// Register every [`WasmHostFunction`] on `builder`, sharing `user_data`.
pub fn register_host_functions(
    mut builder: PluginBuilder,
    user_data: UserData<HostState>,
) -> PluginBuilder {
    for func in WasmHostFunction::ALL {
        let ud = user_data.clone();

        let args = vec![extism::PTR; func.arg_count()];
        let rets = if func.returns_value() {
            vec![extism::PTR]
        } else {
            vec![]
        };

        builder = match func {
            WasmHostFunction::Open => {
                builder.with_function(func.name(), args, rets, ud, fs::webfunc_open_impl)
            },
            WasmHostFunction::Read => {
                builder.with_function(func.name(), args, rets, ud, fs::webfunc_read_impl)
            },
            WasmHostFunction::Write => {
                builder.with_function(func.name(), args, rets, ud, fs::webfunc_write_impl)
            },
            WasmHostFunction::Stat => {
                builder.with_function(func.name(), args, rets, ud, fs::webfunc_stat_impl)
            },
            WasmHostFunction::Close => {
                builder.with_function(func.name(), args, rets, ud, fs::webfunc_close_impl)
            },
            WasmHostFunction::Readdir => {
                builder.with_function(func.name(), args, rets, ud, fs::webfunc_readdir_impl)
            },
            WasmHostFunction::Stdin => {
                builder.with_function(func.name(), args, rets, ud, stdio::webfunc_stdin_impl)
            },
            WasmHostFunction::Stdout => {
                builder.with_function(func.name(), args, rets, ud, stdio::webfunc_stdout_impl)
            },
            WasmHostFunction::Stderr => {
                builder.with_function(func.name(), args, rets, ud, stdio::webfunc_stderr_impl)
            },
            WasmHostFunction::Random => {
                builder.with_function(func.name(), args, rets, ud, sys::webfunc_random_impl)
            },
            WasmHostFunction::Exit => {
                builder.with_function(func.name(), args, rets, ud, sys::webfunc_exit_impl)
            },
        };
    }

    builder
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_are_unique_and_prefixed() {
        let names: HashSet<&str> = WasmHostFunction::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names.len(), WasmHostFunction::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("webfunc_")));
    }

    #[test]
    fn signatures() {
        assert_eq!(WasmHostFunction::Readdir.arg_count(), 0);
        assert_eq!(WasmHostFunction::Write.arg_count(), 2);
        assert!(WasmHostFunction::Open.returns_value());
        assert!(!WasmHostFunction::Exit.returns_value());
        assert!(!WasmHostFunction::Stdout.returns_value());
    }
}
