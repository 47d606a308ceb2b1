//! Raw host imports.
//!
//! Every argument and result crosses the boundary as bytes. Numbers are
//! little-endian `u64`; fallible results carry a leading status byte (see
//! [`webfunc_vfs::contract::Status`]).

#![allow(unreachable_pub)]

use extism_pdk::*;

#[host_fn]
extern "ExtismHost" {
    // -----------------------------------------------------------------------
    // Virtual filesystem
    // -----------------------------------------------------------------------
    /// Open a path relative to (or under) the mount directory.
    pub fn webfunc_open(path: Vec<u8>) -> Vec<u8>;
    /// Read up to `max_len` bytes from a handle.
    pub fn webfunc_read(handle: Vec<u8>, max_len: Vec<u8>) -> Vec<u8>;
    /// Append bytes through a handle.
    pub fn webfunc_write(handle: Vec<u8>, data: Vec<u8>) -> Vec<u8>;
    /// Stat a handle.
    pub fn webfunc_stat(handle: Vec<u8>) -> Vec<u8>;
    /// Release a handle.
    pub fn webfunc_close(handle: Vec<u8>) -> Vec<u8>;
    /// List the mount directory.
    pub fn webfunc_readdir() -> Vec<u8>;

    // -----------------------------------------------------------------------
    // Standard streams
    // -----------------------------------------------------------------------
    /// Read up to `max_len` bytes of standard input.
    pub fn webfunc_stdin(max_len: Vec<u8>) -> Vec<u8>;
    /// Write to standard output.
    pub fn webfunc_stdout(data: Vec<u8>);
    /// Write to standard error.
    pub fn webfunc_stderr(data: Vec<u8>);

    // -----------------------------------------------------------------------
    // System
    // -----------------------------------------------------------------------
    /// Request `len` random bytes.
    pub fn webfunc_random(len: Vec<u8>) -> Vec<u8>;
    /// Terminate with an exit code. Does not return.
    pub fn webfunc_exit(code: Vec<u8>);
}
