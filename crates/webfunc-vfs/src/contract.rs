//! The host/guest contract: fixed file names, environment keys, host function
//! names, and the status byte prefixed to fallible host function results.
//!
//! Guests depend on these values byte-for-byte. Changing any of them is a
//! breaking change for every deployed module.

use crate::VfsError;

/// Request headers, one `Name: value` line per value.
pub const HEADERS_FILE: &str = "headers";
/// Request method token.
pub const METHOD_FILE: &str = "method";
/// Request path.
pub const PATH_FILE: &str = "path";
/// Canonicalized query string.
pub const QUERY_FILE: &str = "query";
/// Writable slot the guest fills with the response status.
pub const STATUS_CODE_FILE: &str = "status_code";

/// Marker variable, always `1` inside the sandbox.
pub const ENV_MARKER: &str = "WEBFUNC";
/// Execution mode indicator.
pub const ENV_MODE: &str = "WEBFUNC_MODE";
/// Mount directory of the virtual filesystem.
pub const ENV_DIR: &str = "WEBFUNC_DIR";

/// Value of [`ENV_MODE`] for HTTP-triggered executions.
pub const MODE_HTTP: &str = "HTTP";

/// Default mount point of the virtual filesystem.
pub const DEFAULT_MOUNT_PATH: &str = "/var/webfunc";

/// Host function names, as imported by guests from `extism:host/user`.
pub mod host_fn {
    /// Open a path, returning a handle.
    pub const OPEN: &str = "webfunc_open";
    /// Read from a handle.
    pub const READ: &str = "webfunc_read";
    /// Write to a handle.
    pub const WRITE: &str = "webfunc_write";
    /// Stat a handle.
    pub const STAT: &str = "webfunc_stat";
    /// Close a handle.
    pub const CLOSE: &str = "webfunc_close";
    /// List the mount root.
    pub const READDIR: &str = "webfunc_readdir";
    /// Read from standard input.
    pub const STDIN: &str = "webfunc_stdin";
    /// Write to standard output.
    pub const STDOUT: &str = "webfunc_stdout";
    /// Write to standard error.
    pub const STDERR: &str = "webfunc_stderr";
    /// Fill a buffer with random bytes.
    pub const RANDOM: &str = "webfunc_random";
    /// Terminate with an exit code.
    pub const EXIT: &str = "webfunc_exit";
}

/// Status byte prefixed to fallible host function results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Success; the payload follows.
    Ok = 0,
    /// No entry with that name.
    NotFound = 1,
    /// Write on a read-only entry.
    PermissionDenied = 2,
    /// Malformed name.
    InvalidName = 3,
    /// Duplicate name.
    AlreadyExists = 4,
    /// Operation not valid for the target.
    InvalidTarget = 5,
    /// Unknown or closed handle.
    BadHandle = 6,
    /// Content operation on the mount root.
    IsADirectory = 7,
}

impl Status {
    /// Decode a status byte.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Ok,
            1 => Self::NotFound,
            2 => Self::PermissionDenied,
            3 => Self::InvalidName,
            4 => Self::AlreadyExists,
            5 => Self::InvalidTarget,
            6 => Self::BadHandle,
            7 => Self::IsADirectory,
            _ => return None,
        })
    }

    /// Status byte for a VFS error.
    #[must_use]
    pub fn from_error(err: &VfsError) -> Self {
        match err.kind() {
            VfsError::NotFound(_) => Self::NotFound,
            VfsError::PermissionDenied(_) => Self::PermissionDenied,
            VfsError::InvalidName(_) => Self::InvalidName,
            VfsError::AlreadyExists(_) => Self::AlreadyExists,
            VfsError::IsADirectory(_) => Self::IsADirectory,
            VfsError::InvalidTarget(_) | VfsError::Path { .. } => Self::InvalidTarget,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::InvalidName => "invalid name",
            Self::AlreadyExists => "already exists",
            Self::InvalidTarget => "invalid target",
            Self::BadHandle => "bad handle",
            Self::IsADirectory => "is a directory",
        }
    }
}

/// Prefix `payload` with a status byte.
#[must_use]
pub fn encode_result(status: Status, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len().saturating_add(1));
    out.push(status as u8);
    out.extend_from_slice(payload);
    out
}

/// Split a host function result into its status and payload.
///
/// An empty or unknown status byte decodes as [`Status::InvalidTarget`].
#[must_use]
pub fn decode_result(bytes: &[u8]) -> (Status, &[u8]) {
    match bytes.split_first() {
        Some((head, rest)) => (Status::from_u8(*head).unwrap_or(Status::InvalidTarget), rest),
        None => (Status::InvalidTarget, &[]),
    }
}

/// Encode a number argument or result.
#[must_use]
pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

/// Decode a number argument or result. Short input is zero-padded.
#[must_use]
pub fn decode_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}
