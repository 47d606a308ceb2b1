//! Safe wrappers around the webfunc host functions.
//!
//! A handler is an Extism plugin exporting `handle`. Inside it, the request
//! is a set of files in the mounted directory and the response is whatever
//! the handler writes to stdout plus an optional `status_code` file:
//!
//! ```rust,ignore
//! use webfunc_sdk::prelude::*;
//!
//! #[plugin_fn]
//! pub fn handle() -> FnResult<()> {
//!     let path = request::path()?;
//!     response::set_status(200)?;
//!     writeln!(io::stdout(), "hello from {path}")?;
//!     Ok(())
//! }
//! ```

#![allow(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod sys;

pub use extism_pdk;
pub use webfunc_vfs::FileStat;
pub use webfunc_vfs::contract::Status;
use webfunc_vfs::contract;

use thiserror::Error;

/// Errors returned by SDK calls.
#[derive(Error, Debug)]
pub enum SdkError {
    /// The host function call itself failed.
    #[error("host function call failed: {0}")]
    Host(#[from] extism_pdk::Error),
    /// The host reported a filesystem condition.
    #[error("{op} {target}: {}", .status.as_str())]
    Status {
        /// Operation that failed.
        op: &'static str,
        /// Path or handle it was applied to.
        target: String,
        /// Condition reported by the host.
        status: Status,
    },
    /// A JSON payload from the host did not parse.
    #[error("malformed host response: {0}")]
    Json(#[from] serde_json::Error),
    /// File content was not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),    /// [`response::set_status`] was already called for this request.
    #[error("status code already set")]
    StatusAlreadySet,
}

/// Result alias for SDK calls.
pub type SdkResult<T> = Result<T, SdkError>;

impl SdkError {
    /// The host status, if this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<SdkError> for std::io::Error {
    fn from(err: SdkError) -> Self {
        use std::io::ErrorKind;
        let kind = match err.status() {
            Some(Status::NotFound) => ErrorKind::NotFound,
            Some(Status::PermissionDenied) => ErrorKind::PermissionDenied,
            Some(Status::AlreadyExists) => ErrorKind::AlreadyExists,
            Some(Status::InvalidName | Status::InvalidTarget | Status::BadHandle) => {
                ErrorKind::InvalidInput
            },
            Some(Status::IsADirectory) => ErrorKind::IsADirectory,
            Some(Status::Ok) | None => ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

/// Split a framed host result, turning a failure status into an error.
fn check(op: &'static str, target: impl FnOnce() -> String, framed: &[u8]) -> SdkResult<Vec<u8>> {
    match contract::decode_result(framed) {
        (Status::Ok, payload) => Ok(payload.to_vec()),
        (status, _) => Err(SdkError::Status {
            op,
            target: target(),
            status,
        }),
    }
}

fn len_arg(len: usize) -> Vec<u8> {
    contract::encode_u64(u64::try_from(len).unwrap_or(u64::MAX)).to_vec()
}

/// The mounted virtual filesystem.
pub mod fs {
    use std::io;

    use super::*;
    use crate::sys::*;

    /// An open file in the mounted directory.
    ///
    /// Each `File` has its own read position. Writes always append. The
    /// handle is closed on drop.
    #[derive(Debug)]
    pub struct File {
        handle: u64,
        name: String,
        open: bool,
    }

    impl File {
        /// Open `path`, either a bare name (`status_code`), `.` for the mount
        /// directory, or an absolute path under it.
        ///
        /// # Errors
        ///
        /// Returns [`SdkError::Status`] with [`Status::NotFound`] for a name
        /// not in the mount.
        pub fn open(path: &str) -> SdkResult<Self> {
            let framed = unsafe { webfunc_open(path.as_bytes().to_vec())? };
            let payload = check("open", || path.to_owned(), &framed)?;
            Ok(Self {
                handle: contract::decode_u64(&payload),
                name: path.to_owned(),
                open: true,
            })
        }

        /// Metadata for this file.
        ///
        /// # Errors
        ///
        /// Returns an error if the handle is no longer valid.
        pub fn stat(&self) -> SdkResult<FileStat> {
            let framed = unsafe { webfunc_stat(contract::encode_u64(self.handle).to_vec())? };
            let payload = check("stat", || self.name.clone(), &framed)?;
            Ok(serde_json::from_slice(&payload)?)
        }

        /// Read up to `max_len` bytes. An empty result means end of file.
        ///
        /// # Errors
        ///
        /// Returns [`Status::IsADirectory`] for the mount directory.
        pub fn read_chunk(&mut self, max_len: usize) -> SdkResult<Vec<u8>> {
            let framed = unsafe {
                webfunc_read(contract::encode_u64(self.handle).to_vec(), len_arg(max_len))?
            };
            check("read", || self.name.clone(), &framed)
        }

        /// Append `data`, returning the number of bytes written.
        ///
        /// # Errors
        ///
        /// Returns [`Status::PermissionDenied`] for read-only files.
        pub fn append(&mut self, data: &[u8]) -> SdkResult<usize> {
            let framed = unsafe {
                webfunc_write(contract::encode_u64(self.handle).to_vec(), data.to_vec())?
            };
            let payload = check("write", || self.name.clone(), &framed)?;
            Ok(usize::try_from(contract::decode_u64(&payload)).unwrap_or(usize::MAX))
        }

        /// Close the handle explicitly.
        ///
        /// # Errors
        ///
        /// Returns an error if the host no longer knows the handle.
        pub fn close(mut self) -> SdkResult<()> {
            self.open = false;
            close_handle(self.handle, &self.name)
        }
    }

    fn close_handle(handle: u64, name: &str) -> SdkResult<()> {
        let framed = unsafe { webfunc_close(contract::encode_u64(handle).to_vec())? };
        check("close", || name.to_owned(), &framed).map(|_| ())
    }

    impl io::Read for File {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let chunk = self.read_chunk(buf.len())?;
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
    }

    impl io::Write for File {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(self.append(buf)?)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for File {
        fn drop(&mut self) {
            if self.open {
                let _ = close_handle(self.handle, &self.name);
            }
        }
    }

    /// Stats of every file in the mount directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the host call fails or returns malformed JSON.
    pub fn read_dir() -> SdkResult<Vec<FileStat>> {
        let listing = unsafe { webfunc_readdir()? };
        Ok(serde_json::from_slice(&listing)?)
    }

    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn read(path: &str) -> SdkResult<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut out = Vec::new();
        loop {
            let chunk = file.read_chunk(READ_CHUNK)?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        file.close()?;
        Ok(out)
    }

    /// Read a whole file as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not UTF-8.
    pub fn read_to_string(path: &str) -> SdkResult<String> {
        Ok(String::from_utf8(read(path)?)?)
    }

    /// Append `data` to a writable file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is read-only.
    pub fn write(path: &str, data: impl AsRef<[u8]>) -> SdkResult<()> {
        let mut file = File::open(path)?;
        let mut rest = data.as_ref();
        while !rest.is_empty() {
            let n = file.append(rest)?;
            if n == 0 {
                break;
            }
            rest = &rest[n.min(rest.len())..];
        }
        file.close()
    }

    const READ_CHUNK: usize = 64 * 1024;
}

/// Standard streams.
pub mod io {
    use std::io;

    use super::*;
    use crate::sys::*;

    /// Writer for the handler's standard output, which becomes the HTTP
    /// response body.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Stdout;

    /// Writer for the handler's standard error.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Stderr;

    /// The standard output writer.
    #[must_use]
    pub fn stdout() -> Stdout {
        Stdout
    }

    /// The standard error writer.
    #[must_use]
    pub fn stderr() -> Stderr {
        Stderr
    }

    impl io::Write for Stdout {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            unsafe { webfunc_stdout(buf.to_vec()) }.map_err(SdkError::Host)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl io::Write for Stderr {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            unsafe { webfunc_stderr(buf.to_vec()) }.map_err(SdkError::Host)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Read up to `max_len` bytes of the request body. Empty means end.
    ///
    /// # Errors
    ///
    /// Returns an error if the host call fails.
    pub fn read_stdin(max_len: usize) -> SdkResult<Vec<u8>> {
        Ok(unsafe { webfunc_stdin(len_arg(max_len))? })
    }

    /// Read the whole request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the host call fails.
    pub fn read_stdin_to_end() -> SdkResult<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let chunk = read_stdin(64 * 1024)?;
            if chunk.is_empty() {
                return Ok(body);
            }
            body.extend_from_slice(&chunk);
        }
    }
}

/// The sandbox environment.
pub mod env {
    use super::*;

    /// Look up an environment variable set by the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host call fails.
    pub fn var(name: &str) -> SdkResult<Option<String>> {
        Ok(extism_pdk::config::get(name)?)
    }

    /// True when running under webfunc.
    #[must_use]
    pub fn in_sandbox() -> bool {
        matches!(var(contract::ENV_MARKER), Ok(Some(v)) if v == "1")
    }

    /// Execution mode, e.g. `HTTP`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host call fails.
    pub fn mode() -> SdkResult<Option<String>> {
        var(contract::ENV_MODE)
    }

    /// The mount directory, falling back to the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the host call fails.
    pub fn mount_dir() -> SdkResult<String> {
        Ok(var(contract::ENV_DIR)?.unwrap_or_else(|| contract::DEFAULT_MOUNT_PATH.to_owned()))
    }
}

/// Host randomness.
pub mod random {
    use super::*;
    use crate::sys::*;

    /// Fill `buf` with random bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the host call fails.
    pub fn fill(buf: &mut [u8]) -> SdkResult<()> {
        let bytes = unsafe { webfunc_random(len_arg(buf.len()))? };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(())
    }
}

/// Terminate the handler with `code`.
///
/// Output written so far is kept. A non-zero code is reported by the host
/// but is not a failure of the request.
pub fn exit(code: u32) -> ! {
    let _ = unsafe { sys::webfunc_exit(contract::encode_u64(u64::from(code)).to_vec()) };
    // The host traps the guest on exit; getting here means it did not.
    std::process::abort()
}

/// The inbound request, read from the mounted files.
pub mod request {
    use super::*;

    /// Request headers in arrival order, one entry per value.
    ///
    /// # Errors
    ///
    /// Returns an error if the `headers` file cannot be read.
    pub fn headers() -> SdkResult<Vec<(String, String)>> {
        Ok(parse_headers(&fs::read_to_string(contract::HEADERS_FILE)?))
    }

    /// First value of the header `name`, compared case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the `headers` file cannot be read.
    pub fn header(name: &str) -> SdkResult<Option<String>> {
        Ok(headers()?
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v))
    }

    /// The request method.
    ///
    /// # Errors
    ///
    /// Returns an error if the `method` file cannot be read.
    pub fn method() -> SdkResult<String> {
        fs::read_to_string(contract::METHOD_FILE)
    }

    /// The request path.
    ///
    /// # Errors
    ///
    /// Returns an error if the `path` file cannot be read.
    pub fn path() -> SdkResult<String> {
        fs::read_to_string(contract::PATH_FILE)
    }

    /// The canonicalized query string, without a leading `?`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `query` file cannot be read.
    pub fn query() -> SdkResult<String> {
        fs::read_to_string(contract::QUERY_FILE)
    }

    /// Split `Name: value` lines. Lines without a colon are skipped.
    #[must_use]
    pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
        raw.lines()
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_owned(), value.trim().to_owned()))
            })
            .collect()
    }
}

/// The outbound response.
pub mod response {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    static STATUS_SET: AtomicBool = AtomicBool::new(false);

    /// Set the HTTP status code.
    ///
    /// `status_code` is append-only and the host reads exactly three digits,
    /// so a second write would corrupt it into a 200 fallback. Only the first
    /// call per instance writes; later calls fail without touching the file.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::StatusAlreadySet`] on a repeated call, or an error
    /// if `status_code` is not writable.
    pub fn set_status(code: u16) -> SdkResult<()> {
        claim(&STATUS_SET)?;
        fs::write(contract::STATUS_CODE_FILE, format_status(code)).inspect_err(|_| {
            STATUS_SET.store(false, Ordering::Release);
        })
    }

    pub(crate) fn claim(flag: &AtomicBool) -> SdkResult<()> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(SdkError::StatusAlreadySet);
        }
        Ok(())
    }

    /// Three-digit rendering written to `status_code`.
    #[must_use]
    pub fn format_status(code: u16) -> String {
        format!("{:03}", code.min(999))
    }
}

/// Common imports for handlers.
pub mod prelude {
    pub use std::io::{Read, Write};

    pub use extism_pdk::{FnResult, plugin_fn};

    pub use crate::fs::File;
    pub use crate::{SdkError, SdkResult, env, exit, fs, io, random, request, response};
}
