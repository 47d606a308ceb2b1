//! Shared state for Extism host functions.
//!
//! [`HostState`] is wrapped in [`extism::UserData`] and shared across all
//! host function invocations for a single plugin instance. The host
//! functions only decode guest memory and frame results; the operations
//! themselves live here.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use rand::RngCore;
use tracing::trace;
use webfunc_vfs::contract::Status;
use webfunc_vfs::{FileHandle, FileSystem, PATH_SEPARATOR, ROOT_PATH, VfsError};

use crate::engine::Invocation;
use crate::engine::wasm::host::util::{MAX_GUEST_PAYLOAD_LEN, MAX_READ_CHUNK};

/// Result of a fallible host operation, before framing.
pub type HostCallResult = Result<Vec<u8>, Status>;

/// Shared state accessible to all host functions via `UserData<HostState>`.
pub struct HostState {
    /// Filesystem exposed to the guest.
    pub filesystem: Arc<dyn FileSystem>,
    /// Absolute guest path the filesystem is mounted at.
    pub mount_path: String,
    /// Open handles keyed by the id returned to the guest.
    handles: HashMap<u64, FileHandle>,
    /// Counter for issuing handle ids. `0` is never issued.
    next_handle: u64,
    stdin: Cursor<Vec<u8>>,
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
    random: Box<dyn RngCore + Send>,
    /// Code passed to `webfunc_exit`, if the guest called it.
    exit_code: Option<u32>,
}

impl HostState {
    /// Take the filesystem, stdio and random source out of `invocation`.
    #[must_use]
    pub fn from_invocation(invocation: Invocation) -> Self {
        Self {
            filesystem: invocation.filesystem,
            mount_path: invocation.mount_path,
            handles: HashMap::new(),
            next_handle: 1,
            stdin: Cursor::new(invocation.stdin),
            stdout: invocation.stdout,
            stderr: invocation.stderr,
            random: invocation.random,
            exit_code: None,
        }
    }

    /// Map a guest path to a flat name.
    ///
    /// `/var/webfunc/status_code`, `./status_code` and `status_code` all name
    /// the same entry; the mount path itself names the root.
    #[must_use]
    pub fn resolve_path<'a>(&self, raw: &'a str) -> &'a str {
        let relative = match raw.strip_prefix(self.mount_path.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with(PATH_SEPARATOR) => {
                rest.trim_start_matches(PATH_SEPARATOR)
            },
            _ => raw,
        };
        let relative = relative.strip_prefix("./").unwrap_or(relative);
        if relative.is_empty() {
            ROOT_PATH
        } else {
            relative
        }
    }

    /// Open `path` and return the new handle id.
    ///
    /// # Errors
    ///
    /// The status for the underlying [`VfsError`].
    pub fn open(&mut self, path: &str) -> Result<u64, Status> {
        let name = self.resolve_path(path);
        let handle = self.filesystem.open(name).map_err(|e| status_of(&e))?;

        let id = self.next_handle;
        self.next_handle = self.next_handle.saturating_add(1);
        self.handles.insert(id, handle);
        trace!(path, handle = id, "guest open");
        Ok(id)
    }

    /// Read up to `max_len` bytes from `handle`. Empty means end of content.
    ///
    /// # Errors
    ///
    /// [`Status::BadHandle`] for unknown ids, [`Status::IsADirectory`] for the
    /// root.
    pub fn read(&mut self, handle: u64, max_len: u64) -> HostCallResult {
        let open = self.handles.get_mut(&handle).ok_or(Status::BadHandle)?;
        let mut buf = vec![0u8; clamp_len(max_len, MAX_READ_CHUNK)];
        let n = open.read_some(&mut buf).map_err(|e| status_of(&e))?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Append `data` through `handle`, returning the count written.
    ///
    /// # Errors
    ///
    /// [`Status::BadHandle`] for unknown ids, [`Status::PermissionDenied`] for
    /// read-only entries and the root.
    pub fn write(&mut self, handle: u64, data: &[u8]) -> Result<u64, Status> {
        let open = self.handles.get(&handle).ok_or(Status::BadHandle)?;
        let n = open.write_some(data).map_err(|e| status_of(&e))?;
        Ok(u64::try_from(n).unwrap_or(u64::MAX))
    }

    /// Metadata of `handle` as JSON.
    ///
    /// # Errors
    ///
    /// [`Status::BadHandle`] for unknown ids.
    pub fn stat(&self, handle: u64) -> HostCallResult {
        let open = self.handles.get(&handle).ok_or(Status::BadHandle)?;
        serde_json::to_vec(&open.stat()).map_err(|_| Status::InvalidTarget)
    }

    /// Release `handle`.
    ///
    /// # Errors
    ///
    /// [`Status::BadHandle`] for unknown or already closed ids.
    pub fn close(&mut self, handle: u64) -> Result<(), Status> {
        let open = self.handles.remove(&handle).ok_or(Status::BadHandle)?;
        open.close().map_err(|e| status_of(&e))?;
        trace!(handle, "guest close");
        Ok(())
    }

    /// Listing of the mount root as a JSON array of stats.
    #[must_use]
    pub fn read_dir(&self) -> Vec<u8> {
        serde_json::to_vec(&self.filesystem.read_dir()).unwrap_or_else(|_| b"[]".to_vec())
    }

    /// Read up to `max_len` bytes of standard input.
    #[must_use]
    pub fn read_stdin(&mut self, max_len: u64) -> Vec<u8> {
        let mut buf = vec![0u8; clamp_len(max_len, MAX_READ_CHUNK)];
        // Reading from an in-memory cursor cannot fail.
        let n = self.stdin.read(&mut buf).unwrap_or(0);
        buf.truncate(n);
        buf
    }

    /// Forward `data` to standard output.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying writer.
    pub fn write_stdout(&mut self, data: &[u8]) -> io::Result<()> {
        self.stdout.write_all(data)?;
        self.stdout.flush()
    }

    /// Forward `data` to standard error.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying writer.
    pub fn write_stderr(&mut self, data: &[u8]) -> io::Result<()> {
        self.stderr.write_all(data)?;
        self.stderr.flush()
    }

    /// `len` random bytes.
    #[must_use]
    pub fn random_bytes(&mut self, len: u64) -> Vec<u8> {
        let payload_limit = usize::try_from(MAX_GUEST_PAYLOAD_LEN).unwrap_or(usize::MAX);
        let mut buf = vec![0u8; clamp_len(len, payload_limit)];
        self.random.fill_bytes(&mut buf);
        buf
    }

    /// Record the guest's exit code. The first call wins.
    pub fn record_exit(&mut self, code: u32) {
        if self.exit_code.is_none() {
            self.exit_code = Some(code);
        }
    }

    /// Code recorded by [`HostState::record_exit`].
    #[must_use]
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Number of handles the guest has not closed.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

fn status_of(err: &VfsError) -> Status {
    let status = Status::from_error(err);
    trace!(error = %err, status = status.as_str(), "guest fs error");
    status
}

fn clamp_len(requested: u64, limit: usize) -> usize {
    usize::try_from(requested).unwrap_or(usize::MAX).min(limit)
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("mount_path", &self.mount_path)
            .field("open_handles", &self.handles.len())
            .field("next_handle", &self.next_handle)
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use webfunc_vfs::FileStat;

    use super::*;
    use crate::builder::SandboxFilesystemBuilder;
    use crate::request::RequestMetadata;
    use crate::tee::SharedBuffer;

    fn state_with(stdin: &[u8], stdout: SharedBuffer) -> HostState {
        let request = RequestMetadata::new("GET", "/hello")
            .with_query("a=1")
            .with_header("Content-Type", "text/plain");
        let filesystem = SandboxFilesystemBuilder::new().build(&request).unwrap();
        HostState::from_invocation(Invocation {
            filesystem: Arc::new(filesystem),
            mount_path: "/var/webfunc".into(),
            stdin: stdin.to_vec(),
            stdout: Box::new(stdout),
            stderr: Box::new(io::sink()),
            random: Box::new(StdRng::seed_from_u64(7)),
            env: BTreeMap::new(),
            timeout: None,
            cancel: None,
        })
    }

    fn state() -> HostState {
        state_with(b"", SharedBuffer::new())
    }

    #[test]
    fn resolves_mount_relative_paths() {
        let state = state();
        assert_eq!(state.resolve_path("/var/webfunc/method"), "method");
        assert_eq!(state.resolve_path("./method"), "method");
        assert_eq!(state.resolve_path("method"), "method");
        assert_eq!(state.resolve_path("/var/webfunc"), ".");
        assert_eq!(state.resolve_path("/var/webfunc/"), ".");
        assert_eq!(state.resolve_path("."), ".");
        assert_eq!(state.resolve_path(""), ".");
        assert_eq!(state.resolve_path("/var/webfuncs/x"), "/var/webfuncs/x");
    }

    #[test]
    fn open_read_close() {
        let mut state = state();
        let h = state.open("/var/webfunc/path").unwrap();
        assert_eq!(state.read(h, 3).unwrap(), b"/he");
        assert_eq!(state.read(h, 100).unwrap(), b"llo");
        assert!(state.read(h, 100).unwrap().is_empty());

        state.close(h).unwrap();
        assert_eq!(state.read(h, 1), Err(Status::BadHandle));
        assert_eq!(state.close(h), Err(Status::BadHandle));
        assert_eq!(state.open_handles(), 0);
    }

    #[test]
    fn independent_handles_read_independently() {
        let mut state = state();
        let a = state.open("method").unwrap();
        let b = state.open("method").unwrap();
        assert_ne!(a, b);
        assert_eq!(state.read(a, 10).unwrap(), b"GET");
        assert_eq!(state.read(b, 10).unwrap(), b"GET");
    }

    #[test]
    fn open_missing_is_not_found() {
        let mut state = state();
        assert_eq!(state.open("missing"), Err(Status::NotFound));
        assert_eq!(state.open("a/b"), Err(Status::NotFound));
    }

    #[test]
    fn write_status_code_and_reject_read_only() {
        let mut state = state();
        let status = state.open("status_code").unwrap();
        assert_eq!(state.write(status, b"404").unwrap(), 3);

        let method = state.open("method").unwrap();
        assert_eq!(state.write(method, b"POST"), Err(Status::PermissionDenied));

        let again = state.open("status_code").unwrap();
        assert_eq!(state.read(again, 10).unwrap(), b"404");
    }

    #[test]
    fn root_handle_is_a_directory() {
        let mut state = state();
        let root = state.open("/var/webfunc").unwrap();
        assert_eq!(state.read(root, 10), Err(Status::IsADirectory));
        assert_eq!(state.write(root, b"x"), Err(Status::PermissionDenied));

        let stat: FileStat = serde_json::from_slice(&state.stat(root).unwrap()).unwrap();
        assert!(stat.is_dir);
        assert_eq!(stat.name, "./");
    }

    #[test]
    fn stat_reports_size_and_mode() {
        let mut state = state();
        let h = state.open("headers").unwrap();
        let stat: FileStat = serde_json::from_slice(&state.stat(h).unwrap()).unwrap();
        assert_eq!(stat.name, "headers");
        assert_eq!(stat.size, 25);
        assert_eq!(stat.mode, 0o444);
        assert_eq!(state.stat(999), Err(Status::BadHandle));
    }

    #[test]
    fn read_dir_lists_request_files() {
        let state = state();
        let stats: Vec<FileStat> = serde_json::from_slice(&state.read_dir()).unwrap();
        let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["headers", "method", "path", "query", "status_code"]);
    }

    #[test]
    fn stdin_is_consumed_in_chunks() {
        let mut state = state_with(b"request body", SharedBuffer::new());
        assert_eq!(state.read_stdin(7), b"request");
        assert_eq!(state.read_stdin(100), b" body");
        assert!(state.read_stdin(100).is_empty());
    }

    #[test]
    fn stdout_is_forwarded() {
        let stdout = SharedBuffer::new();
        let mut state = state_with(b"", stdout.clone());
        state.write_stdout(b"hello ").unwrap();
        state.write_stdout(b"world").unwrap();
        assert_eq!(stdout.snapshot(), b"hello world");
    }

    #[test]
    fn random_bytes_have_requested_length() {
        let mut state = state();
        assert_eq!(state.random_bytes(32).len(), 32);
        assert!(state.random_bytes(0).is_empty());
    }

    #[test]
    fn first_exit_code_wins() {
        let mut state = state();
        assert_eq!(state.exit_code(), None);
        state.record_exit(2);
        state.record_exit(0);
        assert_eq!(state.exit_code(), Some(2));
    }
}
