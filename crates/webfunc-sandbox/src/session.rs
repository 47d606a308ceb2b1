//! One guest execution per request.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span};
use webfunc_vfs::contract::{
    DEFAULT_MOUNT_PATH, ENV_DIR, ENV_MARKER, ENV_MODE, MODE_HTTP, STATUS_CODE_FILE,
};
use webfunc_vfs::FileSystem;

use crate::builder::SandboxFilesystemBuilder;
use crate::engine::{ExecutionEngine, Invocation};
use crate::error::SandboxResult;
use crate::request::RequestMetadata;
use crate::tee::{SharedBuffer, TeeWriter};

/// Per-session settings shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Guest path the virtual filesystem is mounted at.
    pub mount_path: String,
    /// Value of `WEBFUNC_MODE`.
    pub mode: String,
    /// Wall-clock limit per execution.
    pub timeout: Option<Duration>,
    /// Writable output files created besides `status_code`.
    pub extra_outputs: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mount_path: DEFAULT_MOUNT_PATH.into(),
            mode: MODE_HTTP.into(),
            timeout: Some(Duration::from_secs(30)),
            extra_outputs: Vec::new(),
        }
    }
}

/// What a finished session produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Everything the guest wrote to standard output, in order.
    pub stdout: Vec<u8>,
    /// Everything the guest wrote to standard error.
    pub stderr: Vec<u8>,
    /// Exit code; `0` when the guest returned normally.
    pub exit_code: u32,
    /// Terminal content of every writable file, by name.
    pub outputs: BTreeMap<String, Vec<u8>>,
}

impl SessionReport {
    /// The status the guest wrote to `status_code`.
    ///
    /// Returns `None` when the file is empty or does not hold a three digit
    /// status (surrounding whitespace is ignored).
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        let raw = self.outputs.get(STATUS_CODE_FILE)?;
        let text = std::str::from_utf8(raw).ok()?.trim();
        if text.len() != 3 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        text.parse::<u16>()
            .ok()
            .filter(|code| (100..=999).contains(code))
    }
}

/// Runs guests against per-request filesystems.
///
/// A session owns nothing request-specific: every [`SandboxSession::run`]
/// builds a fresh filesystem, so one session serves any number of concurrent
/// requests.
#[derive(Clone)]
pub struct SandboxSession {
    engine: Arc<dyn ExecutionEngine>,
    builder: SandboxFilesystemBuilder,
    config: SessionConfig,
}

impl SandboxSession {
    /// Create a session running guests on `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn ExecutionEngine>, config: SessionConfig) -> Self {
        let builder = config
            .extra_outputs
            .iter()
            .fold(SandboxFilesystemBuilder::new(), |b, name| {
                b.with_output(name.as_str())
            });
        Self {
            engine,
            builder,
            config,
        }
    }

    /// The session settings.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Environment assignments handed to every guest.
    #[must_use]
    pub fn environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ENV_MARKER.to_owned(), "1".to_owned()),
            (ENV_MODE.to_owned(), self.config.mode.clone()),
            (ENV_DIR.to_owned(), self.config.mount_path.clone()),
        ])
    }

    /// Execute the guest once for `request`.
    ///
    /// `body` becomes the guest's standard input. Standard output is written
    /// to `sink` as it is produced and also captured in the report.
    ///
    /// # Errors
    ///
    /// Returns the builder's error if the filesystem cannot be populated and
    /// the engine's error if the guest does not exit cleanly. A non-zero exit
    /// code is not an error.
    pub fn run<W>(
        &self,
        request: &RequestMetadata,
        body: Vec<u8>,
        sink: W,
        cancel: Option<CancellationToken>,
    ) -> SandboxResult<SessionReport>
    where
        W: Write + Send + 'static,
    {
        let span = info_span!("sandbox_session", method = %request.method, path = %request.path);
        let _enter = span.enter();

        let filesystem = Arc::new(self.builder.build(request)?);
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();

        let invocation = Invocation {
            filesystem: Arc::clone(&filesystem) as Arc<dyn FileSystem>,
            mount_path: self.config.mount_path.clone(),
            stdin: body,
            stdout: Box::new(TeeWriter::new(sink, stdout.clone())),
            stderr: Box::new(stderr.clone()),
            random: Box::new(rand::rngs::OsRng),
            env: self.environment(),
            timeout: self.config.timeout,
            cancel,
        };

        let exit = self.engine.execute(invocation)?;

        let outputs = filesystem
            .writable_entries()
            .into_iter()
            .map(|entry| (entry.name().to_owned(), entry.contents()))
            .collect();
        let report = SessionReport {
            stdout: stdout.take(),
            stderr: stderr.take(),
            exit_code: exit.code(),
            outputs,
        };

        debug!(
            exit_code = report.exit_code,
            stdout_len = report.stdout.len(),
            stderr_len = report.stderr.len(),
            status = ?report.status_code(),
            "Session finished"
        );
        Ok(report)
    }

    /// Names of the writable files every session creates.
    #[must_use]
    pub fn output_names(&self) -> BTreeSet<String> {
        std::iter::once(STATUS_CODE_FILE.to_owned())
            .chain(self.config.extra_outputs.iter().cloned())
            .collect()
    }
}

impl std::fmt::Debug for SandboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
