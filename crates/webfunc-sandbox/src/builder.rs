//! Populates a fresh virtual filesystem from request metadata.

use tracing::debug;
use webfunc_vfs::VirtualFileSystem;
use webfunc_vfs::contract::{
    HEADERS_FILE, METHOD_FILE, PATH_FILE, QUERY_FILE, STATUS_CODE_FILE,
};

use crate::error::SandboxResult;
use crate::request::RequestMetadata;

/// Builds the per-request filesystem a guest sees.
///
/// Every build yields a new [`VirtualFileSystem`] with the read-only request
/// files (`headers`, `method`, `path`, `query`) and an empty writable
/// `status_code`. Extra writable outputs can be registered with
/// [`SandboxFilesystemBuilder::with_output`].
#[derive(Debug, Clone, Default)]
pub struct SandboxFilesystemBuilder {
    outputs: Vec<String>,
}

impl SandboxFilesystemBuilder {
    /// Create a builder with the standard file set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional writable output file, created empty.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Build the filesystem for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SandboxError::Vfs`] if an extra output name is invalid
    /// or collides with a standard file.
    pub fn build(&self, request: &RequestMetadata) -> SandboxResult<VirtualFileSystem> {
        let fs = VirtualFileSystem::new();

        fs.add_file(HEADERS_FILE, request.render_headers(), false)?;
        fs.add_file(METHOD_FILE, request.method.as_bytes(), false)?;
        fs.add_file(PATH_FILE, request.path.as_bytes(), false)?;
        fs.add_file(QUERY_FILE, request.canonical_query(), false)?;
        fs.add_file(STATUS_CODE_FILE, Vec::<u8>::new(), true)?;
        for name in &self.outputs {
            fs.add_file(name.as_str(), Vec::<u8>::new(), true)?;
        }

        debug!(
            method = %request.method,
            path = %request.path,
            files = fs.len(),
            "Built sandbox filesystem"
        );
        Ok(fs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use webfunc_vfs::{FileSystem, VfsError};

    use super::*;
    use crate::SandboxError;

    fn read(fs: &VirtualFileSystem, name: &str) -> String {
        let mut out = String::new();
        fs.open(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn builds_request_files() {
        let request = RequestMetadata::new("GET", "/hello")
            .with_query("a=1")
            .with_header("Content-Type", "text/plain");
        let fs = SandboxFilesystemBuilder::new().build(&request).unwrap();

        assert_eq!(read(&fs, "headers"), "Content-Type: text/plain\n");
        assert_eq!(read(&fs, "method"), "GET");
        assert_eq!(read(&fs, "path"), "/hello");
        assert_eq!(read(&fs, "query"), "a=1");
        assert_eq!(read(&fs, "status_code"), "");

        for name in ["headers", "method", "path", "query"] {
            assert!(!fs.get(name).unwrap().is_writable(), "{name}");
        }
        assert!(fs.get("status_code").unwrap().is_writable());
    }

    #[test]
    fn request_files_reject_writes() {
        let fs = SandboxFilesystemBuilder::new()
            .build(&RequestMetadata::new("POST", "/"))
            .unwrap();
        let err = fs.write_file("method", b"GET").unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(read(&fs, "method"), "POST");
    }

    #[test]
    fn status_code_round_trips() {
        let fs = SandboxFilesystemBuilder::new()
            .build(&RequestMetadata::new("GET", "/"))
            .unwrap();
        fs.write_file("status_code", b"404").unwrap();
        assert_eq!(read(&fs, "status_code"), "404");
    }

    #[test]
    fn each_build_is_fresh() {
        let builder = SandboxFilesystemBuilder::new();
        let first = builder.build(&RequestMetadata::new("GET", "/a")).unwrap();
        first.write_file("status_code", b"500").unwrap();

        let second = builder.build(&RequestMetadata::new("GET", "/b")).unwrap();
        assert_eq!(read(&second, "status_code"), "");
        assert_eq!(read(&second, "path"), "/b");
    }

    #[test]
    fn extra_outputs_are_writable() {
        let fs = SandboxFilesystemBuilder::new()
            .with_output("content_type")
            .build(&RequestMetadata::new("GET", "/"))
            .unwrap();
        fs.write_file("content_type", b"text/html").unwrap();
        assert_eq!(read(&fs, "content_type"), "text/html");
        assert_eq!(fs.writable_entries().len(), 2);
    }

    #[test]
    fn colliding_output_is_an_error() {
        let err = SandboxFilesystemBuilder::new()
            .with_output("method")
            .build(&RequestMetadata::new("GET", "/"))
            .unwrap_err();
        assert!(matches!(
            err,
            SandboxError::Vfs(VfsError::AlreadyExists(ref n)) if n == "method"
        ));
    }
}
