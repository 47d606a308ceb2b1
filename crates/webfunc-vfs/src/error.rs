use std::io;

use thiserror::Error;

/// Virtual filesystem errors.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The name is empty, `.`, or contains the path separator.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// An entry with this name is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// No entry has this name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write attempted on a read-only entry.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The operation cannot target the mount root.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Content operation attempted on the mount root.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// An error annotated with the operation and path that produced it.
    #[error("{op} {path}: {source}")]
    Path {
        /// Operation name, e.g. `open`.
        op: &'static str,
        /// The path as requested by the caller.
        path: String,
        /// Underlying condition.
        #[source]
        source: Box<VfsError>,
    },
}

impl VfsError {
    /// Wrap `source` in a [`VfsError::Path`].
    pub fn path(op: &'static str, path: impl Into<String>, source: VfsError) -> Self {
        Self::Path {
            op,
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// The innermost condition, looking through any [`VfsError::Path`] wrappers.
    #[must_use]
    pub fn kind(&self) -> &VfsError {
        match self {
            Self::Path { source, .. } => source.kind(),
            other => other,
        }
    }

    /// True if the innermost condition is [`VfsError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), Self::NotFound(_))
    }

    /// True if the innermost condition is [`VfsError::PermissionDenied`].
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.kind(), Self::PermissionDenied(_))
    }
}

/// Convert `VfsError` to `std::io::Error` for `Read`/`Write` implementations.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match e.kind() {
            VfsError::InvalidName(_) | VfsError::InvalidTarget(_) => io::ErrorKind::InvalidInput,
            VfsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            VfsError::NotFound(_) => io::ErrorKind::NotFound,
            VfsError::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            VfsError::IsADirectory(_) => io::ErrorKind::IsADirectory,
            VfsError::Path { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// Convenience result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_looks_through_path_wrapper() {
        let err = VfsError::path("open", "missing", VfsError::NotFound("missing".into()));
        assert!(err.is_not_found());
        assert!(!err.is_permission_denied());
        assert_eq!(err.to_string(), "open missing: not found: missing");
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: io::Error = VfsError::PermissionDenied("method".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err: io::Error =
            VfsError::path("open", "x", VfsError::NotFound("x".into())).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
