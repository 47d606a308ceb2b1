//! Buffer-backed file entries.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::{PATH_SEPARATOR, VfsError, VfsResult};

/// Permission bits reported for read-only entries.
pub const MODE_READ_ONLY: u32 = 0o444;
/// Permission bits reported for writable entries.
pub const MODE_READ_WRITE: u32 = 0o666;
/// Type bit reported for the mount root.
pub const MODE_DIR: u32 = 0o040_000;

/// Name reported by the mount root's stat.
pub const ROOT_NAME: &str = "./";

/// Metadata returned by stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Entry name (`./` for the mount root).
    pub name: String,
    /// Current content length in bytes.
    pub size: u64,
    /// Unix-style mode: permission bits plus [`MODE_DIR`] for the root.
    pub mode: u32,
    /// Modification time in seconds since the UNIX epoch. Never tracked, always `0`.
    pub mtime: u64,
    /// True only for the mount root.
    pub is_dir: bool,
}

impl FileStat {
    /// Stat of the synthetic mount root.
    #[must_use]
    pub fn root() -> Self {
        Self {
            name: ROOT_NAME.to_owned(),
            size: 0,
            mode: MODE_DIR | MODE_READ_ONLY,
            mtime: 0,
            is_dir: true,
        }
    }

    /// True if the owner write bit is set.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.mode & 0o200 != 0
    }
}

/// A single named unit of buffered content.
///
/// The writable flag is decided once at creation. Content is guarded by its
/// own lock so readers of one entry never contend with writers of another.
#[derive(Debug)]
pub struct FileEntry {
    name: String,
    writable: bool,
    content: RwLock<Vec<u8>>,
}

impl FileEntry {
    /// Create an entry. Name validation happens when it is added to a
    /// [`VirtualFileSystem`](crate::VirtualFileSystem).
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>, writable: bool) -> Self {
        Self {
            name: name.into(),
            writable,
            content: RwLock::new(content.into()),
        }
    }

    /// Create a read-only entry.
    pub fn read_only(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::new(name, content, false)
    }

    /// Create an empty writable entry.
    pub fn writable(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), true)
    }

    /// The entry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether writes are permitted.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Current content length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content_guard().len()
    }

    /// True if the entry holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy bytes starting at `offset` into `buf`, returning how many were copied.
    ///
    /// Returns `0` once `offset` reaches the end of the content.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let content = self.content_guard();
        let start = usize::try_from(offset).map_or(content.len(), |o| o.min(content.len()));
        let available = &content[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        n
    }

    /// Append `data` to the content.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PermissionDenied`] if the entry is read-only.
    pub fn write(&self, data: &[u8]) -> VfsResult<usize> {
        if !self.writable {
            return Err(VfsError::PermissionDenied(self.name.clone()));
        }
        let mut content = self
            .content
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        content.extend_from_slice(data);
        tracing::trace!(name = %self.name, bytes = data.len(), size = content.len(), "vfs write");
        Ok(data.len())
    }

    /// A copy of the whole content.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.content_guard().clone()
    }

    /// Entry metadata. Never fails.
    #[must_use]
    pub fn stat(&self) -> FileStat {
        let size = u64::try_from(self.len()).unwrap_or(u64::MAX);
        FileStat {
            name: self.name.clone(),
            size,
            mode: if self.writable {
                MODE_READ_WRITE
            } else {
                MODE_READ_ONLY
            },
            mtime: 0,
            is_dir: false,
        }
    }

    fn content_guard(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.content.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Check that `name` is usable as a flat-namespace entry name.
///
/// # Errors
///
/// Returns [`VfsError::InvalidName`] for empty names, `.`, `..`, and names
/// containing [`PATH_SEPARATOR`].
pub fn validate_name(name: &str) -> VfsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(PATH_SEPARATOR) {
        return Err(VfsError::InvalidName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_reports_size_and_mode() {
        let ro = FileEntry::read_only("method", "GET");
        let stat = ro.stat();
        assert_eq!(stat.name, "method");
        assert_eq!(stat.size, 3);
        assert_eq!(stat.mode, MODE_READ_ONLY);
        assert_eq!(stat.mtime, 0);
        assert!(!stat.is_dir);
        assert!(!stat.is_writable());

        let rw = FileEntry::writable("status_code");
        assert_eq!(rw.stat().mode, MODE_READ_WRITE);
        assert!(rw.stat().is_writable());
        assert_eq!(rw.stat().size, 0);
    }

    #[test]
    fn stat_serializes_for_host_transport() {
        let stat = FileEntry::read_only("method", "GET").stat();
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["name"], "method");
        assert_eq!(json["size"], 3);
        assert_eq!(json["mode"], MODE_READ_ONLY);
        assert_eq!(json["is_dir"], false);
        let back: FileStat = serde_json::from_value(json).unwrap();
        assert_eq!(back, stat);

        let root = FileStat::root();
        let back: FileStat = serde_json::from_str(&serde_json::to_string(&root).unwrap()).unwrap();
        assert_eq!(back, root);
        assert!(back.is_dir);
        assert_eq!(back.mode, MODE_DIR | MODE_READ_ONLY);
    }

    #[test]
    fn write_appends() {
        let entry = FileEntry::writable("out");
        assert_eq!(entry.write(b"40").unwrap(), 2);
        assert_eq!(entry.write(b"4").unwrap(), 1);
        assert_eq!(entry.contents(), b"404");
        assert_eq!(entry.stat().size, 3);
    }

    #[test]
    fn write_to_read_only_is_denied() {
        let entry = FileEntry::read_only("path", "/hello");
        let err = entry.write(b"x").unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(ref n) if n == "path"));
        assert_eq!(entry.contents(), b"/hello");
    }

    #[test]
    fn read_at_stops_at_end() {
        let entry = FileEntry::read_only("query", "a=1&b=2");
        let mut buf = [0u8; 4];
        assert_eq!(entry.read_at(0, &mut buf), 4);
        assert_eq!(&buf, b"a=1&");
        assert_eq!(entry.read_at(4, &mut buf), 3);
        assert_eq!(&buf[..3], b"b=2");
        assert_eq!(entry.read_at(7, &mut buf), 0);
        assert_eq!(entry.read_at(u64::MAX, &mut buf), 0);
    }

    #[test]
    fn root_stat_is_directory() {
        let root = FileStat::root();
        assert!(root.is_dir);
        assert_eq!(root.name, "./");
        assert_eq!(root.mode & MODE_DIR, MODE_DIR);
        assert!(!root.is_writable());
    }

    #[test]
    fn names_with_separator_are_invalid() {
        assert!(validate_name("headers").is_ok());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("./").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("").is_err());
    }
}
