//! Open handles returned by [`FileSystem::open`](crate::FileSystem::open).

use std::io;
use std::sync::Arc;

use crate::entry::{FileEntry, FileStat, ROOT_NAME};
use crate::{VfsError, VfsResult};

/// An open file or the mount root.
///
/// Each handle carries its own read position; opening the same entry twice
/// yields two independent cursors over shared content.
#[derive(Debug, Clone)]
pub enum FileHandle {
    /// The synthetic mount root.
    Root,
    /// A regular entry.
    File {
        /// The shared entry.
        entry: Arc<FileEntry>,
        /// Read cursor.
        position: u64,
    },
}

impl FileHandle {
    /// Open `entry` with the cursor at the start.
    #[must_use]
    pub fn file(entry: Arc<FileEntry>) -> Self {
        Self::File { entry, position: 0 }
    }

    /// Handle metadata. Never fails.
    #[must_use]
    pub fn stat(&self) -> FileStat {
        match self {
            Self::Root => FileStat::root(),
            Self::File { entry, .. } => entry.stat(),
        }
    }

    /// True for the mount root.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// The underlying entry, if this is a regular file.
    #[must_use]
    pub fn entry(&self) -> Option<&Arc<FileEntry>> {
        match self {
            Self::Root => None,
            Self::File { entry, .. } => Some(entry),
        }
    }

    /// Read into `buf` from the current position and advance it.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::IsADirectory`] for the root.
    pub fn read_some(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        match self {
            Self::Root => Err(VfsError::IsADirectory(ROOT_NAME.to_owned())),
            Self::File { entry, position } => {
                let n = entry.read_at(*position, buf);
                *position = position.saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
                Ok(n)
            },
        }
    }

    /// Append `data` to the entry.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PermissionDenied`] for read-only entries and the root.
    pub fn write_some(&self, data: &[u8]) -> VfsResult<usize> {
        match self {
            Self::Root => Err(VfsError::PermissionDenied(ROOT_NAME.to_owned())),
            Self::File { entry, .. } => entry.write(data),
        }
    }

    /// Release the handle. There is no underlying OS resource.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn close(self) -> VfsResult<()> {
        Ok(())
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_some(buf).map_err(io::Error::from)
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_some(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn independent_cursors() {
        let entry = Arc::new(FileEntry::read_only("headers", "Host: x\n"));
        let mut a = FileHandle::file(Arc::clone(&entry));
        let mut b = FileHandle::file(entry);

        let mut first = [0u8; 4];
        a.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"Host");

        let mut all = String::new();
        b.read_to_string(&mut all).unwrap();
        assert_eq!(all, "Host: x\n");

        let mut rest = String::new();
        a.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, ": x\n");
    }

    #[test]
    fn write_through_handle_is_visible_to_readers() {
        let entry = Arc::new(FileEntry::writable("status_code"));
        let mut writer = FileHandle::file(Arc::clone(&entry));
        writer.write_all(b"201").unwrap();

        let mut reader = FileHandle::file(entry);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"201");
    }

    #[test]
    fn read_only_write_maps_to_io_permission_denied() {
        let mut handle = FileHandle::file(Arc::new(FileEntry::read_only("method", "GET")));
        let err = handle.write(b"POST").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn root_rejects_content_operations() {
        let mut root = FileHandle::Root;
        assert!(root.is_dir());
        assert!(root.stat().is_dir);
        assert!(matches!(
            root.read_some(&mut [0u8; 8]),
            Err(VfsError::IsADirectory(_))
        ));
        assert!(root.write_some(b"x").is_err());
        assert!(root.close().is_ok());
    }
}
