//! The flat, request-scoped file table.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::entry::{FileEntry, FileStat, validate_name};
use crate::handle::FileHandle;
use crate::{FileSystem, ROOT_PATH, VfsError, VfsResult};

/// An owning, concurrency-safe table of [`FileEntry`] values keyed by name.
///
/// Only top-level entries exist. The mount root is not stored; it is answered
/// for [`ROOT_PATH`] regardless of what the table holds.
#[derive(Debug, Default)]
pub struct VirtualFileSystem {
    files: RwLock<HashMap<String, Arc<FileEntry>>>,
}

impl VirtualFileSystem {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::InvalidName`] if the name is empty, `.`, or contains
    /// the path separator, and [`VfsError::AlreadyExists`] if the name is taken.
    /// The table is unchanged on failure.
    pub fn add(&self, entry: FileEntry) -> VfsResult<()> {
        validate_name(entry.name())?;

        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        if files.contains_key(entry.name()) {
            return Err(VfsError::AlreadyExists(entry.name().to_owned()));
        }
        tracing::debug!(
            name = entry.name(),
            writable = entry.is_writable(),
            size = entry.len(),
            "vfs add"
        );
        files.insert(entry.name().to_owned(), Arc::new(entry));
        Ok(())
    }

    /// Shorthand for `add(FileEntry::new(name, content, writable))`.
    ///
    /// # Errors
    ///
    /// See [`VirtualFileSystem::add`].
    pub fn add_file(
        &self,
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        writable: bool,
    ) -> VfsResult<()> {
        self.add(FileEntry::new(name, content, writable))
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<FileEntry>> {
        self.table().get(name).cloned()
    }

    /// Append `data` to the named entry.
    ///
    /// The table lock is released before the entry is written, so this only
    /// contends with other writers of the same entry.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::InvalidTarget`] for the mount root,
    /// [`VfsError::NotFound`] for unknown names, and
    /// [`VfsError::PermissionDenied`] for read-only entries.
    pub fn write_file(&self, name: &str, data: &[u8]) -> VfsResult<usize> {
        if name == ROOT_PATH {
            return Err(VfsError::InvalidTarget(name.to_owned()));
        }
        let entry = self
            .get(name)
            .ok_or_else(|| VfsError::NotFound(name.to_owned()))?;
        entry.write(data)
    }

    /// Stats of every entry, sorted by name.
    #[must_use]
    pub fn read_dir(&self) -> Vec<FileStat> {
        let mut stats: Vec<FileStat> = self.table().values().map(|e| e.stat()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Every writable entry, sorted by name.
    #[must_use]
    pub fn writable_entries(&self) -> Vec<Arc<FileEntry>> {
        let mut entries: Vec<Arc<FileEntry>> = self
            .table()
            .values()
            .filter(|e| e.is_writable())
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// Number of entries (the root is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// True if no entries have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<FileEntry>>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileSystem for VirtualFileSystem {
    fn open(&self, path: &str) -> VfsResult<FileHandle> {
        if path == ROOT_PATH {
            return Ok(FileHandle::Root);
        }
        self.get(path)
            .map(FileHandle::file)
            .ok_or_else(|| VfsError::path("open", path, VfsError::NotFound(path.to_owned())))
    }

    fn read_dir(&self) -> Vec<FileStat> {
        VirtualFileSystem::read_dir(self)
    }
}
