//! Webfunc Virtual File System.
//!
//! A per-request, in-memory, flat-namespace filesystem handed to a sandboxed
//! guest. Entries are buffer-backed and carry a static read-only/writable flag;
//! the only "directory" is the synthetic mount root answered for `.`.
//!
//! # Locking
//!
//! The table is guarded by a reader/writer lock for structural changes
//! (`add`) and lookups. Each [`FileEntry`] guards its own content, so reading
//! one file never blocks a write to another.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Host/guest contract constants and result framing.
pub mod contract;
/// Buffer-backed file entries and their metadata.
pub mod entry;
/// Virtual filesystem error types.
pub mod error;
/// The flat file table.
pub mod fs;
/// Open handles.
pub mod handle;

pub use entry::{FileEntry, FileStat, MODE_DIR, MODE_READ_ONLY, MODE_READ_WRITE};
pub use error::{VfsError, VfsResult};
pub use fs::VirtualFileSystem;
pub use handle::FileHandle;

/// Path separator. WASI paths always use `/`.
pub const PATH_SEPARATOR: char = '/';

/// Path that names the mount root.
pub const ROOT_PATH: &str = ".";

/// A filesystem that can be mounted into a guest.
///
/// `open(".")` must yield a directory-like root handle; any other path is a
/// flat name with no separator.
pub trait FileSystem: Send + Sync {
    /// Open `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`VfsError::Path`] wrapping [`VfsError::NotFound`] when no
    /// entry has that name.
    fn open(&self, path: &str) -> VfsResult<FileHandle>;

    /// Stats of the entries under the mount root, sorted by name.
    fn read_dir(&self) -> Vec<FileStat> {
        Vec::new()
    }
}
