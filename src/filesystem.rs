//! Backend contract shared by every filesystem.

use crate::error::{Result, VfsError};
use crate::file::File;
use crate::meta::{MetaStat, PlainMeta};
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Nesting limit for recursive listings of archive directories
pub const MAX_DIRECTORY_DEPTH: usize = 128;

/// Process-unique identity of a backend instance.
///
/// Entries and metadata carry it as a non-owning reference back to the backend
/// that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FsId(u64);

impl FsId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FsId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fs#{}", self.0)
    }
}

/// Combinable open flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode(u8);

impl OpenMode {
    pub const READ: OpenMode = OpenMode(1 << 0);
    pub const WRITE: OpenMode = OpenMode(1 << 1);
    pub const APPEND: OpenMode = OpenMode(1 << 2);
    pub const UPDATE: OpenMode = OpenMode(1 << 3);
    pub const BINARY: OpenMode = OpenMode(1 << 4);

    pub fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Read-only binary access, the mode archive consumers use
    pub fn read_binary() -> Self {
        Self::READ | Self::BINARY
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 | rhs.0)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::READ, "r"),
            (Self::WRITE, "w"),
            (Self::APPEND, "a"),
            (Self::UPDATE, "+"),
            (Self::BINARY, "b"),
        ];
        for (flag, name) in names {
            if self.contains(flag) {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

/// One item of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub is_directory: bool,
    pub is_encrypted: bool,
    pub owner: FsId,
}

impl Entry {
    pub fn new(path: impl Into<String>, is_directory: bool, is_encrypted: bool, owner: FsId) -> Self {
        Self {
            path: path.into(),
            is_directory,
            is_encrypted,
            owner,
        }
    }
}

/// A mountable store of files and directories.
///
/// Paths are forward-slash delimited and absolute within the store.
/// `read_dir` returns `Err(VfsError::NotFound)` for a missing directory so that
/// callers can tell it apart from an empty one.
pub trait FileSystem: Send + Sync {
    fn id(&self) -> FsId;

    /// Location the backend was created from
    fn root(&self) -> &str;

    /// Short backend kind, e.g. `hashfs`
    fn name(&self) -> &'static str;

    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>>;

    fn mkdir(&self, path: &str) -> Result<()>;

    fn rmdir(&self, path: &str) -> Result<()>;

    /// True for files only
    fn exists(&self, path: &str) -> bool;

    /// True for directories only
    fn dir_exists(&self, path: &str) -> bool;

    fn read_dir(&self, path: &str, absolute: bool, recursive: bool) -> Result<Vec<Entry>>;

    fn mstat(&self, path: &str) -> Result<MetaStat>;

    /// Open content described by an externally resolved plain record.
    fn open_with_plain_meta(&self, path: &str, plain: &PlainMeta) -> Result<Box<dyn File>> {
        let _ = (path, plain);
        Err(VfsError::Unsupported("open_with_plain_meta"))
    }
}
