use crate::error::{Result, VfsError};
use crate::file::File;
use crate::filesystem::{Entry, FileSystem, FsId, OpenMode};
use crate::memfs::file::{MemFile, SharedEntry, StoredEntry};
use crate::meta::MetaStat;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Flat in-memory store for synthesized content.
///
/// Each entry admits either any number of readers or a single writer. The
/// check happens when a handle is opened; handles release their claim on drop.
pub struct MemFileSystem {
    id: FsId,
    entries: Mutex<HashMap<String, SharedEntry>>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self {
            id: FsId::next(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn find(&self, path: &str) -> Option<SharedEntry> {
        self.entries.lock().get(path).cloned()
    }

    fn find_file(&self, path: &str) -> Option<SharedEntry> {
        self.find(path).filter(|entry| !entry.lock().is_directory)
    }

    fn find_or_create_file(&self, path: &str) -> Option<(SharedEntry, bool)> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(path) {
            if entry.lock().is_directory {
                return None;
            }
            return Some((Arc::clone(entry), false));
        }
        let entry: SharedEntry = Arc::new(Mutex::new(StoredEntry::default()));
        entries.insert(path.to_string(), Arc::clone(&entry));
        Some((entry, true))
    }

    fn busy(path: &str) -> VfsError {
        VfsError::Busy(path.to_string())
    }
}

impl Default for MemFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemFileSystem {
    fn id(&self) -> FsId {
        self.id
    }

    fn root(&self) -> &str {
        ""
    }

    fn name(&self) -> &'static str {
        "memfs"
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        if !mode.contains(OpenMode::BINARY) || mode.contains(OpenMode::UPDATE) {
            return Err(VfsError::UnsupportedMode(format!("memfs requires binary mode, got {mode}")));
        }

        if mode.contains(OpenMode::READ) {
            let entry = self
                .find_file(path)
                .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
            {
                let mut state = entry.lock();
                if state.open_for_write {
                    return Err(Self::busy(path));
                }
                state.open_for_read_count += 1;
            }
            return Ok(Box::new(MemFile::attached(path, entry, true)));
        }

        if mode.contains(OpenMode::WRITE) {
            let (entry, created) = self
                .find_or_create_file(path)
                .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
            {
                let mut state = entry.lock();
                if state.open_for_read_count != 0 || state.open_for_write {
                    return Err(Self::busy(path));
                }
                if !created {
                    debug!(path, "truncating memfs entry");
                    state.content = Vec::new();
                }
                state.open_for_write = true;
            }
            return Ok(Box::new(MemFile::attached(path, entry, false)));
        }

        if mode.contains(OpenMode::APPEND) {
            let entry = self
                .find_file(path)
                .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
            {
                let mut state = entry.lock();
                if state.open_for_read_count != 0 || state.open_for_write {
                    return Err(Self::busy(path));
                }
                state.open_for_write = true;
            }
            return Ok(Box::new(MemFile::attached(path, entry, false)));
        }

        Err(VfsError::UnsupportedMode(mode.to_string()))
    }

    fn mkdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("memfs mkdir"))
    }

    fn rmdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("memfs rmdir"))
    }

    fn exists(&self, path: &str) -> bool {
        self.find(path)
            .map(|entry| !entry.lock().is_directory)
            .unwrap_or(false)
    }

    fn dir_exists(&self, path: &str) -> bool {
        self.find(path)
            .map(|entry| entry.lock().is_directory)
            .unwrap_or(false)
    }

    fn read_dir(&self, _path: &str, _absolute: bool, _recursive: bool) -> Result<Vec<Entry>> {
        Err(VfsError::Unsupported("memfs read_dir"))
    }

    fn mstat(&self, path: &str) -> Result<MetaStat> {
        match self.find(path) {
            Some(_) => Ok(MetaStat::new(self.id)),
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }
}
