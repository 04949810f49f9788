use crate::error::{Result, VfsError};
use crate::file::{File, SeekOrigin};
use parking_lot::Mutex;
use std::sync::Arc;

/// Content and open-state of one in-memory file
#[derive(Debug, Default)]
pub(crate) struct StoredEntry {
    pub(crate) is_directory: bool,
    pub(crate) content: Vec<u8>,
    pub(crate) open_for_read_count: usize,
    pub(crate) open_for_write: bool,
}

pub(crate) type SharedEntry = Arc<Mutex<StoredEntry>>;

enum Backing {
    /// Scratch buffer owned by the handle
    Detached(Vec<u8>),
    /// Entry of a [`MemFileSystem`](super::MemFileSystem); the claim is released on drop
    Stored { entry: SharedEntry, for_read: bool },
}

/// Handle over in-memory content.
///
/// Writes always append; reads advance an independent read position.
pub struct MemFile {
    path: String,
    backing: Backing,
    read_position: u64,
}

impl MemFile {
    /// Empty growable buffer not attached to any filesystem
    pub fn new(path: impl Into<String>) -> Self {
        Self::from_bytes(path, Vec::new())
    }

    pub fn from_bytes(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            backing: Backing::Detached(bytes),
            read_position: 0,
        }
    }

    /// Caller must already hold the claim recorded in the entry.
    pub(crate) fn attached(path: &str, entry: SharedEntry, for_read: bool) -> Self {
        Self {
            path: path.to_string(),
            backing: Backing::Stored { entry, for_read },
            read_position: 0,
        }
    }

    /// Snapshot of the current content
    pub fn contents(&self) -> Vec<u8> {
        self.with_content(|content| content.to_vec())
    }

    fn with_content<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match &self.backing {
            Backing::Detached(bytes) => f(bytes),
            Backing::Stored { entry, .. } => f(&entry.lock().content),
        }
    }

    fn content_len(&self) -> u64 {
        self.with_content(|content| content.len() as u64)
    }
}

impl File for MemFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let position = self.read_position as usize;
        let read = self.with_content(|content| {
            let left = content.len().saturating_sub(position);
            let n = buf.len().min(left);
            if n == 0 {
                return 0;
            }
            buf[..n].copy_from_slice(&content[position..position + n]);
            n
        });
        self.read_position += read as u64;
        Ok(read)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match &mut self.backing {
            Backing::Detached(bytes) => bytes.extend_from_slice(buf),
            Backing::Stored { entry, for_read } => {
                if *for_read {
                    return Err(VfsError::UnsupportedMode(format!(
                        "{} is open for reading",
                        self.path
                    )));
                }
                entry.lock().content.extend_from_slice(buf);
            }
        }
        Ok(buf.len())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.content_len())
    }

    fn seek(&mut self, offset: u64, origin: SeekOrigin) -> Result<()> {
        let size = self.content_len();
        let target = match origin {
            SeekOrigin::Set => Some(offset),
            SeekOrigin::Cur => self.read_position.checked_add(offset),
            SeekOrigin::End => size.checked_sub(offset),
        };
        match target {
            Some(position) if position <= size => {
                self.read_position = position;
                Ok(())
            }
            _ => Err(VfsError::OutOfBounds {
                offset: offset as usize,
                len: 0,
                available: size as usize,
            }),
        }
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.read_position)
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        if let Backing::Stored { entry, for_read } = &self.backing {
            let mut entry = entry.lock();
            if *for_read {
                entry.open_for_read_count = entry.open_for_read_count.saturating_sub(1);
            } else {
                entry.open_for_write = false;
            }
        }
    }
}
