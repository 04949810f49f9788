//! Positioned reads against an archive's backing file.

use crate::error::{Result, VfsError};
use crate::file::File;
use parking_lot::Mutex;

/// Shared read-only access to the file an archive backend was built on.
///
/// Each call holds the lock for a single seek-and-read, so handles opened from
/// the same archive can be used from different threads.
pub struct Device {
    file: Mutex<Box<dyn File>>,
    size: u64,
}

impl Device {
    pub fn new(file: Box<dyn File>) -> Result<Self> {
        let size = file.size()?;
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Fill `buf` from `offset`, failing on a short read.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.lock().block_read(buf, offset)
    }

    /// Read `len` bytes at `offset` into a new buffer.
    pub fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        // Checked before allocating; lengths come from untrusted headers.
        let available = self.size.saturating_sub(offset);
        if len as u64 > available {
            return Err(VfsError::ShortRead {
                expected: len,
                actual: available.min(usize::MAX as u64) as usize,
            });
        }
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("size", &self.size).finish()
    }
}
