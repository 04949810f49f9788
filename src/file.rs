//! Open file handles.

use crate::error::{Result, VfsError};
use crate::meta::MetaStat;
use bytemuck::Pod;
use std::io;

/// Chunk size used by [`copy_file`]
pub const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Reference point of a [`File::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// From the start of the file
    Set,
    /// Forward from the current position
    Cur,
    /// Backward from the end of the file
    End,
}

/// An open handle returned by a [`FileSystem`](crate::FileSystem).
///
/// Archive-backed handles are read-only; `write` on them fails.
pub trait File: Send {
    /// Path the handle was opened with
    fn path(&self) -> &str;

    /// Read up to `buf.len()` bytes, returning 0 at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let _ = buf;
        Err(VfsError::Unsupported("write on read-only file"))
    }

    /// Uncompressed size in bytes
    fn size(&self) -> Result<u64>;

    fn seek(&mut self, offset: u64, origin: SeekOrigin) -> Result<()>;

    fn rewind(&mut self) -> Result<()> {
        self.seek(0, SeekOrigin::Set)
    }

    /// Current position in the uncompressed content
    fn tell(&mut self) -> Result<u64>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn mstat(&self) -> MetaStat {
        MetaStat::default()
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn block_read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        if self.tell()? != offset {
            self.seek(offset, SeekOrigin::Set)?;
        }
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.read(&mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled != buf.len() {
            return Err(VfsError::ShortRead {
                expected: buf.len(),
                actual: filled,
            });
        }
        Ok(())
    }

    /// Read the whole file from the beginning.
    fn get_contents(&mut self) -> Result<Vec<u8>> {
        let size = usize::try_from(self.size()?)
            .map_err(|_| VfsError::InvalidFormat("file too large for memory".to_string()))?;
        let mut buf = vec![0u8; size];
        self.block_read(&mut buf, 0)?;
        Ok(buf)
    }

    /// Write all of `buf` or fail.
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..])?;
            if n == 0 {
                return Err(VfsError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("{}: wrote {written} of {} bytes", self.path(), buf.len()),
                )));
            }
            written += n;
        }
        Ok(())
    }
}

/// Read one plain-old-data record at the current position.
pub fn read_pod<T: Pod>(file: &mut dyn File) -> Result<T> {
    let mut value = T::zeroed();
    let bytes = bytemuck::bytes_of_mut(&mut value);
    let mut filled = 0;
    while filled < bytes.len() {
        let read = file.read(&mut bytes[filled..])?;
        if read == 0 {
            return Err(VfsError::ShortRead {
                expected: bytes.len(),
                actual: filled,
            });
        }
        filled += read;
    }
    Ok(value)
}

/// Copy the remaining content of `input` into `output`, returning the bytes copied.
///
/// Whole-block entries cannot be read in chunks and are copied in one piece.
pub fn copy_file(input: &mut dyn File, output: &mut dyn File) -> Result<u64> {
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match input.read(&mut buffer) {
            Err(VfsError::PartialBlockRead) if total == 0 => {
                let contents = input.get_contents()?;
                output.write_all(&contents)?;
                output.flush()?;
                return Ok(contents.len() as u64);
            }
            other => other?,
        };
        if read == 0 {
            break;
        }
        output.write_all(&buffer[..read])?;
        total += read as u64;
    }
    output.flush()?;
    Ok(total)
}
