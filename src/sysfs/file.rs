use crate::error::{Result, VfsError};
use crate::file::{File, SeekOrigin};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};

/// Handle over a host file
pub struct SysFile {
    path: String,
    file: fs::File,
}

impl SysFile {
    pub(crate) fn new(path: &str, file: fs::File) -> Self {
        Self {
            path: path.to_string(),
            file,
        }
    }
}

impl File for SysFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn seek(&mut self, offset: u64, origin: SeekOrigin) -> Result<()> {
        let target = match origin {
            SeekOrigin::Set => SeekFrom::Start(offset),
            SeekOrigin::Cur => SeekFrom::Current(to_signed(offset)?),
            SeekOrigin::End => SeekFrom::End(-to_signed(offset)?),
        };
        self.file.seek(target)?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }
}

fn to_signed(offset: u64) -> Result<i64> {
    i64::try_from(offset).map_err(|_| VfsError::SeekUnsupported)
}
