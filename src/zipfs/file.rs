use crate::error::Result;
use crate::file::{File, SeekOrigin};
use crate::filesystem::FsId;
use crate::inflate::{Payload, PayloadInfo};
use crate::meta::MetaStat;
use crate::zipfs::filesystem::{ZipEntry, ZipIndex};
use std::sync::Arc;
use tracing::warn;

/// Read handle over one ZIP entry
pub struct ZipFile {
    path: String,
    owner: FsId,
    index: Arc<ZipIndex>,
    entry: ZipEntry,
    payload: Payload,
}

impl ZipFile {
    pub(crate) fn new(
        path: &str,
        owner: FsId,
        index: Arc<ZipIndex>,
        entry: ZipEntry,
        info: PayloadInfo,
    ) -> Result<Self> {
        info.check_bounds(index.device.size())?;
        Ok(Self {
            path: path.to_string(),
            owner,
            payload: Payload::new(info)?,
            index,
            entry,
        })
    }

    /// CRC-32 recorded in the central directory
    pub fn crc32(&self) -> u32 {
        self.entry.crc32
    }
}

impl File for ZipFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.payload.read(&self.index.device, buf)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.payload.size())
    }

    fn seek(&mut self, offset: u64, origin: SeekOrigin) -> Result<()> {
        self.payload.seek(offset, origin)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.payload.tell())
    }

    fn mstat(&self) -> MetaStat {
        self.index
            .mstat_entry(self.owner, &self.entry)
            .unwrap_or_else(|err| {
                warn!(path = %self.path, error = %err, "unreadable zip metadata");
                MetaStat::new(self.owner)
            })
    }
}
