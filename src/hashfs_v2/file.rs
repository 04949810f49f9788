use crate::error::Result;
use crate::file::{File, SeekOrigin};
use crate::filesystem::FsId;
use crate::hashfs_v2::filesystem::IndexV2;
use crate::hashfs_v2::format::EntryV2;
use crate::inflate::{Payload, PayloadInfo};
use crate::meta::{MetaStat, PlainMeta};
use std::sync::Arc;
use tracing::warn;

/// Read handle over the content record of one HashFS v2 entry
pub struct HashFileV2 {
    path: String,
    owner: FsId,
    index: Arc<IndexV2>,
    entry: EntryV2,
    payload: Payload,
}

impl HashFileV2 {
    pub(crate) fn new(
        path: &str,
        owner: FsId,
        index: Arc<IndexV2>,
        entry: EntryV2,
        plain: PlainMeta,
    ) -> Result<Self> {
        let info = PayloadInfo::from_plain(&plain)?;
        info.check_bounds(index.device.size())?;
        Ok(Self {
            path: path.to_string(),
            owner,
            payload: Payload::new(info)?,
            index,
            entry,
        })
    }
}

impl File for HashFileV2 {
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
                warn!(path = %self.path, error = %err, "unreadable metadata");
                MetaStat::new(self.owner)
            })
    }
}
