use crate::error::Result;
use crate::file::{File, SeekOrigin};
use crate::filesystem::FsId;
use crate::hashfs::filesystem::HashIndex;
use crate::hashfs::format::EntryRecord;
use crate::inflate::Payload;
use crate::meta::MetaStat;
use std::sync::Arc;

/// Read handle over one HashFS v1 entry
pub struct HashFile {
    path: String,
    owner: FsId,
    index: Arc<HashIndex>,
    entry: EntryRecord,
    payload: Payload,
}

impl HashFile {
    pub(crate) fn new(path: &str, owner: FsId, index: Arc<HashIndex>, entry: EntryRecord) -> Result<Self> {
        let info = HashIndex::payload_info(&entry);
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

impl File for HashFile {
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
        self.index.mstat_entry(self.owner, &self.entry)
    }
}
