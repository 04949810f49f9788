use crate::city;
use crate::device::Device;
use crate::error::{Result, VfsError};
use crate::file::File;
use crate::filesystem::{Entry, FileSystem, FsId, OpenMode, MAX_DIRECTORY_DEPTH};
use crate::hashfs_v2::file::HashFileV2;
use crate::hashfs_v2::format::{
    inflate_table, parse_directory_listing, parse_metadata_table, EntryV2, HeaderV2, HEADER_SIZE,
};
use crate::inflate::{Payload, PayloadInfo};
use crate::meta::{ImgMeta, Meta, MetaKind, MetaStat, MetaValue, PlainMeta, SampleMeta};
use crate::path;
use crate::sysfs::SysFileSystem;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Parsed tables plus the device they point into
pub(crate) struct IndexV2 {
    pub(crate) device: Device,
    pub(crate) header: HeaderV2,
    pub(crate) entries: Vec<EntryV2>,
    pub(crate) metadata: Vec<u32>,
}

impl IndexV2 {
    pub(crate) fn find(&self, path: &str) -> Option<&EntryV2> {
        let hash = city::hash_path(path, self.header.salt);
        self.entries
            .binary_search_by_key(&hash, |entry| entry.hash)
            .ok()
            .map(|index| &self.entries[index])
    }

    fn record(&self, kind: MetaKind, index: u32) -> Result<&[u32]> {
        let start = index as usize;
        self.metadata
            .get(start..start + kind.record_len())
            .ok_or_else(|| {
                VfsError::InvalidFormat(format!(
                    "{kind:?} record at word {index} exceeds metadata table"
                ))
            })
    }

    fn run(&self, entry: &EntryV2) -> Result<&[u32]> {
        let start = entry.metadata_index as usize;
        self.metadata
            .get(start..start + entry.metadata_count as usize)
            .ok_or_else(|| {
                VfsError::InvalidFormat(format!(
                    "metadata run at word {start} exceeds metadata table"
                ))
            })
    }

    /// Record words of the first metadata item of the given kind.
    pub(crate) fn find_metadata(&self, entry: &EntryV2, kind: MetaKind) -> Result<Option<&[u32]>> {
        for &word in self.run(entry)? {
            let (found, index) = MetaKind::decode(word);
            if found == kind {
                return self.record(kind, index).map(Some);
            }
        }
        Ok(None)
    }

    pub(crate) fn find_plain(&self, entry: &EntryV2, kind: MetaKind) -> Result<Option<PlainMeta>> {
        match self.find_metadata(entry, kind)? {
            Some(words) => PlainMeta::decode(words).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn mstat_entry(&self, owner: FsId, entry: &EntryV2) -> Result<MetaStat> {
        let mut stat = MetaStat::new(owner);
        for &word in self.run(entry)? {
            let (kind, index) = MetaKind::decode(word);
            let value = match kind {
                MetaKind::Img => {
                    let words = self.record(kind, index)?;
                    MetaValue::Img(ImgMeta([words[0], words[1]]))
                }
                MetaKind::Sample => MetaValue::Sample(SampleMeta(self.record(kind, index)?[0])),
                MetaKind::MipProxy | MetaKind::InlineDirectory | MetaKind::Directory => continue,
                MetaKind::Unknown(tag) if !kind.is_plain() => {
                    debug!(tag, "skipping unknown metadata kind");
                    continue;
                }
                _ => MetaValue::Plain(PlainMeta::decode(self.record(kind, index)?)?),
            };
            stat.records.push(Meta {
                name: kind.token(),
                value,
            });
        }
        Ok(stat)
    }
}

/// Read-only view of a HashFS v2 (`SCS#`, version 2) archive
pub struct HashFsV2 {
    id: FsId,
    root: String,
    index: Arc<IndexV2>,
}

impl HashFsV2 {
    /// Open an archive from the host filesystem.
    pub fn open(root: &str) -> Result<Self> {
        let file = SysFileSystem::process()
            .open(root, OpenMode::read_binary())
            .map_err(|err| {
                error!(root, error = %err, "unable to open hashfs v2 root file");
                err
            })?;
        Self::from_file(root, file)
    }

    /// Build the backend over an already opened archive file.
    pub fn from_file(root: &str, file: Box<dyn File>) -> Result<Self> {
        let device = Device::new(file)?;
        let index = Self::read_index(device).map_err(|err| {
            error!(root, error = %err, "failed to read hashfs v2 tables");
            err
        })?;
        debug!(
            root,
            entries = index.entries.len(),
            metadata_words = index.metadata.len(),
            platform = ?index.header.platform,
            "hashfs v2 mounted"
        );
        Ok(Self {
            id: FsId::next(),
            root: root.to_string(),
            index: Arc::new(index),
        })
    }

    fn read_table(device: &Device, offset: u64, stored: u32, expected: u64) -> Result<Vec<u8>> {
        let bytes = device.read_vec(offset, stored as usize)?;
        if stored as u64 == expected {
            Ok(bytes)
        } else {
            inflate_table(&bytes, expected)
        }
    }

    fn read_index(device: Device) -> Result<IndexV2> {
        let header_bytes = device.read_vec(0, HEADER_SIZE)?;
        let header = HeaderV2::parse(&header_bytes)?;
        header.validate()?;

        let entry_table = Self::read_table(
            &device,
            header.entry_table_offset,
            header.entry_table_compressed_size,
            header.entry_table_size(),
        )?;
        let entries = EntryV2::parse_table(&entry_table, header.entry_table_count as usize)?;

        let metadata_table = Self::read_table(
            &device,
            header.metadata_table_offset,
            header.metadata_table_compressed_size,
            header.metadata_table_size(),
        )?;
        let metadata =
            parse_metadata_table(&metadata_table, header.metadata_table_count as usize)?;

        Ok(IndexV2 {
            device,
            header,
            entries,
            metadata,
        })
    }

    pub fn header(&self) -> &HeaderV2 {
        &self.index.header
    }

    pub fn entry_count(&self) -> usize {
        self.index.entries.len()
    }

    fn open_entry(&self, path: &str, entry: EntryV2, plain: PlainMeta) -> Result<Box<dyn File>> {
        let file = HashFileV2::new(path, self.id, Arc::clone(&self.index), entry, plain)?;
        Ok(Box::new(file))
    }

    fn list_into(
        &self,
        dir: &str,
        absolute: bool,
        recursive: bool,
        depth: usize,
        out: &mut Vec<Entry>,
    ) -> Result<()> {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(VfsError::InvalidFormat(format!("directory nesting too deep at {dir}")));
        }
        let entry = self
            .index
            .find(dir)
            .ok_or_else(|| VfsError::NotFound(dir.to_string()))?;
        let plain = self
            .index
            .find_plain(entry, MetaKind::Directory)?
            .ok_or_else(|| VfsError::NotFound(format!("{dir} is not a directory")))?;

        let info = PayloadInfo::from_plain(&plain)?;
        info.check_bounds(self.index.device.size())?;
        let listing = Payload::new(info)?.read_all(&self.index.device)?;

        for name in parse_directory_listing(&listing)? {
            match name.strip_prefix('/') {
                Some(sub) => {
                    let full = path::join(dir, sub);
                    let shown = if absolute { full.clone() } else { sub.to_string() };
                    out.push(Entry::new(shown, true, false, self.id));
                    if recursive {
                        if let Err(err) = self.list_into(&full, absolute, recursive, depth + 1, out) {
                            warn!(root = %self.root, dir = %full, error = %err, "skipping unreadable subdirectory");
                        }
                    }
                }
                None => {
                    let shown = if absolute { path::join(dir, &name) } else { name.clone() };
                    out.push(Entry::new(shown, false, false, self.id));
                }
            }
        }
        Ok(())
    }
}

impl FileSystem for HashFsV2 {
    fn id(&self) -> FsId {
        self.id
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn name(&self) -> &'static str {
        "hashfs_v2"
    }

    fn open(&self, path: &str, _mode: OpenMode) -> Result<Box<dyn File>> {
        let entry = *self
            .index
            .find(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        let kind = if entry.is_directory() {
            MetaKind::Directory
        } else {
            MetaKind::Plain
        };
        let plain = self.index.find_plain(&entry, kind)?.ok_or_else(|| {
            error!(root = %self.root, path, ?kind, "entry has no content metadata");
            VfsError::InvalidFormat(format!("{path} has no {kind:?} metadata"))
        })?;
        self.open_entry(path, entry, plain)
    }

    fn open_with_plain_meta(&self, path: &str, plain: &PlainMeta) -> Result<Box<dyn File>> {
        let entry = *self
            .index
            .find(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        self.open_entry(path, entry, *plain)
    }

    fn mkdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("hashfs v2 is read-only"))
    }

    fn rmdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("hashfs v2 is read-only"))
    }

    fn exists(&self, path: &str) -> bool {
        !path.is_empty()
            && self
                .index
                .find(path)
                .map(|entry| !entry.is_directory())
                .unwrap_or(false)
    }

    fn dir_exists(&self, path: &str) -> bool {
        let dir = path::remove_slash_at_end(path);
        !dir.is_empty()
            && self
                .index
                .find(dir)
                .map(|entry| entry.is_directory())
                .unwrap_or(false)
    }

    fn read_dir(&self, path: &str, absolute: bool, recursive: bool) -> Result<Vec<Entry>> {
        if path.is_empty() {
            return Err(VfsError::NotFound("empty directory path".to_string()));
        }
        let dir = path::remove_slash_at_end(path);
        let mut entries = Vec::new();
        self.list_into(dir, absolute, recursive, 0, &mut entries)?;
        Ok(entries)
    }

    fn mstat(&self, path: &str) -> Result<MetaStat> {
        if path.is_empty() {
            return Err(VfsError::NotFound("empty path".to_string()));
        }
        let entry = self
            .index
            .find(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        self.index.mstat_entry(self.id, entry)
    }
}
