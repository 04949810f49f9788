use crate::city;
use crate::device::Device;
use crate::error::{Result, VfsError};
use crate::file::File;
use crate::filesystem::{Entry, FileSystem, FsId, OpenMode, MAX_DIRECTORY_DEPTH};
use crate::hashfs::file::HashFile;
use crate::hashfs::format::{EntryRecord, Header, ENTRY_SIZE, HEADER_SIZE};
use crate::inflate::{Payload, PayloadInfo};
use crate::meta::{Compression, Meta, MetaStat, PlainMeta};
use crate::path;
use crate::sysfs::SysFileSystem;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Parsed index plus the device it points into
pub(crate) struct HashIndex {
    pub(crate) device: Device,
    pub(crate) header: Header,
    pub(crate) entries: Vec<EntryRecord>,
}

impl HashIndex {
    pub(crate) fn find(&self, path: &str) -> Option<&EntryRecord> {
        let hash = city::hash_path(path, self.header.salt);
        self.entries
            .binary_search_by_key(&hash, |entry| entry.hash)
            .ok()
            .map(|index| &self.entries[index])
    }

    pub(crate) fn payload_info(entry: &EntryRecord) -> PayloadInfo {
        PayloadInfo {
            compression: if entry.is_compressed() {
                Compression::Zlib
            } else {
                Compression::None
            },
            offset: entry.offset,
            compressed_size: entry.compressed_size as u64,
            size: entry.size as u64,
        }
    }

    pub(crate) fn mstat_entry(&self, owner: FsId, entry: &EntryRecord) -> MetaStat {
        let mut stat = MetaStat::new(owner);
        if !entry.is_directory() {
            let info = Self::payload_info(entry);
            stat.records.push(Meta::plain(
                "plain",
                PlainMeta {
                    compression: info.compression as u8,
                    flags: 0,
                    compressed_size: entry.compressed_size,
                    aux: 0,
                    size: entry.size,
                    offset: entry.offset,
                },
            ));
        }
        stat
    }
}

/// Read-only view of a HashFS v1 (`SCS#`, version 1) archive
pub struct HashFileSystem {
    id: FsId,
    root: String,
    index: Arc<HashIndex>,
}

impl HashFileSystem {
    /// Open an archive from the host filesystem.
    pub fn open(root: &str) -> Result<Self> {
        let file = SysFileSystem::process()
            .open(root, OpenMode::read_binary())
            .map_err(|err| {
                error!(root, error = %err, "unable to open hashfs root file");
                err
            })?;
        Self::from_file(root, file)
    }

    /// Build the backend over an already opened archive file.
    pub fn from_file(root: &str, file: Box<dyn File>) -> Result<Self> {
        let device = Device::new(file)?;
        let index = Self::read_index(device).map_err(|err| {
            error!(root, error = %err, "failed to read hashfs index");
            err
        })?;
        debug!(root, entries = index.entries.len(), salt = index.header.salt, "hashfs mounted");
        Ok(Self {
            id: FsId::next(),
            root: root.to_string(),
            index: Arc::new(index),
        })
    }

    fn read_index(device: Device) -> Result<HashIndex> {
        let header_bytes = device.read_vec(0, HEADER_SIZE)?;
        let header = Header::parse(&header_bytes)?;
        header.validate()?;

        let count = header.entries_count as usize;
        let table = device.read_vec(header.start_offset as u64, count * ENTRY_SIZE)?;
        let entries = EntryRecord::parse_table(&table, count)?;

        Ok(HashIndex {
            device,
            header,
            entries,
        })
    }

    pub fn header(&self) -> &Header {
        &self.index.header
    }

    pub fn entry_count(&self) -> usize {
        self.index.entries.len()
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
        if !entry.is_directory() {
            return Err(VfsError::NotFound(format!("{dir} is not a directory")));
        }
        if entry.is_encrypted() {
            return Err(VfsError::Encrypted(dir.to_string()));
        }

        let info = HashIndex::payload_info(entry);
        info.check_bounds(self.index.device.size())?;
        let listing = Payload::new(info)?.read_all(&self.index.device)?;
        let text = String::from_utf8_lossy(&listing);

        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('*') {
                let full = path::join(dir, name);
                let shown = if absolute { full.clone() } else { name.to_string() };
                out.push(Entry::new(shown, true, false, self.id));
                if recursive {
                    if let Err(err) = self.list_into(&full, absolute, recursive, depth + 1, out) {
                        warn!(root = %self.root, dir = %full, error = %err, "skipping unreadable subdirectory");
                    }
                }
            } else {
                let full = path::join(dir, line);
                let encrypted = self
                    .index
                    .find(&full)
                    .map(|child| child.is_encrypted())
                    .unwrap_or(false);
                let shown = if absolute { full } else { line.to_string() };
                out.push(Entry::new(shown, false, encrypted, self.id));
            }
        }
        Ok(())
    }
}

impl FileSystem for HashFileSystem {
    fn id(&self) -> FsId {
        self.id
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn name(&self) -> &'static str {
        "hashfs"
    }

    fn open(&self, path: &str, _mode: OpenMode) -> Result<Box<dyn File>> {
        let entry = *self
            .index
            .find(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        if entry.is_encrypted() {
            error!(root = %self.root, path, "encrypted files are not supported");
            return Err(VfsError::Encrypted(path.to_string()));
        }
        let file = HashFile::new(path, self.id, Arc::clone(&self.index), entry)?;
        Ok(Box::new(file))
    }

    fn mkdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("hashfs is read-only"))
    }

    fn rmdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("hashfs is read-only"))
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
        !path.is_empty()
            && self
                .index
                .find(path::remove_slash_at_end(path))
                .map(|entry| entry.is_directory())
                .unwrap_or(false)
    }

    fn read_dir(&self, path: &str, absolute: bool, recursive: bool) -> Result<Vec<Entry>> {
        if path.is_empty() {
            return Err(VfsError::NotFound("empty directory path".to_string()));
        }
        let mut entries = Vec::new();
        self.list_into(path::remove_slash_at_end(path), absolute, recursive, 0, &mut entries)?;
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
        Ok(self.index.mstat_entry(self.id, entry))
    }
}
