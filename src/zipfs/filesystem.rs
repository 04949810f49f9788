use crate::city;
use crate::device::Device;
use crate::error::{Result, VfsError};
use crate::file::File;
use crate::filesystem::{Entry, FileSystem, FsId, OpenMode, MAX_DIRECTORY_DEPTH};
use crate::inflate::PayloadInfo;
use crate::meta::{Compression, Meta, MetaStat, PlainMeta};
use crate::path;
use crate::sysfs::SysFileSystem;
use crate::zipfs::file::ZipFile;
use crate::zipfs::format::{
    local_data_offset, CentralEntry, EndRecord, EOCD_SCAN_WINDOW, EOCD_SIZE, LFH_SIZE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// One file or directory of the linked ZIP tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ZipEntry {
    /// Absolute path without trailing slash; `/` for the root
    pub(crate) path: String,
    pub(crate) name: String,
    pub(crate) is_directory: bool,
    pub(crate) is_encrypted: bool,
    pub(crate) compressed: bool,
    pub(crate) crc32: u32,
    pub(crate) size: u32,
    pub(crate) compressed_size: u32,
    pub(crate) local_header_offset: u32,
    /// Path hashes of the children, sorted by name
    pub(crate) children: Vec<u64>,
}

impl ZipEntry {
    fn directory(path: String) -> Self {
        Self {
            name: path::file_name(&path).to_string(),
            path,
            is_directory: true,
            is_encrypted: false,
            compressed: false,
            crc32: 0,
            size: 0,
            compressed_size: 0,
            local_header_offset: 0,
            children: Vec::new(),
        }
    }

    fn from_central(record: &CentralEntry) -> Self {
        let path = path::absolute(path::remove_slash_at_end(&record.name));
        Self {
            name: path::file_name(&path).to_string(),
            path,
            is_directory: record.is_directory(),
            is_encrypted: record.is_encrypted(),
            compressed: record.is_compressed(),
            crc32: record.crc32,
            size: record.size,
            compressed_size: record.compressed_size,
            local_header_offset: record.local_header_offset,
            children: Vec::new(),
        }
    }
}

/// Linked entry map plus the device it points into
pub(crate) struct ZipIndex {
    pub(crate) device: Device,
    pub(crate) entries: HashMap<u64, ZipEntry>,
}

impl ZipIndex {
    pub(crate) fn find(&self, path: &str) -> Option<&ZipEntry> {
        self.entries.get(&city::hash_path(path, 0))
    }

    /// Resolve where the entry's bytes start by reading its local header.
    pub(crate) fn payload_info(&self, entry: &ZipEntry) -> Result<PayloadInfo> {
        let header = self
            .device
            .read_vec(entry.local_header_offset as u64, LFH_SIZE)?;
        let offset = local_data_offset(entry.local_header_offset, &header)?;
        Ok(PayloadInfo {
            compression: if entry.compressed {
                Compression::ZlibHeaderless
            } else {
                Compression::None
            },
            offset,
            compressed_size: entry.compressed_size as u64,
            size: entry.size as u64,
        })
    }

    pub(crate) fn mstat_entry(&self, owner: FsId, entry: &ZipEntry) -> Result<MetaStat> {
        let mut stat = MetaStat::new(owner);
        if !entry.is_directory {
            let info = self.payload_info(entry)?;
            stat.records.push(Meta::plain(
                "plain",
                PlainMeta {
                    compression: info.compression as u8,
                    flags: 0,
                    compressed_size: entry.compressed_size,
                    aux: 0,
                    size: entry.size,
                    offset: info.offset,
                },
            ));
        }
        Ok(stat)
    }

    /// Build the tree: synthesize missing parents and attach sorted children.
    fn link(records: &[CentralEntry]) -> HashMap<u64, ZipEntry> {
        let mut entries = HashMap::with_capacity(records.len() + 1);
        entries.insert(city::hash_path("/", 0), ZipEntry::directory("/".to_string()));

        for record in records {
            let entry = ZipEntry::from_central(record);
            if entry.path == "/" {
                continue;
            }
            let hash = city::hash_path(&entry.path, 0);
            if entries.contains_key(&hash) {
                warn!(path = %entry.path, "duplicate zip entry ignored");
                continue;
            }
            entries.insert(hash, entry);
        }

        let paths: Vec<String> = entries
            .values()
            .filter(|entry| entry.path != "/")
            .map(|entry| entry.path.clone())
            .collect();

        for child in &paths {
            let mut current = path::directory(child).to_string();
            loop {
                let hash = city::hash_path(&current, 0);
                if entries.contains_key(&hash) {
                    break;
                }
                trace!(path = %current, "synthesizing zip directory");
                let parent = path::directory(&current).to_string();
                entries.insert(hash, ZipEntry::directory(current));
                current = parent;
            }
        }

        let mut children: HashMap<u64, Vec<(String, u64)>> = HashMap::new();
        for entry in entries.values().filter(|entry| entry.path != "/") {
            let parent = city::hash_path(path::directory(&entry.path), 0);
            children
                .entry(parent)
                .or_default()
                .push((entry.name.clone(), city::hash_path(&entry.path, 0)));
        }
        for (parent, mut list) in children {
            list.sort();
            if let Some(entry) = entries.get_mut(&parent) {
                entry.children = list.into_iter().map(|(_, hash)| hash).collect();
            }
        }
        entries
    }
}

/// Read-only view of a ZIP archive
pub struct ZipFileSystem {
    id: FsId,
    root: String,
    index: Arc<ZipIndex>,
}

impl ZipFileSystem {
    /// Open an archive from the host filesystem.
    pub fn open(root: &str) -> Result<Self> {
        let file = SysFileSystem::process()
            .open(root, OpenMode::read_binary())
            .map_err(|err| {
                error!(root, error = %err, "unable to open zip root file");
                err
            })?;
        Self::from_file(root, file)
    }

    /// Build the backend over an already opened archive file.
    pub fn from_file(root: &str, file: Box<dyn File>) -> Result<Self> {
        let device = Device::new(file)?;
        let index = Self::read_index(device).map_err(|err| {
            error!(root, error = %err, "failed to read zip central directory");
            err
        })?;
        debug!(root, entries = index.entries.len(), "zip mounted");
        Ok(Self {
            id: FsId::next(),
            root: root.to_string(),
            index: Arc::new(index),
        })
    }

    fn read_index(device: Device) -> Result<ZipIndex> {
        let size = device.size();
        if size <= EOCD_SIZE as u64 {
            return Err(VfsError::InvalidFormat(format!(
                "zip of {size} bytes is too small"
            )));
        }
        let window = size.min(EOCD_SCAN_WINDOW);
        let tail = device.read_vec(size - window, window as usize)?;
        let end = EndRecord::find(&tail)?;

        let directory = device.read_vec(end.cd_offset as u64, end.cd_size as usize)?;
        let records = CentralEntry::parse_directory(&directory, end.total_entries as usize)?;
        Ok(ZipIndex {
            entries: ZipIndex::link(&records),
            device,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.index.entries.len()
    }

    /// Decode a file entry and compare its CRC-32 with the central directory.
    pub fn verify(&self, path: &str) -> Result<()> {
        let expected = self
            .index
            .find(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?
            .crc32;
        let contents = self.open(path, OpenMode::read_binary())?.get_contents()?;
        let actual = crc32fast::hash(&contents);
        if actual != expected {
            return Err(VfsError::CrcMismatch { expected, actual });
        }
        Ok(())
    }

    fn list_into(
        &self,
        dir: &ZipEntry,
        absolute: bool,
        recursive: bool,
        depth: usize,
        out: &mut Vec<Entry>,
    ) -> Result<()> {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(VfsError::InvalidFormat(format!(
                "directory nesting too deep at {}",
                dir.path
            )));
        }
        for hash in &dir.children {
            let Some(child) = self.index.entries.get(hash) else {
                continue;
            };
            let shown = if absolute { &child.path } else { &child.name };
            out.push(Entry::new(
                shown.clone(),
                child.is_directory,
                child.is_encrypted,
                self.id,
            ));
            if recursive && child.is_directory {
                self.list_into(child, absolute, recursive, depth + 1, out)?;
            }
        }
        Ok(())
    }
}

impl FileSystem for ZipFileSystem {
    fn id(&self) -> FsId {
        self.id
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn name(&self) -> &'static str {
        "zip"
    }

    fn open(&self, path: &str, _mode: OpenMode) -> Result<Box<dyn File>> {
        let entry = self
            .index
            .find(path)
            .filter(|entry| !entry.is_directory)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        if entry.is_encrypted {
            error!(root = %self.root, path, "encrypted zip entries are not supported");
            return Err(VfsError::Encrypted(path.to_string()));
        }
        let info = self.index.payload_info(entry)?;
        let file = ZipFile::new(path, self.id, Arc::clone(&self.index), entry.clone(), info)?;
        Ok(Box::new(file))
    }

    fn mkdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("zip is read-only"))
    }

    fn rmdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("zip is read-only"))
    }

    fn exists(&self, path: &str) -> bool {
        !path.is_empty()
            && self
                .index
                .find(path)
                .map(|entry| !entry.is_directory)
                .unwrap_or(false)
    }

    fn dir_exists(&self, path: &str) -> bool {
        !path.is_empty()
            && self
                .index
                .find(path::remove_slash_at_end(path))
                .map(|entry| entry.is_directory)
                .unwrap_or(false)
    }

    fn read_dir(&self, path: &str, absolute: bool, recursive: bool) -> Result<Vec<Entry>> {
        let dir = self
            .index
            .find(path::remove_slash_at_end(path))
            .filter(|entry| entry.is_directory && !path.is_empty())
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
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
            .find(path::remove_slash_at_end(path))
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        self.index.mstat_entry(self.id, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zipfs::format::HostSystem;

    fn record(name: &str) -> CentralEntry {
        CentralEntry {
            name: name.to_string(),
            host: HostSystem::Dos,
            flags: 0,
            method: 0,
            crc32: 0,
            compressed_size: 1,
            size: 1,
            external_attrs: 0,
            local_header_offset: 0,
        }
    }

    #[test]
    fn test_link_synthesizes_parents() {
        let entries = ZipIndex::link(&[record("a/b/c.txt"), record("a/z.txt"), record("top.txt")]);
        // root, a, a/b, three files
        assert_eq!(entries.len(), 6);

        let a = &entries[&city::hash_path("/a", 0)];
        assert!(a.is_directory);
        assert_eq!(a.children.len(), 2);
        assert_eq!(entries[&a.children[0]].name, "b");
        assert_eq!(entries[&a.children[1]].name, "z.txt");

        let root = &entries[&city::hash_path("/", 0)];
        let names: Vec<&str> = root
            .children
            .iter()
            .map(|hash| entries[hash].name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "top.txt"]);
    }

    #[test]
    fn test_link_keeps_explicit_directories() {
        let mut dir = record("docs/");
        dir.size = 0;
        let entries = ZipIndex::link(&[dir, record("docs/readme.md")]);
        assert_eq!(entries.len(), 3);
        let docs = &entries[&city::hash_path("/docs", 0)];
        assert!(docs.is_directory);
        assert_eq!(docs.children.len(), 1);
    }
}
