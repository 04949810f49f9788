//! Backend detection and the [`Vfs`] context.

use crate::config::MountConfig;
use crate::error::{Result, VfsError};
use crate::file::File;
use crate::filesystem::{FileSystem, FsId, OpenMode};
use crate::hashfs::{peek_signature, HashFileSystem, HASHFS_V1_VERSION, SCS_MAGIC};
use crate::hashfs_v2::{HashFsV2, HASHFS_V2_VERSION};
use crate::overlay::OverlayFileSystem;
use crate::path;
use crate::sysfs::SysFileSystem;
use crate::zipfs::{ZipFileSystem, LFH_SIGNATURE};
use std::path::Path;
use tracing::{error, info};

/// Backend able to serve a mount root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    System,
    HashFsV1,
    HashFsV2,
    Zip,
}

/// Pick the backend for `root` from its type and leading bytes.
pub fn detect_backend(root: &str) -> Result<BackendKind> {
    if root.ends_with('/') || Path::new(root).is_dir() {
        return Ok(BackendKind::System);
    }
    let mut file = SysFileSystem::process().open(root, OpenMode::read_binary())?;
    detect_file(root, file.as_mut())
}

/// Pick the archive backend for an open file.
pub fn detect_file(root: &str, file: &mut dyn File) -> Result<BackendKind> {
    let mut head = [0u8; 8];
    let mut filled = 0;
    while filled < head.len() {
        let read = file.read(&mut head[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    let head = &head[..filled];

    if let Ok((magic, version)) = peek_signature(head) {
        if magic == SCS_MAGIC {
            return match version {
                HASHFS_V1_VERSION => Ok(BackendKind::HashFsV1),
                HASHFS_V2_VERSION => Ok(BackendKind::HashFsV2),
                other => Err(VfsError::UnsupportedVersion(other)),
            };
        }
    }
    if head.starts_with(&LFH_SIGNATURE.to_le_bytes()) || root.to_ascii_lowercase().ends_with(".zip") {
        return Ok(BackendKind::Zip);
    }
    Err(VfsError::UnknownBackend(root.to_string()))
}

/// Construct the backend of the given kind for `root`.
pub fn open_backend(root: &str, kind: BackendKind) -> Result<Box<dyn FileSystem>> {
    Ok(match kind {
        BackendKind::System => Box::new(SysFileSystem::new(path::remove_slash_at_end(root))),
        BackendKind::HashFsV1 => Box::new(HashFileSystem::open(root)?),
        BackendKind::HashFsV2 => Box::new(HashFsV2::open(root)?),
        BackendKind::Zip => Box::new(ZipFileSystem::open(root)?),
    })
}

/// A root of a [`MountConfig`] that failed to mount
#[derive(Debug)]
pub struct MountFailure {
    pub root: String,
    pub error: VfsError,
}

/// Explicit filesystem context.
///
/// Owns the process-relative host filesystem used to open archive roots and
/// the overlay that all mounts are registered with.
pub struct Vfs {
    system: SysFileSystem,
    overlay: OverlayFileSystem,
}

impl Vfs {
    pub fn new() -> Self {
        Self {
            system: SysFileSystem::process(),
            overlay: OverlayFileSystem::new(),
        }
    }

    /// Detect, construct and mount the backend for `root`.
    pub fn mount(&mut self, root: &str, priority: i32) -> Result<FsId> {
        let backend = detect_backend(root)
            .and_then(|kind| open_backend(root, kind))
            .map_err(|err| {
                error!(root, priority, error = %err, "failed to mount");
                err
            })?;
        info!(root, kind = backend.name(), priority, "mounted");
        Ok(self.overlay.mount(backend, priority))
    }

    /// Mount an already constructed backend.
    pub fn mount_backend(&mut self, backend: Box<dyn FileSystem>, priority: i32) -> FsId {
        self.overlay.mount(backend, priority)
    }

    pub fn unmount(&mut self, id: FsId) -> Option<Box<dyn FileSystem>> {
        self.overlay.unmount(id)
    }

    /// Mount every entry of `config` in order, continuing past failures.
    pub fn mount_config(&mut self, config: &MountConfig) -> Vec<MountFailure> {
        let mut failures = Vec::new();
        for entry in &config.mounts {
            let root = config.resolve(entry);
            if let Err(error) = self.mount(&root, entry.priority) {
                failures.push(MountFailure { root, error });
            }
        }
        failures
    }

    pub fn overlay(&self) -> &OverlayFileSystem {
        &self.overlay
    }

    pub fn system(&self) -> &SysFileSystem {
        &self.system
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}
