//! Priority-ordered union of mounted backends.

use crate::error::{Result, VfsError};
use crate::file::File;
use crate::filesystem::{Entry, FileSystem, FsId, OpenMode};
use crate::meta::{MetaStat, PlainMeta};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace, warn};

/// Union filesystem resolving each path against the highest-priority backend
/// that has it.
///
/// Directory listings merge every backend that has the directory; a path seen
/// in a higher-priority backend shadows the same path further down.
pub struct OverlayFileSystem {
    id: FsId,
    mounts: BTreeMap<i32, Box<dyn FileSystem>>,
}

impl OverlayFileSystem {
    pub fn new() -> Self {
        Self {
            id: FsId::next(),
            mounts: BTreeMap::new(),
        }
    }

    /// Mount `backend` at `priority`, replacing any backend already there.
    pub fn mount(&mut self, backend: Box<dyn FileSystem>, priority: i32) -> FsId {
        let id = backend.id();
        debug!(root = backend.root(), kind = backend.name(), priority, %id, "mounting filesystem");
        if let Some(previous) = self.mounts.insert(priority, backend) {
            warn!(
                root = previous.root(),
                priority,
                "replaced filesystem mounted at the same priority"
            );
        }
        id
    }

    /// Remove the backend with the given identity.
    pub fn unmount(&mut self, id: FsId) -> Option<Box<dyn FileSystem>> {
        let priority = self
            .mounts
            .iter()
            .find(|(_, backend)| backend.id() == id)
            .map(|(priority, _)| *priority)?;
        let backend = self.mounts.remove(&priority);
        debug!(%id, priority, "unmounted filesystem");
        backend
    }

    /// Backend with the given identity, e.g. the owner of an [`Entry`].
    pub fn filesystem(&self, id: FsId) -> Option<&dyn FileSystem> {
        self.mounts
            .values()
            .find(|backend| backend.id() == id)
            .map(|backend| backend.as_ref())
    }

    /// Mounted backends with their priorities, highest first.
    pub fn mounted(&self) -> impl Iterator<Item = (i32, &dyn FileSystem)> + '_ {
        self.mounts
            .iter()
            .rev()
            .map(|(priority, backend)| (*priority, backend.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    fn by_priority(&self) -> impl Iterator<Item = &dyn FileSystem> + '_ {
        self.mounts.values().rev().map(|backend| backend.as_ref())
    }

    /// First success from highest to lowest priority. A failure other than
    /// `NotFound` is reported when no backend succeeds.
    fn first<T>(&self, path: &str, mut op: impl FnMut(&dyn FileSystem) -> Result<T>) -> Result<T> {
        let mut failure = None;
        for backend in self.by_priority() {
            match op(backend) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    trace!(root = backend.root(), path, error = %err, "backend failed, trying next");
                    failure.get_or_insert(err);
                }
            }
        }
        Err(failure.unwrap_or_else(|| VfsError::NotFound(path.to_string())))
    }
}

impl Default for OverlayFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for OverlayFileSystem {
    fn id(&self) -> FsId {
        self.id
    }

    fn root(&self) -> &str {
        ""
    }

    fn name(&self) -> &'static str {
        "overlay"
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        self.first(path, |backend| backend.open(path, mode))
    }

    fn open_with_plain_meta(&self, path: &str, plain: &PlainMeta) -> Result<Box<dyn File>> {
        self.first(path, |backend| backend.open_with_plain_meta(path, plain))
    }

    fn mkdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("mkdir on overlay"))
    }

    fn rmdir(&self, _path: &str) -> Result<()> {
        Err(VfsError::Unsupported("rmdir on overlay"))
    }

    fn exists(&self, path: &str) -> bool {
        self.by_priority().any(|backend| backend.exists(path))
    }

    fn dir_exists(&self, path: &str) -> bool {
        self.by_priority().any(|backend| backend.dir_exists(path))
    }

    fn read_dir(&self, path: &str, absolute: bool, recursive: bool) -> Result<Vec<Entry>> {
        let mut found = false;
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for backend in self.by_priority() {
            if !backend.dir_exists(path) {
                continue;
            }
            found = true;
            match backend.read_dir(path, absolute, recursive) {
                Ok(entries) => {
                    for entry in entries {
                        if seen.insert(entry.path.clone()) {
                            merged.push(entry);
                        }
                    }
                }
                Err(err) => {
                    warn!(root = backend.root(), path, error = %err, "skipping unreadable directory");
                }
            }
        }

        if !found {
            return Err(VfsError::NotFound(path.to_string()));
        }
        Ok(merged)
    }

    fn mstat(&self, path: &str) -> Result<MetaStat> {
        self.first(path, |backend| backend.mstat(path))
    }
}
