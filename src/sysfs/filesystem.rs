use crate::error::{Result, VfsError};
use crate::file::File;
use crate::filesystem::{Entry, FileSystem, FsId, OpenMode};
use crate::meta::MetaStat;
use crate::path;
use crate::sysfs::file::SysFile;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Pass-through to the host filesystem.
///
/// Logical paths are appended verbatim to the root prefix, so an empty root
/// resolves paths relative to the process (or as absolute host paths).
pub struct SysFileSystem {
    id: FsId,
    root: String,
}

impl SysFileSystem {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            id: FsId::next(),
            root: root.into(),
        }
    }

    /// Filesystem with an empty root, used to open archive files themselves
    pub fn process() -> Self {
        Self::new(String::new())
    }

    fn host_path(&self, path: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.root, path))
    }

    fn open_options(mode: OpenMode) -> fs::OpenOptions {
        let mut options = fs::OpenOptions::new();
        if mode.contains(OpenMode::READ) {
            options.read(true);
        }
        if mode.contains(OpenMode::WRITE) {
            options.write(true).create(true).truncate(true);
        }
        if mode.contains(OpenMode::APPEND) {
            options.append(true).create(true);
        }
        if mode.contains(OpenMode::UPDATE) {
            options.read(true).write(true);
        }
        options
    }

    fn list_into(
        &self,
        dir: &str,
        absolute: bool,
        recursive: bool,
        out: &mut Vec<Entry>,
    ) -> Result<()> {
        let mut children = Vec::new();
        for item in fs::read_dir(self.host_path(dir))? {
            let item = item?;
            let name = item.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let is_directory = match item.metadata() {
                Ok(meta) => meta.is_dir(),
                Err(err) => {
                    debug!(name = %name, error = %err, "skipping unreadable directory item");
                    continue;
                }
            };
            children.push((name, is_directory));
        }
        children.sort();

        for (name, is_directory) in children {
            let full = path::join(dir, &name);
            out.push(Entry::new(
                if absolute { full.clone() } else { name },
                is_directory,
                false,
                self.id,
            ));
            if is_directory && recursive {
                self.list_into(&full, absolute, recursive, out)?;
            }
        }
        Ok(())
    }
}

impl FileSystem for SysFileSystem {
    fn id(&self) -> FsId {
        self.id
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn File>> {
        let host = self.host_path(path);
        if host.is_dir() {
            return Err(VfsError::NotFound(path.to_string()));
        }
        let options = Self::open_options(mode);
        let file = match options.open(&host) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound && mode.contains(OpenMode::WRITE) => {
                // Create the missing parent once, then retry.
                let parent = path::directory(path);
                if parent.is_empty() || self.dir_exists(parent) {
                    return Err(err.into());
                }
                self.mkdir(parent)?;
                options.open(&host)?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(VfsError::NotFound(path.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Box::new(SysFile::new(path, file)))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let host = self.host_path(path);
        if host.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&host).map_err(|err| {
            warn!(path = %host.display(), error = %err, "failed to create directory");
            VfsError::from(err)
        })
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        Ok(fs::remove_dir(self.host_path(path))?)
    }

    fn exists(&self, path: &str) -> bool {
        self.host_path(path).is_file()
    }

    fn dir_exists(&self, path: &str) -> bool {
        self.host_path(path).is_dir()
    }

    fn read_dir(&self, path: &str, absolute: bool, recursive: bool) -> Result<Vec<Entry>> {
        let dir = path::remove_slash_at_end(path);
        if !self.dir_exists(dir) {
            return Err(VfsError::NotFound(path.to_string()));
        }
        let mut entries = Vec::new();
        self.list_into(dir, absolute, recursive, &mut entries)?;
        Ok(entries)
    }

    fn mstat(&self, path: &str) -> Result<MetaStat> {
        if self.host_path(path).exists() {
            Ok(MetaStat::new(self.id))
        } else {
            Err(VfsError::NotFound(path.to_string()))
        }
    }
}
