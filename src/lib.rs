//! layered-vfs: one file and directory interface over many read-mostly stores
//!
//! Backends:
//! - Host directories ([`SysFileSystem`])
//! - SCS hash archives, both header revisions ([`HashFileSystem`], [`HashFsV2`])
//! - ZIP archives with directory reconstruction ([`ZipFileSystem`])
//! - In-memory scratch stores ([`MemFileSystem`])
//!
//! An [`OverlayFileSystem`] unions mounted backends by priority, and [`Vfs`]
//! detects and mounts roots.
//!
//! # Example
//!
//! ```no_run
//! use layered_vfs::{FileSystem, OpenMode, Vfs};
//!
//! let mut vfs = Vfs::new();
//! vfs.mount("base.scs", 0)?;
//! vfs.mount("mods/", 10)?;
//!
//! let mut file = vfs.overlay().open("/def/world.sii", OpenMode::read_binary())?;
//! let bytes = file.get_contents()?;
//!
//! for entry in vfs.overlay().read_dir("/def", true, false)? {
//!     println!("{} {}", if entry.is_directory { "d" } else { "f" }, entry.path);
//! }
//! # Ok::<(), layered_vfs::VfsError>(())
//! ```

// Core modules
pub mod buffer;
pub mod city;
pub mod config;
pub mod device;
pub mod error;
pub mod file;
pub mod filesystem;
pub mod gdeflate;
pub mod inflate;
pub mod meta;
pub mod mount;
pub mod overlay;
pub mod path;
pub mod token;

// Backends
pub mod hashfs;
pub mod hashfs_v2;
pub mod memfs;
pub mod sysfs;
pub mod zipfs;

// Re-export commonly used types
pub use config::{MountConfig, MountEntry};
pub use error::{Result, VfsError};
pub use file::{copy_file, read_pod, File, SeekOrigin};
pub use filesystem::{Entry, FileSystem, FsId, OpenMode};
pub use hashfs::HashFileSystem;
pub use hashfs_v2::HashFsV2;
pub use memfs::{MemFile, MemFileSystem};
pub use meta::{Compression, ImgMeta, Meta, MetaKind, MetaStat, MetaValue, PlainMeta, SampleMeta};
pub use mount::{detect_backend, BackendKind, MountFailure, Vfs};
pub use overlay::OverlayFileSystem;
pub use sysfs::SysFileSystem;
pub use token::Token;
pub use zipfs::ZipFileSystem;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Ensure core types are accessible
        let vfs = Vfs::new();
        assert!(vfs.overlay().is_empty());
        assert_eq!(vfs.system().name(), "sysfs");
        assert_eq!(Compression::from_u8(4).unwrap(), Compression::Zstd);
    }
}
