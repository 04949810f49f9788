//! Mount configuration files
//!
//! A mount configuration lists the roots to mount into a [`Vfs`](crate::Vfs)
//! and the priority of each. Roots may be host directories, HashFS archives or
//! ZIP files; the backend is picked by [`detect_backend`](crate::detect_backend).
//!
//! # Example
//!
//! ```toml
//! base_dir = "/games/truck"
//!
//! [[mount]]
//! root = "base.scs"
//! priority = 0
//!
//! [[mount]]
//! root = "mods/"
//! priority = 100
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use layered_vfs::{MountConfig, Vfs};
//! # use layered_vfs::Result;
//!
//! # fn main() -> Result<()> {
//! let config = MountConfig::load("mounts.toml")?;
//! let mut vfs = Vfs::new();
//! for failure in vfs.mount_config(&config) {
//!     eprintln!("{}: {}", failure.root, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One root to mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Directory or archive path; relative roots resolve against `base_dir`
    pub root: String,

    /// Higher priorities shadow lower ones
    #[serde(default)]
    pub priority: i32,
}

/// Ordered list of roots to mount
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<String>,

    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountEntry>,
}

impl MountConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Root of `entry` with `base_dir` applied.
    pub fn resolve(&self, entry: &MountEntry) -> String {
        match &self.base_dir {
            Some(base) if !Path::new(&entry.root).is_absolute() => {
                Path::new(base).join(&entry.root).to_string_lossy().into_owned()
            }
            _ => entry.root.clone(),
        }
    }
}
