use std::io;
use thiserror::Error;

/// Result type for vfs operations
pub type Result<T> = std::result::Result<T, VfsError>;

/// Unified error type for all filesystem backends
#[derive(Debug, Error)]
pub enum VfsError {
    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(String),

    // Format errors
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Invalid magic number: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    #[error("Unsupported hash method: {0:#010x}")]
    UnsupportedHashMethod(u32),

    #[error("Too many entries: {count} (limit {limit})")]
    TooManyEntries { count: u64, limit: u64 },

    #[error("Read out of bounds: offset {offset} + {len} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    // Unsupported features
    #[error("Entry is encrypted: {0}")]
    Encrypted(String),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u32),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(u8),

    #[error("Seek is not supported on compressed stream (only rewind to 0)")]
    SeekUnsupported,

    #[error("Whole-block codec requires reading the full entry in one call")]
    PartialBlockRead,

    #[error("Unsupported open mode: {0}")]
    UnsupportedMode(String),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Cannot detect filesystem type for root: {0}")]
    UnknownBackend(String),

    // Corruption
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("CRC mismatch: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    // Conflicts
    #[error("Entry is busy: {0}")]
    Busy(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Configuration errors
    #[error("TOML error: {0}")]
    TomlError(String),
}

impl VfsError {
    /// Whether the error means "no such path" rather than a broken backend
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<toml::de::Error> for VfsError {
    fn from(err: toml::de::Error) -> Self {
        VfsError::TomlError(err.to_string())
    }
}

impl From<toml::ser::Error> for VfsError {
    fn from(err: toml::ser::Error) -> Self {
        VfsError::TomlError(err.to_string())
    }
}

impl From<flate2::DecompressError> for VfsError {
    fn from(err: flate2::DecompressError) -> Self {
        VfsError::DecompressionFailed(err.to_string())
    }
}
