use crate::buffer;
use crate::error::{Result, VfsError};
use bytemuck::{Pod, Zeroable};
use std::io::Write;

/// Archive magic: "SCS#" read as a little-endian u32
pub const SCS_MAGIC: u32 = u32::from_le_bytes(*b"SCS#");

/// Hash method identifier: "CITY" (CityHash64)
pub const HASH_METHOD_CITY: u32 = u32::from_le_bytes(*b"CITY");

/// Header version handled by [`HashFileSystem`](super::HashFileSystem)
pub const HASHFS_V1_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Entry record size in bytes
pub const ENTRY_SIZE: usize = 32;

/// Entry-count limit checked before the table is allocated
pub const MAX_ENTRIES: u32 = 200_000;

/// Entry flag bits
pub const FLAG_DIRECTORY: u32 = 1 << 0;
pub const FLAG_COMPRESSED: u32 = 1 << 1;
pub const FLAG_VERIFY: u32 = 1 << 2;
pub const FLAG_ENCRYPTED: u32 = 1 << 3;

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawHeader {
    magic: u32,
    version: u16,
    salt: u16,
    hash_method: u32,
    entries_count: u32,
    start_offset: u32,
    reserved: [u8; 12],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawEntry {
    hash: u64,
    offset: u64,
    flags: u32,
    crc: u32,
    size: u32,
    compressed_size: u32,
}

/// Magic and version shared by both SCS header revisions.
///
/// Used to pick the right backend before parsing the full header.
pub fn peek_signature(bytes: &[u8]) -> Result<(u32, u16)> {
    let magic = u32::from_le(buffer::read_pod::<u32>(bytes, 0)?);
    let version = u16::from_le(buffer::read_pod::<u16>(bytes, 4)?);
    Ok((magic, version))
}

/// HashFS v1 archive header (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
    /// Decimal prefix mixed into every path hash when non-zero
    pub salt: u16,
    pub hash_method: u32,
    pub entries_count: u32,
    /// Offset of the entry table
    pub start_offset: u32,
}

impl Header {
    pub fn new(salt: u16, entries_count: u32, start_offset: u32) -> Self {
        Self {
            magic: SCS_MAGIC,
            version: HASHFS_V1_VERSION,
            salt,
            hash_method: HASH_METHOD_CITY,
            entries_count,
            start_offset,
        }
    }

    /// Decode the header from the first bytes of an archive.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: &RawHeader = buffer::interpret(bytes, 0)?;
        Ok(Self {
            magic: u32::from_le(raw.magic),
            version: u16::from_le(raw.version),
            salt: u16::from_le(raw.salt),
            hash_method: u32::from_le(raw.hash_method),
            entries_count: u32::from_le(raw.entries_count),
            start_offset: u32::from_le(raw.start_offset),
        })
    }

    /// Check magic, version, hash method and entry limit.
    pub fn validate(&self) -> Result<()> {
        if self.magic != SCS_MAGIC {
            return Err(VfsError::InvalidMagic(self.magic));
        }
        if self.version != HASHFS_V1_VERSION {
            return Err(VfsError::UnsupportedVersion(self.version));
        }
        if self.hash_method != HASH_METHOD_CITY {
            return Err(VfsError::UnsupportedHashMethod(self.hash_method));
        }
        if self.entries_count > MAX_ENTRIES {
            return Err(VfsError::TooManyEntries {
                count: self.entries_count as u64,
                limit: MAX_ENTRIES as u64,
            });
        }
        Ok(())
    }

    /// Write header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.magic.to_le_bytes())?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.salt.to_le_bytes())?;
        writer.write_all(&self.hash_method.to_le_bytes())?;
        writer.write_all(&self.entries_count.to_le_bytes())?;
        writer.write_all(&self.start_offset.to_le_bytes())?;
        writer.write_all(&[0u8; 12])?;
        Ok(())
    }
}

/// One record of the hash-sorted entry table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryRecord {
    pub hash: u64,
    pub offset: u64,
    pub flags: u32,
    pub crc: u32,
    pub size: u32,
    pub compressed_size: u32,
}

impl EntryRecord {
    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Decode `count` consecutive records.
    pub fn parse_table(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        let raw: &[RawEntry] = buffer::interpret_slice(bytes, 0, count)?;
        Ok(raw
            .iter()
            .map(|entry| Self {
                hash: u64::from_le(entry.hash),
                offset: u64::from_le(entry.offset),
                flags: u32::from_le(entry.flags),
                crc: u32::from_le(entry.crc),
                size: u32::from_le(entry.size),
                compressed_size: u32::from_le(entry.compressed_size),
            })
            .collect())
    }

    /// Write entry to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.hash.to_le_bytes())?;
        writer.write_all(&self.offset.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.crc.to_le_bytes())?;
        writer.write_all(&self.size.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        Ok(())
    }
}
