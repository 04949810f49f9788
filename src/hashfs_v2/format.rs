use crate::buffer;
use crate::error::{Result, VfsError};
use crate::hashfs::{HASH_METHOD_CITY, SCS_MAGIC};
use bytemuck::{Pod, Zeroable};
use flate2::read::ZlibDecoder;
use std::io::{Read, Write};

/// Header version handled by [`HashFsV2`](super::HashFsV2)
pub const HASHFS_V2_VERSION: u16 = 2;

/// Header size in bytes
pub const HEADER_SIZE: usize = 53;

/// Entry record size in bytes
pub const ENTRY_SIZE: usize = 16;

/// Metadata table word size in bytes
pub const METADATA_WORD_SIZE: usize = 4;

/// Entry flag: the entry is a directory
pub const ENTRY_FLAG_DIRECTORY: u8 = 1 << 0;

/// Upper bound of the DEFLATE expansion ratio, used to reject inflated table sizes
pub const MAX_DEFLATE_RATIO: u64 = 1032;

/// Target platform the archive was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Platform {
    Pc = 0,
    XboxOne = 1,
    XboxSeries = 2,
    Ps4 = 3,
    Ps5 = 4,
}

impl Platform {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Pc),
            1 => Ok(Self::XboxOne),
            2 => Ok(Self::XboxSeries),
            3 => Ok(Self::Ps4),
            4 => Ok(Self::Ps5),
            _ => Err(VfsError::UnsupportedPlatform(value)),
        }
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawHeader {
    magic: u32,
    version: u16,
    salt: u16,
    hash_method: u32,
    entry_table_count: u32,
    entry_table_compressed_size: u32,
    metadata_table_count: u32,
    metadata_table_compressed_size: u32,
    entry_table_offset: u64,
    metadata_table_offset: u64,
    security_descriptor_offset: u64,
    platform: u8,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawEntry {
    hash: u64,
    metadata_index: u32,
    metadata_count: u16,
    flags: u8,
    reserved: u8,
}

/// HashFS v2 archive header (53 bytes, packed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV2 {
    pub magic: u32,
    pub version: u16,
    pub salt: u16,
    pub hash_method: u32,
    pub entry_table_count: u32,
    /// On-disk size; differs from `count * 16` when the table is zlib-compressed
    pub entry_table_compressed_size: u32,
    pub metadata_table_count: u32,
    /// On-disk size; differs from `count * 4` when the table is zlib-compressed
    pub metadata_table_compressed_size: u32,
    pub entry_table_offset: u64,
    pub metadata_table_offset: u64,
    pub security_descriptor_offset: u64,
    pub platform: Platform,
}

impl HeaderV2 {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: &RawHeader = buffer::interpret(bytes, 0)?;
        Ok(Self {
            magic: u32::from_le(raw.magic),
            version: u16::from_le(raw.version),
            salt: u16::from_le(raw.salt),
            hash_method: u32::from_le(raw.hash_method),
            entry_table_count: u32::from_le(raw.entry_table_count),
            entry_table_compressed_size: u32::from_le(raw.entry_table_compressed_size),
            metadata_table_count: u32::from_le(raw.metadata_table_count),
            metadata_table_compressed_size: u32::from_le(raw.metadata_table_compressed_size),
            entry_table_offset: u64::from_le(raw.entry_table_offset),
            metadata_table_offset: u64::from_le(raw.metadata_table_offset),
            security_descriptor_offset: u64::from_le(raw.security_descriptor_offset),
            platform: Platform::from_u8(raw.platform)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.magic != SCS_MAGIC {
            return Err(VfsError::InvalidMagic(self.magic));
        }
        if self.version != HASHFS_V2_VERSION {
            return Err(VfsError::UnsupportedVersion(self.version));
        }
        if self.hash_method != HASH_METHOD_CITY {
            return Err(VfsError::UnsupportedHashMethod(self.hash_method));
        }
        Ok(())
    }

    pub fn entry_table_size(&self) -> u64 {
        self.entry_table_count as u64 * ENTRY_SIZE as u64
    }

    pub fn metadata_table_size(&self) -> u64 {
        self.metadata_table_count as u64 * METADATA_WORD_SIZE as u64
    }

    /// Write header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.magic.to_le_bytes())?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.salt.to_le_bytes())?;
        writer.write_all(&self.hash_method.to_le_bytes())?;
        writer.write_all(&self.entry_table_count.to_le_bytes())?;
        writer.write_all(&self.entry_table_compressed_size.to_le_bytes())?;
        writer.write_all(&self.metadata_table_count.to_le_bytes())?;
        writer.write_all(&self.metadata_table_compressed_size.to_le_bytes())?;
        writer.write_all(&self.entry_table_offset.to_le_bytes())?;
        writer.write_all(&self.metadata_table_offset.to_le_bytes())?;
        writer.write_all(&self.security_descriptor_offset.to_le_bytes())?;
        writer.write_all(&[self.platform as u8])?;
        Ok(())
    }
}

/// One record of the hash-sorted entry table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryV2 {
    pub hash: u64,
    /// First word of this entry's metadata run
    pub metadata_index: u32,
    pub metadata_count: u16,
    pub flags: u8,
}

impl EntryV2 {
    pub fn is_directory(&self) -> bool {
        self.flags & ENTRY_FLAG_DIRECTORY != 0
    }

    pub fn parse_table(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        let raw: &[RawEntry] = buffer::interpret_slice(bytes, 0, count)?;
        Ok(raw
            .iter()
            .map(|entry| Self {
                hash: u64::from_le(entry.hash),
                metadata_index: u32::from_le(entry.metadata_index),
                metadata_count: u16::from_le(entry.metadata_count),
                flags: entry.flags,
            })
            .collect())
    }

    /// Write entry to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.hash.to_le_bytes())?;
        writer.write_all(&self.metadata_index.to_le_bytes())?;
        writer.write_all(&self.metadata_count.to_le_bytes())?;
        writer.write_all(&[self.flags, 0])?;
        Ok(())
    }
}

/// Decode a metadata table into host-order words.
pub fn parse_metadata_table(bytes: &[u8], count: usize) -> Result<Vec<u32>> {
    let words: &[[u8; 4]] = buffer::interpret_slice(bytes, 0, count)?;
    Ok(words.iter().map(|word| u32::from_le_bytes(*word)).collect())
}

/// Inflate a zlib-compressed table to exactly `expected` bytes.
pub fn inflate_table(compressed: &[u8], expected: u64) -> Result<Vec<u8>> {
    if expected > compressed.len() as u64 * MAX_DEFLATE_RATIO {
        return Err(VfsError::InvalidFormat(format!(
            "table of {expected} bytes cannot come from {} compressed bytes",
            compressed.len()
        )));
    }
    let mut out = vec![0u8; expected as usize];
    ZlibDecoder::new(compressed)
        .read_exact(&mut out)
        .map_err(|err| VfsError::DecompressionFailed(err.to_string()))?;
    Ok(out)
}

/// Child list of a directory entry.
///
/// Layout: `count: u32`, `count` name lengths (one byte each), then the names
/// back to back. A leading `/` marks a subdirectory.
pub fn parse_directory_listing(bytes: &[u8]) -> Result<Vec<String>> {
    let count = u32::from_le(buffer::read_pod::<u32>(bytes, 0)?) as usize;
    let lengths: &[u8] = buffer::interpret_slice(bytes, 4, count)?;
    let mut offset = 4 + count;
    let mut names = Vec::with_capacity(count);
    for &len in lengths {
        let name: &[u8] = buffer::interpret_slice(bytes, offset, len as usize)?;
        offset += len as usize;
        names.push(String::from_utf8_lossy(name).into_owned());
    }
    Ok(names)
}

/// Inverse of [`parse_directory_listing`].
pub fn write_directory_listing<W: Write>(names: &[&str], mut writer: W) -> Result<()> {
    writer.write_all(&(names.len() as u32).to_le_bytes())?;
    for name in names {
        let len = u8::try_from(name.len()).map_err(|_| {
            VfsError::InvalidFormat(format!("directory item name too long: {name}"))
        })?;
        writer.write_all(&[len])?;
    }
    for name in names {
        writer.write_all(name.as_bytes())?;
    }
    Ok(())
}
