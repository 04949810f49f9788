//! ZIP end record, central directory and local header decoding.

use crate::buffer;
use crate::error::{Result, VfsError};
use bytemuck::{Pod, Zeroable};
use std::io::Write;

/// End of central directory signature (`PK\x05\x06`)
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// Central directory file header signature (`PK\x01\x02`)
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;

/// Local file header signature (`PK\x03\x04`)
pub const LFH_SIGNATURE: u32 = 0x0403_4b50;

/// Fixed part of the end of central directory record
pub const EOCD_SIZE: usize = 22;

/// Fixed part of a central directory file header
pub const CDFH_SIZE: usize = 46;

/// Fixed part of a local file header
pub const LFH_SIZE: usize = 30;

/// Tail window searched for the end record
pub const EOCD_SCAN_WINDOW: u64 = 0x4000;

/// Maximum number of central directory records accepted
pub const MAX_ZIP_ENTRIES: usize = 60_000;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

/// General purpose flag bit 0
pub const FLAG_ENCRYPTED: u16 = 1 << 0;

/// MS-DOS directory attribute
const DOS_ATTR_DIRECTORY: u32 = 0x10;

/// `S_IFDIR` in the Unix mode stored in the high half of the external attributes
const UNIX_MODE_DIRECTORY: u32 = 0o040000;

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawEndRecord {
    signature: u32,
    disk_number: u16,
    cd_disk: u16,
    disk_entries: u16,
    total_entries: u16,
    cd_size: u32,
    cd_offset: u32,
    comment_len: u16,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawCentralHeader {
    signature: u32,
    version_made_by: u16,
    version_needed: u16,
    flags: u16,
    method: u16,
    mod_time: u16,
    mod_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name_len: u16,
    extra_len: u16,
    comment_len: u16,
    disk_start: u16,
    internal_attrs: u16,
    external_attrs: u32,
    local_header_offset: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawLocalHeader {
    signature: u32,
    version_needed: u16,
    flags: u16,
    method: u16,
    mod_time: u16,
    mod_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name_len: u16,
    extra_len: u16,
}

/// Host system recorded in the high byte of "version made by"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSystem {
    /// MS-DOS, NTFS, VFAT and MVS share the DOS attribute encoding
    Dos,
    Unix,
}

impl HostSystem {
    pub fn from_version_made_by(version: u16) -> Result<Self> {
        match (version >> 8) as u8 {
            0 | 10 | 11 | 14 | 15 => Ok(Self::Dos),
            3 => Ok(Self::Unix),
            other => Err(VfsError::UnsupportedPlatform(other)),
        }
    }

    pub fn is_directory(self, external_attrs: u32) -> bool {
        match self {
            Self::Dos => external_attrs & DOS_ATTR_DIRECTORY != 0,
            Self::Unix => (external_attrs >> 16) & UNIX_MODE_DIRECTORY != 0,
        }
    }
}

/// End of central directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRecord {
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndRecord {
    /// Locate the end record by scanning `tail` backward for its signature.
    pub fn find(tail: &[u8]) -> Result<Self> {
        if tail.len() < EOCD_SIZE {
            return Err(VfsError::InvalidFormat(
                "file too small to hold a zip end record".to_string(),
            ));
        }
        for pos in (0..=tail.len() - EOCD_SIZE).rev() {
            let signature = u32::from_le(buffer::read_pod::<u32>(tail, pos)?);
            if signature == EOCD_SIGNATURE {
                return Self::parse(tail, pos);
            }
        }
        Err(VfsError::InvalidFormat(
            "zip end of central directory not found".to_string(),
        ))
    }

    pub fn parse(bytes: &[u8], offset: usize) -> Result<Self> {
        let raw: RawEndRecord = buffer::read_pod(bytes, offset)?;
        Ok(Self {
            total_entries: u16::from_le(raw.total_entries),
            cd_size: u32::from_le(raw.cd_size),
            cd_offset: u32::from_le(raw.cd_offset),
            comment_len: u16::from_le(raw.comment_len),
        })
    }

    /// Write end record to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&EOCD_SIGNATURE.to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?;
        writer.write_all(&self.total_entries.to_le_bytes())?;
        writer.write_all(&self.total_entries.to_le_bytes())?;
        writer.write_all(&self.cd_size.to_le_bytes())?;
        writer.write_all(&self.cd_offset.to_le_bytes())?;
        writer.write_all(&self.comment_len.to_le_bytes())?;
        Ok(())
    }
}

/// One decoded central directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralEntry {
    pub name: String,
    pub host: HostSystem,
    pub flags: u16,
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub size: u32,
    pub external_attrs: u32,
    pub local_header_offset: u32,
}

impl CentralEntry {
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/') || self.host.is_directory(self.external_attrs)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.method == METHOD_DEFLATE
    }

    /// Decode `count` consecutive records from the central directory bytes.
    pub fn parse_directory(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        if count > MAX_ZIP_ENTRIES {
            return Err(VfsError::TooManyEntries {
                count: count as u64,
                limit: MAX_ZIP_ENTRIES as u64,
            });
        }
        let mut entries = Vec::with_capacity(count);
        let mut offset = 0;
        for _ in 0..count {
            let raw: RawCentralHeader = buffer::read_pod(bytes, offset)?;
            let signature = u32::from_le(raw.signature);
            if signature != CDFH_SIGNATURE {
                return Err(VfsError::InvalidMagic(signature));
            }
            let method = u16::from_le(raw.method);
            if method != METHOD_STORED && method != METHOD_DEFLATE {
                return Err(VfsError::UnsupportedCompression(method as u32));
            }
            let name_len = u16::from_le(raw.name_len) as usize;
            let extra_len = u16::from_le(raw.extra_len) as usize;
            let comment_len = u16::from_le(raw.comment_len) as usize;
            let name: &[u8] = buffer::interpret_slice(bytes, offset + CDFH_SIZE, name_len)?;

            entries.push(Self {
                name: String::from_utf8_lossy(name).into_owned(),
                host: HostSystem::from_version_made_by(u16::from_le(raw.version_made_by))?,
                flags: u16::from_le(raw.flags),
                method,
                crc32: u32::from_le(raw.crc32),
                compressed_size: u32::from_le(raw.compressed_size),
                size: u32::from_le(raw.uncompressed_size),
                external_attrs: u32::from_le(raw.external_attrs),
                local_header_offset: u32::from_le(raw.local_header_offset),
            });
            offset += CDFH_SIZE + name_len + extra_len + comment_len;
        }
        Ok(entries)
    }
}

/// Offset of the entry's data given the bytes of its local header.
pub fn local_data_offset(local_header_offset: u32, header: &[u8]) -> Result<u64> {
    let raw: RawLocalHeader = buffer::read_pod(header, 0)?;
    let signature = u32::from_le(raw.signature);
    if signature != LFH_SIGNATURE {
        return Err(VfsError::InvalidMagic(signature));
    }
    Ok(local_header_offset as u64
        + LFH_SIZE as u64
        + u16::from_le(raw.name_len) as u64
        + u16::from_le(raw.extra_len) as u64)
}
