//! Archive fixture builders shared by the integration tests.

#![allow(dead_code)]

use flate2::write::{DeflateEncoder, ZlibEncoder};
use layered_vfs::city::hash_path;
use layered_vfs::hashfs::{EntryRecord, Header, FLAG_COMPRESSED, FLAG_DIRECTORY, FLAG_ENCRYPTED};
use layered_vfs::hashfs_v2::{write_directory_listing, EntryV2, HeaderV2, Platform, ENTRY_FLAG_DIRECTORY};
use layered_vfs::zipfs::{EndRecord, CDFH_SIGNATURE, LFH_SIGNATURE, METHOD_DEFLATE, METHOD_STORED};
use layered_vfs::gdeflate::{GDEFLATE_ID, NUM_LANES, TILE_SIZE};
use layered_vfs::{File, MemFile, MetaKind, PlainMeta};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Text large enough to span several 4 KiB input windows once compressed
pub fn sample_text(lines: u32) -> Vec<u8> {
    (0..lines)
        .flat_map(|i| format!("{i:06} the quick brown fox {}\n", i * 7919 % 1000).into_bytes())
        .collect()
}

pub fn mem_file(bytes: Vec<u8>) -> Box<dyn File> {
    Box::new(MemFile::from_bytes("fixture", bytes))
}

pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn pad_to(buf: &mut Vec<u8>, alignment: usize) {
    while buf.len() % alignment != 0 {
        buf.push(0);
    }
}

// ---------------------------------------------------------------------------
// HashFS v1

struct V1Item {
    path: String,
    data: Vec<u8>,
    flags: u32,
    size: u32,
}

/// Builds a v1 archive: header, payloads, then the hash-sorted entry table.
pub struct V1Builder {
    salt: u16,
    items: Vec<V1Item>,
}

impl V1Builder {
    pub fn new() -> Self {
        Self::with_salt(0)
    }

    pub fn with_salt(salt: u16) -> Self {
        Self {
            salt,
            items: Vec::new(),
        }
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.items.push(V1Item {
            path: path.to_string(),
            data: data.to_vec(),
            flags: 0,
            size: data.len() as u32,
        });
        self
    }

    pub fn compressed_file(mut self, path: &str, data: &[u8]) -> Self {
        self.items.push(V1Item {
            path: path.to_string(),
            data: zlib(data),
            flags: FLAG_COMPRESSED,
            size: data.len() as u32,
        });
        self
    }

    pub fn encrypted_file(mut self, path: &str, data: &[u8]) -> Self {
        self.items.push(V1Item {
            path: path.to_string(),
            data: data.to_vec(),
            flags: FLAG_ENCRYPTED,
            size: data.len() as u32,
        });
        self
    }

    /// Directory listing: one name per line, subdirectories prefixed with `*`.
    pub fn dir(mut self, path: &str, lines: &[&str]) -> Self {
        let listing = lines.join("\n").into_bytes();
        self.items.push(V1Item {
            path: path.to_string(),
            size: listing.len() as u32,
            data: listing,
            flags: FLAG_DIRECTORY,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut records = Vec::new();
        for item in &self.items {
            let offset = (layered_vfs::hashfs::HEADER_SIZE + body.len()) as u64;
            body.extend_from_slice(&item.data);
            records.push(EntryRecord {
                hash: hash_path(&item.path, self.salt),
                offset,
                flags: item.flags,
                crc: crc32fast::hash(&item.data),
                size: item.size,
                compressed_size: item.data.len() as u32,
            });
        }
        records.sort_by_key(|record| record.hash);

        let start_offset = (layered_vfs::hashfs::HEADER_SIZE + body.len()) as u32;
        let mut out = Vec::new();
        Header::new(self.salt, records.len() as u32, start_offset)
            .write_to(&mut out)
            .unwrap();
        out.extend_from_slice(&body);
        for record in &records {
            record.write_to(&mut out).unwrap();
        }
        out
    }
}

// ---------------------------------------------------------------------------
// HashFS v2

/// Payload codec used by [`V2Builder`] items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V2Codec {
    Stored,
    Zlib,
    GDeflate,
    Zstd,
}

struct V2Item {
    path: String,
    is_directory: bool,
    content_kind: MetaKind,
    content: Vec<u8>,
    codec: V2Codec,
    extra: Vec<(MetaKind, Vec<u32>)>,
}

/// Builds a v2 archive with optional zlib-compressed tables.
pub struct V2Builder {
    salt: u16,
    compress_tables: bool,
    items: Vec<V2Item>,
}

impl V2Builder {
    pub fn new() -> Self {
        Self {
            salt: 0,
            compress_tables: false,
            items: Vec::new(),
        }
    }

    pub fn salt(mut self, salt: u16) -> Self {
        self.salt = salt;
        self
    }

    pub fn compress_tables(mut self) -> Self {
        self.compress_tables = true;
        self
    }

    pub fn file(self, path: &str, data: &[u8]) -> Self {
        self.file_with(path, data, V2Codec::Stored)
    }

    pub fn file_with(mut self, path: &str, data: &[u8], codec: V2Codec) -> Self {
        self.items.push(V2Item {
            path: path.to_string(),
            is_directory: false,
            content_kind: MetaKind::Plain,
            content: data.to_vec(),
            codec,
            extra: Vec::new(),
        });
        self
    }

    /// File carrying image and sampler descriptors ahead of its content.
    pub fn texture(mut self, path: &str, data: &[u8], img: [u32; 2], sample: u32) -> Self {
        self.items.push(V2Item {
            path: path.to_string(),
            is_directory: false,
            content_kind: MetaKind::Plain,
            content: data.to_vec(),
            codec: V2Codec::Stored,
            extra: vec![
                (MetaKind::Img, img.to_vec()),
                (MetaKind::Sample, vec![sample]),
            ],
        });
        self
    }

    /// Directory whose listing names subdirectories with a leading `/`.
    pub fn dir(mut self, path: &str, names: &[&str]) -> Self {
        let mut listing = Vec::new();
        write_directory_listing(names, &mut listing).unwrap();
        self.items.push(V2Item {
            path: path.to_string(),
            is_directory: true,
            content_kind: MetaKind::Directory,
            content: listing,
            codec: V2Codec::Stored,
            extra: Vec::new(),
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = vec![0u8; layered_vfs::hashfs_v2::HEADER_SIZE];
        pad_to(&mut out, 16);

        let mut metadata: Vec<u32> = Vec::new();
        let mut entries = Vec::new();
        for item in &self.items {
            let (stored, compression) = match item.codec {
                V2Codec::Stored => (item.content.clone(), 0),
                V2Codec::Zlib => (zlib(&item.content), 1),
                V2Codec::GDeflate => (gdeflate(&item.content), 3),
                V2Codec::Zstd => (zstd::bulk::compress(&item.content, 3).unwrap(), 4),
            };
            let offset = out.len() as u64;
            out.extend_from_slice(&stored);
            pad_to(&mut out, 16);

            let plain = PlainMeta {
                compression,
                flags: 0,
                compressed_size: stored.len() as u32,
                aux: 0,
                size: item.content.len() as u32,
                offset,
            };
            let mut records = item.extra.clone();
            records.push((item.content_kind, plain.encode().unwrap().to_vec()));

            let run_start = metadata.len() as u32;
            let mut record_index = run_start + records.len() as u32;
            for (kind, words) in &records {
                metadata.push(kind.encode(record_index));
                record_index += words.len() as u32;
            }
            for (_, words) in &records {
                metadata.extend_from_slice(words);
            }

            entries.push(EntryV2 {
                hash: hash_path(&item.path, self.salt),
                metadata_index: run_start,
                metadata_count: records.len() as u16,
                flags: if item.is_directory { ENTRY_FLAG_DIRECTORY } else { 0 },
            });
        }
        entries.sort_by_key(|entry| entry.hash);

        let mut entry_table = Vec::new();
        for entry in &entries {
            entry.write_to(&mut entry_table).unwrap();
        }
        let metadata_table: Vec<u8> = metadata.iter().flat_map(|word| word.to_le_bytes()).collect();
        let (entry_table, metadata_table) = if self.compress_tables {
            (zlib(&entry_table), zlib(&metadata_table))
        } else {
            (entry_table, metadata_table)
        };

        let entry_table_offset = out.len() as u64;
        out.extend_from_slice(&entry_table);
        let metadata_table_offset = out.len() as u64;
        out.extend_from_slice(&metadata_table);

        let header = HeaderV2 {
            magic: layered_vfs::hashfs::SCS_MAGIC,
            version: layered_vfs::hashfs_v2::HASHFS_V2_VERSION,
            salt: self.salt,
            hash_method: layered_vfs::hashfs::HASH_METHOD_CITY,
            entry_table_count: entries.len() as u32,
            entry_table_compressed_size: entry_table.len() as u32,
            metadata_table_count: metadata.len() as u32,
            metadata_table_compressed_size: metadata_table.len() as u32,
            entry_table_offset,
            metadata_table_offset,
            security_descriptor_offset: 0,
            platform: Platform::Pc,
        };
        let mut header_bytes = Vec::new();
        header.write_to(&mut header_bytes).unwrap();
        out[..header_bytes.len()].copy_from_slice(&header_bytes);
        out
    }
}

// ---------------------------------------------------------------------------
// GDeflate

const PRECODE_ORDER: [usize; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];
const LENGTH_BASE: [usize; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u32; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [usize; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u32; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
];

enum Token {
    Literal(u8),
    Match { length: usize, distance: usize },
}

/// Greedy LZ77 with a single candidate per 3-byte prefix.
fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut last_seen: HashMap<&[u8], usize> = HashMap::new();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let mut length = 0;
        let mut distance = 0;
        if let Some(&prev) = data.get(pos..pos + 3).and_then(|key| last_seen.get(key)) {
            while pos + length < data.len() && length < 258 && data[prev + length] == data[pos + length] {
                length += 1;
            }
            distance = pos - prev;
        }
        let step = if length >= 3 && distance <= 32768 {
            tokens.push(Token::Match { length, distance });
            length
        } else {
            tokens.push(Token::Literal(data[pos]));
            1
        };
        for at in pos..pos + step {
            if let Some(key) = data.get(at..at + 3) {
                last_seen.insert(key, at);
            }
        }
        pos += step;
    }
    tokens
}

/// Canonical (code, length) pairs for a set of code lengths
fn canonical_codes(lengths: &[u8]) -> Vec<(u32, u32)> {
    let mut counts = [0u32; 16];
    for &len in lengths.iter().filter(|&&len| len > 0) {
        counts[len as usize] += 1;
    }
    let mut next = [0u32; 16];
    let mut code = 0;
    for bits in 1..16 {
        code = (code + counts[bits - 1]) << 1;
        next[bits] = code;
    }
    lengths
        .iter()
        .map(|&len| match len {
            0 => (0, 0),
            len => {
                let code = next[len as usize];
                next[len as usize] += 1;
                (code, len as u32)
            }
        })
        .collect()
}

/// Lane fields of one tile in decode order
struct TileWriter {
    // (lane, bits ensured, bits taken, value)
    ops: Vec<(usize, u32, u32, u32)>,
    lane: usize,
}

impl TileWriter {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            lane: 0,
        }
    }

    fn field(&mut self, count: u32, value: u32) {
        if count > 0 {
            self.ops.push((self.lane, count, count, value));
        }
    }

    /// Huffman code, sent most significant bit first
    fn code(&mut self, ensure: u32, (code, len): (u32, u32)) {
        let reversed = code.reverse_bits() >> (32 - len);
        self.ops.push((self.lane, ensure, len, reversed));
    }

    fn advance(&mut self) {
        self.lane = (self.lane + 1) % NUM_LANES;
    }

    fn tokens(&mut self, tokens: &[Token], litlen: &[(u32, u32)], dist: &[(u32, u32)]) {
        for token in tokens {
            match *token {
                Token::Literal(byte) => self.code(15, litlen[byte as usize]),
                Token::Match { length, distance } => {
                    let index = LENGTH_BASE.iter().rposition(|&base| base <= length).unwrap();
                    self.code(15, litlen[257 + index]);
                    self.field(LENGTH_EXTRA[index], (length - LENGTH_BASE[index]) as u32);
                    let index = DIST_BASE.iter().rposition(|&base| base <= distance).unwrap();
                    self.code(15, dist[index]);
                    self.field(DIST_EXTRA[index], (distance - DIST_BASE[index]) as u32);
                }
            }
            self.advance();
        }
        self.code(15, litlen[256]);
        self.advance();
    }

    /// Word stream: one word per lane, then refills in the order lanes ask for them.
    fn finish(self) -> Vec<u8> {
        let mut queues: Vec<Vec<u32>> = vec![Vec::new(); NUM_LANES];
        for &(lane, _, count, value) in &self.ops {
            queues[lane].extend((0..count).map(|bit| (value >> bit) & 1));
        }
        let mut cursors = [0usize; NUM_LANES];
        let mut take = |lane: usize, out: &mut Vec<u8>| {
            let word = (0..32).fold(0u32, |word, bit| {
                word | (queues[lane].get(cursors[lane] + bit).copied().unwrap_or(0) << bit)
            });
            cursors[lane] += 32;
            out.extend_from_slice(&word.to_le_bytes());
        };

        let mut out = Vec::new();
        for lane in 0..NUM_LANES {
            take(lane, &mut out);
        }
        let mut available = [32u32; NUM_LANES];
        for &(lane, ensure, count, _) in &self.ops {
            if available[lane] < ensure {
                take(lane, &mut out);
                available[lane] += 32;
            }
            available[lane] -= count;
        }
        out
    }
}

/// One tile as a stored block, a fixed-code block and a dynamic-code block.
fn gdeflate_tile(data: &[u8]) -> Vec<u8> {
    let stored_end = data.len().min(16);
    let fixed_end = stored_end + (data.len() - stored_end) / 2;
    let mut writer = TileWriter::new();

    writer.field(1, 0);
    writer.field(2, 0);
    writer.field(16, stored_end as u32);
    for &byte in &data[..stored_end] {
        writer.field(8, byte as u32);
        writer.advance();
    }

    let mut fixed_litlen = [8u8; 288];
    fixed_litlen[144..256].fill(9);
    fixed_litlen[256..280].fill(7);
    writer.field(1, 0);
    writer.field(2, 1);
    writer.tokens(
        &tokenize(&data[stored_end..fixed_end]),
        &canonical_codes(&fixed_litlen),
        &canonical_codes(&[5u8; 30]),
    );

    // Complete codes: 256 literals at 9 bits, 2 + 28 other symbols at 5 and 6 bits
    let mut litlen = [9u8; 286];
    litlen[256..258].fill(5);
    litlen[258..].fill(6);
    let mut dist = [5u8; 30];
    dist[28..].fill(4);
    let precode: Vec<u8> = (0..19).map(|symbol| if symbol < 13 { 4 } else { 5 }).collect();
    let precode_codes = canonical_codes(&precode);

    writer.field(1, 1);
    writer.field(2, 2);
    writer.field(5, (litlen.len() - 257) as u32);
    writer.field(5, (dist.len() - 1) as u32);
    writer.field(4, 19 - 4);
    for &symbol in &PRECODE_ORDER {
        writer.field(3, precode[symbol] as u32);
    }
    let lengths: Vec<u8> = litlen.iter().chain(dist.iter()).copied().collect();
    let mut index = 0;
    while index < lengths.len() {
        let value = lengths[index];
        writer.code(7, precode_codes[value as usize]);
        index += 1;
        let run = lengths[index..].iter().take(6).take_while(|&&len| len == value).count();
        if run >= 3 {
            writer.code(7, precode_codes[16]);
            writer.field(2, (run - 3) as u32);
            index += run;
        }
    }
    writer.tokens(
        &tokenize(&data[fixed_end..]),
        &canonical_codes(&litlen),
        &canonical_codes(&dist),
    );

    writer.finish()
}

/// GDeflate tile stream covering `data`.
pub fn gdeflate(data: &[u8]) -> Vec<u8> {
    let tiles: Vec<Vec<u8>> = data.chunks(TILE_SIZE).map(gdeflate_tile).collect();
    let last_tile_size = (data.len() % TILE_SIZE) as u32;

    let mut out = vec![GDEFLATE_ID, GDEFLATE_ID ^ 0xFF];
    out.extend_from_slice(&(tiles.len() as u16).to_le_bytes());
    out.extend_from_slice(&(1 | (last_tile_size << 2)).to_le_bytes());
    // Slot 0 holds the last tile's size, slot i the start of tile i
    let mut start = 0;
    for (index, tile) in tiles.iter().enumerate() {
        let slot = if index == 0 { tiles[tiles.len() - 1].len() } else { start };
        out.extend_from_slice(&(slot as u32).to_le_bytes());
        start += tile.len();
    }
    for tile in &tiles {
        out.extend_from_slice(tile);
    }
    out
}

// ---------------------------------------------------------------------------
// ZIP

struct ZipItem {
    name: String,
    data: Vec<u8>,
    size: u32,
    crc: u32,
    method: u16,
    flags: u16,
    external_attrs: u32,
}

/// Builds a ZIP archive with DOS attributes.
pub struct ZipBuilder {
    items: Vec<ZipItem>,
    comment: Vec<u8>,
    version_made_by: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            comment: Vec::new(),
            version_made_by: 0x0014,
        }
    }

    /// Record `host` in the high byte of every "version made by" field.
    pub fn host(mut self, host: u8) -> Self {
        self.version_made_by = ((host as u16) << 8) | 20;
        self
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.items.push(ZipItem {
            name: name.to_string(),
            data: data.to_vec(),
            size: data.len() as u32,
            crc: crc32fast::hash(data),
            method: METHOD_STORED,
            flags: 0,
            external_attrs: 0x20,
        });
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        self.items.push(ZipItem {
            name: name.to_string(),
            data: deflate(data),
            size: data.len() as u32,
            crc: crc32fast::hash(data),
            method: METHOD_DEFLATE,
            flags: 0,
            external_attrs: 0x20,
        });
        self
    }

    pub fn encrypted(mut self, name: &str, data: &[u8]) -> Self {
        self = self.stored(name, data);
        if let Some(item) = self.items.last_mut() {
            item.flags = 1;
        }
        self
    }

    /// Stored entry whose recorded CRC does not match its content.
    pub fn bad_crc(mut self, name: &str, data: &[u8]) -> Self {
        self = self.stored(name, data);
        if let Some(item) = self.items.last_mut() {
            item.crc ^= 0xFFFF_FFFF;
        }
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.items.push(ZipItem {
            name: name.to_string(),
            data: Vec::new(),
            size: 0,
            crc: 0,
            method: METHOD_STORED,
            flags: 0,
            external_attrs: 0x10,
        });
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = comment.as_bytes().to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offsets = Vec::new();
        for item in &self.items {
            offsets.push(out.len() as u32);
            out.extend_from_slice(&LFH_SIGNATURE.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&item.flags.to_le_bytes());
            out.extend_from_slice(&item.method.to_le_bytes());
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&item.crc.to_le_bytes());
            out.extend_from_slice(&(item.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&item.size.to_le_bytes());
            out.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            // A local extra field the central directory does not repeat
            out.extend_from_slice(&4u16.to_le_bytes());
            out.extend_from_slice(item.name.as_bytes());
            out.extend_from_slice(&[0xCA, 0xFE, 0x00, 0x00]);
            out.extend_from_slice(&item.data);
        }

        let cd_offset = out.len() as u32;
        for (item, offset) in self.items.iter().zip(offsets) {
            out.extend_from_slice(&CDFH_SIGNATURE.to_le_bytes());
            out.extend_from_slice(&self.version_made_by.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&item.flags.to_le_bytes());
            out.extend_from_slice(&item.method.to_le_bytes());
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&item.crc.to_le_bytes());
            out.extend_from_slice(&(item.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&item.size.to_le_bytes());
            out.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&item.external_attrs.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(item.name.as_bytes());
        }
        let cd_size = out.len() as u32 - cd_offset;

        EndRecord {
            total_entries: self.items.len() as u16,
            cd_size,
            cd_offset,
            comment_len: self.comment.len() as u16,
        }
        .write_to(&mut out)
        .unwrap();
        out.extend_from_slice(&self.comment);
        out
    }
}
