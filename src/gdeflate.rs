//! GDeflate tile streams.
//!
//! A stream is an 8-byte header, a table of tile offsets and the tiles
//! themselves. Every tile decodes to 64 KiB of output (the last may be shorter)
//! and is independent of its neighbours, so tiles can be decoded in parallel.
//!
//! Inside a tile the DEFLATE bitstream is split across 32 lanes. Each lane owns
//! a bit buffer that starts with one little-endian word from the head of the
//! tile. Block headers and code tables are read from the current lane, and the
//! lane advances after every literal, match or end-of-block symbol. When a lane
//! holds fewer bits than the next field needs it takes the next word of the tile.

use crate::error::{Result, VfsError};

/// First byte of every stream
pub const GDEFLATE_ID: u8 = 4;

/// Uncompressed bytes per tile
pub const TILE_SIZE: usize = 64 * 1024;

/// Interleaved bit lanes per tile
pub const NUM_LANES: usize = 32;

pub const STREAM_HEADER_SIZE: usize = 8;

/// Header encoding of the 64 KiB tile size
const TILE_SIZE_INDEX: u32 = 1;

const MAX_CODE_BITS: u32 = 15;
const MAX_PRECODE_BITS: u32 = 7;
const MAX_LITLEN_CODES: usize = 286;
const MAX_DIST_CODES: usize = 30;
const END_OF_BLOCK: u16 = 256;

const PRECODE_ORDER: [usize; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
];

fn corrupt(message: impl Into<String>) -> VfsError {
    VfsError::DecompressionFailed(format!("gdeflate: {}", message.into()))
}

/// Stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub num_tiles: u16,
    /// Output bytes of the last tile, 0 when it is a full tile
    pub last_tile_size: u32,
}

impl StreamHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < STREAM_HEADER_SIZE {
            return Err(corrupt("stream shorter than its header"));
        }
        let (id, magic) = (bytes[0], bytes[1]);
        if id != GDEFLATE_ID || magic != id ^ 0xFF {
            return Err(corrupt(format!("bad stream id {id:#04x}/{magic:#04x}")));
        }
        let num_tiles = u16::from_le_bytes([bytes[2], bytes[3]]);
        let bits = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if bits & 0x3 != TILE_SIZE_INDEX {
            return Err(corrupt(format!("unsupported tile size index {}", bits & 0x3)));
        }
        let last_tile_size = (bits >> 2) & 0x3_FFFF;
        if last_tile_size as usize > TILE_SIZE {
            return Err(corrupt(format!("last tile size {last_tile_size} exceeds a tile")));
        }
        Ok(Self {
            num_tiles,
            last_tile_size,
        })
    }

    pub fn uncompressed_size(&self) -> usize {
        match self.num_tiles {
            0 => 0,
            n => {
                let last = match self.last_tile_size {
                    0 => TILE_SIZE,
                    size => size as usize,
                };
                (n as usize - 1) * TILE_SIZE + last
            }
        }
    }
}

/// Decode a whole stream into `out`, which must be exactly the stream's size.
pub fn decompress(input: &[u8], out: &mut [u8]) -> Result<()> {
    let header = StreamHeader::parse(input)?;
    let size = header.uncompressed_size();
    if size != out.len() {
        return Err(corrupt(format!(
            "stream holds {size} bytes, entry expects {}",
            out.len()
        )));
    }

    let tiles = header.num_tiles as usize;
    let table_end = STREAM_HEADER_SIZE + tiles * 4;
    let table = input
        .get(STREAM_HEADER_SIZE..table_end)
        .ok_or_else(|| corrupt("tile table truncated"))?;
    // Entry 0 is the compressed size of the last tile; tile 0 always starts at 0
    let offsets: Vec<usize> = table
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as usize)
        .collect();
    let data = &input[table_end..];

    for (index, chunk) in out.chunks_mut(TILE_SIZE).enumerate() {
        let start = if index == 0 { 0 } else { offsets[index] };
        let end = if index + 1 < tiles {
            offsets[index + 1]
        } else {
            start.saturating_add(offsets[0])
        };
        let tile = data
            .get(start..end)
            .ok_or_else(|| corrupt(format!("tile {index} spans {start}..{end} of {}", data.len())))?;
        decode_tile(tile, chunk)?;
    }
    Ok(())
}

/// Per-lane bit buffers over one tile
struct Lanes<'a> {
    input: &'a [u8],
    pos: usize,
    buffers: [u64; NUM_LANES],
    counts: [u32; NUM_LANES],
    current: usize,
}

impl<'a> Lanes<'a> {
    fn new(input: &'a [u8]) -> Result<Self> {
        let mut lanes = Self {
            input,
            pos: 0,
            buffers: [0; NUM_LANES],
            counts: [32; NUM_LANES],
            current: 0,
        };
        for lane in 0..NUM_LANES {
            lanes.buffers[lane] = lanes.next_word()?;
        }
        Ok(lanes)
    }

    fn next_word(&mut self) -> Result<u64> {
        let word = self
            .input
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| corrupt("tile truncated"))?;
        self.pos += 4;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as u64)
    }

    fn ensure(&mut self, count: u32) -> Result<()> {
        let lane = self.current;
        if self.counts[lane] < count {
            let word = self.next_word()?;
            self.buffers[lane] |= word << self.counts[lane];
            self.counts[lane] += 32;
        }
        Ok(())
    }

    fn pop(&mut self, count: u32) -> Result<u32> {
        let lane = self.current;
        if self.counts[lane] < count {
            return Err(corrupt("lane ran out of bits"));
        }
        let value = (self.buffers[lane] & ((1u64 << count) - 1)) as u32;
        self.buffers[lane] >>= count;
        self.counts[lane] -= count;
        Ok(value)
    }

    fn bits(&mut self, count: u32) -> Result<u32> {
        self.ensure(count)?;
        self.pop(count)
    }

    fn advance(&mut self) {
        self.current = (self.current + 1) % NUM_LANES;
    }
}

/// Canonical Huffman code, decoded one bit at a time
struct Huffman {
    counts: [u16; 16],
    symbols: Vec<u16>,
    max_bits: u32,
}

impl Huffman {
    fn new(lengths: &[u8], max_bits: u32) -> Result<Self> {
        let mut counts = [0u16; 16];
        for &len in lengths {
            counts[len as usize] += 1;
        }

        let mut left = 1i32;
        for &count in &counts[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(corrupt("over-subscribed code"));
            }
        }

        let mut next = [0u16; 16];
        for len in 1..15 {
            next[len + 1] = next[len] + counts[len];
        }
        let mut symbols = vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[next[len as usize] as usize] = symbol as u16;
                next[len as usize] += 1;
            }
        }

        Ok(Self {
            counts,
            symbols,
            max_bits,
        })
    }

    fn decode(&self, lanes: &mut Lanes) -> Result<u16> {
        lanes.ensure(self.max_bits)?;
        let (mut code, mut first, mut index) = (0i32, 0i32, 0i32);
        for len in 1..=self.max_bits as usize {
            code |= lanes.pop(1)? as i32;
            let count = self.counts[len] as i32;
            if code - count < first {
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(corrupt("invalid code"))
    }
}

fn decode_tile(tile: &[u8], out: &mut [u8]) -> Result<()> {
    let mut lanes = Lanes::new(tile)?;
    let mut written = 0;
    loop {
        let last = lanes.bits(1)? == 1;
        written = match lanes.bits(2)? {
            0 => stored_block(&mut lanes, out, written)?,
            1 => {
                let (litlen, dist) = fixed_tables()?;
                huffman_block(&mut lanes, &litlen, &dist, out, written)?
            }
            2 => {
                let (litlen, dist) = dynamic_tables(&mut lanes)?;
                huffman_block(&mut lanes, &litlen, &dist, out, written)?
            }
            kind => return Err(corrupt(format!("reserved block type {kind}"))),
        };
        if last {
            break;
        }
    }

    if written != out.len() {
        return Err(VfsError::ShortRead {
            expected: out.len(),
            actual: written,
        });
    }
    Ok(())
}

fn stored_block(lanes: &mut Lanes, out: &mut [u8], written: usize) -> Result<usize> {
    let len = lanes.bits(16)? as usize;
    let end = written + len;
    if end > out.len() {
        return Err(corrupt("stored block overruns tile"));
    }
    for byte in &mut out[written..end] {
        *byte = lanes.bits(8)? as u8;
        lanes.advance();
    }
    Ok(end)
}

fn huffman_block(
    lanes: &mut Lanes,
    litlen: &Huffman,
    dist: &Huffman,
    out: &mut [u8],
    mut written: usize,
) -> Result<usize> {
    loop {
        let symbol = litlen.decode(lanes)?;
        if symbol < END_OF_BLOCK {
            let slot = out
                .get_mut(written)
                .ok_or_else(|| corrupt("literal overruns tile"))?;
            *slot = symbol as u8;
            written += 1;
        } else if symbol == END_OF_BLOCK {
            lanes.advance();
            return Ok(written);
        } else {
            let index = (symbol - 257) as usize;
            if index >= LENGTH_BASE.len() {
                return Err(corrupt(format!("invalid length symbol {symbol}")));
            }
            let length = LENGTH_BASE[index] as usize + lanes.bits(LENGTH_EXTRA[index] as u32)? as usize;

            let code = dist.decode(lanes)? as usize;
            if code >= DIST_BASE.len() {
                return Err(corrupt(format!("invalid distance symbol {code}")));
            }
            let distance = DIST_BASE[code] as usize + lanes.bits(DIST_EXTRA[code] as u32)? as usize;

            if distance > written {
                return Err(corrupt(format!("distance {distance} before start of tile")));
            }
            if written + length > out.len() {
                return Err(corrupt("match overruns tile"));
            }
            // Byte by byte, the source may overlap the bytes being produced
            for pos in written..written + length {
                out[pos] = out[pos - distance];
            }
            written += length;
        }
        lanes.advance();
    }
}

fn fixed_tables() -> Result<(Huffman, Huffman)> {
    let mut lengths = [0u8; 288];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    Ok((
        Huffman::new(&lengths, MAX_CODE_BITS)?,
        Huffman::new(&[5u8; MAX_DIST_CODES], MAX_CODE_BITS)?,
    ))
}

fn dynamic_tables(lanes: &mut Lanes) -> Result<(Huffman, Huffman)> {
    let litlen_count = lanes.bits(5)? as usize + 257;
    let dist_count = lanes.bits(5)? as usize + 1;
    let precode_count = lanes.bits(4)? as usize + 4;
    if litlen_count > MAX_LITLEN_CODES || dist_count > MAX_DIST_CODES {
        return Err(corrupt(format!(
            "too many codes: {litlen_count} literal/length, {dist_count} distance"
        )));
    }

    let mut precode_lengths = [0u8; 19];
    for &symbol in &PRECODE_ORDER[..precode_count] {
        precode_lengths[symbol] = lanes.bits(3)? as u8;
    }
    let precode = Huffman::new(&precode_lengths, MAX_PRECODE_BITS)?;

    let mut lengths = vec![0u8; litlen_count + dist_count];
    let mut index = 0;
    while index < lengths.len() {
        let symbol = precode.decode(lanes)?;
        let (value, repeat) = match symbol {
            0..=15 => {
                lengths[index] = symbol as u8;
                index += 1;
                continue;
            }
            16 => {
                let previous = index
                    .checked_sub(1)
                    .map(|prev| lengths[prev])
                    .ok_or_else(|| corrupt("repeat with no previous length"))?;
                (previous, 3 + lanes.bits(2)? as usize)
            }
            17 => (0, 3 + lanes.bits(3)? as usize),
            18 => (0, 11 + lanes.bits(7)? as usize),
            _ => return Err(corrupt(format!("invalid code length symbol {symbol}"))),
        };
        let end = index + repeat;
        if end > lengths.len() {
            return Err(corrupt("code lengths overrun the table"));
        }
        lengths[index..end].fill(value);
        index = end;
    }

    if lengths[END_OF_BLOCK as usize] == 0 {
        return Err(corrupt("missing end-of-block code"));
    }
    Ok((
        Huffman::new(&lengths[..litlen_count], MAX_CODE_BITS)?,
        Huffman::new(&lengths[litlen_count..], MAX_CODE_BITS)?,
    ))
}
