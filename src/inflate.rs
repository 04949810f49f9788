//! Payload readers for archive entries.
//!
//! Stored payloads support random access. DEFLATE payloads are decoded through a
//! fixed 4 KiB input window and can only be rewound to the start. Whole-block
//! payloads (GDeflate tile streams and zstd frames) must be decoded in a single
//! read of exactly the uncompressed size.

use crate::device::Device;
use crate::error::{Result, VfsError};
use crate::file::SeekOrigin;
use crate::gdeflate;
use crate::meta::{Compression, PlainMeta};
use flate2::{Decompress, FlushDecompress, Status};

/// Input window of the streaming decoder
pub const INFLATE_CHUNK_SIZE: usize = 4 * 1024;

/// Incremental DEFLATE state for one open handle
struct InflateStream {
    decompress: Decompress,
    zlib_header: bool,
    /// Compressed bytes consumed so far
    input_pos: u64,
    finished: bool,
}

impl InflateStream {
    fn new(zlib_header: bool) -> Self {
        Self {
            decompress: Decompress::new(zlib_header),
            zlib_header,
            input_pos: 0,
            finished: false,
        }
    }

    fn reset(&mut self) {
        self.decompress.reset(self.zlib_header);
        self.input_pos = 0;
        self.finished = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockCodec {
    GDeflate,
    Zstd,
}

impl BlockCodec {
    fn decode(self, compressed: &[u8], out: &mut [u8]) -> Result<()> {
        match self {
            BlockCodec::GDeflate => gdeflate::decompress(compressed, out),
            BlockCodec::Zstd => {
                let written = zstd::bulk::decompress_to_buffer(compressed, out)
                    .map_err(|err| VfsError::DecompressionFailed(err.to_string()))?;
                if written != out.len() {
                    return Err(VfsError::ShortRead {
                        expected: out.len(),
                        actual: written,
                    });
                }
                Ok(())
            }
        }
    }
}

enum Codec {
    Stored,
    Stream(InflateStream),
    WholeBlock(BlockCodec),
}

/// Location and codec of one entry's bytes inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadInfo {
    pub compression: Compression,
    pub offset: u64,
    pub compressed_size: u64,
    pub size: u64,
}

impl PayloadInfo {
    pub fn from_plain(plain: &PlainMeta) -> Result<Self> {
        Ok(Self {
            compression: plain.codec()?,
            offset: plain.offset,
            compressed_size: plain.compressed_size as u64,
            size: plain.size as u64,
        })
    }

    /// Reject payloads whose stored bytes extend past the end of the device.
    pub fn check_bounds(&self, device_size: u64) -> Result<()> {
        let stored = match self.compression {
            Compression::None => self.size,
            _ => self.compressed_size,
        };
        match self.offset.checked_add(stored) {
            Some(end) if end <= device_size => Ok(()),
            _ => Err(VfsError::InvalidFormat(format!(
                "payload at {} (+{stored}) exceeds archive size {device_size}",
                self.offset
            ))),
        }
    }
}

/// Read cursor over a payload
pub struct Payload {
    info: PayloadInfo,
    codec: Codec,
    position: u64,
}

impl Payload {
    pub fn new(info: PayloadInfo) -> Result<Self> {
        let codec = match info.compression {
            Compression::None => Codec::Stored,
            Compression::Zlib => Codec::Stream(InflateStream::new(true)),
            Compression::ZlibHeaderless => Codec::Stream(InflateStream::new(false)),
            Compression::GDeflate => Codec::WholeBlock(BlockCodec::GDeflate),
            Compression::Zstd => Codec::WholeBlock(BlockCodec::Zstd),
        };
        Ok(Self {
            info,
            codec,
            position: 0,
        })
    }

    pub fn info(&self) -> &PayloadInfo {
        &self.info
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn read(&mut self, device: &Device, buf: &mut [u8]) -> Result<usize> {
        if self.position >= self.info.size || buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.info.size - self.position;

        let read = match &mut self.codec {
            Codec::Stored => {
                let len = (buf.len() as u64).min(remaining) as usize;
                device.read_at(self.info.offset + self.position, &mut buf[..len])?;
                len
            }
            Codec::Stream(stream) => {
                let len = (buf.len() as u64).min(remaining) as usize;
                read_stream(stream, &self.info, device, &mut buf[..len])?
            }
            Codec::WholeBlock(block) => {
                if self.position != 0 || buf.len() as u64 != self.info.size {
                    return Err(VfsError::PartialBlockRead);
                }
                let compressed = device.read_vec(self.info.offset, self.info.compressed_size as usize)?;
                block.decode(&compressed, buf)?;
                buf.len()
            }
        };

        self.position += read as u64;
        Ok(read)
    }

    /// Decode the whole payload from the start.
    pub fn read_all(&mut self, device: &Device) -> Result<Vec<u8>> {
        self.seek(0, SeekOrigin::Set)?;
        let size = usize::try_from(self.info.size)
            .map_err(|_| VfsError::InvalidFormat("entry too large for memory".to_string()))?;
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let read = self.read(device, &mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled != size {
            return Err(VfsError::ShortRead {
                expected: size,
                actual: filled,
            });
        }
        Ok(buf)
    }

    pub fn seek(&mut self, offset: u64, origin: SeekOrigin) -> Result<()> {
        match &mut self.codec {
            Codec::Stored => {
                self.position = match origin {
                    SeekOrigin::Set => offset,
                    SeekOrigin::Cur => self
                        .position
                        .checked_add(offset)
                        .ok_or(VfsError::SeekUnsupported)?,
                    SeekOrigin::End => self
                        .info
                        .size
                        .checked_sub(offset)
                        .ok_or(VfsError::SeekUnsupported)?,
                };
                Ok(())
            }
            Codec::Stream(stream) => {
                if offset != 0 || origin != SeekOrigin::Set {
                    return Err(VfsError::SeekUnsupported);
                }
                if self.position != 0 || stream.input_pos != 0 {
                    stream.reset();
                }
                self.position = 0;
                Ok(())
            }
            Codec::WholeBlock(_) => {
                if offset != 0 || origin != SeekOrigin::Set {
                    return Err(VfsError::SeekUnsupported);
                }
                self.position = 0;
                Ok(())
            }
        }
    }
}

/// Feed the decoder window by window until `out` is full or input runs out.
fn read_stream(
    stream: &mut InflateStream,
    info: &PayloadInfo,
    device: &Device,
    out: &mut [u8],
) -> Result<usize> {
    let mut chunk = [0u8; INFLATE_CHUNK_SIZE];
    let mut filled = 0;

    while !stream.finished && filled < out.len() {
        let left = info.compressed_size.saturating_sub(stream.input_pos);
        let bytes = (INFLATE_CHUNK_SIZE as u64).min(left) as usize;
        if bytes > 0 {
            device.read_at(info.offset + stream.input_pos, &mut chunk[..bytes])?;
        }
        // Once input is exhausted the decoder may still hold buffered output
        let flush = if left == 0 {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };

        let before_in = stream.decompress.total_in();
        let before_out = stream.decompress.total_out();
        let status = stream
            .decompress
            .decompress(&chunk[..bytes], &mut out[filled..], flush)?;
        let consumed = stream.decompress.total_in() - before_in;
        let produced = (stream.decompress.total_out() - before_out) as usize;

        stream.input_pos += consumed;
        filled += produced;

        match status {
            Status::StreamEnd => stream.finished = true,
            Status::Ok | Status::BufError if consumed == 0 && produced == 0 => {
                return Err(VfsError::DecompressionFailed(format!(
                    "decoder stalled at input offset {}",
                    stream.input_pos
                )));
            }
            Status::Ok | Status::BufError => {}
        }
    }

    Ok(filled)
}
