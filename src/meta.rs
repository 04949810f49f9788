//! Per-file metadata records reported by `mstat`.
//!
//! HashFS v2 stores a run of tagged metadata words per entry. The top byte of a
//! word names the record kind and the low 24 bits index the record's first word
//! in the metadata table. The other backends synthesize a `plain` record from
//! their own entry headers so callers can treat every file the same way.

use crate::error::{Result, VfsError};
use crate::filesystem::FsId;
use crate::token::Token;

/// Codec of an entry's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    /// zlib stream with header
    Zlib = 1,
    /// Raw DEFLATE stream without zlib header
    ZlibHeaderless = 2,
    /// GDeflate tile stream, decoded as a whole block
    GDeflate = 3,
    /// Whole-block zstd frame
    Zstd = 4,
}

impl Compression {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            2 => Ok(Self::ZlibHeaderless),
            3 => Ok(Self::GDeflate),
            4 => Ok(Self::Zstd),
            _ => Err(VfsError::UnsupportedCompression(value as u32)),
        }
    }
}

/// Kind of a v2 metadata record, from the top byte of a metadata word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Img,
    Sample,
    MipProxy,
    InlineDirectory,
    Plain,
    Directory,
    Mip0,
    Mip1,
    MipTail,
    Unknown(u8),
}

/// Bit shared by every kind whose record has the plain layout
pub const META_PLAIN_FLAG: u8 = 0x80;

impl MetaKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Img,
            2 => Self::Sample,
            3 => Self::MipProxy,
            4 => Self::InlineDirectory,
            0x80 => Self::Plain,
            0x81 => Self::Directory,
            0x82 => Self::Mip0,
            0x83 => Self::Mip1,
            0x84 => Self::MipTail,
            other => Self::Unknown(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Img => 1,
            Self::Sample => 2,
            Self::MipProxy => 3,
            Self::InlineDirectory => 4,
            Self::Plain => 0x80,
            Self::Directory => 0x81,
            Self::Mip0 => 0x82,
            Self::Mip1 => 0x83,
            Self::MipTail => 0x84,
            Self::Unknown(tag) => tag,
        }
    }

    /// Split a metadata word into its kind and the record's table index.
    pub fn decode(word: u32) -> (Self, u32) {
        (Self::from_tag((word >> 24) as u8), word & 0x00FF_FFFF)
    }

    /// Build the metadata word pointing at `index`.
    pub fn encode(self, index: u32) -> u32 {
        ((self.tag() as u32) << 24) | (index & 0x00FF_FFFF)
    }

    pub fn is_plain(self) -> bool {
        self.tag() & META_PLAIN_FLAG != 0
    }

    /// Number of table words the record occupies
    pub fn record_len(self) -> usize {
        match self {
            Self::Img => 2,
            Self::Sample => 1,
            Self::MipProxy | Self::InlineDirectory => 0,
            kind if kind.is_plain() => 4,
            _ => 0,
        }
    }

    pub fn token(self) -> Token {
        match self {
            Self::Img => Token::from_str_const("img"),
            Self::Sample => Token::from_str_const("sample"),
            Self::MipProxy => Token::from_str_const("mipproxy"),
            Self::InlineDirectory => Token::from_str_const("inline_dir"),
            Self::Plain => Token::from_str_const("plain"),
            Self::Directory => Token::from_str_const("directory"),
            Self::Mip0 => Token::from_str_const("mip0"),
            Self::Mip1 => Token::from_str_const("mip1"),
            Self::MipTail => Token::from_str_const("miptail"),
            Self::Unknown(_) => Token::default(),
        }
    }
}

/// Location and codec of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlainMeta {
    /// Raw 4-bit codec id, see [`Compression`]
    pub compression: u8,
    /// Upper nibble of the packed codec byte
    pub flags: u8,
    pub compressed_size: u32,
    /// Third record word, carried through unchanged
    pub aux: u32,
    pub size: u32,
    pub offset: u64,
}

impl PlainMeta {
    /// Decode the four-word packed record.
    ///
    /// Word 0 holds the codec in its top nibble and the compressed size in the
    /// low 28 bits; word 1 holds flags and the size; word 3 is the offset in
    /// 16-byte units.
    pub fn decode(words: &[u32]) -> Result<Self> {
        if words.len() < 4 {
            return Err(VfsError::InvalidFormat(format!(
                "plain metadata needs 4 words, got {}",
                words.len()
            )));
        }
        let packed = ((words[0] >> 4) | (words[1] & 0xF0FF_FFFF)) >> 24;
        Ok(Self {
            compression: (packed & 0xF) as u8,
            flags: ((packed >> 4) & 0xF) as u8,
            compressed_size: words[0] & 0x0FFF_FFFF,
            aux: words[2] & 0x0FFF_FFFF,
            size: words[1] & 0x0FFF_FFFF,
            offset: 16 * words[3] as u64,
        })
    }

    /// Inverse of [`PlainMeta::decode`]; the offset must be 16-byte aligned.
    pub fn encode(&self) -> Result<[u32; 4]> {
        if self.offset % 16 != 0 || self.offset / 16 > u32::MAX as u64 {
            return Err(VfsError::InvalidFormat(format!(
                "offset {} cannot be packed",
                self.offset
            )));
        }
        Ok([
            ((self.compression as u32 & 0xF) << 28) | (self.compressed_size & 0x0FFF_FFFF),
            ((self.flags as u32 & 0xF) << 28) | (self.size & 0x0FFF_FFFF),
            self.aux & 0x0FFF_FFFF,
            (self.offset / 16) as u32,
        ])
    }

    pub fn codec(&self) -> Result<Compression> {
        Compression::from_u8(self.compression)
    }
}

/// Texture-object image descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImgMeta(pub [u32; 2]);

impl ImgMeta {
    pub fn width(&self) -> u32 {
        1 + (self.0[0] & 0xFFFF)
    }

    pub fn height(&self) -> u32 {
        1 + (self.0[0] >> 16)
    }

    pub fn mipmap_count(&self) -> u32 {
        (self.0[1] & 0xF) + 1
    }

    /// Pixel format id
    pub fn format(&self) -> u8 {
        (self.0[1] >> 4) as u8
    }

    pub fn is_cube(&self) -> bool {
        (self.0[1] >> 12) & 3 != 0
    }

    /// Faces or array layers
    pub fn count(&self) -> u32 {
        ((self.0[1] >> 14) & 0x3F) + 1
    }

    pub fn pitch_alignment(&self) -> u32 {
        1 << ((self.0[1] >> 20) & 0xF)
    }

    pub fn image_alignment(&self) -> u32 {
        1 << ((self.0[1] >> 24) & 0xF)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    Mirror,
    ClampToEdge,
    ClampToBorder,
}

impl AddressMode {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Repeat),
            1 => Some(Self::Mirror),
            2 => Some(Self::ClampToEdge),
            3 => Some(Self::ClampToBorder),
            _ => None,
        }
    }
}

/// Sampler state descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleMeta(pub u32);

impl SampleMeta {
    pub fn mag_filter(&self) -> Filter {
        if self.0 & 1 == 0 {
            Filter::Nearest
        } else {
            Filter::Linear
        }
    }

    pub fn min_filter(&self) -> Filter {
        if (self.0 >> 1) & 1 == 0 {
            Filter::Nearest
        } else {
            Filter::Linear
        }
    }

    /// Raw two-bit mip filter selector
    pub fn mip_filter(&self) -> u8 {
        ((self.0 >> 2) & 0b11) as u8
    }

    pub fn addr_u(&self) -> Option<AddressMode> {
        AddressMode::from_bits((self.0 >> 4) & 0b111)
    }

    pub fn addr_v(&self) -> Option<AddressMode> {
        AddressMode::from_bits((self.0 >> 7) & 0b111)
    }

    pub fn addr_w(&self) -> Option<AddressMode> {
        AddressMode::from_bits((self.0 >> 10) & 0b111)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaValue {
    Img(ImgMeta),
    Sample(SampleMeta),
    Plain(PlainMeta),
}

/// One named metadata record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub name: Token,
    pub value: MetaValue,
}

impl Meta {
    pub fn plain(name: &str, value: PlainMeta) -> Self {
        Self {
            name: Token::from(name),
            value: MetaValue::Plain(value),
        }
    }
}

/// Metadata of one path, produced on demand by `mstat`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaStat {
    /// Backend that produced the records
    pub owner: Option<FsId>,
    pub records: Vec<Meta>,
}

impl MetaStat {
    pub fn new(owner: FsId) -> Self {
        Self {
            owner: Some(owner),
            records: Vec::new(),
        }
    }

    /// First record with the given name
    pub fn find(&self, name: &str) -> Option<&Meta> {
        let token = Token::from(name);
        self.records.iter().find(|meta| meta.name == token)
    }

    pub fn plain(&self) -> Option<PlainMeta> {
        self.records.iter().find_map(|meta| match meta.value {
            MetaValue::Plain(plain) if meta.name == Token::from("plain") => Some(plain),
            _ => None,
        })
    }

    pub fn img(&self) -> Option<ImgMeta> {
        self.records.iter().find_map(|meta| match meta.value {
            MetaValue::Img(img) => Some(img),
            _ => None,
        })
    }

    pub fn sample(&self) -> Option<SampleMeta> {
        self.records.iter().find_map(|meta| match meta.value {
            MetaValue::Sample(sample) => Some(sample),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_decode_fields() {
        let words = [0x1000_0123, 0x2000_0456, 0xFFFF_FFFF, 0x0000_0010];
        let plain = PlainMeta::decode(&words).unwrap();
        assert_eq!(plain.compression, 1);
        assert_eq!(plain.flags, 2);
        assert_eq!(plain.compressed_size, 0x123);
        assert_eq!(plain.size, 0x456);
        assert_eq!(plain.aux, 0x0FFF_FFFF);
        assert_eq!(plain.offset, 0x100);
        assert_eq!(plain.codec().unwrap(), Compression::Zlib);
    }

    #[test]
    fn test_plain_offset_above_4g() {
        let words = [0, 0, 0, 0xF000_0000];
        let plain = PlainMeta::decode(&words).unwrap();
        assert_eq!(plain.offset, 0xF_0000_0000);
    }

    #[test]
    fn test_plain_encode_inverse() {
        let plain = PlainMeta {
            compression: 4,
            flags: 0,
            compressed_size: 77,
            aux: 5,
            size: 1000,
            offset: 4096,
        };
        assert_eq!(PlainMeta::decode(&plain.encode().unwrap()).unwrap(), plain);

        let unaligned = PlainMeta { offset: 17, ..plain };
        assert!(unaligned.encode().is_err());
    }

    #[test]
    fn test_plain_short_record() {
        assert!(PlainMeta::decode(&[0, 0, 0]).is_err());
    }

    #[test]
    fn test_meta_word_decode() {
        let (kind, index) = MetaKind::decode(0x8000_0012);
        assert_eq!(kind, MetaKind::Plain);
        assert_eq!(index, 0x12);
        assert_eq!(MetaKind::decode(0x8412_3456), (MetaKind::MipTail, 0x12_3456));
        assert_eq!(MetaKind::decode(0x7F00_0000).0, MetaKind::Unknown(0x7F));
        assert_eq!(MetaKind::Img.encode(9), 0x0100_0009);
        assert!(MetaKind::Mip1.is_plain());
        assert!(!MetaKind::Sample.is_plain());
    }

    #[test]
    fn test_img_fields() {
        // 512x256, 10 mips, format 0x47, cube, 6 faces, pitch 256, image 512
        let w1 = 9 | (0x47 << 4) | (1 << 12) | (5 << 14) | (8 << 20) | (9 << 24);
        let img = ImgMeta([511 | (255 << 16), w1]);
        assert_eq!(img.width(), 512);
        assert_eq!(img.height(), 256);
        assert_eq!(img.mipmap_count(), 10);
        assert_eq!(img.format(), 0x47);
        assert!(img.is_cube());
        assert_eq!(img.count(), 6);
        assert_eq!(img.pitch_alignment(), 256);
        assert_eq!(img.image_alignment(), 512);
    }

    #[test]
    fn test_sample_fields() {
        let sample = SampleMeta(1 | (2 << 2) | (1 << 4) | (2 << 7) | (3 << 10));
        assert_eq!(sample.mag_filter(), Filter::Linear);
        assert_eq!(sample.min_filter(), Filter::Nearest);
        assert_eq!(sample.mip_filter(), 2);
        assert_eq!(sample.addr_u(), Some(AddressMode::Mirror));
        assert_eq!(sample.addr_v(), Some(AddressMode::ClampToEdge));
        assert_eq!(sample.addr_w(), Some(AddressMode::ClampToBorder));
        assert_eq!(SampleMeta(7 << 4).addr_u(), None);
    }
}
