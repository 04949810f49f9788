//! Corruption handling
//!
//! Damaged or hostile archives must fail construction or the affected call
//! with an error, never panic or allocate what the header claims.

mod common;

use common::{mem_file, sample_text, V1Builder, V2Builder, V2Codec, ZipBuilder};
use layered_vfs::hashfs::{MAX_ENTRIES, SCS_MAGIC};
use layered_vfs::{FileSystem, HashFileSystem, HashFsV2, OpenMode, VfsError, ZipFileSystem};

/// Helper: overwrite bytes at an offset
fn patch(bytes: &mut [u8], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}

fn v1() -> Vec<u8> {
    V1Builder::new()
        .file("/a.txt", b"alpha")
        .compressed_file("/b.txt", &sample_text(500))
        .build()
}

#[test]
fn test_v1_bad_magic() {
    let mut bytes = v1();
    patch(&mut bytes, 0, b"XXXX");
    let result = HashFileSystem::from_file("bad.scs", mem_file(bytes));
    match result {
        Err(VfsError::InvalidMagic(magic)) => assert_ne!(magic, SCS_MAGIC),
        Err(other) => panic!("Expected InvalidMagic, got: {:?}", other),
        Ok(_) => panic!("Expected InvalidMagic"),
    }
}

#[test]
fn test_v1_unsupported_version_and_hash() {
    let mut bytes = v1();
    patch(&mut bytes, 4, &3u16.to_le_bytes());
    assert!(matches!(
        HashFileSystem::from_file("v3.scs", mem_file(bytes)),
        Err(VfsError::UnsupportedVersion(3))
    ));

    let mut bytes = v1();
    patch(&mut bytes, 8, b"MD5_");
    assert!(matches!(
        HashFileSystem::from_file("md5.scs", mem_file(bytes)),
        Err(VfsError::UnsupportedHashMethod(_))
    ));
}

#[test]
fn test_v1_oversized_entry_count() {
    let mut bytes = v1();
    patch(&mut bytes, 12, &(MAX_ENTRIES + 1).to_le_bytes());
    assert!(matches!(
        HashFileSystem::from_file("huge.scs", mem_file(bytes)),
        Err(VfsError::TooManyEntries { .. })
    ));

    // Within the limit but larger than the file
    let mut bytes = v1();
    patch(&mut bytes, 12, &MAX_ENTRIES.to_le_bytes());
    assert!(HashFileSystem::from_file("short.scs", mem_file(bytes)).is_err());
}

#[test]
fn test_truncated_headers() {
    for len in [0, 4, 16, 31] {
        let bytes = v1()[..len].to_vec();
        assert!(HashFileSystem::from_file("cut.scs", mem_file(bytes)).is_err());
    }
    let v2 = V2Builder::new().file("/a", b"a").build();
    for len in [0, 8, 52] {
        assert!(HashFsV2::from_file("cut.scs", mem_file(v2[..len].to_vec())).is_err());
    }
}

#[test]
fn test_v1_payload_past_end() {
    let mut bytes = v1();
    let start = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
    for index in 0..2 {
        patch(&mut bytes, start + index * 32 + 8, &(1u64 << 40).to_le_bytes());
    }
    let fs = HashFileSystem::from_file("far.scs", mem_file(bytes)).unwrap();
    assert!(fs.exists("/a.txt"));
    assert!(matches!(
        fs.open("/a.txt", OpenMode::read_binary()),
        Err(VfsError::InvalidFormat(_))
    ));
}

#[test]
fn test_v1_corrupt_deflate_stream() {
    let mut bytes = v1();
    // The compressed payload follows the 5 stored bytes after the header
    let start = 32 + 5;
    for byte in &mut bytes[start + 2..start + 40] {
        *byte ^= 0x5A;
    }
    let fs = HashFileSystem::from_file("flip.scs", mem_file(bytes)).unwrap();
    let result = fs
        .open("/b.txt", OpenMode::read_binary())
        .and_then(|mut file| file.get_contents());
    assert!(result.is_err());
}

#[test]
fn test_v2_unknown_platform() {
    let mut bytes = V2Builder::new().file("/a", b"a").build();
    bytes[52] = 200;
    assert!(matches!(
        HashFsV2::from_file("ps9.scs", mem_file(bytes)),
        Err(VfsError::UnsupportedPlatform(200))
    ));
}

#[test]
fn test_v2_metadata_index_out_of_range() {
    let bytes = V2Builder::new().file("/a", b"payload").build();
    let fs = HashFsV2::from_file("ok.scs", mem_file(bytes.clone())).unwrap();
    let header = *fs.header();

    // Point the entry's metadata run far past the table
    let mut bad = bytes.clone();
    let entry = header.entry_table_offset as usize;
    patch(&mut bad, entry + 8, &0x00FF_0000u32.to_le_bytes());
    let fs = HashFsV2::from_file("bad.scs", mem_file(bad)).unwrap();
    assert!(matches!(
        fs.open("/a", OpenMode::read_binary()),
        Err(VfsError::InvalidFormat(_))
    ));
    assert!(fs.mstat("/a").is_err());

    // Point the plain record itself past the table
    let mut bad = bytes;
    let run = header.metadata_table_offset as usize;
    patch(&mut bad, run, &(0x8000_0000u32 | 0x00FF_FFFF).to_le_bytes());
    let fs = HashFsV2::from_file("bad.scs", mem_file(bad)).unwrap();
    assert!(fs.open("/a", OpenMode::read_binary()).is_err());
}

#[test]
fn test_v2_compressed_table_claims() {
    let mut bytes = V2Builder::new()
        .file("/a", b"a")
        .compress_tables()
        .build();
    // Claim far more entries than the compressed table could hold
    patch(&mut bytes, 12, &0x0FFF_FFFFu32.to_le_bytes());
    assert!(HashFsV2::from_file("bomb.scs", mem_file(bytes)).is_err());
}

#[test]
fn test_v2_corrupt_zstd_block() {
    let text = sample_text(500);
    let mut bytes = V2Builder::new()
        .file_with("/z", &text, V2Codec::Zstd)
        .build();
    // First payload starts at the 16-byte boundary after the header
    for byte in &mut bytes[64 + 4..64 + 24] {
        *byte = 0xFF;
    }
    let fs = HashFsV2::from_file("z.scs", mem_file(bytes)).unwrap();
    let result = fs
        .open("/z", OpenMode::read_binary())
        .and_then(|mut file| file.get_contents());
    assert!(result.is_err());
}

#[test]
fn test_zip_entry_count_and_truncation() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"a").build();
    let len = bytes.len();
    // total_entries exceeds what the central directory holds
    patch(&mut bytes, len - 12, &500u16.to_le_bytes());
    assert!(ZipFileSystem::from_file("many.zip", mem_file(bytes)).is_err());

    let bytes = ZipBuilder::new().stored("a.txt", b"a").build();
    for cut in [10, 23, bytes.len() / 2] {
        assert!(ZipFileSystem::from_file("cut.zip", mem_file(bytes[..cut].to_vec())).is_err());
    }
}

#[test]
fn test_zip_local_header_damage() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"abc").build();
    patch(&mut bytes, 0, b"JUNK");
    let fs = ZipFileSystem::from_file("lfh.zip", mem_file(bytes)).unwrap();
    assert!(fs.exists("/a.txt"));
    assert!(matches!(
        fs.open("/a.txt", OpenMode::read_binary()),
        Err(VfsError::InvalidMagic(_))
    ));
}
