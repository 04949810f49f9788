#![no_main]

use layered_vfs::{FileSystem, HashFileSystem, HashFsV2, MemFile, OpenMode, ZipFileSystem};
use libfuzzer_sys::fuzz_target;

fn exercise(fs: &dyn FileSystem) {
    let Ok(listing) = fs.read_dir("/", true, true) else {
        return;
    };

    for entry in listing.iter().take(64) {
        let _ = fs.mstat(&entry.path);
        if entry.is_directory {
            continue;
        }
        if let Ok(mut file) = fs.open(&entry.path, OpenMode::read_binary()) {
            let _ = file.get_contents();
        }
    }

    let _ = fs.exists("");
    let _ = fs.exists("/../../etc/passwd");
    let _ = fs.dir_exists("/");
}

fuzz_target!(|data: &[u8]| {
    // Every backend sees the same bytes; none of them may panic
    let source = || Box::new(MemFile::from_bytes("fuzz", data.to_vec()));

    if let Ok(fs) = HashFileSystem::from_file("fuzz.scs", source()) {
        exercise(&fs);
    }
    if let Ok(fs) = HashFsV2::from_file("fuzz.scs", source()) {
        exercise(&fs);
    }
    if let Ok(fs) = ZipFileSystem::from_file("fuzz.zip", source()) {
        exercise(&fs);
    }
});
