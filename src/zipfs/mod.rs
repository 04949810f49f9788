mod file;
mod filesystem;
mod format;

pub use file::ZipFile;
pub use filesystem::ZipFileSystem;
pub use format::{
    local_data_offset, CentralEntry, EndRecord, HostSystem, CDFH_SIGNATURE, CDFH_SIZE,
    EOCD_SCAN_WINDOW, EOCD_SIGNATURE, EOCD_SIZE, FLAG_ENCRYPTED, LFH_SIGNATURE, LFH_SIZE,
    MAX_ZIP_ENTRIES, METHOD_DEFLATE, METHOD_STORED,
};
