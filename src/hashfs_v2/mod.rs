mod file;
mod filesystem;
mod format;

pub use file::HashFileV2;
pub use filesystem::HashFsV2;
pub use format::{
    inflate_table, parse_directory_listing, write_directory_listing, EntryV2, HeaderV2, Platform,
    ENTRY_FLAG_DIRECTORY, ENTRY_SIZE, HASHFS_V2_VERSION, HEADER_SIZE, MAX_DEFLATE_RATIO,
    METADATA_WORD_SIZE,
};
