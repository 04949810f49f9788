mod file;
mod filesystem;
mod format;

pub use file::HashFile;
pub use filesystem::HashFileSystem;
pub use format::{
    peek_signature, EntryRecord, Header, ENTRY_SIZE, FLAG_COMPRESSED, FLAG_DIRECTORY,
    FLAG_ENCRYPTED, FLAG_VERIFY, HASHFS_V1_VERSION, HASH_METHOD_CITY, HEADER_SIZE, MAX_ENTRIES,
    SCS_MAGIC,
};
