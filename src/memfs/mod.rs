mod file;
mod filesystem;

pub use file::MemFile;
pub use filesystem::MemFileSystem;
