mod file;
mod filesystem;

pub use file::SysFile;
pub use filesystem::SysFileSystem;
