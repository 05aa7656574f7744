//! 虚拟文件系统
//!
//! 程序存储只通过 `VirtualFileSystem` 访问磁盘，测试可以换成内存实现。

mod memory;
mod native;

pub use memory::MemoryFileSystem;
pub use native::NativeFileSystem;

use crate::error::VfsResult;
use std::path::Path;

/// Virtual File System trait
///
/// # Implementations
/// - `MemoryFileSystem`: In-memory file system
/// - `NativeFileSystem`: Native OS file system
pub trait VirtualFileSystem: Send + Sync {
    /// Read file contents
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>>;

    /// Write file contents
    ///
    /// Creates the file and any missing parent directories; truncates an
    /// existing file.
    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()>;

    /// Check if path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Names of the direct children of a directory, sorted
    ///
    /// A missing directory lists as empty.
    fn list_dir(&self, path: &Path) -> VfsResult<Vec<String>>;
}
