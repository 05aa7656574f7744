//! Native file system implementation

use super::VirtualFileSystem;
use crate::error::{VfsError, VfsResult};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// 目录与文件的创建权限
const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// A native OS file system implementation.
///
/// Wraps `std::fs`. With a base directory, relative paths are resolved
/// against it; absolute paths are used as given.
#[derive(Debug, Clone, Default)]
pub struct NativeFileSystem {
    base: Option<PathBuf>,
}

impl NativeFileSystem {
    /// Create a new native file system.
    pub fn new() -> Self {
        Self { base: None }
    }

    /// Create a native file system rooted at `base`.
    pub fn with_base(base: impl AsRef<Path>) -> Self {
        Self {
            base: Some(base.as_ref().to_path_buf()),
        }
    }

    pub fn base(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    /// 把路径解析到基准目录下
    pub fn resolve<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match &self.base {
            Some(base) if path.is_relative() => Cow::Owned(base.join(path)),
            _ => Cow::Borrowed(path),
        }
    }
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> VfsError {
    if e.kind() == std::io::ErrorKind::NotFound {
        VfsError::NotFound {
            path: path.to_string_lossy().to_string(),
        }
    } else {
        e.into()
    }
}

fn create_dirs(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)
}

fn create_file(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    options.open(path)
}

impl VirtualFileSystem for NativeFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let path = self.resolve(path);
        fs::read(&path).map_err(|e| not_found_or_io(&path, e))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dirs(parent)?;
        }
        let mut file = create_file(&path)?;
        file.write_all(content)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn list_dir(&self, path: &Path) -> VfsResult<Vec<String>> {
        let path = self.resolve(path);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}
