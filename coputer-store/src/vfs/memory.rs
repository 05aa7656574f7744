//! In-memory file system implementation

use super::VirtualFileSystem;
use crate::error::{VfsError, VfsResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// An in-memory file system implementation.
///
/// Files live in a `BTreeMap` keyed by normalised path. Directories are
/// implicit: a path is a directory when some file lives beneath it.
///
/// # Example
/// ```
/// use coputer_store::{MemoryFileSystem, VirtualFileSystem};
/// use std::path::Path;
///
/// let fs = MemoryFileSystem::new();
/// fs.write_file(Path::new("/programs/ab/init.luau"), b"return 1").unwrap();
/// assert!(fs.is_dir(Path::new("/programs/ab")));
/// assert_eq!(fs.list_dir(Path::new("/programs")).unwrap(), vec!["ab"]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryFileSystem {
    /// Create a new empty memory file system.
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Create a new memory file system pre-populated with files.
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let map = files
            .into_iter()
            .map(|(path, content)| (normalize_str(path.as_ref()), content))
            .collect();
        Self {
            files: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_lock(&self) -> VfsResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files.read().map_err(|_| VfsError::Custom {
            message: String::from("lock poisoned"),
        })
    }
}

/// 统一分隔符，去掉末尾的 `/`
fn normalize_str(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.trim_end_matches('/') {
        "" if path.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn normalize(path: &Path) -> String {
    normalize_str(&path.to_string_lossy())
}

fn dir_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let normalized = normalize(path);
        let files = self.read_lock()?;
        files
            .get(&normalized)
            .cloned()
            .ok_or(VfsError::NotFound { path: normalized })
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        let normalized = normalize(path);
        let mut files = self.files.write().map_err(|_| VfsError::Custom {
            message: String::from("lock poisoned"),
        })?;

        // 不能把文件写在已有文件的“下面”，也不能覆盖一个目录
        let prefix = dir_prefix(&normalized);
        if files.keys().any(|k| k.starts_with(&prefix)) {
            return Err(VfsError::InvalidPath {
                path: normalized,
                reason: "is a directory".to_string(),
            });
        }
        let mut parent = Path::new(&normalized).parent();
        while let Some(p) = parent {
            if files.contains_key(&normalize(p)) {
                return Err(VfsError::InvalidPath {
                    path: normalized,
                    reason: "parent is a file".to_string(),
                });
            }
            parent = p.parent();
        }

        files.insert(normalized, content.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let normalized = normalize(path);
        match self.files.read() {
            Ok(files) => files.contains_key(&normalized),
            Err(_) => false,
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        let prefix = dir_prefix(&normalize(path));
        match self.files.read() {
            Ok(files) => files.keys().any(|k| k.starts_with(&prefix)),
            Err(_) => false,
        }
    }

    fn list_dir(&self, path: &Path) -> VfsResult<Vec<String>> {
        let prefix = dir_prefix(&normalize(path));
        let files = self.read_lock()?;

        let names: BTreeSet<String> = files
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k[prefix.len()..].split('/').next().map(str::to_string))
            .collect();
        Ok(names.into_iter().collect())
    }
}
