//! 存储层错误类型

use thiserror::Error;

/// VFS 操作结果
pub type VfsResult<T> = Result<T, VfsError>;

/// 存储操作结果
pub type StoreResult<T> = Result<T, StoreError>;

/// 文件系统错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VfsError {
    #[error("path not found: {path}")]
    NotFound { path: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("io error: {message}")]
    Io { message: String },

    #[error("{message}")]
    Custom { message: String },
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        VfsError::Io {
            message: err.to_string(),
        }
    }
}

/// 打包与解包错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BundleError {
    #[error("bad bundle: 0 length")]
    Empty,

    #[error("bad bundle: invalid file length")]
    BadLength,

    #[error("bad bundle: file length exceeds bundle length")]
    Truncated,

    #[error("bad bundle: {0}")]
    Gzip(String),

    #[error("entrypoint (init.luau) not found")]
    MissingEntrypoint,

    #[error("bad bundle: unsafe file path '{0}'")]
    UnsafePath(String),

    #[error("error reading {path}: {message}")]
    Read { path: String, message: String },
}

/// 程序存储错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("invalid program name '{0}'")]
    InvalidName(String),

    #[error("corrupt name index entry for '{0}'")]
    CorruptIndex(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_messages() {
        assert_eq!(BundleError::Empty.to_string(), "bad bundle: 0 length");
        assert_eq!(
            BundleError::Truncated.to_string(),
            "bad bundle: file length exceeds bundle length"
        );
        assert_eq!(
            BundleError::MissingEntrypoint.to_string(),
            "entrypoint (init.luau) not found"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: StoreError = BundleError::Empty.into();
        assert_eq!(err.to_string(), "bad bundle: 0 length");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        assert_eq!(VfsError::from(io).to_string(), "io error: disk on fire");
    }
}
