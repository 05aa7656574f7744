//! Coputer Store - Program bundles and content-addressed storage
//!
//! A program is uploaded as a bundle: a sequence of gzip-compressed files
//! whose first entry is `init.luau`. Bundles are stored by the SHA3-256 of
//! their bytes, and a per-owner name index maps human-readable names to hashes.
//!
//! # Usage
//! ```rust,ignore
//! use coputer_store::{ProgramStore, MemoryFileSystem, bundle_files, BundleFile};
//!
//! let store = ProgramStore::with_fs(MemoryFileSystem::new(), Default::default());
//! let bundle = bundle_files(vec![BundleFile::new("init.luau", b"return 1".to_vec())])?;
//! let (hash, _) = store.store("owner", "hello", &bundle)?;
//! assert_eq!(store.lookup("owner", "hello")?, Some(hash));
//! ```

pub mod bundle;
mod error;
pub mod store;
pub mod vfs;

pub use bundle::{
    bundle_dir, bundle_files, bundle_hash, unbundle, BundleFile, ENTRYPOINT, ENTRYPOINT_FILENAME,
};
pub use error::{BundleError, StoreError, StoreResult, VfsError, VfsResult};
pub use store::{ProgramStore, StoreOutcome};
pub use vfs::{MemoryFileSystem, NativeFileSystem, VirtualFileSystem};

// Re-export config types from coputer-config
pub use coputer_config::StoreConfig;

/// Create a new memory-based file system.
pub fn memory_fs() -> MemoryFileSystem {
    MemoryFileSystem::new()
}

/// Create a new native file system.
pub fn native_fs() -> NativeFileSystem {
    NativeFileSystem::new()
}
