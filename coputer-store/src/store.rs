//! 内容寻址的程序存储
//!
//! 布局：
//! - `<programs_dir>/<hex sha3-256>/init.luau` 及其余文件
//! - `<names_dir>/<owner>/<name>`，内容为 32 字节哈希
//!
//! `owner` 是去掉前缀的编码公钥，由调用方提供；存储层不解析密钥。

use crate::bundle::{bundle_hash, unbundle, BundleFile, ENTRYPOINT_FILENAME};
use crate::error::{StoreError, StoreResult, VfsError};
use crate::vfs::{NativeFileSystem, VirtualFileSystem};
use coputer_config::StoreConfig;
use std::path::PathBuf;
use tracing::{debug, info};

/// 名称最长 255 字节（线上用一个字节表示长度）
pub const MAX_NAME_LEN: usize = 255;

/// 存储结果，对应执行服务器的 201 与 409
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Created,
    AlreadyExists,
}

impl StoreOutcome {
    pub fn status_code(self) -> u16 {
        match self {
            StoreOutcome::Created => 201,
            StoreOutcome::AlreadyExists => 409,
        }
    }
}

/// 程序存储
#[derive(Debug, Clone)]
pub struct ProgramStore<F: VirtualFileSystem = NativeFileSystem> {
    fs: F,
    config: StoreConfig,
}

impl ProgramStore<NativeFileSystem> {
    /// 使用本机文件系统
    pub fn open(config: StoreConfig) -> Self {
        Self::with_fs(NativeFileSystem::new(), config)
    }
}

fn check_segment(segment: &str) -> StoreResult<()> {
    let bad = segment.is_empty()
        || segment.len() > MAX_NAME_LEN
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if bad {
        Err(StoreError::InvalidName(segment.to_string()))
    } else {
        Ok(())
    }
}

impl<F: VirtualFileSystem> ProgramStore<F> {
    pub fn with_fs(fs: F, config: StoreConfig) -> Self {
        Self { fs, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn program_dir(&self, hash: &[u8; 32]) -> PathBuf {
        self.config.programs_dir.join(hex::encode(hash))
    }

    /// 程序入口文件
    pub fn entry_path(&self, hash: &[u8; 32]) -> PathBuf {
        self.program_dir(hash).join(ENTRYPOINT_FILENAME)
    }

    fn index_path(&self, owner: &str, name: &str) -> PathBuf {
        self.config.names_dir.join(owner).join(name)
    }

    /// 登记名称并落盘程序包
    ///
    /// 程序包先于索引写入，索引项永远指向完整的程序。
    /// 同名同包返回 `AlreadyExists`；新名称或更新后的包返回 `Created`。
    pub fn store(&self, owner: &str, name: &str, bundle: &[u8]) -> StoreResult<([u8; 32], StoreOutcome)> {
        check_segment(owner)?;
        check_segment(name)?;

        let hash = self.materialise(bundle)?;
        let outcome = match self.lookup(owner, name)? {
            Some(previous) if previous == hash => StoreOutcome::AlreadyExists,
            _ => {
                self.fs.write_file(&self.index_path(owner, name), &hash)?;
                StoreOutcome::Created
            }
        };

        info!(target: "coputer::store", owner, name, hash = %hex::encode(hash), ?outcome, "stored program");
        Ok((hash, outcome))
    }

    /// 把程序包展开到 `<programs_dir>/<hash>/`，已存在则跳过
    pub fn materialise(&self, bundle: &[u8]) -> StoreResult<[u8; 32]> {
        let hash = bundle_hash(bundle);
        if self.fs.is_file(&self.entry_path(&hash)) {
            debug!(target: "coputer::store", hash = %hex::encode(hash), "bundle already materialised");
            return Ok(hash);
        }

        let files = unbundle(bundle)?;
        self.write_files(&hash, &files)?;
        debug!(target: "coputer::store", hash = %hex::encode(hash), files = files.len(), "materialised bundle");
        Ok(hash)
    }

    fn write_files(&self, hash: &[u8; 32], files: &[BundleFile]) -> StoreResult<()> {
        let dir = self.program_dir(hash);
        // 入口最后写，它的存在标志着展开完成
        for file in files.iter().rev() {
            self.fs.write_file(&dir.join(&file.path), &file.data)?;
        }
        Ok(())
    }

    /// 名称对应的程序哈希
    pub fn lookup(&self, owner: &str, name: &str) -> StoreResult<Option<[u8; 32]>> {
        check_segment(owner)?;
        check_segment(name)?;

        match self.fs.read_file(&self.index_path(owner, name)) {
            Ok(bytes) => {
                let hash: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| StoreError::CorruptIndex(name.to_string()))?;
                Ok(Some(hash))
            }
            Err(VfsError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 某个所有者的全部程序名，按名称排序
    pub fn names(&self, owner: &str) -> StoreResult<Vec<String>> {
        check_segment(owner)?;
        Ok(self.fs.list_dir(&self.config.names_dir.join(owner))?)
    }

    /// 十六进制哈希对应的程序是否已展开
    pub fn bundle_stored(&self, hexhash: &str) -> bool {
        check_segment(hexhash).is_ok()
            && self
                .fs
                .is_file(&self.config.programs_dir.join(hexhash).join(ENTRYPOINT_FILENAME))
    }

    /// 读取已展开程序中的一个文件
    pub fn read_program_file(&self, hash: &[u8; 32], path: &str) -> StoreResult<Vec<u8>> {
        Ok(self.fs.read_file(&self.program_dir(hash).join(path))?)
    }
}
