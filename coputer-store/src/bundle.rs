//! 程序包编解码
//!
//! 程序包是一串 `(uvarint 长度, gzip 数据)` 条目。gzip 头部保存原始文件名，
//! 但固定的 10 字节前缀在写入时去掉、读取时补回。第一个条目必须是 `init.luau`。

use crate::error::BundleError;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use sha3::{Digest, Sha3_256};
use std::io::{Read, Write};
use std::path::{Component, Path};
use tracing::debug;
use walkdir::WalkDir;

pub const ENTRYPOINT: &str = "init";
pub const ENTRYPOINT_FILENAME: &str = "init.luau";

const GZ_HEADER_LEN: usize = 10;

/// FNAME 标志、零修改时间、最高压缩、未知操作系统
const GZ_HEADER: [u8; GZ_HEADER_LEN] = [0x1f, 0x8b, 0x08, 0x08, 0x00, 0x00, 0x00, 0x00, 0x02, 0xff];

/// 程序包中的一个文件，路径使用 `/` 分隔
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub path: String,
    pub data: Vec<u8>,
}

impl BundleFile {
    pub fn new(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }
}

// ===== 压缩 =====

fn gzip_error(e: std::io::Error) -> BundleError {
    BundleError::Gzip(e.to_string())
}

fn compress(file: &BundleFile) -> Result<Vec<u8>, BundleError> {
    if file.path.contains('\0') {
        return Err(BundleError::UnsafePath(file.path.clone()));
    }

    let mut encoder = GzBuilder::new()
        .filename(file.path.as_bytes())
        .mtime(0)
        .operating_system(0xff)
        .write(Vec::with_capacity(file.data.len() / 2), Compression::best());
    encoder.write_all(&file.data).map_err(gzip_error)?;
    let mut out = encoder.finish().map_err(gzip_error)?;

    out.drain(..GZ_HEADER_LEN);
    Ok(out)
}

fn decompress(compressed: &[u8]) -> Result<BundleFile, BundleError> {
    let mut framed = Vec::with_capacity(GZ_HEADER_LEN + compressed.len());
    framed.extend_from_slice(&GZ_HEADER);
    framed.extend_from_slice(compressed);

    let mut decoder = GzDecoder::new(&framed[..]);
    let mut data = Vec::with_capacity(compressed.len() * 2);
    decoder.read_to_end(&mut data).map_err(gzip_error)?;

    let path = decoder
        .header()
        .and_then(|h| h.filename())
        .map(|name| String::from_utf8_lossy(name).to_string())
        .ok_or_else(|| BundleError::Gzip("missing file name".to_string()))?;
    check_path(&path)?;

    Ok(BundleFile { path, data })
}

/// 解包后的路径会拼到程序目录下，拒绝绝对路径与 `..`
fn check_path(path: &str) -> Result<(), BundleError> {
    let safe = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(BundleError::UnsafePath(path.to_string()))
    }
}

// ===== 变长整数 =====

fn put_uvarint(out: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        out.push((n as u8) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

/// 返回值与读取的字节数
fn read_uvarint(b: &[u8]) -> Option<(u64, usize)> {
    let mut n = 0u64;
    for (i, &byte) in b.iter().enumerate().take(10) {
        if i == 9 && byte > 1 {
            return None;
        }
        n |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            return Some((n, i + 1));
        }
    }
    None
}

// ===== 打包 =====

/// 把若干文件打成一个包，`init.luau` 排在最前面
pub fn bundle_files(files: Vec<BundleFile>) -> Result<Vec<u8>, BundleError> {
    let mut ordered = Vec::with_capacity(files.len());
    let mut entry = None;
    for file in files {
        check_path(&file.path)?;
        if file.path == ENTRYPOINT_FILENAME && entry.is_none() {
            entry = Some(file);
        } else {
            ordered.push(file);
        }
    }
    let entry = entry.ok_or(BundleError::MissingEntrypoint)?;
    ordered.insert(0, entry);

    let mut out = Vec::new();
    for file in &ordered {
        let compressed = compress(file)?;
        put_uvarint(&mut out, compressed.len() as u64);
        out.extend_from_slice(&compressed);
    }
    Ok(out)
}

/// 打包一个目录；路径相对于该目录，按文件名排序遍历
pub fn bundle_dir(dir: impl AsRef<Path>) -> Result<Vec<u8>, BundleError> {
    let dir = dir.as_ref();
    let read_error = |path: &Path, message: String| BundleError::Read {
        path: path.display().to_string(),
        message,
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| read_error(dir, e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| read_error(entry.path(), e.to_string()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = std::fs::read(entry.path()).map_err(|e| read_error(entry.path(), e.to_string()))?;
        files.push(BundleFile { path, data });
    }

    debug!(target: "coputer::store", dir = %dir.display(), files = files.len(), "bundling directory");
    bundle_files(files)
}

// ===== 解包 =====

/// 解开一个程序包，保持条目顺序
pub fn unbundle(b: &[u8]) -> Result<Vec<BundleFile>, BundleError> {
    if b.is_empty() {
        return Err(BundleError::Empty);
    }

    let mut files = Vec::new();
    let mut i = 0;
    while i < b.len() {
        let (len, n) = read_uvarint(&b[i..]).ok_or(BundleError::BadLength)?;
        i += n;

        let end = usize::try_from(len)
            .ok()
            .and_then(|len| i.checked_add(len))
            .filter(|&end| end <= b.len())
            .ok_or(BundleError::Truncated)?;
        files.push(decompress(&b[i..end])?);
        i = end;
    }

    if files.first().map(|f| f.path.as_str()) != Some(ENTRYPOINT_FILENAME) {
        return Err(BundleError::MissingEntrypoint);
    }
    Ok(files)
}

/// 程序包的内容地址
pub fn bundle_hash(b: &[u8]) -> [u8; 32] {
    Sha3_256::digest(b).into()
}
