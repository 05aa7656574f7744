//! 身份：工作量证明密钥对
//!
//! 随机生成 Curve25519 密钥对，直到公钥前三个字节为零（约 1/16M 的概率）。
//! 剩下的 29 个字节就是到处使用的“公钥”；32 字节私钥原样保留。

use crate::encoding::{self, PK_SECTION, PUB_START, SEC_START, SK_SECTION};
use crate::error::KeyError;
use crypto_box::{PublicKey, SecretKey};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::debug;

pub const PK_SIZE: usize = 29;
pub const SK_SIZE: usize = 32;
pub const ADDRESS_LEN: usize = 16;

/// 公钥前缀中必须为零的字节数
const POW_BYTES: usize = SK_SIZE - PK_SIZE;

/// 去掉零前缀的公钥
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PK(pub [u8; PK_SIZE]);

/// 私钥
#[derive(Clone, PartialEq, Eq)]
pub struct SK(pub [u8; SK_SIZE]);

/// 对端地址；内容由传输层决定
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// 首字节为 `n`、其余为零的占位地址
    pub fn numbered(n: u8) -> Self {
        let mut a = [0u8; ADDRESS_LEN];
        a[0] = n;
        Address(a)
    }
}

impl PK {
    /// 补回零前缀的完整 Curve25519 公钥
    pub fn full(&self) -> PublicKey {
        let mut full = [0u8; SK_SIZE];
        full[POW_BYTES..].copy_from_slice(&self.0);
        PublicKey::from(full)
    }

    pub fn encode_no_prefix(&self) -> String {
        encoding::encode(&self.0, PK_SECTION)
    }

    pub fn encode(&self) -> String {
        format!("{PUB_START}{}", self.encode_no_prefix())
    }

    pub fn decode(key: &str) -> Result<PK, KeyError> {
        encoding::decode_prefixed(key, PUB_START, PK_SECTION).map(PK)
    }

    pub fn decode_no_prefix(key: &str) -> Result<PK, KeyError> {
        encoding::decode(key, PK_SECTION).map(PK)
    }

    /// 日志中用来区分节点的两个字符
    pub fn log_id(&self) -> String {
        self.encode_no_prefix()[..2].to_string()
    }
}

impl fmt::Debug for PK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PK({})", self.encode())
    }
}

impl fmt::Display for PK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl SK {
    pub fn secret(&self) -> SecretKey {
        SecretKey::from(self.0)
    }

    pub fn encode(&self) -> String {
        format!("{SEC_START}{}", encoding::encode(&self.0, SK_SECTION))
    }

    pub fn decode(key: &str) -> Result<SK, KeyError> {
        encoding::decode_prefixed(key, SEC_START, SK_SECTION).map(SK)
    }
}

impl fmt::Debug for SK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SK(..)")
    }
}

/// 工作量证明密钥对
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keypair {
    pub pk: PK,
    pub sk: SK,
}

/// 完整公钥满足零前缀时返回截短后的公钥
fn pow_public_key(sk: &[u8; SK_SIZE]) -> Option<PK> {
    let full = SecretKey::from(*sk).public_key();
    let bytes = full.as_bytes();
    if bytes[..POW_BYTES].iter().any(|&b| b != 0) {
        return None;
    }
    let mut pk = [0u8; PK_SIZE];
    pk.copy_from_slice(&bytes[POW_BYTES..]);
    Some(PK(pk))
}

/// 多线程搜索一个私钥，使其公钥的前 `zero_bytes` 个字节为零
fn search(threads: usize, zero_bytes: usize) -> [u8; SK_SIZE] {
    let stop = Arc::new(AtomicBool::new(false));
    let (found_tx, found_rx) = mpsc::channel();

    let workers: Vec<_> = (0..threads.max(1))
        .map(|_| {
            let stop = stop.clone();
            let found_tx = found_tx.clone();
            thread::spawn(move || {
                let mut rng = StdRng::from_entropy();
                let mut sk = [0u8; SK_SIZE];
                while !stop.load(Ordering::Relaxed) {
                    rng.fill_bytes(&mut sk);
                    let full = SecretKey::from(sk).public_key();
                    if full.as_bytes()[..zero_bytes].iter().all(|&b| b == 0) {
                        let _ = found_tx.send(sk);
                        return;
                    }
                }
            })
        })
        .collect();
    drop(found_tx);

    // 每个线程只在找到时退出，至少会收到一个
    let mut sk = [0u8; SK_SIZE];
    if let Ok(found) = found_rx.recv() {
        sk = found;
    }
    stop.store(true, Ordering::Relaxed);
    for worker in workers {
        let _ = worker.join();
    }
    sk
}

impl Keypair {
    /// 用 `threads` 个线程搜索一个密钥对，第一个找到的获胜
    pub fn generate(threads: usize) -> Keypair {
        loop {
            let sk = search(threads, POW_BYTES);
            if let Some(pk) = pow_public_key(&sk) {
                debug!(target: "coputer::net", pk = %pk, threads, "generated keypair");
                return Keypair { pk, sk: SK(sk) };
            }
        }
    }

    /// 由私钥推导；公钥没有零前缀时失败
    pub fn from_secret(sk: SK) -> Result<Keypair, KeyError> {
        let pk = pow_public_key(&sk.0).ok_or(KeyError::MissingPrefix)?;
        Ok(Keypair { pk, sk })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "cosec:0aqouiilz3-ynmmxunwx1-7u6e5xppqa-hmz7q8yd3f-5l92e17yos";

    #[test]
    fn test_sample_secret_is_pow() {
        let sk = SK::decode(SAMPLE).unwrap();
        assert_eq!(sk.encode(), SAMPLE);

        let kp = Keypair::from_secret(sk).unwrap();
        let full = kp.pk.full();
        assert_eq!(&full.as_bytes()[..3], &[0, 0, 0]);
        assert_eq!(PK::decode(&kp.pk.encode()).unwrap(), kp.pk);
        assert_eq!(kp.pk.encode().len(), 55);
    }

    #[test]
    fn test_non_pow_secret_is_rejected() {
        // 全 1 的私钥几乎不可能满足前缀
        assert_eq!(
            Keypair::from_secret(SK([1; 32])).unwrap_err(),
            KeyError::MissingPrefix
        );
    }

    #[test]
    fn test_search_finds_prefix() {
        // 一个零字节只需约 256 次尝试
        let sk = search(2, 1);
        assert_eq!(SecretKey::from(sk).public_key().as_bytes()[0], 0);
    }

    #[test]
    fn test_log_id() {
        let kp = Keypair::from_secret(SK::decode(SAMPLE).unwrap()).unwrap();
        assert_eq!(kp.pk.log_id(), kp.pk.encode_no_prefix()[..2]);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", SK([9; 32])), "SK(..)");
    }
}
