//! 对端与查找串
//!
//! 查找串 `cofind:<公钥（不含前缀）>.<url 安全 base64 的地址签名>`
//! 可以经由不可信渠道传递：签名证明地址由私钥持有者发布。

use crate::crypto::{self, Opened};
use crate::error::{CryptoError, FindError};
use crate::keys::{Address, Keypair, PK, ADDRESS_LEN};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::time::Instant;

pub const FIND_START: &str = "cofind:";

/// 前缀加不含前缀的公钥长度
const FIND_DOT: usize = 7 + 49;

/// 已知的对端
#[derive(Debug, Clone)]
pub struct Peer {
    pub pk: PK,
    pub main_addr: Address,
    pub alt_addrs: Vec<Address>,
    /// 最后一次成功解码其消息的时间
    pub last_seen: Option<Instant>,
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.pk == other.pk && self.main_addr == other.main_addr && self.alt_addrs == other.alt_addrs
    }
}

impl Eq for Peer {}

impl Peer {
    pub fn new(pk: PK, main_addr: Address, alt_addrs: Vec<Address>) -> Self {
        Self {
            pk,
            main_addr,
            alt_addrs,
            last_seen: None,
        }
    }

    /// 主地址在前
    pub fn addresses(&self) -> Vec<Address> {
        let mut all = Vec::with_capacity(1 + self.alt_addrs.len());
        all.push(self.main_addr);
        all.extend_from_slice(&self.alt_addrs);
        all
    }

    /// 由解开的帧得到发送方
    pub fn from_opened(opened: &Opened) -> Option<Peer> {
        let (main, alts) = opened.addresses.split_first()?;
        Some(Peer::new(opened.from, *main, alts.to_vec()))
    }

    pub fn from_find_string(find: &str) -> Result<Peer, FindError> {
        let rest = find.strip_prefix(FIND_START).ok_or(FindError::Invalid)?;
        if find.len() <= FIND_DOT || find.as_bytes()[FIND_DOT] != b'.' {
            return Err(FindError::Invalid);
        }
        let (pk, encoded) = rest.split_at(FIND_DOT - FIND_START.len());
        let pk = PK::decode_no_prefix(pk)?;

        let signed = URL_SAFE_NO_PAD
            .decode(&encoded[1..])
            .map_err(|e| FindError::Encoding(e.to_string()))?;
        let addrs = crypto::verify(&pk, &signed).ok_or(FindError::Signature)?;
        if addrs.is_empty() || addrs.len() % ADDRESS_LEN != 0 {
            return Err(FindError::AddressLength);
        }

        let mut addresses = addrs.chunks_exact(ADDRESS_LEN).map(|c| {
            let mut a = [0u8; ADDRESS_LEN];
            a.copy_from_slice(c);
            Address(a)
        });
        let main = addresses.next().ok_or(FindError::AddressLength)?;
        Ok(Peer::new(pk, main, addresses.collect()))
    }
}

/// 本节点：密钥对与自己的地址
#[derive(Debug, Clone)]
pub struct Identity {
    pub keypair: Keypair,
    pub main_addr: Address,
    pub alt_addrs: Vec<Address>,
}

impl Identity {
    pub fn new(keypair: Keypair, main_addr: Address, alt_addrs: Vec<Address>) -> Self {
        Self {
            keypair,
            main_addr,
            alt_addrs,
        }
    }

    pub fn pk(&self) -> PK {
        self.keypair.pk
    }

    /// 别人眼中的本节点
    pub fn peer(&self) -> Peer {
        Peer::new(self.keypair.pk, self.main_addr, self.alt_addrs.clone())
    }

    pub fn encrypt(&self, msg: &[u8], to: &PK) -> Result<Vec<u8>, CryptoError> {
        crypto::encrypt(&self.keypair, &self.peer().addresses(), msg, to)
    }

    pub fn decrypt(&self, frame: &[u8]) -> Result<Opened, CryptoError> {
        crypto::decrypt(&self.keypair, frame)
    }

    pub fn find_string(&self) -> Result<String, CryptoError> {
        let addrs: Vec<u8> = self.peer().addresses().iter().flat_map(|a| a.0).collect();
        let signed = crypto::sign(&self.keypair.sk, &addrs)?;
        Ok(format!(
            "{FIND_START}{}.{}",
            self.keypair.pk.encode_no_prefix(),
            URL_SAFE_NO_PAD.encode(signed)
        ))
    }
}
