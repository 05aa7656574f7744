//! 加密帧与签名
//!
//! 帧布局：
//! 1. 匿名密封块（48 字节开销）：发送方公钥 29 字节 + 备用地址数 1 字节
//! 2. 地址块（16 字节开销）：主地址，随后是备用地址
//! 3. 若干数据块，每块最多 65519 字节明文，加 16 字节认证标签
//!
//! 所有块都使用零 nonce。每个请求都以内容寻址且幂等，确定性比 nonce 唯一更重要。

use crate::error::CryptoError;
use crate::keys::{Address, Keypair, PK, PK_SIZE, SK, ADDRESS_LEN};
use crypto_box::aead::{Aead, Nonce};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

/// 认证加密的开销
pub const OVERHEAD: usize = 16;
/// 匿名密封的开销（临时公钥 + 标签）
pub const SEAL_OVERHEAD: usize = 48;

const KEY_PLAIN: usize = PK_SIZE + 1;
pub const KEY_BLOCK: usize = KEY_PLAIN + SEAL_OVERHEAD;
pub const CHUNK_ENC: usize = (1 << 16) - 1;
pub const CHUNK_SIZE: usize = CHUNK_ENC - OVERHEAD;

/// 人人都知道的临时密钥对，用于“签名”
static ZERO_SK: Lazy<SecretKey> = Lazy::new(|| SecretKey::from([0u8; 32]));
static ZERO_PK: Lazy<PublicKey> = Lazy::new(|| ZERO_SK.public_key());

fn zero_nonce() -> Nonce<SalsaBox> {
    Nonce::<SalsaBox>::default()
}

/// 解密后的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub from: PK,
    /// 第一个是主地址
    pub addresses: Vec<Address>,
    pub message: Vec<u8>,
}

/// 加密发给 `to` 的消息；`addresses` 的第一个是主地址
pub fn encrypt(from: &Keypair, addresses: &[Address], msg: &[u8], to: &PK) -> Result<Vec<u8>, CryptoError> {
    if addresses.is_empty() {
        return Err(CryptoError::NoAddress);
    }
    let alt_count = u8::try_from(addresses.len() - 1).map_err(|_| CryptoError::TooManyAddresses)?;

    let recipient = to.full();
    let sbox = SalsaBox::new(&recipient, &from.sk.secret());
    let nonce = zero_nonce();

    let chunk_count = msg.len().div_ceil(CHUNK_SIZE);
    let mut out = Vec::with_capacity(
        KEY_BLOCK + addresses.len() * ADDRESS_LEN + OVERHEAD + msg.len() + chunk_count * OVERHEAD,
    );

    let mut key = [0u8; KEY_PLAIN];
    key[..PK_SIZE].copy_from_slice(&from.pk.0);
    key[PK_SIZE] = alt_count;
    let sealed = recipient
        .seal(&mut OsRng, &key)
        .map_err(|_| CryptoError::Encryption)?;
    out.extend_from_slice(&sealed);

    let plain_addrs: Vec<u8> = addresses.iter().flat_map(|a| a.0).collect();
    let sealed = sbox
        .encrypt(&nonce, plain_addrs.as_slice())
        .map_err(|_| CryptoError::Encryption)?;
    out.extend_from_slice(&sealed);

    for chunk in msg.chunks(CHUNK_SIZE) {
        let sealed = sbox.encrypt(&nonce, chunk).map_err(|_| CryptoError::Encryption)?;
        out.extend_from_slice(&sealed);
    }
    Ok(out)
}

/// 用接收方密钥对解开一帧
pub fn decrypt(kp: &Keypair, frame: &[u8]) -> Result<Opened, CryptoError> {
    if frame.len() < KEY_BLOCK + ADDRESS_LEN + OVERHEAD {
        return Err(CryptoError::TooShort(frame.len()));
    }

    let secret = kp.sk.secret();
    let (key_block, rest) = frame.split_at(KEY_BLOCK);
    let key = secret.unseal(key_block).map_err(|_| CryptoError::KeyDecryption)?;
    if key.len() != KEY_PLAIN {
        return Err(CryptoError::KeyDecryption);
    }
    let mut from = [0u8; PK_SIZE];
    from.copy_from_slice(&key[..PK_SIZE]);
    let from = PK(from);
    let address_count = usize::from(key[PK_SIZE]) + 1;

    let sbox = SalsaBox::new(&from.full(), &secret);
    let nonce = zero_nonce();

    let addrs_len = address_count * ADDRESS_LEN + OVERHEAD;
    if rest.len() < addrs_len {
        return Err(CryptoError::AddressDecryption);
    }
    let (addr_block, mut rest) = rest.split_at(addrs_len);
    let plain = sbox
        .decrypt(&nonce, addr_block)
        .map_err(|_| CryptoError::AddressDecryption)?;
    let addresses = plain
        .chunks_exact(ADDRESS_LEN)
        .map(|c| {
            let mut a = [0u8; ADDRESS_LEN];
            a.copy_from_slice(c);
            Address(a)
        })
        .collect();

    let mut message = Vec::with_capacity(rest.len());
    while !rest.is_empty() {
        let (chunk, next) = rest.split_at(rest.len().min(CHUNK_ENC));
        let plain = sbox
            .decrypt(&nonce, chunk)
            .map_err(|_| CryptoError::ChunkDecryption)?;
        message.extend_from_slice(&plain);
        rest = next;
    }

    Ok(Opened {
        from,
        addresses,
        message,
    })
}

/// 用私钥加密给全零公钥，任何人都能用全零私钥和发送方公钥打开
pub fn sign(sk: &SK, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
    SalsaBox::new(&ZERO_PK, &sk.secret())
        .encrypt(&zero_nonce(), msg)
        .map_err(|_| CryptoError::Signing)
}

/// 验证签名并取回原文
pub fn verify(pk: &PK, sig: &[u8]) -> Option<Vec<u8>> {
    SalsaBox::new(&pk.full(), &ZERO_SK)
        .decrypt(&zero_nonce(), sig)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(sk: &str) -> Keypair {
        Keypair::from_secret(SK::decode(sk).unwrap()).unwrap()
    }

    fn alice() -> Keypair {
        keypair("cosec:0aqouiilz3-ynmmxunwx1-7u6e5xppqa-hmz7q8yd3f-5l92e17yos")
    }

    fn bob() -> Keypair {
        keypair("cosec:0ot4jpb8z4-iq7yu96m3f-9bh2ze9s7w-m7r7vowu2k-tl8pmbetoz")
    }

    #[test]
    fn test_frame_sizes() {
        let addrs = [Address::numbered(1), Address::numbered(2)];
        let frame = encrypt(&alice(), &addrs, b"hello", &bob().pk).unwrap();
        assert_eq!(frame.len(), KEY_BLOCK + 2 * ADDRESS_LEN + OVERHEAD + 5 + OVERHEAD);
    }

    #[test]
    fn test_round_trip() {
        let addrs = [Address::numbered(1)];
        let frame = encrypt(&alice(), &addrs, b"hello", &bob().pk).unwrap();
        let opened = decrypt(&bob(), &frame).unwrap();
        assert_eq!(opened.from, alice().pk);
        assert_eq!(opened.addresses, addrs);
        assert_eq!(opened.message, b"hello");
    }

    #[test]
    fn test_multi_chunk() {
        let msg: Vec<u8> = (0..CHUNK_SIZE * 2 + 10).map(|i| i as u8).collect();
        let frame = encrypt(&alice(), &[Address::numbered(3)], &msg, &bob().pk).unwrap();
        assert_eq!(
            frame.len(),
            KEY_BLOCK + ADDRESS_LEN + OVERHEAD + msg.len() + 3 * OVERHEAD
        );
        assert_eq!(decrypt(&bob(), &frame).unwrap().message, msg);
    }

    #[test]
    fn test_wrong_recipient() {
        let frame = encrypt(&alice(), &[Address::numbered(1)], b"x", &bob().pk).unwrap();
        assert_eq!(decrypt(&alice(), &frame).unwrap_err(), CryptoError::KeyDecryption);
    }

    #[test]
    fn test_tampering() {
        let mut frame = encrypt(&alice(), &[Address::numbered(1)], b"hello", &bob().pk).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 1;
        assert_eq!(decrypt(&bob(), &frame).unwrap_err(), CryptoError::ChunkDecryption);

        let mut frame = encrypt(&alice(), &[Address::numbered(1)], b"hello", &bob().pk).unwrap();
        frame[KEY_BLOCK] ^= 1;
        assert_eq!(decrypt(&bob(), &frame).unwrap_err(), CryptoError::AddressDecryption);

        assert_eq!(decrypt(&bob(), &frame[..10]).unwrap_err(), CryptoError::TooShort(10));
    }

    #[test]
    fn test_address_limits() {
        assert_eq!(
            encrypt(&alice(), &[], b"x", &bob().pk).unwrap_err(),
            CryptoError::NoAddress
        );
        let many = vec![Address::default(); 257];
        assert_eq!(
            encrypt(&alice(), &many, b"x", &bob().pk).unwrap_err(),
            CryptoError::TooManyAddresses
        );
    }

    #[test]
    fn test_sign_verify() {
        let kp = alice();
        let sig = sign(&kp.sk, b"addresses").unwrap();
        assert_eq!(sig.len(), 9 + OVERHEAD);
        assert_eq!(verify(&kp.pk, &sig).unwrap(), b"addresses");
        assert_eq!(verify(&bob().pk, &sig), None);
    }

    #[test]
    fn test_signature_is_deterministic() {
        let kp = alice();
        assert_eq!(sign(&kp.sk, b"m").unwrap(), sign(&kp.sk, b"m").unwrap());
    }
}
