//! 密钥的字符串表示
//!
//! 固定宽度的大端 36 进制，分成五段，段间用 `-` 连接：
//! - 公钥：`copub:` + 5×9 个字符
//! - 私钥：`cosec:` + 5×10 个字符

use crate::error::KeyError;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE: u32 = 36;

pub const PUB_START: &str = "copub:";
pub const SEC_START: &str = "cosec:";

pub const PK_SECTION: usize = 9;
pub const SK_SECTION: usize = 10;
const SECTIONS: usize = 5;

fn digit_value(c: u8) -> Option<u32> {
    match c {
        b'0'..=b'9' => Some(u32::from(c - b'0')),
        b'a'..=b'z' => Some(u32::from(c - b'a') + 10),
        _ => None,
    }
}

/// 字节串（大端）转为 `width` 位 36 进制数字
fn to_digits(bytes: &[u8], width: usize) -> Vec<u8> {
    // 小端存放
    let mut digits = vec![0u8; width];
    let mut used = 1;
    for &b in bytes {
        let mut carry = u32::from(b);
        for d in digits.iter_mut().take(used) {
            carry += u32::from(*d) << 8;
            *d = (carry % BASE) as u8;
            carry /= BASE;
        }
        while carry > 0 && used < width {
            digits[used] = (carry % BASE) as u8;
            used += 1;
            carry /= BASE;
        }
    }
    digits.iter().rev().map(|&d| ALPHABET[d as usize]).collect()
}

/// 36 进制数字转回固定长度的字节串（大端）
fn from_digits<const N: usize>(digits: &[u8]) -> Result<[u8; N], KeyError> {
    // 小端存放
    let mut bytes = [0u8; N];
    for &c in digits {
        let mut carry = digit_value(c).ok_or(KeyError::NonBaseCharacter(c as char))?;
        for b in bytes.iter_mut() {
            carry += u32::from(*b) * BASE;
            *b = carry as u8;
            carry >>= 8;
        }
        if carry > 0 {
            return Err(KeyError::OutOfRange);
        }
    }
    bytes.reverse();
    Ok(bytes)
}

fn sectioned(digits: &[u8], section: usize) -> String {
    let mut out = String::with_capacity(digits.len() + SECTIONS - 1);
    for (i, chunk) in digits.chunks(section).enumerate() {
        if i > 0 {
            out.push('-');
        }
        out.extend(chunk.iter().map(|&c| c as char));
    }
    out
}

/// 去掉分隔符；分隔符必须恰好出现在段边界上
fn unsectioned(body: &str, section: usize) -> Result<Vec<u8>, KeyError> {
    let mut digits = Vec::with_capacity(section * SECTIONS);
    for (i, part) in body.split('-').enumerate() {
        if i >= SECTIONS || part.len() != section {
            return Err(KeyError::InvalidFormat);
        }
        digits.extend_from_slice(part.as_bytes());
    }
    if digits.len() != section * SECTIONS {
        return Err(KeyError::InvalidFormat);
    }
    Ok(digits)
}

/// 编码为分段字符串（不含前缀）
pub fn encode(bytes: &[u8], section: usize) -> String {
    sectioned(&to_digits(bytes, section * SECTIONS), section)
}

/// 解码分段字符串（不含前缀）
pub fn decode<const N: usize>(body: &str, section: usize) -> Result<[u8; N], KeyError> {
    let expected = section * SECTIONS + SECTIONS - 1;
    if body.len() != expected {
        return Err(KeyError::InvalidLength {
            expected,
            got: body.len(),
        });
    }
    from_digits(&unsectioned(body, section)?)
}

/// 解码带前缀的字符串
pub fn decode_prefixed<const N: usize>(key: &str, prefix: &str, section: usize) -> Result<[u8; N], KeyError> {
    let expected = prefix.len() + section * SECTIONS + SECTIONS - 1;
    if key.len() != expected {
        return Err(KeyError::InvalidLength {
            expected,
            got: key.len(),
        });
    }
    let body = key.strip_prefix(prefix).ok_or(KeyError::InvalidKeyType)?;
    decode(body, section)
}
