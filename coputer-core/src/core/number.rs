//! 数字与字符串互转
//!
//! `tostring(number)` 使用 Schubfach 最短往返算法，输出与 Luau 逐字节一致。
//! 幂表是算法的一部分，不可替换。

const POW10_TABLE_MIN: i64 = -292;

const POW5_TABLE: [u64; 16] = [
    0x8000000000000000, 0xa000000000000000, 0xc800000000000000, 0xfa00000000000000,
    0x9c40000000000000, 0xc350000000000000, 0xf424000000000000, 0x9896800000000000,
    0xbebc200000000000, 0xee6b280000000000, 0x9502f90000000000, 0xba43b74000000000,
    0xe8d4a51000000000, 0x9184e72a00000000, 0xb5e620f480000000, 0xe35fa931a0000000,
];

const POW10_TABLE: [[u64; 3]; 39] = [
    [0xff77b1fcbebcdc4f, 0x25e8e89c13bb0f7b, 0x333443443333443b],
    [0x8dd01fad907ffc3b, 0xae3da7d97f6792e4, 0xbbb3ab3cb3ba3cbc],
    [0x9d71ac8fada6c9b5, 0x6f773fc3603db4aa, 0x4ba4bc4bb4bb4bcc],
    [0xaecc49914078536d, 0x58fae9f773886e19, 0x3ba3bc33b43b43bb],
    [0xc21094364dfb5636, 0x985915fc12f542e5, 0x33b43b43a33b33cb],
    [0xd77485cb25823ac7, 0x7d633293366b828c, 0x34b44c444343443c],
    [0xef340a98172aace4, 0x86fb897116c87c35, 0x333343333343334b],
    [0x84c8d4dfd2c63f3b, 0x29ecd9f40041e074, 0xccaccbbcbcbb4bbc],
    [0x936b9fcebb25c995, 0xcab10dd900beec35, 0x3ab3ab3ab3bb3bbb],
    [0xa3ab66580d5fdaf5, 0xc13e60d0d2e0ebbb, 0x4cc3dc4db4db4dbb],
    [0xb5b5ada8aaff80b8, 0x0d819992132456bb, 0x33b33a34c33b34ab],
    [0xc9bcff6034c13052, 0xfc89b393dd02f0b6, 0x33c33b44b43c34bc],
    [0xdff9772470297ebd, 0x59787e2b93bc56f8, 0x43b444444443434c],
    [0xf8a95fcf88747d94, 0x75a44c6397ce912b, 0x443334343443343b],
    [0x8a08f0f8bf0f156b, 0x1b8e9ecb641b5900, 0xbbabab3aa3ab4ccc],
    [0x993fe2c6d07b7fab, 0xe546a8038efe402a, 0x4cb4bc4db4db4bcc],
    [0xaa242499697392d2, 0xdde50bd1d5d0b9ea, 0x3ba3ba3bb33b33bc],
    [0xbce5086492111aea, 0x88f4bb1ca6bcf585, 0x44b44c44c44c43cb],
    [0xd1b71758e219652b, 0xd3c36113404ea4a9, 0x44c44c44c444443b],
    [0xe8d4a51000000000, 0x0000000000000000, 0x444444444444444c],
    [0x813f3978f8940984, 0x4000000000000000, 0xcccccccccccccccc],
    [0x8f7e32ce7bea5c6f, 0xe4820023a2000000, 0xbba3bc4cc4cc4ccc],
    [0x9f4f2726179a2245, 0x01d762422c946591, 0x4aa3bb3aa3ba3bab],
    [0xb0de65388cc8ada8, 0x3b25a55f43294bcc, 0x3ca33b33b44b43bc],
    [0xc45d1df942711d9a, 0x3ba5d0bd324f8395, 0x44c44c34c44b44cb],
    [0xda01ee641a708de9, 0xe80e6f4820cc9496, 0x33b33b343333333c],
    [0xf209787bb47d6b84, 0xc0678c5dbd23a49b, 0x443444444443443b],
    [0x865b86925b9bc5c2, 0x0b8a2392ba45a9b3, 0xdbccbcccb4cb3bbb],
    [0x952ab45cfa97a0b2, 0xdd945a747bf26184, 0x3bc4bb4ab3ca3cbc],
    [0xa59bc234db398c25, 0x43fab9837e699096, 0x3bb3ac3ab3bb33ac],
    [0xb7dcbf5354e9bece, 0x0c11ed6d538aeb30, 0x33b43b43b34c34dc],
    [0xcc20ce9bd35c78a5, 0x31ec038df7b441f5, 0x34c44c43c44b44cb],
    [0xe2a0b5dc971f303a, 0x2e44ae64840fd61e, 0x333333333333333c],
    [0xfb9b7cd9a4a7443c, 0x169840ef017da3b2, 0x433344443333344c],
    [0x8bab8eefb6409c1a, 0x1ad089b6c2f7548f, 0xdcbdcc3cc4cc4bcb],
    [0x9b10a4e5e9913128, 0xca7cf2b4191c8327, 0x3ab3cb3bc3bb4bbb],
    [0xac2820d9623bf429, 0x546345fa9fbdcd45, 0x3bb3cc43c43c43cb],
    [0xbf21e44003acdd2c, 0xe0470a63e6bd56c4, 0x44b34a43b44c44bc],
    [0xd433179d9c8cb841, 0x5fa60692a46151ec, 0x43a33a33a333333c],
];

/// (hi, lo) of the 128-bit product
fn mul128(x: u64, y: u64) -> (u64, u64) {
    let p = (x as u128) * (y as u128);
    ((p >> 64) as u64, p as u64)
}

/// (x * y) >> 64 for a 128-bit x
fn mul192hi(xhi: u64, xlo: u64, y: u64) -> (u64, u64) {
    let (z2, z1) = mul128(xhi, y);
    let (z1c, _) = mul128(xlo, y);

    let z1 = z1.wrapping_add(z1c);
    let z2 = z2.wrapping_add((z1 < z1c) as u64);
    (z2, z1)
}

fn roundodd(ghi: u64, glo: u64, cp: u64) -> u64 {
    let (xhi, _) = mul128(glo, cp);
    let (yhi, ylo) = mul128(ghi, cp);

    let z = ylo.wrapping_add(xhi);
    yhi.wrapping_add((z < xhi) as u64) | (z > 1) as u64
}

/// 返回 (有效数字, 十进制指数)
fn schubfach(exponent: i64, fraction: u64) -> (u64, i64) {
    let mut c = fraction;
    let mut q = exponent - 1023 - 51;

    if exponent != 0 {
        c |= 1 << 52;
        q -= 1;
    }

    // 整数快速路径
    if (0..53).contains(&-q) && c & ((1u64 << -q) - 1) == 0 {
        return (c >> -q, 0);
    }

    let irr = c == 1 << 52 && q != -1074;
    let out = c & 1;

    let cbl = 4 * c - 2 + irr as u64;
    let cb = 4 * c;
    let cbr = 4 * c + 2;

    const Q: i64 = 20;
    const C: i64 = 315652;
    const A: i64 = -131008;
    const C2: i64 = 3483294;

    let k = if irr { (q * C + A) >> Q } else { (q * C) >> Q };
    let h = q + ((-k * C2) >> Q) + 1;

    let gtoff = -k - POW10_TABLE_MIN;
    let gt = POW10_TABLE[(gtoff >> 4) as usize];

    let g15 = (gtoff & 15) as u64;
    let (mut ghi, mut glo) = mul192hi(gt[0], gt[1], POW5_TABLE[g15 as usize]);

    // 1 位缩放 + 3 位偏移，偏移不进位
    let gterr = (gt[2] >> (g15 * 4)) & 15;
    let gtscale = gterr >> 3;

    ghi <<= gtscale;
    ghi = ghi.wrapping_add((glo >> 63) & gtscale);
    glo <<= gtscale;
    glo = glo.wrapping_sub((gterr & 7).wrapping_sub(4));

    let vbl = roundodd(ghi, glo, cbl << h);
    let vb = roundodd(ghi, glo, cb << h);
    let vbr = roundodd(ghi, glo, cbr << h);

    let s = vb / 4;
    if s >= 10 {
        let sp = s / 10;

        let upin = vbl + out <= 40 * sp;
        let wpin = vbr >= 40 * sp + 40 + out;

        if upin != wpin {
            return (sp + wpin as u64, k + 1);
        }
    }

    let uin = vbl + out <= 4 * s;
    let win = 4 * s + 4 + out <= vbr;
    if uin != win {
        return (s + win as u64, k);
    }

    let rup = vb >= 4 * s + 2 + 1 - (s & 1);
    (s + rup as u64, k)
}

fn trim_zeros(buf: &mut Vec<u8>) {
    while buf.last() == Some(&b'0') {
        buf.pop();
    }
}

fn push_exponent(buf: &mut Vec<u8>, mut v: i64) {
    buf.push(b'e');
    if v < 0 {
        buf.push(b'-');
        v = -v;
    } else {
        buf.push(b'+');
    }

    if v >= 100 {
        buf.push(b'0' + (v / 100) as u8);
        v %= 100;
    }

    buf.push(b'0' + (v / 10) as u8);
    buf.push(b'0' + (v % 10) as u8);
}

fn format_finite(exponent: i64, fraction: u64) -> String {
    let (s, k) = schubfach(exponent, fraction);

    let dec = s.to_string().into_bytes();
    let declen = dec.len() as i64;
    let dot = declen + k;

    let mut buf = Vec::with_capacity(32);

    // 科学计数法
    if !(-5..=21).contains(&dot) {
        buf.push(dec[0]);
        buf.push(b'.');
        buf.extend_from_slice(&dec[1..]);
        trim_zeros(&mut buf);
        if buf.last() == Some(&b'.') {
            buf.pop();
        }
        push_exponent(&mut buf, dot - 1);
    } else if dot <= 0 {
        buf.extend_from_slice(b"0.");
        buf.extend(std::iter::repeat(b'0').take((-dot) as usize));
        buf.extend_from_slice(&dec);
        trim_zeros(&mut buf);
    } else if dot == declen {
        buf.extend_from_slice(&dec);
    } else if dot < declen {
        let dot = dot as usize;
        buf.extend_from_slice(&dec[..dot]);
        buf.push(b'.');
        buf.extend_from_slice(&dec[dot..]);
        trim_zeros(&mut buf);
    } else {
        buf.extend_from_slice(&dec);
        buf.extend(std::iter::repeat(b'0').take((dot - declen) as usize));
    }

    // 只包含 ASCII 数字与符号
    String::from_utf8_lossy(&buf).into_owned()
}

/// 数字转字符串（`tostring` 语义）
pub fn num2str(n: f64) -> String {
    let bits = n.to_bits();
    let negative = bits >> 63 != 0;
    let exponent = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & ((1 << 52) - 1);

    if exponent == 0x7ff {
        return if fraction != 0 {
            "nan".to_string()
        } else if negative {
            "-inf".to_string()
        } else {
            "inf".to_string()
        };
    } else if exponent == 0 && fraction == 0 {
        return if negative { "-0" } else { "0" }.to_string();
    }

    let s = format_finite(exponent, fraction);
    if negative {
        format!("-{s}")
    } else {
        s
    }
}

const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 字符串转数字（`tonumber` 语义），无法解析时返回 None
pub fn str2num(text: &[u8], radix: u32) -> Option<f64> {
    if !(2..=36).contains(&radix) {
        return None;
    }
    let text = std::str::from_utf8(text).ok()?;

    if radix == 10 {
        if let Ok(f) = text.parse::<f64>() {
            return Some(f);
        }
    }

    let (negative, mut digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut radix = radix;
    if radix == 10 || radix == 16 {
        if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            digits = rest;
            radix = 16;
        }
    }

    if digits.is_empty() {
        return None;
    }

    let allowed = &DIGITS[..radix as usize];
    let mut n = 0f64;
    for c in digits.bytes() {
        let index = allowed.iter().position(|d| *d == c.to_ascii_uppercase())?;
        n = n * radix as f64 + index as f64;
    }

    Some(if negative { -n } else { n })
}
