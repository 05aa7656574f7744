//! utf8 库

use super::{invalid_arg, make_fn, new_lib, Args};
use crate::core::{TableRef, Value, VmError};
use crate::runtime::vm::Vm;

type R = Result<Vec<Value>, VmError>;

const CHARPATTERN: &[u8] = b"[\x00-\x7F\xC2-\xF4][\x80-\xBF]*";
const MAX_UNICODE: f64 = 0x10FFFF as f64;

fn is_cont(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// 负数位置从末尾算起；超出开头时为 0
fn posrelat(pos: i64, len: usize) -> i64 {
    if pos >= 0 {
        pos
    } else if pos.unsigned_abs() as usize > len {
        0
    } else {
        len as i64 + pos + 1
    }
}

/// 解码 s 开头的一个字符，返回 (码点, 字节数)
fn decode(s: &[u8]) -> Option<(u32, usize)> {
    let len = match *s.first()? {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return None,
    };
    let c = std::str::from_utf8(s.get(..len)?).ok()?.chars().next()?;
    Some((c as u32, len))
}

fn utf8_char(_: &mut Vm, args: &mut Args) -> R {
    let mut out = String::new();
    for i in 0..args.len() {
        let code = args.number()?;
        let c = (0.0..=MAX_UNICODE)
            .contains(&code)
            .then(|| char::from_u32(code as u32))
            .flatten()
            .ok_or_else(|| invalid_arg(i + 1, "char", "value out of range"))?;
        out.push(c);
    }
    Ok(vec![Value::from(out)])
}

fn codes_iter(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let mut n = args.number()? as i64 - 1;
    let len = s.len() as i64;

    if n < 0 {
        n = 0;
    } else if n < len {
        // 跳过当前字符及其后续字节
        n += 1;
        while n < len && is_cont(s[n as usize]) {
            n += 1;
        }
    }
    if n >= len {
        return Ok(vec![]);
    }

    match decode(&s[n as usize..]) {
        Some((code, _)) => Ok(vec![Value::Number((n + 1) as f64), Value::Number(code as f64)]),
        None => Err(VmError::new("invalid UTF-8 code")),
    }
}

fn utf8_codes(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    Ok(vec![make_fn("codes", codes_iter), Value::String(s), Value::Number(0.0)])
}

fn utf8_codepoint(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let i = args.opt_number(1.0)? as i64;
    let j = args.opt_number(i as f64)? as i64;

    let posi = posrelat(i, s.len());
    let pose = posrelat(j, s.len());
    if posi < 1 {
        return Err(invalid_arg(2, "codepoint", "out of range"));
    }
    if pose > s.len() as i64 {
        return Err(invalid_arg(3, "codepoint", "out of range"));
    }
    if posi > pose {
        return Ok(vec![]);
    }

    let mut codes = Vec::new();
    let mut at = (posi - 1) as usize;
    while at < pose as usize {
        let (code, size) = decode(&s[at..]).ok_or_else(|| VmError::new("invalid UTF-8 code"))?;
        codes.push(Value::Number(code as f64));
        at += size;
    }
    Ok(codes)
}

/// 字符个数；遇到无效字节时返回 (nil, 位置)
fn utf8_len(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let i = args.opt_number(1.0)? as i64;
    let j = args.opt_number(-1.0)? as i64;

    let posi = posrelat(i, s.len()).max(1) as usize;
    let pose = (posrelat(j, s.len()) as usize).min(s.len());

    let mut n = 0;
    let mut at = posi - 1;
    while at < pose {
        match decode(&s[at..]) {
            Some((_, size)) => at += size,
            None => return Ok(vec![Value::Nil, Value::Number((at + 1) as f64)]),
        }
        n += 1;
    }
    Ok(vec![Value::Number(n as f64)])
}

fn utf8_offset(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let mut n = args.number()? as i64;
    let default = if n >= 0 { 1.0 } else { (s.len() + 1) as f64 };
    let i = args.opt_number(default)? as i64;

    let len = s.len() as i64;
    let mut posi = posrelat(i, s.len()) - 1;
    if posi < 0 || posi > len {
        return Err(invalid_arg(3, "offset", "position out of range"));
    }
    let cont = |p: i64| p < len && is_cont(s[p as usize]);

    if n == 0 {
        while posi > 0 && cont(posi) {
            posi -= 1;
        }
        return Ok(vec![Value::Number((posi + 1) as f64)]);
    }

    if cont(posi) {
        return Err(VmError::new("initial position is a continuation byte"));
    }
    if n < 0 {
        while n < 0 && posi > 0 {
            posi -= 1;
            while posi > 0 && cont(posi) {
                posi -= 1;
            }
            n += 1;
        }
    } else {
        n -= 1;
        while n > 0 && posi < len {
            posi += 1;
            while cont(posi) {
                posi += 1;
            }
            n -= 1;
        }
    }

    if n != 0 {
        return Ok(vec![Value::Nil]);
    }
    Ok(vec![Value::Number((posi + 1) as f64)])
}

pub(super) fn lib() -> TableRef {
    new_lib(
        &[
            ("char", utf8_char),
            ("codepoint", utf8_codepoint),
            ("codes", utf8_codes),
            ("len", utf8_len),
            ("offset", utf8_offset),
        ],
        vec![("charpattern", Value::string(CHARPATTERN))],
    )
}
