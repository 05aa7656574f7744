//! bit32 库：32 位无符号整数运算

use super::{new_lib, Args};
use crate::core::{TableRef, Value, VmError};
use crate::runtime::vm::Vm;

type R = Result<Vec<Value>, VmError>;

const NBITS: i64 = 32;
const ALL_ONES: u32 = u32::MAX;

/// 数字按模 2^32 截断为无符号整数
fn to_u32(n: f64) -> u32 {
    n as i64 as u32
}

fn num(x: u32) -> R {
    Ok(vec![Value::Number(x as f64)])
}

/// 低 n 位全为 1（1 <= n <= 32）
fn bitmask(n: i64) -> u32 {
    if n >= NBITS {
        ALL_ONES
    } else {
        (1u32 << n) - 1
    }
}

/// 正数左移，负数右移；移出 32 位时得 0
fn shift(x: u32, i: i64) -> u32 {
    let by = u32::try_from(i.unsigned_abs()).unwrap_or(u32::MAX);
    if i < 0 {
        x.checked_shr(by).unwrap_or(0)
    } else {
        x.checked_shl(by).unwrap_or(0)
    }
}

fn fold(args: &mut Args, init: u32, f: impl Fn(u32, u32) -> u32) -> Result<u32, VmError> {
    let mut x = init;
    for _ in 0..args.len() {
        x = f(x, to_u32(args.number()?));
    }
    Ok(x)
}

fn bit32_arshift(_: &mut Vm, args: &mut Args) -> R {
    let x = to_u32(args.number()?);
    let i = args.number()? as i64;

    if i < 0 || x & (1 << 31) == 0 {
        return num(shift(x, -i));
    }
    if i >= NBITS {
        return num(ALL_ONES);
    }
    num((x >> i) | !(ALL_ONES >> i))
}

fn bit32_band(_: &mut Vm, args: &mut Args) -> R {
    num(fold(args, ALL_ONES, |a, b| a & b)?)
}

fn bit32_bnot(_: &mut Vm, args: &mut Args) -> R {
    num(!to_u32(args.number()?))
}

fn bit32_bor(_: &mut Vm, args: &mut Args) -> R {
    num(fold(args, 0, |a, b| a | b)?)
}

fn bit32_btest(_: &mut Vm, args: &mut Args) -> R {
    let x = fold(args, ALL_ONES, |a, b| a & b)?;
    Ok(vec![Value::Boolean(x != 0)])
}

fn bit32_bxor(_: &mut Vm, args: &mut Args) -> R {
    num(fold(args, 0, |a, b| a ^ b)?)
}

fn bit32_byteswap(_: &mut Vm, args: &mut Args) -> R {
    num(to_u32(args.number()?).swap_bytes())
}

fn bit32_countlz(_: &mut Vm, args: &mut Args) -> R {
    num(to_u32(args.number()?).leading_zeros())
}

fn bit32_countrz(_: &mut Vm, args: &mut Args) -> R {
    num(to_u32(args.number()?).trailing_zeros())
}

/// 读取 field 和 width 参数；越界时返回错误消息而不是抛出
fn field_args(args: &mut Args) -> Result<Result<(i64, i64), &'static str>, VmError> {
    let f = args.number()? as i64;
    let w = args.opt_number(1.0)? as i64;

    Ok(if f < 0 {
        Err("field cannot be negative")
    } else if w < 1 {
        Err("width must be positive")
    } else if f + w > NBITS {
        Err("trying to access non-existent bits")
    } else {
        Ok((f, w))
    })
}

fn failure(message: &str) -> R {
    Ok(vec![Value::from(message), Value::Boolean(false)])
}

fn bit32_extract(_: &mut Vm, args: &mut Args) -> R {
    let x = to_u32(args.number()?);
    match field_args(args)? {
        Ok((f, w)) => Ok(vec![
            Value::Number(((x >> f) & bitmask(w)) as f64),
            Value::Boolean(true),
        ]),
        Err(message) => failure(message),
    }
}

fn bit32_replace(_: &mut Vm, args: &mut Args) -> R {
    let x = to_u32(args.number()?);
    let v = to_u32(args.number()?);
    match field_args(args)? {
        Ok((f, w)) => {
            let m = bitmask(w);
            let replaced = (x & !(m << f)) | ((v & m) << f);
            Ok(vec![Value::Number(replaced as f64), Value::Boolean(true)])
        }
        Err(message) => failure(message),
    }
}

fn bit32_lrotate(_: &mut Vm, args: &mut Args) -> R {
    let x = to_u32(args.number()?);
    let i = args.number()? as i64;
    num(x.rotate_left(i.rem_euclid(NBITS) as u32))
}

fn bit32_rrotate(_: &mut Vm, args: &mut Args) -> R {
    let x = to_u32(args.number()?);
    let i = args.number()? as i64;
    num(x.rotate_right(i.rem_euclid(NBITS) as u32))
}

fn bit32_lshift(_: &mut Vm, args: &mut Args) -> R {
    let x = to_u32(args.number()?);
    let i = args.number()? as i64;
    num(shift(x, i))
}

fn bit32_rshift(_: &mut Vm, args: &mut Args) -> R {
    let x = to_u32(args.number()?);
    let i = args.number()? as i64;
    num(shift(x, -i))
}

pub(super) fn lib() -> TableRef {
    new_lib(
        &[
            ("arshift", bit32_arshift),
            ("band", bit32_band),
            ("bnot", bit32_bnot),
            ("bor", bit32_bor),
            ("btest", bit32_btest),
            ("bxor", bit32_bxor),
            ("byteswap", bit32_byteswap),
            ("countlz", bit32_countlz),
            ("countrz", bit32_countrz),
            ("extract", bit32_extract),
            ("lrotate", bit32_lrotate),
            ("lshift", bit32_lshift),
            ("replace", bit32_replace),
            ("rrotate", bit32_rrotate),
            ("rshift", bit32_rshift),
        ],
        vec![],
    )
}
