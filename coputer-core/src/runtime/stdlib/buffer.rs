//! buffer 库
//!
//! 定宽读写都是小端序。越界访问不抛出，返回 `("buffer access out of bounds", false)`。

use super::{invalid_arg, new_lib, Args};
use crate::core::{BufferRef, TableRef, Value, VmError};
use crate::runtime::vm::Vm;

type R = Result<Vec<Value>, VmError>;

const OUT_OF_BOUNDS: &str = "buffer access out of bounds";
/// 单个缓冲区的最大字节数
const MAX_BUFFER: f64 = (1u64 << 30) as f64;

fn out_of_bounds() -> R {
    Ok(vec![Value::from(OUT_OF_BOUNDS), Value::Boolean(false)])
}

fn written() -> R {
    Ok(vec![Value::Nil, Value::Boolean(true)])
}

/// [offset, offset + count) 在缓冲区内时返回起点
fn range(len: usize, offset: f64, count: usize) -> Option<usize> {
    if offset < 0.0 {
        return None;
    }
    let start = offset as usize;
    (start.checked_add(count)? <= len).then_some(start)
}

fn buffer_create(_: &mut Vm, args: &mut Args) -> R {
    let size = args.number()?;
    if !(0.0..=MAX_BUFFER).contains(&size) {
        return Err(invalid_arg(1, "create", "size out of range"));
    }
    Ok(vec![Value::buffer(vec![0; size as usize])])
}

fn buffer_fromstring(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    Ok(vec![Value::buffer(s.to_vec())])
}

fn buffer_tostring(_: &mut Vm, args: &mut Args) -> R {
    let b = args.buffer()?;
    let s = Value::string(&*b.borrow());
    Ok(vec![s])
}

fn buffer_len(_: &mut Vm, args: &mut Args) -> R {
    let b = args.buffer()?;
    let len = b.borrow().len();
    Ok(vec![Value::Number(len as f64)])
}

// ===== 定宽读写 =====

fn read_bytes<const N: usize>(args: &mut Args) -> Result<Option<[u8; N]>, VmError> {
    let b = args.buffer()?;
    let offset = args.number()?;

    let b = b.borrow();
    Ok(range(b.len(), offset, N).map(|start| {
        let mut out = [0u8; N];
        out.copy_from_slice(&b[start..start + N]);
        out
    }))
}

fn write_bytes<const N: usize>(b: &BufferRef, offset: f64, bytes: [u8; N]) -> R {
    let mut b = b.borrow_mut();
    match range(b.len(), offset, N) {
        Some(start) => {
            b[start..start + N].copy_from_slice(&bytes);
            written()
        }
        None => out_of_bounds(),
    }
}

macro_rules! fixed {
    ($read:ident, $write:ident, $t:ty, $n:literal, $to:expr, $from:expr) => {
        fn $read(_: &mut Vm, args: &mut Args) -> R {
            match read_bytes::<$n>(args)? {
                Some(bytes) => Ok(vec![Value::Number($to(<$t>::from_le_bytes(bytes)))]),
                None => out_of_bounds(),
            }
        }

        fn $write(_: &mut Vm, args: &mut Args) -> R {
            let b = args.buffer()?;
            let offset = args.number()?;
            let value: $t = $from(args.number()?);
            write_bytes::<$n>(&b, offset, value.to_le_bytes())
        }
    };
}

// 整数写入按模截断
fixed!(buffer_readi8, buffer_writei8, i8, 1, |v: i8| v as f64, |n: f64| n as i64 as i8);
fixed!(buffer_readu8, buffer_writeu8, u8, 1, |v: u8| v as f64, |n: f64| n as i64 as u8);
fixed!(buffer_readi16, buffer_writei16, i16, 2, |v: i16| v as f64, |n: f64| n as i64 as i16);
fixed!(buffer_readu16, buffer_writeu16, u16, 2, |v: u16| v as f64, |n: f64| n as i64 as u16);
fixed!(buffer_readi32, buffer_writei32, i32, 4, |v: i32| v as f64, |n: f64| n as i64 as i32);
fixed!(buffer_readu32, buffer_writeu32, u32, 4, |v: u32| v as f64, |n: f64| n as i64 as u32);
fixed!(buffer_readf32, buffer_writef32, f32, 4, |v: f32| v as f64, |n: f64| n as f32);
fixed!(buffer_readf64, buffer_writef64, f64, 8, |v: f64| v, |n: f64| n);

// ===== 位读写 =====

/// 检查位范围，返回 (起始字节, 结束字节, 字节内偏移)
fn bit_range(len: usize, bitoffset: f64, bitcount: f64) -> Result<(usize, usize, u32), &'static str> {
    if bitoffset < 0.0 {
        return Err(OUT_OF_BOUNDS);
    }
    if !(0.0..=32.0).contains(&bitcount) {
        return Err("bit count is out of range of [0; 32]");
    }
    let (bitoffset, bitcount) = (bitoffset as u64, bitcount as u64);
    if bitoffset + bitcount > len as u64 * 8 {
        return Err(OUT_OF_BOUNDS);
    }
    let start = (bitoffset / 8) as usize;
    let end = ((bitoffset + bitcount + 7) / 8) as usize;
    Ok((start, end, (bitoffset & 7) as u32))
}

fn gather(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (*b as u64) << (i * 8))
}

fn buffer_readbits(_: &mut Vm, args: &mut Args) -> R {
    let b = args.buffer()?;
    let bitoffset = args.number()?;
    let bitcount = args.number()?;

    let b = b.borrow();
    match bit_range(b.len(), bitoffset, bitcount) {
        Ok((start, end, shift)) => {
            let mask = (1u64 << bitcount as u32) - 1;
            let data = gather(&b[start..end]);
            Ok(vec![Value::Number(((data >> shift) & mask) as f64), Value::Boolean(true)])
        }
        Err(message) => Ok(vec![Value::from(message), Value::Boolean(false)]),
    }
}

fn buffer_writebits(_: &mut Vm, args: &mut Args) -> R {
    let b = args.buffer()?;
    let bitoffset = args.number()?;
    let bitcount = args.number()?;
    let value = args.number()? as i64 as u64;

    let mut b = b.borrow_mut();
    match bit_range(b.len(), bitoffset, bitcount) {
        Ok((start, end, shift)) => {
            let mask = ((1u64 << bitcount as u32) - 1) << shift;
            let data = gather(&b[start..end]);
            let data = (data & !mask) | ((value << shift) & mask);
            let bytes = data.to_le_bytes();
            b[start..end].copy_from_slice(&bytes[..end - start]);
            written()
        }
        Err(message) => Ok(vec![Value::from(message), Value::Boolean(false)]),
    }
}

// ===== 字符串与批量操作 =====

fn buffer_readstring(_: &mut Vm, args: &mut Args) -> R {
    let b = args.buffer()?;
    let offset = args.number()?;
    let count = args.number()?.max(0.0) as usize;

    let b = b.borrow();
    match range(b.len(), offset, count) {
        Some(start) => Ok(vec![Value::string(&b[start..start + count]), Value::Boolean(true)]),
        None => out_of_bounds(),
    }
}

fn buffer_writestring(_: &mut Vm, args: &mut Args) -> R {
    let b = args.buffer()?;
    let offset = args.number()?;
    let value = args.string()?;
    let count = args.opt_number(value.len() as f64)?;
    if count < 0.0 || count as usize > value.len() {
        return Err(invalid_arg(4, "writestring", "string length overflow"));
    }
    let count = count as usize;

    let mut b = b.borrow_mut();
    match range(b.len(), offset, count) {
        Some(start) => {
            b[start..start + count].copy_from_slice(&value[..count]);
            written()
        }
        None => out_of_bounds(),
    }
}

fn buffer_copy(_: &mut Vm, args: &mut Args) -> R {
    let target = args.buffer()?;
    let target_offset = args.number()?;
    let source = args.buffer()?;
    let source_offset = args.opt_number(0.0)?;
    let source_len = source.borrow().len();
    let count = args.opt_number(source_len as f64)?.max(0.0) as usize;

    // 源与目标可能是同一个缓冲区
    let bytes = {
        let s = source.borrow();
        match range(s.len(), source_offset, count) {
            Some(start) => s[start..start + count].to_vec(),
            None => return out_of_bounds(),
        }
    };

    let mut t = target.borrow_mut();
    match range(t.len(), target_offset, count) {
        Some(start) => {
            t[start..start + count].copy_from_slice(&bytes);
            written()
        }
        None => out_of_bounds(),
    }
}

fn buffer_fill(_: &mut Vm, args: &mut Args) -> R {
    let b = args.buffer()?;
    let offset = args.number()?;
    let value = args.number()? as i64 as u8;
    let len = b.borrow().len();
    let remaining = (len as f64 - offset.max(0.0)).max(0.0);
    let count = args.opt_number(remaining)?.max(0.0) as usize;

    let mut b = b.borrow_mut();
    match range(b.len(), offset, count) {
        Some(start) => {
            b[start..start + count].fill(value);
            written()
        }
        None => out_of_bounds(),
    }
}

pub(super) fn lib() -> TableRef {
    new_lib(
        &[
            ("copy", buffer_copy),
            ("create", buffer_create),
            ("fill", buffer_fill),
            ("fromstring", buffer_fromstring),
            ("len", buffer_len),
            ("readbits", buffer_readbits),
            ("readf32", buffer_readf32),
            ("readf64", buffer_readf64),
            ("readi16", buffer_readi16),
            ("readi32", buffer_readi32),
            ("readi8", buffer_readi8),
            ("readstring", buffer_readstring),
            ("readu16", buffer_readu16),
            ("readu32", buffer_readu32),
            ("readu8", buffer_readu8),
            ("tostring", buffer_tostring),
            ("writebits", buffer_writebits),
            ("writef32", buffer_writef32),
            ("writef64", buffer_writef64),
            ("writei16", buffer_writei16),
            ("writei32", buffer_writei32),
            ("writei8", buffer_writei8),
            ("writestring", buffer_writestring),
            ("writeu16", buffer_writeu16),
            ("writeu32", buffer_writeu32),
            ("writeu8", buffer_writeu8),
        ],
        vec![],
    )
}
