//! 字节码反序列化
//!
//! 布局：版本字节、类型版本字节、字符串表、用户类型名（跳过）、proto 表、入口下标。
//! 第二遍把指令的 K 操作数替换为常量本身，解释器运行时不再查常量表。

use super::opcode::{self, OPS};
use super::proto::{Instruction, Konst, Module, Proto};
use super::reader::ByteReader;
use crate::core::{DeserialiseError, Value};
use std::rc::Rc;
use tracing::debug;

pub const BYTECODE_VERSION: u8 = 6;
pub const TYPES_VERSION: u8 = 3;

/// 常量表项；闭包常量保存 proto 下标而不是值
#[derive(Clone, Debug)]
enum Constant {
    Nil,
    Value(Value),
    Closure(usize),
}

fn read_string(r: &mut ByteReader<'_>) -> Result<Rc<[u8]>, DeserialiseError> {
    let size = r.varint_usize()?;
    Ok(Rc::from(r.bytes(size)?))
}

fn string_ref(strings: &[Rc<[u8]>], index: usize) -> Result<Rc<[u8]>, DeserialiseError> {
    index
        .checked_sub(1)
        .and_then(|i| strings.get(i))
        .cloned()
        .ok_or(DeserialiseError::StringIndexOutOfRange(index))
}

/// 读取 1 或 2 个字（主字 + AUX）
fn read_instruction(r: &mut ByteReader<'_>, code: &mut Vec<Instruction>) -> Result<bool, DeserialiseError> {
    let value = r.u32()?;
    let op = value as u8;
    let info = opcode::info(op).ok_or(DeserialiseError::UnknownOpcode(op))?;

    let mut inst = Instruction {
        op,
        ..Instruction::default()
    };

    match info.mode {
        5 => {
            let mut e = (value >> 8) as i32;
            if e >= 0x800000 {
                e -= 0x1000000;
            }
            inst.a = e;
        }
        4 => {
            inst.a = ((value >> 8) & 0xff) as i32;
            inst.d = (value >> 16) as u16 as i16 as i32;
        }
        3 => {
            inst.c = (value >> 24) as u8;
            inst.b = (value >> 16) as u8;
            inst.a = ((value >> 8) & 0xff) as i32;
        }
        2 => {
            inst.b = (value >> 16) as u8;
            inst.a = ((value >> 8) & 0xff) as i32;
        }
        1 => inst.a = ((value >> 8) & 0xff) as i32,
        _ => {}
    }

    if info.aux {
        inst.aux = r.u32()?;
        code.push(inst);
        code.push(Instruction::default());
        return Ok(true);
    }

    code.push(inst);
    Ok(false)
}

fn constant_at(k: &[Constant], index: usize, inst: &Instruction) -> Result<Konst, DeserialiseError> {
    match k.get(index) {
        Some(Constant::Nil) => Ok(Konst::Value(Value::Nil)),
        Some(Constant::Value(v)) => Ok(Konst::Value(v.clone())),
        Some(Constant::Closure(p)) => Ok(Konst::Proto(*p)),
        None => Err(DeserialiseError::ConstantIndexOutOfRange {
            opcode: OPS[inst.op as usize].name,
            index,
        }),
    }
}

fn import_name(k: &[Constant], index: usize, inst: &Instruction) -> Result<Rc<[u8]>, DeserialiseError> {
    match constant_at(k, index, inst)? {
        Konst::Value(Value::String(s)) => Ok(s),
        _ => Err(DeserialiseError::ConstantIndexOutOfRange {
            opcode: OPS[inst.op as usize].name,
            index,
        }),
    }
}

/// 按常量类型解析 K 操作数
fn resolve_konst(inst: &mut Instruction, k: &[Constant]) -> Result<(), DeserialiseError> {
    let kmode = OPS[inst.op as usize].kmode;
    match kmode {
        // FASTCALL3 等指令的 AUX 存的是寄存器，越界时不解析
        1 => {
            if (inst.aux as usize) < k.len() {
                inst.k = constant_at(k, inst.aux as usize, inst)?;
            }
        }
        2 => inst.k = constant_at(k, inst.c(), inst)?,
        3 => {
            let index = usize::try_from(inst.d).map_err(|_| DeserialiseError::ConstantIndexOutOfRange {
                opcode: OPS[inst.op as usize].name,
                index: 0,
            })?;
            inst.k = constant_at(k, index, inst)?;
        }
        4 => {
            let aux = inst.aux;
            let count = (aux >> 30) as usize;
            let ids = [(aux >> 20) & 0x3ff, (aux >> 10) & 0x3ff, aux & 0x3ff];
            let mut names = Vec::with_capacity(count);
            for id in ids.iter().take(count.clamp(1, 3)) {
                names.push(import_name(k, *id as usize, inst)?);
            }
            inst.k = Konst::Import(Rc::from(names));
        }
        5 => {
            inst.k = Konst::Value(Value::Boolean(inst.aux & 1 == 1));
            inst.kn = inst.aux >> 31 == 1;
        }
        6 => {
            inst.k = constant_at(k, (inst.aux & 0xffffff) as usize, inst)?;
            inst.kn = inst.aux >> 31 == 1;
        }
        7 => inst.k = constant_at(k, inst.b(), inst)?,
        8 => inst.k = Konst::Count((inst.aux & 0xf) as u8),
        _ => {}
    }
    Ok(())
}

fn read_line_info(r: &mut ByteReader<'_>, sizecode: usize) -> Result<Vec<u32>, DeserialiseError> {
    let gap = r.u8()? as u32;

    let mut deltas = Vec::with_capacity(sizecode);
    let mut last = 0u8;
    for _ in 0..sizecode {
        last = last.wrapping_add(r.u8()?);
        deltas.push(last);
    }

    let intervals = if sizecode == 0 {
        0
    } else {
        ((sizecode - 1) >> gap) + 1
    };
    let mut absolute = Vec::with_capacity(intervals);
    let mut line = 0u32;
    for _ in 0..intervals {
        line = line.wrapping_add(r.u32()?);
        absolute.push(line);
    }

    Ok(deltas
        .iter()
        .enumerate()
        .map(|(pc, delta)| absolute[pc >> gap].wrapping_add(*delta as u32))
        .collect())
}

fn skip_debug_info(r: &mut ByteReader<'_>) -> Result<(), DeserialiseError> {
    let sizel = r.varint()?;
    for _ in 0..sizel {
        r.skip_varint()?;
        r.skip_varint()?;
        r.skip_varint()?;
        r.skip(1)?;
    }
    let sizeupvalues = r.varint()?;
    for _ in 0..sizeupvalues {
        r.skip_varint()?;
    }
    Ok(())
}

fn read_proto(r: &mut ByteReader<'_>, strings: &[Rc<[u8]>]) -> Result<Proto, DeserialiseError> {
    let mut p = Proto {
        max_stack: r.u8()?,
        num_params: r.u8()?,
        num_upvalues: r.u8()?,
        is_vararg: r.bool()?,
        ..Proto::default()
    };

    // flags
    r.skip(1)?;
    let typesize = r.varint_usize()?;
    r.skip(typesize)?;

    let sizecode = r.varint_usize()?;
    let mut words = 0;
    while words < sizecode {
        words += if read_instruction(r, &mut p.code)? { 2 } else { 1 };
    }

    let sizek = r.varint_usize()?;
    let mut k = Vec::with_capacity(sizek.min(r.len()));
    for _ in 0..sizek {
        let constant = match r.u8()? {
            0 => Constant::Nil,
            1 => Constant::Value(Value::Boolean(r.bool()?)),
            2 => Constant::Value(Value::Number(r.f64()?)),
            3 => {
                let index = r.varint_usize()?;
                Constant::Value(Value::String(string_ref(strings, index)?))
            }
            4 => {
                r.skip(4)?;
                Constant::Nil
            }
            5 => {
                let keys = r.varint()?;
                for _ in 0..keys {
                    r.skip_varint()?;
                }
                Constant::Nil
            }
            6 => Constant::Closure(r.varint_usize()?),
            7 => Constant::Value(Value::Vector([r.f32()?, r.f32()?, r.f32()?, r.f32()?])),
            other => return Err(DeserialiseError::UnknownConstantKind(other)),
        };
        k.push(constant);
    }

    for inst in p.code.iter_mut() {
        resolve_konst(inst, &k)?;
    }

    let sizep = r.varint_usize()?;
    for _ in 0..sizep {
        p.protos.push(r.varint_usize()?);
    }

    // linedefined
    r.skip_varint()?;

    p.debug_name = match r.varint_usize()? {
        0 => "(??)".to_string(),
        index => String::from_utf8_lossy(&string_ref(strings, index)?).into_owned(),
    };

    if r.bool()? {
        p.lines = read_line_info(r, p.code.len())?;
    }

    if r.bool()? {
        skip_debug_info(r)?;
    }

    Ok(p)
}

/// 子函数引用必须指向已存在的 proto
fn validate_proto_refs(protos: &[Proto]) -> Result<(), DeserialiseError> {
    let count = protos.len();
    for p in protos {
        if let Some(bad) = p.protos.iter().find(|i| **i >= count) {
            return Err(DeserialiseError::ProtoIndexOutOfRange(*bad));
        }
        for inst in &p.code {
            if let Konst::Proto(i) = inst.k {
                if i >= count {
                    return Err(DeserialiseError::ProtoIndexOutOfRange(i));
                }
            }
            if inst.op == opcode::NEWCLOSURE
                && usize::try_from(inst.d).map_or(true, |d| d >= p.protos.len())
            {
                return Err(DeserialiseError::ProtoIndexOutOfRange(inst.d.max(0) as usize));
            }
        }
    }
    Ok(())
}

/// 反序列化字节码
pub fn deserialise(bytes: &[u8]) -> Result<Rc<Module>, DeserialiseError> {
    let mut r = ByteReader::new(bytes);

    match r.u8()? {
        0 => {
            let message = String::from_utf8_lossy(r.rest()).trim().to_string();
            return Err(DeserialiseError::CompilerMessage(message));
        }
        BYTECODE_VERSION => {}
        other => return Err(DeserialiseError::UnsupportedVersion(other)),
    }

    let types_version = r.u8()?;
    if types_version != TYPES_VERSION {
        return Err(DeserialiseError::UnsupportedTypesVersion(types_version));
    }

    let string_count = r.varint_usize()?;
    let mut strings = Vec::with_capacity(string_count.min(r.len()));
    for _ in 0..string_count {
        strings.push(read_string(&mut r)?);
    }

    // 用户类型名，VM 不使用
    while r.bool()? {
        r.skip_varint()?;
    }

    let proto_count = r.varint_usize()?;
    let mut protos = Vec::with_capacity(proto_count.min(r.len()));
    for _ in 0..proto_count {
        protos.push(read_proto(&mut r, &strings)?);
    }

    let main = r.varint_usize()?;
    if main >= protos.len() {
        return Err(DeserialiseError::ProtoIndexOutOfRange(main));
    }
    protos[main].debug_name = "(main)".to_string();

    validate_proto_refs(&protos)?;

    if r.position() != r.len() {
        return Err(DeserialiseError::PositionMismatch {
            position: r.position(),
            length: r.len(),
        });
    }

    debug!(
        target: "coputer::deserialise",
        protos = protos.len(),
        strings = strings.len(),
        "bytecode deserialised"
    );

    Ok(Rc::new(Module {
        protos: protos.into_iter().map(Rc::new).collect(),
        main,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 最小模块：一个 proto，只有 `RETURN 0 1`
    fn minimal(version: u8, types: u8) -> Vec<u8> {
        let ret = (opcode::RETURN as u32) | (1 << 16);
        let mut b = vec![version, types];
        b.push(0); // strings
        b.push(0); // userdata types
        b.push(1); // protos
        b.extend_from_slice(&[1, 0, 0, 0, 0]); // maxstack, params, ups, vararg, flags
        b.push(0); // typesize
        b.push(1); // sizecode
        b.extend_from_slice(&ret.to_le_bytes());
        b.push(0); // sizek
        b.push(0); // sizep
        b.push(0); // linedefined
        b.push(0); // dbgname
        b.push(0); // lineinfo
        b.push(0); // debuginfo
        b.push(0); // main
        b
    }

    #[test]
    fn test_minimal_module() {
        let module = deserialise(&minimal(6, 3)).unwrap();
        assert_eq!(module.protos.len(), 1);
        assert_eq!(module.main_proto().debug_name, "(main)");
        assert_eq!(module.main_proto().code[0].op, opcode::RETURN);
        assert_eq!(module.main_proto().code[0].b, 1);
    }

    #[test]
    fn test_error_message_bytecode() {
        let mut b = vec![0];
        b.extend_from_slice(b":1: syntax error");
        assert_eq!(
            deserialise(&b).unwrap_err(),
            DeserialiseError::CompilerMessage(":1: syntax error".to_string())
        );
    }

    #[test]
    fn test_version_checks() {
        assert_eq!(
            deserialise(&minimal(5, 3)).unwrap_err().to_string(),
            "the version of the provided bytecode is unsupported"
        );
        assert_eq!(
            deserialise(&minimal(6, 2)).unwrap_err().to_string(),
            "the types version of the provided bytecode is unsupported"
        );
    }

    #[test]
    fn test_trailing_bytes() {
        let mut b = minimal(6, 3);
        b.push(0);
        assert_eq!(deserialise(&b).unwrap_err().to_string(), "deserialiser position mismatch");
    }

    #[test]
    fn test_truncated() {
        let b = minimal(6, 3);
        assert!(matches!(
            deserialise(&b[..b.len() - 3]),
            Err(DeserialiseError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn test_line_info() {
        // gap 0, deltas 1, 1 (running: 1, 2), one absolute sample of 10 per instruction
        let mut r_bytes = vec![0u8, 1, 1];
        r_bytes.extend_from_slice(&10u32.to_le_bytes());
        r_bytes.extend_from_slice(&0u32.to_le_bytes());
        let mut r = ByteReader::new(&r_bytes);
        assert_eq!(read_line_info(&mut r, 2).unwrap(), vec![11, 12]);
    }
}
