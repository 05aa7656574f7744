//! 解释循环

use super::call;
use super::operators::{self, ArithOp};
use super::{Exit, Vm};
use crate::binary::opcode::*;
use crate::binary::{Instruction, Konst};
use crate::core::{Value, VmError};

/// 运行直到帧栈回到 `base` 时返回或让出。
///
/// 出错时错误被定位到最内层帧，然后丢弃 `base` 以上的帧。
pub(crate) fn run(vm: &mut Vm, base: usize) -> Result<Exit, VmError> {
    loop {
        if !vm.is_alive() {
            vm.frames.truncate(base);
            return Err(VmError::Cancelled);
        }

        match step(vm) {
            Ok(None) => {}
            Ok(Some(exit)) => return Ok(exit),
            Err(err) => {
                let err = vm.locate(err);
                vm.frames.truncate(base);
                return Err(err);
            }
        }
    }
}

fn arith_op(op: u8) -> ArithOp {
    match op {
        ADD | ADDK => ArithOp::Add,
        SUB | SUBK | SUBRK => ArithOp::Sub,
        MUL | MULK => ArithOp::Mul,
        DIV | DIVK | DIVRK => ArithOp::Div,
        MOD | MODK => ArithOp::Mod,
        POW | POWK => ArithOp::Pow,
        _ => ArithOp::Idiv,
    }
}

fn for_number(v: &Value, what: &str) -> Result<f64, VmError> {
    v.as_number().ok_or_else(|| {
        VmError::new(format!(
            "invalid 'for' {} (number expected, got {})",
            what,
            v.type_name()
        ))
    })
}

/// 执行一条指令
fn step(vm: &mut Vm) -> Result<Option<Exit>, VmError> {
    let (closure, pc) = match vm.frames.last_mut() {
        Some(frame) => {
            frame.last_pc = frame.pc;
            (frame.closure.clone(), frame.pc)
        }
        None => return Ok(Some(Exit::Return(Vec::new()))),
    };
    let inst: &Instruction = closure
        .proto
        .code
        .get(pc)
        .ok_or_else(|| VmError::new("program counter out of range"))?;

    #[cfg(feature = "trace_execution")]
    tracing::trace!(target: "coputer::vm", pc, op = inst.info().map(|i| i.name).unwrap_or("?"), "step");

    let a = inst.a();

    // 需要 vm 的分支会重新取帧
    let Some(frame) = vm.frames.last_mut() else {
        return Ok(None);
    };

    match inst.op {
        NOP | COVERAGE => frame.jump(1),

        // ===== 常量加载 =====
        LOADNIL => {
            frame.set(a, Value::Nil);
            frame.jump(1);
        }
        LOADB => {
            frame.set(a, Value::Boolean(inst.b == 1));
            frame.jump(inst.c as i64 + 1);
        }
        LOADN => {
            frame.set(a, Value::Number(inst.d as f64));
            frame.jump(1);
        }
        LOADK => {
            frame.set(a, inst.k_value());
            frame.jump(1);
        }
        LOADKX => {
            frame.set(a, inst.k_value());
            frame.jump(2);
        }
        MOVE => {
            frame.set(a, frame.get(inst.b()));
            frame.jump(1);
        }

        // ===== 全局与 upvalue =====
        GETGLOBAL => {
            let key = inst.k_value();
            let value = vm.global(key.as_bytes().unwrap_or_default());
            if let Some(frame) = vm.frames.last_mut() {
                frame.set(a, value);
                frame.jump(2);
            }
        }
        SETGLOBAL => {
            let key = inst.k_value();
            let name = String::from_utf8_lossy(key.as_bytes().unwrap_or_default()).into_owned();
            if vm.builtins.globals.contains_key(name.as_bytes()) {
                return Err(VmError::new(format!("attempt to redefine global '{name}'")));
            }
            return Err(VmError::new(format!("attempt to set global '{name}'")));
        }
        GETUPVAL => {
            let value = closure
                .upvals
                .get(inst.b())
                .map(|uv| uv.borrow().get())
                .unwrap_or_default();
            frame.set(a, value);
            frame.jump(1);
        }
        SETUPVAL => {
            if let Some(uv) = closure.upvals.get(inst.b()) {
                uv.borrow_mut().set(frame.get(a));
            }
            frame.jump(1);
        }
        CLOSEUPVALS => {
            frame.close_upvals(a);
            frame.jump(1);
        }
        GETIMPORT => {
            let value = match &inst.k {
                Konst::Import(names) => call::import(vm, names)?,
                _ => Value::Nil,
            };
            if let Some(frame) = vm.frames.last_mut() {
                frame.set(a, value);
                frame.jump(2);
            }
        }

        // ===== 表访问 =====
        GETTABLE => {
            let value = operators::gettable(&frame.get(inst.b()), &frame.get(inst.c()))?;
            frame.set(a, value);
            frame.jump(1);
        }
        SETTABLE => {
            operators::settable(&frame.get(inst.b()), frame.get(inst.c()), frame.get(a))?;
            frame.jump(1);
        }
        GETTABLEKS => {
            let value = operators::gettable(&frame.get(inst.b()), &inst.k_value())?;
            frame.set(a, value);
            frame.jump(2);
        }
        SETTABLEKS => {
            operators::settable(&frame.get(inst.b()), inst.k_value(), frame.get(a))?;
            frame.jump(2);
        }
        GETTABLEN => {
            let key = Value::Number(inst.c as f64 + 1.0);
            let value = operators::gettable(&frame.get(inst.b()), &key)?;
            frame.set(a, value);
            frame.jump(1);
        }
        SETTABLEN => {
            let key = Value::Number(inst.c as f64 + 1.0);
            operators::settable(&frame.get(inst.b()), key, frame.get(a))?;
            frame.jump(1);
        }
        NEWTABLE => {
            frame.set(a, call::new_table());
            frame.jump(2);
        }
        DUPTABLE => {
            frame.set(a, call::new_table());
            frame.jump(1);
        }
        SETLIST => call::setlist(vm, inst)?,

        // ===== 闭包与调用 =====
        NEWCLOSURE => {
            let index = usize::try_from(inst.d)
                .ok()
                .and_then(|d| closure.proto.protos.get(d).copied())
                .ok_or_else(|| VmError::new("proto index out of range"))?;
            call::new_closure(vm, a, index)?;
        }
        DUPCLOSURE => {
            let Konst::Proto(index) = inst.k else {
                return Err(VmError::new("DUPCLOSURE constant is not a closure"));
            };
            call::new_closure(vm, a, index)?;
        }
        NAMECALL => call::namecall(vm, inst)?,
        CALL => return call::call(vm, a, inst.b(), inst.c),
        RETURN => return call::ret(vm, a, inst.b()),
        GETVARARGS => {
            let count = if inst.b == 0 {
                frame.varargs.len()
            } else {
                inst.b() - 1
            };
            frame.write(a, frame.varargs.clone(), count);
            if inst.b == 0 {
                frame.top = a + count;
            }
            frame.jump(1);
        }
        PREPVARARGS => frame.jump(1),

        // ===== 跳转 =====
        JUMP | JUMPBACK => frame.jump(inst.d as i64 + 1),
        JUMPX => frame.jump(inst.a as i64 + 1),
        JUMPIF => {
            let offset = if frame.get(a).is_truthy() { inst.d as i64 + 1 } else { 1 };
            frame.jump(offset);
        }
        JUMPIFNOT => {
            let offset = if frame.get(a).is_falsy() { inst.d as i64 + 1 } else { 1 };
            frame.jump(offset);
        }
        JUMPIFEQ | JUMPIFNOTEQ | JUMPIFLE | JUMPIFLT | JUMPIFNOTLE | JUMPIFNOTLT => {
            let ra = frame.get(a);
            let rb = frame.get(inst.aux as usize);
            let taken = match inst.op {
                JUMPIFEQ => ra == rb,
                JUMPIFNOTEQ => ra != rb,
                JUMPIFLE => operators::le(&ra, &rb)?,
                JUMPIFLT => operators::lt(&ra, &rb)?,
                JUMPIFNOTLE => operators::gt(&ra, &rb)?,
                _ => operators::ge(&ra, &rb)?,
            };
            frame.jump(if taken { inst.d as i64 + 1 } else { 2 });
        }
        JUMPXEQKNIL => {
            let taken = frame.get(a).is_nil() != inst.kn;
            frame.jump(if taken { inst.d as i64 + 1 } else { 2 });
        }
        JUMPXEQKB | JUMPXEQKN | JUMPXEQKS => {
            let taken = (frame.get(a) == inst.k_value()) != inst.kn;
            frame.jump(if taken { inst.d as i64 + 1 } else { 2 });
        }

        // ===== 算术 =====
        ADD | SUB | MUL | DIV | MOD | POW | IDIV => {
            let value = operators::arith(arith_op(inst.op), &frame.get(inst.b()), &frame.get(inst.c()))?;
            frame.set(a, value);
            frame.jump(1);
        }
        ADDK | SUBK | MULK | DIVK | MODK | POWK | IDIVK => {
            let value = operators::arith(arith_op(inst.op), &frame.get(inst.b()), &inst.k_value())?;
            frame.set(a, value);
            frame.jump(1);
        }
        SUBRK | DIVRK => {
            let value = operators::arith(arith_op(inst.op), &inst.k_value(), &frame.get(inst.c()))?;
            frame.set(a, value);
            frame.jump(1);
        }
        MINUS => {
            let value = operators::unm(&frame.get(inst.b()))?;
            frame.set(a, value);
            frame.jump(1);
        }

        // ===== 逻辑 =====
        AND | OR => {
            let rb = frame.get(inst.b());
            let pick_b = (inst.op == AND) == rb.is_falsy();
            frame.set(a, if pick_b { rb } else { frame.get(inst.c()) });
            frame.jump(1);
        }
        ANDK | ORK => {
            let rb = frame.get(inst.b());
            let pick_b = (inst.op == ANDK) == rb.is_falsy();
            frame.set(a, if pick_b { rb } else { inst.k_value() });
            frame.jump(1);
        }
        NOT => {
            frame.set(a, Value::Boolean(frame.get(inst.b()).is_falsy()));
            frame.jump(1);
        }

        // ===== 字符串与长度 =====
        CONCAT => {
            let values: Vec<Value> = (inst.b()..=inst.c()).map(|r| frame.get(r)).collect();
            frame.set(a, operators::concat(&values)?);
            frame.jump(1);
        }
        LENGTH => {
            let value = operators::length(&frame.get(inst.b()))?;
            frame.set(a, value);
            frame.jump(1);
        }

        // ===== 数值 for =====
        FORNPREP => {
            let init = for_number(&frame.get(a + 2), "initial value")?;
            let limit = for_number(&frame.get(a), "limit")?;
            let step = for_number(&frame.get(a + 1), "step")?;
            let skip = if step > 0.0 { init > limit } else { init < limit };
            frame.jump(if skip { inst.d as i64 + 1 } else { 1 });
        }
        FORNLOOP => {
            let limit = frame.get(a).as_number().unwrap_or_default();
            let step = frame.get(a + 1).as_number().unwrap_or_default();
            let init = frame.get(a + 2).as_number().unwrap_or_default() + step;
            frame.set(a + 2, Value::Number(init));
            let more = if step > 0.0 { init <= limit } else { init >= limit };
            frame.jump(if more { inst.d as i64 + 1 } else { 1 });
        }

        // ===== 泛型 for =====
        FORGPREP => call::forgprep(vm, inst.d),
        FORGPREP_INEXT | FORGPREP_NEXT => {
            let generator = frame.get(a);
            if !matches!(generator, Value::Function(_)) {
                return Err(VmError::new(format!(
                    "attempt to iterate over a {} value",
                    generator.type_name()
                )));
            }
            call::forgprep(vm, inst.d);
        }
        FORGLOOP => return call::forgloop(vm, inst),

        // ===== 快速调用 =====
        // 只是优化提示，后面总会跟着完整的 CALL
        FASTCALL | FASTCALL1 => frame.jump(1),
        FASTCALL2 | FASTCALL2K | FASTCALL3 => frame.jump(2),

        op => return Err(VmError::new(format!("unsupported opcode: {op}"))),
    }

    Ok(None)
}
