//! 调用、返回与闭包

use super::operators::{invalid_index, uncallable};
use super::{Dest, Exit, ReturnTo, Vm};
use crate::binary::opcode::CAPTURE;
use crate::binary::{Instruction, Konst};
use crate::core::{Table, TableError, Value, VmError};
use crate::runtime::function::{Flow, Function, LuaClosure, Upval, UpvalRef};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// 把结果写回目标位置
pub(crate) fn deliver(vm: &mut Vm, dest: Dest, values: Vec<Value>) {
    let Some(frame) = vm.frames.last_mut() else {
        return;
    };

    match dest {
        Dest::Call { a, c } => {
            if c == 0 {
                let n = values.len();
                frame.write(a, values, n);
                frame.top = a + n;
            } else {
                frame.write(a, values, c as usize - 1);
            }
        }
        Dest::ForGLoop { a, res, d } => {
            frame.write(a + 3, values, res);
            let first = frame.get(a + 3);
            if first.is_nil() {
                frame.jump(2);
            } else {
                frame.set(a + 2, first);
                frame.jump(d as i64 + 1);
            }
        }
    }
}

/// 调用任意值；字节码函数压入新帧，原生函数立即执行
pub(crate) fn invoke(vm: &mut Vm, f: Value, args: Vec<Value>, dest: Dest) -> Result<Option<Exit>, VmError> {
    let func = match &f {
        Value::Function(func) => func.clone(),
        other => return Err(uncallable(other)),
    };

    match &*func {
        Function::Lua(closure) => {
            vm.push_frame(closure.clone(), args, ReturnTo::Caller(dest))?;
            Ok(None)
        }
        Function::Native(native) => {
            let body = native.body.clone();
            match body(vm, args)? {
                Flow::Return(values) => {
                    deliver(vm, dest, values);
                    Ok(None)
                }
                Flow::Yield(values) => {
                    if vm.native_depth > 0 {
                        return Err(VmError::new("attempt to yield across a native call boundary"));
                    }
                    if let Some(frame) = vm.frames.last_mut() {
                        frame.resume_dest = Some(dest);
                    }
                    Ok(Some(Exit::Yield(values)))
                }
            }
        }
    }
}

pub(crate) fn call(vm: &mut Vm, a: usize, b: usize, c: u8) -> Result<Option<Exit>, VmError> {
    let Some(frame) = vm.frames.last_mut() else {
        return Ok(None);
    };

    let f = frame.get(a);
    let nargs = if b == 0 {
        frame.top.saturating_sub(a + 1)
    } else {
        b - 1
    };
    let args = (0..nargs).map(|n| frame.get(a + 1 + n)).collect();
    frame.jump(1);

    invoke(vm, f, args, Dest::Call { a, c })
}

pub(crate) fn ret(vm: &mut Vm, a: usize, b: usize) -> Result<Option<Exit>, VmError> {
    let Some(mut frame) = vm.frames.pop() else {
        return Ok(Some(Exit::Return(Vec::new())));
    };

    let n = if b == 0 { frame.top.saturating_sub(a) } else { b - 1 };
    let values = (0..n).map(|i| frame.get(a + i)).collect();
    frame.close_upvals(0);

    match frame.ret {
        ReturnTo::Caller(dest) => {
            deliver(vm, dest, values);
            Ok(None)
        }
        ReturnTo::Native | ReturnTo::Base => Ok(Some(Exit::Return(values))),
    }
}

/// NEWCLOSURE / DUPCLOSURE：按其后的 CAPTURE 伪指令捕获 upvalue
pub(crate) fn new_closure(vm: &mut Vm, a: usize, proto_index: usize) -> Result<(), VmError> {
    let Some(frame) = vm.frames.last_mut() else {
        return Ok(());
    };

    let parent = frame.closure.clone();
    let proto = parent
        .script
        .module
        .proto(proto_index)
        .cloned()
        .ok_or_else(|| VmError::new(format!("proto index {proto_index} out of range")))?;

    let nups = proto.num_upvalues as usize;
    let regs = frame.regs.clone();
    let mut upvals: Vec<UpvalRef> = Vec::with_capacity(nups);
    for n in 0..nups {
        let capture = parent
            .proto
            .code
            .get(frame.pc + 1 + n)
            .filter(|inst| inst.op == CAPTURE)
            .ok_or_else(|| VmError::new("malformed closure captures"))?;
        let slot = capture.b();

        let upval = match capture.a {
            // 值捕获
            0 => Rc::new(RefCell::new(Upval::Closed(frame.get(slot)))),
            // 引用捕获：同一栈槽共享同一个 upvalue
            1 => frame
                .open_upvals
                .entry(slot)
                .or_insert_with(|| {
                    Rc::new(RefCell::new(Upval::Open {
                        regs: regs.clone(),
                        index: slot,
                    }))
                })
                .clone(),
            // 沿用外层闭包的 upvalue
            2 => parent
                .upvals
                .get(slot)
                .cloned()
                .ok_or_else(|| VmError::new("malformed closure captures"))?,
            mode => return Err(VmError::new(format!("unknown capture type {mode}"))),
        };
        upvals.push(upval);
    }

    let closure = LuaClosure {
        proto,
        script: parent.script.clone(),
        upvals,
    };
    frame.set(a, Value::Function(Rc::new(Function::Lua(Rc::new(closure)))));
    frame.jump(1 + nups as i64);
    Ok(())
}

/// NAMECALL：查找方法，并把接收者放到 A+1
pub(crate) fn namecall(vm: &mut Vm, inst: &Instruction) -> Result<(), VmError> {
    let key = inst.k_value();
    let string_lib = vm.string_lib().clone();
    let Some(frame) = vm.frames.last_mut() else {
        return Ok(());
    };

    let a = inst.a();
    let object = frame.get(inst.b());
    let (method, kind) = match &object {
        Value::Table(t) => (t.borrow().get(&key), "table"),
        Value::String(_) => (string_lib.borrow().get(&key), "string"),
        other => return Err(invalid_index(other.type_name(), &key)),
    };
    if method.is_nil() {
        return Err(VmError::new(format!(
            "attempt to call missing method '{}' of {}",
            String::from_utf8_lossy(key.as_bytes().unwrap_or_default()),
            kind
        )));
    }

    frame.set(a + 1, object);
    frame.set(a, method);
    frame.jump(2);
    Ok(())
}

/// FORGLOOP：表直接迭代或内置 `next` 走快照，其它函数按普通调用处理
pub(crate) fn forgloop(vm: &mut Vm, inst: &Instruction) -> Result<Option<Exit>, VmError> {
    let a = inst.a();
    let res = match inst.k {
        Konst::Count(n) => n as usize,
        _ => 2,
    };
    let d = inst.d;
    let next_fn = vm.builtins.next.clone();

    let Some(frame) = vm.frames.last_mut() else {
        return Ok(None);
    };
    let pc = frame.pc;
    let generator = frame.get(a);

    let snapshot_of = match &generator {
        Value::Table(t) => Some(t.clone()),
        Value::Function(f) if Rc::ptr_eq(f, &next_fn) => match frame.get(a + 1) {
            Value::Table(t) => Some(t),
            _ => None,
        },
        Value::Function(_) => None,
        other => {
            return Err(VmError::new(format!(
                "attempt to iterate over a {} value",
                other.type_name()
            )))
        }
    };

    let Some(table) = snapshot_of else {
        let args = vec![frame.get(a + 1), frame.get(a + 2)];
        return invoke(vm, generator, args, Dest::ForGLoop { a, res, d });
    };

    let pending = frame
        .iterators
        .entry(pc)
        .or_insert_with(|| VecDeque::from(table.borrow().iter()));

    match pending.pop_front() {
        Some((k, v)) => {
            frame.write(a + 3, vec![k.clone(), v], res);
            frame.set(a + 2, k);
            frame.jump(d as i64 + 1);
        }
        None => {
            frame.iterators.remove(&pc);
            frame.jump(2);
        }
    }
    Ok(None)
}

/// FORGPREP*：清除目标 FORGLOOP 上残留的快照（上一次循环可能被 break 提前结束）
pub(crate) fn forgprep(vm: &mut Vm, d: i32) {
    if let Some(frame) = vm.frames.last_mut() {
        frame.jump(d as i64 + 1);
        let target = frame.pc;
        frame.iterators.remove(&target);
    }
}

/// SETLIST：把寄存器 B.. 写入表的数组部分，从 AUX 开始
pub(crate) fn setlist(vm: &mut Vm, inst: &Instruction) -> Result<(), VmError> {
    let Some(frame) = vm.frames.last_mut() else {
        return Ok(());
    };

    let b = inst.b();
    let count = if inst.c == 0 {
        frame.top.saturating_sub(b)
    } else {
        inst.c() - 1
    };

    let target = frame.get(inst.a());
    let Value::Table(t) = &target else {
        return Err(invalid_index(target.type_name(), &Value::Number(inst.aux as f64)));
    };
    let mut t = t.borrow_mut();
    if t.is_readonly() {
        return Err(TableError::Readonly.into());
    }
    let start = inst.aux as usize;
    for n in 0..count {
        t.set_int(start + n, frame.get(b + n));
    }
    drop(t);

    frame.jump(2);
    Ok(())
}

/// GETIMPORT：从全局开始逐段索引
pub(crate) fn import(vm: &Vm, names: &[Rc<[u8]>]) -> Result<Value, VmError> {
    let Some((first, rest)) = names.split_first() else {
        return Ok(Value::Nil);
    };

    let mut value = vm.global(first);
    for name in rest {
        value = match &value {
            Value::Table(t) => t.borrow().get(&Value::String(name.clone())),
            other => return Err(invalid_index(other.type_name(), &Value::String(name.clone()))),
        };
    }
    Ok(value)
}

/// NEWTABLE / DUPTABLE
pub(crate) fn new_table() -> Value {
    Value::table(Table::new())
}
