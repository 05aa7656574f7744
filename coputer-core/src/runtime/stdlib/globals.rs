//! 全局函数

use super::{make_fn, Args};
use crate::core::{str2num, Value, VmError};
use crate::runtime::function::Function;
use crate::runtime::require;
use crate::runtime::vm::Vm;
use std::rc::Rc;

// ===== 迭代 =====

fn ipairs_iter(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let i = args.number()? + 1.0;

    let v = t.borrow().get(&Value::Number(i));
    if v.is_nil() {
        return Ok(vec![]);
    }
    Ok(vec![Value::Number(i), v])
}

fn global_ipairs(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    Ok(vec![
        make_fn("ipairs", ipairs_iter),
        Value::Table(t),
        Value::Number(0.0),
    ])
}

fn global_next(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let key = args.opt_any();

    let next = t.borrow().next(&key);
    Ok(match next {
        Some((k, v)) => vec![k, v],
        None => vec![Value::Nil],
    })
}

/// 内置 `next`；`pairs` 返回同一个函数对象
pub(super) fn next_fn() -> Rc<Function> {
    Rc::new(Function::simple("next", |vm, list| {
        global_next(vm, &mut Args::new("next", list))
    }))
}

// ===== 转换 =====

fn global_tonumber(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let value = args.any()?;
    let radix = args.opt_number(10.0)?;

    let converted = match &value {
        Value::Number(n) if radix == 10.0 => Some(*n),
        Value::String(s) if (2.0..=36.0).contains(&radix) => str2num(s, radix as u32),
        _ => None,
    };
    Ok(vec![converted.map(Value::Number).unwrap_or_default()])
}

fn global_tostring(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let value = args.any()?;
    Ok(vec![Value::String(value.to_lua_string())])
}

fn global_type(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let value = args.any()?;
    Ok(vec![Value::from(value.type_name())])
}

// ===== 模块 =====

fn global_require(vm: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let name = args.string()?;
    let module = require::require(vm, &String::from_utf8_lossy(&name))?;
    Ok(vec![module])
}

pub(super) fn functions(next: &Rc<Function>) -> Vec<(&'static str, Value)> {
    let next = Value::Function(next.clone());
    let pairs = {
        let next = next.clone();
        Value::function(Function::simple("pairs", move |_, list| {
            let t = Args::new("pairs", list).table()?;
            Ok(vec![next.clone(), Value::Table(t)])
        }))
    };

    vec![
        ("ipairs", make_fn("ipairs", global_ipairs)),
        ("next", next),
        ("pairs", pairs),
        ("tonumber", make_fn("tonumber", global_tonumber)),
        ("tostring", make_fn("tostring", global_tostring)),
        ("type", make_fn("type", global_type)),
        ("typeof", make_fn("typeof", global_type)),
        ("require", make_fn("require", global_require)),
    ]
}
