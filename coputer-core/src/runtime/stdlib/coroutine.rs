//! coroutine 库

use super::{new_lib, Args};
use crate::core::{TableRef, Value, VmError};
use crate::runtime::coroutine::{CoStatus, Coroutine};
use crate::runtime::function::{Flow, Function};
use crate::runtime::vm::Vm;

type R = Result<Vec<Value>, VmError>;

fn coroutine_close(_: &mut Vm, args: &mut Args) -> R {
    let co = args.coroutine()?;
    let status = co.borrow().status();
    if matches!(status, CoStatus::Running | CoStatus::Normal) {
        return Err(VmError::new("cannot close running coroutine"));
    }
    co.borrow_mut().close();
    Ok(vec![Value::Boolean(true)])
}

fn coroutine_create(_: &mut Vm, args: &mut Args) -> R {
    let f = args.function()?;
    Ok(vec![Value::Thread(Coroutine::new(f))])
}

fn coroutine_isyieldable(vm: &mut Vm, _: &mut Args) -> R {
    Ok(vec![Value::Boolean(vm.is_yieldable())])
}

/// 协程内的错误不向上传播，而是作为 `(false, message)` 返回
fn coroutine_resume(vm: &mut Vm, args: &mut Args) -> R {
    let co = args.coroutine()?;
    let rest = args.rest();

    match vm.resume(&co, rest) {
        Ok(resumed) => {
            let mut out = vec![Value::Boolean(true)];
            out.extend(resumed.into_values());
            Ok(out)
        }
        Err(VmError::Cancelled) => Err(VmError::Cancelled),
        Err(err) => Ok(vec![Value::Boolean(false), Value::from(err.to_string())]),
    }
}

fn coroutine_running(vm: &mut Vm, _: &mut Args) -> R {
    let current = vm.current_coroutine().cloned();
    Ok(vec![current.map(Value::Thread).unwrap_or_default()])
}

fn coroutine_status(_: &mut Vm, args: &mut Args) -> R {
    let co = args.coroutine()?;
    let status = co.borrow().status();
    Ok(vec![Value::from(status.as_str())])
}

/// 每次调用恢复一次内部协程；错误直接抛出
fn coroutine_wrap(_: &mut Vm, args: &mut Args) -> R {
    let co = Coroutine::new(args.function()?);
    let wrapped = Function::simple("wrap", move |vm, list| {
        Ok(vm.resume(&co, list)?.into_values())
    });
    Ok(vec![Value::function(wrapped)])
}

pub(super) fn lib() -> TableRef {
    let yield_fn = Function::native("yield", |_, list| Ok(Flow::Yield(list)));
    new_lib(
        &[
            ("close", coroutine_close),
            ("create", coroutine_create),
            ("isyieldable", coroutine_isyieldable),
            ("resume", coroutine_resume),
            ("running", coroutine_running),
            ("status", coroutine_status),
            ("wrap", coroutine_wrap),
        ],
        vec![("yield", Value::function(yield_fn))],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::env::Env;
    use crate::runtime::stdlib::make_fn;

    #[test]
    fn test_resume_native_body() {
        let mut vm = Vm::new(Env::default());
        let body = make_fn("body", |_, args| Ok(args.rest()));
        let co = Value::Thread(Coroutine::new(body));

        let out = coroutine_resume(&mut vm, &mut Args::new("resume", vec![co.clone(), Value::Number(1.0)])).unwrap();
        assert_eq!(out, vec![Value::Boolean(true), Value::Number(1.0)]);

        let out = coroutine_status(&mut vm, &mut Args::new("status", vec![co.clone()])).unwrap();
        assert_eq!(out, vec![Value::from("dead")]);

        let out = coroutine_resume(&mut vm, &mut Args::new("resume", vec![co])).unwrap();
        assert_eq!(
            out,
            vec![Value::Boolean(false), Value::from("cannot resume dead coroutine")]
        );
    }

    #[test]
    fn test_close_suspended() {
        let mut vm = Vm::new(Env::default());
        let co = Value::Thread(Coroutine::new(make_fn("body", |_, _| Ok(vec![]))));

        let out = coroutine_close(&mut vm, &mut Args::new("close", vec![co.clone()])).unwrap();
        assert_eq!(out, vec![Value::Boolean(true)]);
        let out = coroutine_status(&mut vm, &mut Args::new("status", vec![co])).unwrap();
        assert_eq!(out, vec![Value::from("dead")]);
    }

    #[test]
    fn test_wrap_reraises() {
        let mut vm = Vm::new(Env::default());
        let body = make_fn("body", |_, _| Err(VmError::new("boom")));
        let out = coroutine_wrap(&mut vm, &mut Args::new("wrap", vec![body])).unwrap();

        let err = vm.call_value(&out[0], vec![]).unwrap_err();
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_isyieldable_only_inside_nested_coroutine() {
        let mut vm = Vm::new(Env::default());
        let outer = make_fn("outer", |vm, _| {
            let mut out = coroutine_isyieldable(vm, &mut Args::new("isyieldable", vec![]))?;
            let inner = make_fn("inner", |vm, _| coroutine_isyieldable(vm, &mut Args::new("isyieldable", vec![])));
            let co = Value::Thread(Coroutine::new(inner));
            out.extend(coroutine_resume(vm, &mut Args::new("resume", vec![co]))?);
            Ok(out)
        });

        let root = Coroutine::new(outer);
        let out = vm.resume(&root, vec![]).unwrap().into_values();
        assert_eq!(out, vec![Value::Boolean(false), Value::Boolean(true), Value::Boolean(true)]);
        assert!(!vm.is_yieldable());
    }
}
