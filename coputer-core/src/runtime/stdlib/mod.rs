//! 标准库
//!
//! 每个库都是一个只读表。原生函数通过 `Args` 取参数，参数缺失或类型不符时
//! 返回与 Luau 一致的错误消息。

use super::function::Function;
use super::vm::Vm;
use crate::core::{BufferRef, CoroutineRef, Table, TableRef, Value, Vector, VmError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

mod args;
mod bit32;
mod buffer;
mod coroutine;
mod globals;
mod math;
pub mod pattern;
mod string;
mod table;
mod utf8;
mod vector;

// ===== 参数 =====

pub(crate) fn missing_arg(index: usize, func: &str, expected: Option<&str>) -> VmError {
    match expected {
        Some(t) => VmError::new(format!("missing argument #{index} to '{func}' ({t} expected)")),
        None => VmError::new(format!("missing argument #{index} to '{func}'")),
    }
}

pub(crate) fn invalid_arg_type(index: usize, func: &str, expected: &str, got: &str) -> VmError {
    VmError::new(format!(
        "invalid argument #{index} to '{func}' ({expected} expected, got {got})"
    ))
}

pub(crate) fn invalid_arg(index: usize, func: &str, message: &str) -> VmError {
    VmError::new(format!("invalid argument #{index} to '{func}' ({message})"))
}

/// 原生函数的参数列表，按顺序读取
pub struct Args {
    name: &'static str,
    list: Vec<Value>,
    pos: usize,
}

impl Args {
    pub fn new(name: &'static str, list: Vec<Value>) -> Self {
        Self { name, list, pos: 0 }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// 已读取的参数个数
    pub fn position(&self) -> usize {
        self.pos
    }

    fn advance(&mut self) -> Option<Value> {
        self.pos += 1;
        self.list.get(self.pos - 1).cloned()
    }

    fn typed<T>(
        &mut self,
        expected: &'static str,
        default: Option<T>,
        extract: impl Fn(&Value) -> Option<T>,
    ) -> Result<T, VmError> {
        let arg = self.advance();
        match (arg, default) {
            (None, Some(d)) | (Some(Value::Nil), Some(d)) => Ok(d),
            (None, None) => Err(missing_arg(self.pos, self.name, Some(expected))),
            (Some(v), _) => {
                extract(&v).ok_or_else(|| invalid_arg_type(self.pos, self.name, expected, v.type_name()))
            }
        }
    }

    pub fn any(&mut self) -> Result<Value, VmError> {
        self.advance()
            .ok_or_else(|| missing_arg(self.pos, self.name, None))
    }

    pub fn opt_any(&mut self) -> Value {
        self.advance().unwrap_or_default()
    }

    pub fn number(&mut self) -> Result<f64, VmError> {
        self.typed("number", None, Value::as_number)
    }

    pub fn opt_number(&mut self, default: f64) -> Result<f64, VmError> {
        self.typed("number", Some(default), Value::as_number)
    }

    pub fn string(&mut self) -> Result<Rc<[u8]>, VmError> {
        self.typed("string", None, string_of)
    }

    pub fn opt_string(&mut self, default: &[u8]) -> Result<Rc<[u8]>, VmError> {
        self.typed("string", Some(Rc::from(default)), string_of)
    }

    pub fn boolean(&mut self) -> Result<bool, VmError> {
        self.typed("boolean", None, bool_of)
    }

    pub fn opt_boolean(&mut self, default: bool) -> Result<bool, VmError> {
        self.typed("boolean", Some(default), bool_of)
    }

    pub fn table(&mut self) -> Result<TableRef, VmError> {
        self.typed("table", None, |v| v.as_table().cloned())
    }

    pub fn opt_table(&mut self) -> Result<Option<TableRef>, VmError> {
        self.typed("table", Some(None), |v| v.as_table().cloned().map(Some))
    }

    /// 函数参数保留为值，便于直接交给 `call_value`
    pub fn function(&mut self) -> Result<Value, VmError> {
        self.typed("function", None, |v| v.as_function().map(|_| v.clone()))
    }

    pub fn opt_function(&mut self) -> Result<Option<Value>, VmError> {
        self.typed("function", Some(None), |v| v.as_function().map(|_| Some(v.clone())))
    }

    pub fn coroutine(&mut self) -> Result<CoroutineRef, VmError> {
        self.typed("thread", None, |v| match v {
            Value::Thread(co) => Some(co.clone()),
            _ => None,
        })
    }

    pub fn buffer(&mut self) -> Result<BufferRef, VmError> {
        self.typed("buffer", None, |v| v.as_buffer().cloned())
    }

    pub fn vector(&mut self) -> Result<Vector, VmError> {
        self.typed("vector", None, vector_of)
    }

    /// 剩余的全部参数
    pub fn rest(&mut self) -> Vec<Value> {
        let rest = self.list.get(self.pos..).map(<[Value]>::to_vec).unwrap_or_default();
        self.pos = self.list.len();
        rest
    }
}

fn string_of(v: &Value) -> Option<Rc<[u8]>> {
    match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn bool_of(v: &Value) -> Option<bool> {
    match v {
        Value::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn vector_of(v: &Value) -> Option<Vector> {
    match v {
        Value::Vector(v) => Some(*v),
        _ => None,
    }
}

// ===== 库构造 =====

pub(crate) type LibFn = fn(&mut Vm, &mut Args) -> Result<Vec<Value>, VmError>;

pub(crate) fn make_fn(name: &'static str, f: LibFn) -> Value {
    Value::function(Function::simple(name, move |vm, list| {
        f(vm, &mut Args::new(name, list))
    }))
}

/// 由函数和常量组成的只读库表
pub(crate) fn new_lib(functions: &[(&'static str, LibFn)], constants: Vec<(&str, Value)>) -> TableRef {
    let mut t = Table::new();
    for &(name, f) in functions {
        t.set_str(name, make_fn(name, f));
    }
    for (name, v) in constants {
        t.set_str(name, v);
    }
    t.freeze();
    Rc::new(RefCell::new(t))
}

/// 所有内置全局名字
pub(crate) struct Builtins {
    pub globals: HashMap<Vec<u8>, Value>,
    /// 字符串方法查找使用
    pub string: TableRef,
    /// FORGLOOP 用它识别 `pairs` 迭代
    pub next: Rc<Function>,
}

pub(crate) fn builtins() -> Builtins {
    let string = string::lib();
    let next = globals::next_fn();

    let mut names: HashMap<Vec<u8>, Value> = HashMap::new();
    let mut add = |name: &str, v: Value| {
        names.insert(name.as_bytes().to_vec(), v);
    };

    add("string", Value::Table(string.clone()));
    add("table", Value::Table(table::lib()));
    add("math", Value::Table(math::lib()));
    add("bit32", Value::Table(bit32::lib()));
    add("buffer", Value::Table(buffer::lib()));
    add("coroutine", Value::Table(coroutine::lib()));
    add("utf8", Value::Table(utf8::lib()));
    add("vector", Value::Table(vector::lib()));
    for (name, v) in globals::functions(&next) {
        add(name, v);
    }
    add("_VERSION", Value::from("Luau"));
    add("args", Value::Table(args::lib()));

    Builtins {
        globals: names,
        string,
        next,
    }
}
