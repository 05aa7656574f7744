//! 值类型
//!
//! VM 中的九种值。堆上的值（表、函数、协程、缓冲区）按身份比较，
//! 其余按值比较。

use super::number::num2str;
use super::table::Table;
use crate::runtime::coroutine::Coroutine;
use crate::runtime::function::Function;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// 四个 f32 分量（x, y, z, w）
pub type Vector = [f32; 4];

pub type TableRef = Rc<RefCell<Table>>;
pub type CoroutineRef = Rc<RefCell<Coroutine>>;
pub type BufferRef = Rc<RefCell<Vec<u8>>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    Vector(Vector),
    String(Rc<[u8]>),
    Table(TableRef),
    Function(Rc<Function>),
    Thread(CoroutineRef),
    Buffer(BufferRef),
}

impl Value {
    // ===== 构造 =====

    pub fn string(s: impl AsRef<[u8]>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn table(t: Table) -> Value {
        Value::Table(Rc::new(RefCell::new(t)))
    }

    pub fn buffer(bytes: Vec<u8>) -> Value {
        Value::Buffer(Rc::new(RefCell::new(bytes)))
    }

    pub fn function(f: Function) -> Value {
        Value::Function(Rc::new(f))
    }

    // ===== 类型查询 =====

    /// `type()` 返回的类型名
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::Vector(_) => "vector",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Thread(_) => "thread",
            Value::Buffer(_) => "buffer",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// nil 和 false 为假，其余（包括 0 和空串）为真
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn is_falsy(&self) -> bool {
        !self.is_truthy()
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&BufferRef> {
        match self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    // ===== 字符串化 =====

    /// `tostring()` 的字节结果；字符串原样返回
    pub fn to_lua_string(&self) -> Rc<[u8]> {
        match self {
            Value::String(s) => s.clone(),
            other => Rc::from(other.to_string().as_bytes()),
        }
    }

    /// 用于哈希部分确定性排序的键
    pub(crate) fn sort_key(&self) -> Vec<u8> {
        match self {
            Value::String(s) => s.to_vec(),
            other => other.to_string().into_bytes(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => Rc::ptr_eq(a, b),
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", num2str(*n)),
            Value::Vector(v) => write!(
                f,
                "{}, {}, {}",
                num2str(v[0] as f64),
                num2str(v[1] as f64),
                num2str(v[2] as f64)
            ),
            Value::String(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            Value::Table(_) => write!(f, "table"),
            Value::Function(func) => write!(f, "function: {}", func.name()),
            Value::Thread(_) => write!(f, "thread"),
            Value::Buffer(_) => write!(f, "buffer"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            other => write!(f, "{other}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::String(Rc::from(bytes))
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Value::Vector(v)
    }
}

/// 哈希部分的键：数字按值（-0 与 0 相同），堆对象按地址
#[derive(Clone, Debug)]
pub(crate) struct Key(pub Value);

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Nil => {}
            Value::Boolean(b) => b.hash(state),
            Value::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state)
            }
            Value::Vector(v) => {
                for lane in v {
                    let lane = if *lane == 0.0 { 0.0f32 } else { *lane };
                    lane.to_bits().hash(state);
                }
            }
            Value::String(s) => s.hash(state),
            Value::Table(t) => (Rc::as_ptr(t) as *const () as usize).hash(state),
            Value::Function(func) => (Rc::as_ptr(func) as *const () as usize).hash(state),
            Value::Thread(co) => (Rc::as_ptr(co) as *const () as usize).hash(state),
            Value::Buffer(b) => (Rc::as_ptr(b) as *const () as usize).hash(state),
        }
    }
}
