//! 运算符与索引
//!
//! 算术、比较、连接、长度和表索引。所有错误消息都以运算对象的类型名描述。

use crate::core::{Value, Vector, VmError};

/// 二元算术运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Idiv,
}

impl ArithOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Mod => "mod",
            ArithOp::Pow => "pow",
            ArithOp::Idiv => "idiv",
        }
    }
}

// ===== 错误消息 =====

pub fn uncallable(v: &Value) -> VmError {
    VmError::new(format!("attempt to call a {} value", v.type_name()))
}

pub fn invalid_index(type_name: &str, key: &Value) -> VmError {
    match key {
        Value::String(s) => VmError::new(format!(
            "attempt to index {} with '{}'",
            type_name,
            String::from_utf8_lossy(s)
        )),
        other => VmError::new(format!("attempt to index {} with {}", type_name, other.type_name())),
    }
}

fn invalid_arith(op: ArithOp, a: &Value, b: &Value) -> VmError {
    VmError::new(format!(
        "attempt to perform arithmetic ({}) on {} and {}",
        op.name(),
        a.type_name(),
        b.type_name()
    ))
}

fn invalid_compare(op: &str, a: &Value, b: &Value) -> VmError {
    VmError::new(format!(
        "attempt to compare {} {} {}",
        a.type_name(),
        op,
        b.type_name()
    ))
}

// ===== 算术 =====

/// Lua 的取模：结果与除数同号
pub fn lua_mod(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

fn lanes(v: Vector, f: impl Fn(f32) -> f32) -> Vector {
    [f(v[0]), f(v[1]), f(v[2]), f(v[3])]
}

fn zip(a: Vector, b: Vector, f: impl Fn(f32, f32) -> f32) -> Vector {
    [f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2]), f(a[3], b[3])]
}

pub fn arith(op: ArithOp, a: &Value, b: &Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (*x, *y);
            Ok(Value::Number(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Mod => lua_mod(x, y),
                ArithOp::Pow => x.powf(y),
                ArithOp::Idiv => (x / y).floor(),
            }))
        }
        (Value::Vector(x), Value::Vector(y)) => {
            let (x, y) = (*x, *y);
            let v = match op {
                ArithOp::Add => zip(x, y, |p, q| p + q),
                ArithOp::Sub => zip(x, y, |p, q| p - q),
                ArithOp::Mul => zip(x, y, |p, q| p * q),
                ArithOp::Div => zip(x, y, |p, q| p / q),
                ArithOp::Idiv => zip(x, y, |p, q| (p / q).floor()),
                ArithOp::Mod | ArithOp::Pow => return Err(invalid_arith(op, a, b)),
            };
            Ok(Value::Vector(v))
        }
        (Value::Vector(x), Value::Number(y)) => {
            let (x, y) = (*x, *y as f32);
            let v = match op {
                ArithOp::Mul => lanes(x, |p| p * y),
                ArithOp::Div => lanes(x, |p| p / y),
                ArithOp::Idiv => lanes(x, |p| (p / y).floor()),
                _ => return Err(invalid_arith(op, a, b)),
            };
            Ok(Value::Vector(v))
        }
        (Value::Number(x), Value::Vector(y)) => {
            let (x, y) = (*x as f32, *y);
            let v = match op {
                ArithOp::Mul => lanes(y, |q| x * q),
                ArithOp::Div => lanes(y, |q| x / q),
                ArithOp::Idiv => lanes(y, |q| (x / q).floor()),
                _ => return Err(invalid_arith(op, a, b)),
            };
            Ok(Value::Vector(v))
        }
        _ => Err(invalid_arith(op, a, b)),
    }
}

pub fn unm(a: &Value) -> Result<Value, VmError> {
    match a {
        Value::Number(n) => Ok(Value::Number(-n)),
        Value::Vector(v) => Ok(Value::Vector(lanes(*v, |p| -p))),
        other => Err(VmError::new(format!(
            "attempt to perform arithmetic (unm) on {}",
            other.type_name()
        ))),
    }
}

// ===== 比较 =====

fn compare<F, G>(op: &str, a: &Value, b: &Value, num: F, bytes: G) -> Result<bool, VmError>
where
    F: Fn(f64, f64) -> bool,
    G: Fn(&[u8], &[u8]) -> bool,
{
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(num(*x, *y)),
        (Value::String(x), Value::String(y)) => Ok(bytes(x, y)),
        _ => Err(invalid_compare(op, a, b)),
    }
}

pub fn lt(a: &Value, b: &Value) -> Result<bool, VmError> {
    compare("<", a, b, |x, y| x < y, |x, y| x < y)
}

pub fn le(a: &Value, b: &Value) -> Result<bool, VmError> {
    compare("<=", a, b, |x, y| x <= y, |x, y| x <= y)
}

pub fn gt(a: &Value, b: &Value) -> Result<bool, VmError> {
    compare(">", a, b, |x, y| x > y, |x, y| x > y)
}

pub fn ge(a: &Value, b: &Value) -> Result<bool, VmError> {
    compare(">=", a, b, |x, y| x >= y, |x, y| x >= y)
}

// ===== 字符串与长度 =====

/// 按从左到右的顺序连接，只接受字符串
///
/// 首项出错时报告 (首项, 次项)，其余报告 (前一项, 出错项)。
pub fn concat(values: &[Value]) -> Result<Value, VmError> {
    let mut out = Vec::new();
    for (n, v) in values.iter().enumerate() {
        match v {
            Value::String(s) => out.extend_from_slice(s),
            _ => {
                let (left, right) = match (n, values.get(n + 1)) {
                    (0, Some(next)) => (v, next),
                    (0, None) => (v, v),
                    _ => (&values[n - 1], v),
                };
                return Err(VmError::new(format!(
                    "attempt to concatenate {} with {}",
                    left.type_name(),
                    right.type_name()
                )));
            }
        }
    }
    Ok(Value::string(out))
}

pub fn length(v: &Value) -> Result<Value, VmError> {
    match v {
        Value::Table(t) => Ok(Value::Number(t.borrow().len() as f64)),
        Value::String(s) => Ok(Value::Number(s.len() as f64)),
        other => Err(VmError::new(format!(
            "attempt to get length of a {} value",
            other.type_name()
        ))),
    }
}

// ===== 索引 =====

pub fn gettable(obj: &Value, key: &Value) -> Result<Value, VmError> {
    match obj {
        Value::Table(t) => Ok(t.borrow().get(key)),
        Value::Vector(v) => vector_field(v, key).ok_or_else(|| invalid_index("vector", key)),
        other => Err(invalid_index(other.type_name(), key)),
    }
}

pub fn settable(obj: &Value, key: Value, value: Value) -> Result<(), VmError> {
    match obj {
        Value::Table(t) => Ok(t.borrow_mut().set(key, value)?),
        other => Err(invalid_index(other.type_name(), &key)),
    }
}

/// 向量的分量访问：`v.x`、`v.Y` 等
fn vector_field(v: &Vector, key: &Value) -> Option<Value> {
    let name = key.as_bytes()?;
    let lane = match name {
        b"x" | b"X" => 0,
        b"y" | b"Y" => 1,
        b"z" | b"Z" => 2,
        _ => return None,
    };
    Some(Value::Number(v[lane] as f64))
}
