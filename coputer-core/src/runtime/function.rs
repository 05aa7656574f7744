//! 函数对象：原生函数与字节码闭包

use super::vm::Vm;
use crate::binary::{Module, Proto};
use crate::core::{Value, VmError};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// 原生函数的执行结果
#[derive(Debug)]
pub enum Flow {
    Return(Vec<Value>),
    /// `coroutine.yield`：把值交给 resume 的调用者
    Yield(Vec<Value>),
}

impl From<Vec<Value>> for Flow {
    fn from(values: Vec<Value>) -> Self {
        Flow::Return(values)
    }
}

pub type NativeBody = Rc<dyn Fn(&mut Vm, Vec<Value>) -> Result<Flow, VmError>>;

pub struct NativeFunction {
    pub name: &'static str,
    pub body: NativeBody,
}

/// 寄存器文件；开放的 upvalue 通过它引用外层栈槽
pub type Regs = Rc<RefCell<Vec<Value>>>;

pub type UpvalRef = Rc<RefCell<Upval>>;

/// upvalue：开放时指向某个栈槽，关闭后持有自己的值
pub enum Upval {
    Open { regs: Regs, index: usize },
    Closed(Value),
}

impl Upval {
    pub fn get(&self) -> Value {
        match self {
            Upval::Open { regs, index } => regs.borrow().get(*index).cloned().unwrap_or_default(),
            Upval::Closed(v) => v.clone(),
        }
    }

    pub fn set(&mut self, value: Value) {
        match self {
            Upval::Open { regs, index } => {
                let mut regs = regs.borrow_mut();
                if *index >= regs.len() {
                    regs.resize(*index + 1, Value::Nil);
                }
                regs[*index] = value;
            }
            Upval::Closed(v) => *v = value,
        }
    }

    /// 把引用的值拷贝进来
    pub fn close(&mut self) {
        if let Upval::Open { .. } = self {
            *self = Upval::Closed(self.get());
        }
    }
}

/// 一个已加载的脚本文件
pub struct Script {
    pub module: Rc<Module>,
    /// 不带扩展名的路径，`require` 相对于它解析
    pub filepath: String,
    /// 带扩展名的路径，用于错误消息
    pub dbgpath: String,
    /// 加载链上的祖先文件，用于检测循环依赖
    pub require_history: Vec<String>,
}

pub struct LuaClosure {
    pub proto: Rc<Proto>,
    pub script: Rc<Script>,
    pub upvals: Vec<UpvalRef>,
}

pub enum Function {
    Native(NativeFunction),
    Lua(Rc<LuaClosure>),
}

impl Function {
    pub fn native<F>(name: &'static str, body: F) -> Function
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Flow, VmError> + 'static,
    {
        Function::Native(NativeFunction {
            name,
            body: Rc::new(body),
        })
    }

    /// 只返回值、不会让出的原生函数
    pub fn simple<F>(name: &'static str, body: F) -> Function
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Vec<Value>, VmError> + 'static,
    {
        Function::native(name, move |vm, args| body(vm, args).map(Flow::Return))
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Native(n) => n.name,
            Function::Lua(c) => &c.proto.debug_name,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {}", self.name())
    }
}
