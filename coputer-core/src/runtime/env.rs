//! 宿主环境
//!
//! 加载前由宿主填充的全局变量。程序内部只读；内置库的名字优先于环境。

use super::function::Function;
use super::vm::Vm;
use crate::core::{Value, VmError};
use std::collections::HashMap;

#[derive(Clone, Default)]
pub struct Env {
    globals: HashMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// 添加一个原生函数
    pub fn add_fn<F>(&mut self, name: &'static str, f: F)
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Vec<Value>, VmError> + 'static,
    {
        self.set(name, Value::function(Function::simple(name, f)));
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}
