//! 反序列化后的模块数据

use super::opcode::{self, OpInfo};
use crate::core::Value;
use std::rc::Rc;

/// 加载时解析好的 K 操作数
#[derive(Clone, Debug, Default)]
pub enum Konst {
    #[default]
    None,
    Value(Value),
    /// 闭包常量：模块级 proto 下标
    Proto(usize),
    /// GETIMPORT 的 1..3 段名字
    Import(Rc<[Rc<[u8]>]>),
    /// FORGLOOP 的变量个数
    Count(u8),
}

/// 一条指令。带 AUX 的指令后面跟一条占位指令，使下标与字对齐。
#[derive(Clone, Debug, Default)]
pub struct Instruction {
    pub op: u8,
    /// 模式 5 下保存有符号的 E
    pub a: i32,
    pub b: u8,
    pub c: u8,
    pub d: i32,
    pub aux: u32,
    pub k: Konst,
    /// JUMPXEQK* 的取反标志
    pub kn: bool,
}

impl Instruction {
    pub fn info(&self) -> Option<&'static OpInfo> {
        opcode::info(self.op)
    }

    pub fn a(&self) -> usize {
        self.a as usize
    }

    pub fn b(&self) -> usize {
        self.b as usize
    }

    pub fn c(&self) -> usize {
        self.c as usize
    }

    /// K 作为值；非值常量视为 nil
    pub fn k_value(&self) -> Value {
        match &self.k {
            Konst::Value(v) => v.clone(),
            _ => Value::Nil,
        }
    }
}

/// 字节码函数原型
#[derive(Debug, Default)]
pub struct Proto {
    pub max_stack: u8,
    pub num_params: u8,
    pub num_upvalues: u8,
    pub is_vararg: bool,
    pub code: Vec<Instruction>,
    /// 子函数对应的模块级 proto 下标
    pub protos: Vec<usize>,
    /// 每条指令的源码行；没有行信息时为空
    pub lines: Vec<u32>,
    pub debug_name: String,
}

impl Proto {
    pub fn line_at(&self, pc: usize) -> u32 {
        self.lines.get(pc).copied().unwrap_or(0)
    }
}

/// 一个字节码模块：全部 proto 和入口下标
#[derive(Debug)]
pub struct Module {
    pub protos: Vec<Rc<Proto>>,
    pub main: usize,
}

impl Module {
    pub fn main_proto(&self) -> &Rc<Proto> {
        &self.protos[self.main]
    }

    pub fn proto(&self, index: usize) -> Option<&Rc<Proto>> {
        self.protos.get(index)
    }
}
