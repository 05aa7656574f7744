//! 虚拟机实现
//!
//! 寄存器式解释器。字节码函数之间的调用不占用 Rust 栈：每次调用压入一个 `Frame`，
//! 返回时按 `ReturnTo` 把结果交回调用者。只有原生函数回调字节码（`call_value`）
//! 和恢复协程（`resume`）会嵌套一层解释循环。

use super::compiler::{Compiled, ModuleLoader};
use super::coroutine::Coroutine;
use super::env::Env;
use super::function::{Flow, Function, LuaClosure, Regs, Script, UpvalRef};
use super::stdlib::{self, Builtins};
use crate::core::{CoroutineRef, TableRef, Value, VmError};
use crate::program::ProgramArgs;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// 子模块
mod call;
mod execution;
pub(crate) mod operators;

/// 调用帧上限（字节码递归）
pub const MAX_FRAMES: usize = 20_000;
/// 原生函数与协程嵌套上限（Rust 递归）
pub const MAX_NATIVE_DEPTH: usize = 120;

/// 取消句柄：清除活性标志后，解释器在下一次迭代返回 `Cancelled`
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        !self.0.load(Ordering::SeqCst)
    }
}

/// 结果写回的位置
#[derive(Clone, Copy, Debug)]
pub(crate) enum Dest {
    /// CALL：从 A 开始写 C-1 个结果（C 为 0 时全部写入并设置 top）
    Call { a: usize, c: u8 },
    /// FORGLOOP 的迭代函数：结果写到 A+3，然后决定继续还是退出
    ForGLoop { a: usize, res: usize, d: i32 },
}

/// 帧返回时的去向
#[derive(Clone, Copy, Debug)]
pub(crate) enum ReturnTo {
    Caller(Dest),
    /// 由 `call_value` 启动，返回到原生代码
    Native,
    /// 协程主体
    Base,
}

pub(crate) struct Frame {
    pub closure: Rc<LuaClosure>,
    pub pc: usize,
    /// 当前正在执行的指令，用于错误定位
    pub last_pc: usize,
    pub regs: Regs,
    pub varargs: Vec<Value>,
    pub top: usize,
    pub open_upvals: BTreeMap<usize, UpvalRef>,
    /// 以 FORGLOOP 位置为键的表迭代快照
    pub iterators: HashMap<usize, VecDeque<(Value, Value)>>,
    pub ret: ReturnTo,
    /// 在此帧中让出时，恢复值写回的位置
    pub resume_dest: Option<Dest>,
}

impl Frame {
    pub fn get(&self, r: usize) -> Value {
        self.regs.borrow().get(r).cloned().unwrap_or_default()
    }

    pub fn set(&self, r: usize, v: Value) {
        let mut regs = self.regs.borrow_mut();
        if r >= regs.len() {
            regs.resize(r + 1, Value::Nil);
        }
        regs[r] = v;
    }

    /// 从 start 开始写入 count 个值，不足补 nil
    pub fn write(&self, start: usize, values: Vec<Value>, count: usize) {
        let mut values = values.into_iter();
        for n in 0..count {
            self.set(start + n, values.next().unwrap_or_default());
        }
    }

    pub fn jump(&mut self, offset: i64) {
        self.pc = (self.pc as i64 + offset).max(0) as usize;
    }

    /// 关闭下标 >= from 的开放 upvalue
    pub fn close_upvals(&mut self, from: usize) {
        for (_, uv) in self.open_upvals.split_off(&from) {
            uv.borrow_mut().close();
        }
    }
}

/// 解释循环的出口
pub(crate) enum Exit {
    Return(Vec<Value>),
    Yield(Vec<Value>),
}

/// 一次 resume 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Resumed {
    Returned(Vec<Value>),
    Yielded(Vec<Value>),
}

impl Resumed {
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Resumed::Returned(v) | Resumed::Yielded(v) => v,
        }
    }
}

/// 一次程序运行的全部状态
pub struct Vm {
    pub(crate) frames: Vec<Frame>,
    pub(crate) current: Option<CoroutineRef>,
    /// 最外层被恢复的协程，即程序主体
    pub(crate) root: Option<CoroutineRef>,
    /// 当前协程内原生函数嵌套的层数；大于 0 时不能让出
    pub(crate) native_depth: usize,
    /// Rust 递归深度
    pub(crate) c_depth: usize,
    pub(crate) builtins: Builtins,
    pub(crate) env: Env,
    pub(crate) loader: Option<Box<dyn ModuleLoader>>,
    pub(crate) require_cache: HashMap<String, Value>,
    pub(crate) alive: Arc<AtomicBool>,
    pub(crate) program_args: ProgramArgs,
}

impl Vm {
    pub fn new(env: Env) -> Self {
        Self {
            frames: Vec::new(),
            current: None,
            root: None,
            native_depth: 0,
            c_depth: 0,
            builtins: stdlib::builtins(),
            env,
            loader: None,
            require_cache: HashMap::new(),
            alive: Arc::new(AtomicBool::new(true)),
            program_args: ProgramArgs::None,
        }
    }

    /// 设置 `require` 使用的加载器
    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_program_args(mut self, args: ProgramArgs) -> Self {
        self.program_args = args;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.alive.clone())
    }

    pub fn program_args(&self) -> &ProgramArgs {
        &self.program_args
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// 当前运行的协程
    pub fn current_coroutine(&self) -> Option<&CoroutineRef> {
        self.current.as_ref()
    }

    /// 当前是否在程序主体之外的协程里
    pub fn is_yieldable(&self) -> bool {
        match (&self.current, &self.root) {
            (Some(current), Some(root)) => !Rc::ptr_eq(current, root),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// 把模块包装成一个尚未启动的协程
    pub fn load(&mut self, compiled: Compiled) -> CoroutineRef {
        self.load_with_history(compiled, Vec::new())
    }

    pub(crate) fn load_with_history(&mut self, compiled: Compiled, require_history: Vec<String>) -> CoroutineRef {
        let proto = compiled.module.main_proto().clone();
        let script = Rc::new(Script {
            module: compiled.module,
            filepath: compiled.filepath,
            dbgpath: compiled.dbgpath,
            require_history,
        });
        let closure = LuaClosure {
            proto,
            script,
            upvals: Vec::new(),
        };
        Coroutine::new(Value::Function(Rc::new(Function::Lua(Rc::new(closure)))))
    }

    /// 加载并运行到第一次返回或让出
    pub fn run(&mut self, compiled: Compiled, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        let co = self.load(compiled);
        Ok(self.resume(&co, args)?.into_values())
    }

    /// 全局读取：内置库优先，然后是宿主环境
    pub(crate) fn global(&self, name: &[u8]) -> Value {
        if let Some(v) = self.builtins.globals.get(name) {
            return v.clone();
        }
        std::str::from_utf8(name)
            .ok()
            .and_then(|name| self.env.get(name))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn string_lib(&self) -> &TableRef {
        &self.builtins.string
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// 当前最内层字节码帧所属的脚本
    pub(crate) fn current_script(&self) -> Option<Rc<Script>> {
        self.frames.last().map(|f| f.closure.script.clone())
    }

    pub(crate) fn enter_native(&mut self) -> Result<(), VmError> {
        if self.c_depth >= MAX_NATIVE_DEPTH {
            return Err(VmError::new("stack overflow"));
        }
        self.c_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_native(&mut self) {
        self.c_depth = self.c_depth.saturating_sub(1);
    }

    /// 给未定位的错误附加最内层帧的位置
    pub(crate) fn locate(&self, err: VmError) -> VmError {
        let VmError::Runtime(message) = err else {
            return err;
        };
        match self.frames.last() {
            Some(frame) => VmError::Located {
                path: frame.closure.script.dbgpath.clone(),
                line: frame.closure.proto.line_at(frame.last_pc),
                name: frame.closure.proto.debug_name.clone(),
                message,
            },
            None => VmError::Runtime(message),
        }
    }

    pub(crate) fn push_frame(&mut self, closure: Rc<LuaClosure>, args: Vec<Value>, ret: ReturnTo) -> Result<(), VmError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError::new("stack overflow"));
        }

        let np = closure.proto.num_params as usize;
        let size = (closure.proto.max_stack as usize)
            .max(args.len().saturating_sub(np))
            .max(np);

        let mut args = args;
        let varargs = if args.len() > np { args.split_off(np) } else { Vec::new() };
        let mut regs = args;
        regs.resize(size, Value::Nil);

        self.frames.push(Frame {
            closure,
            pc: 0,
            last_pc: 0,
            regs: Rc::new(RefCell::new(regs)),
            varargs,
            top: 0,
            open_upvals: BTreeMap::new(),
            iterators: HashMap::new(),
            ret,
            resume_dest: None,
        });
        Ok(())
    }

    /// 从原生代码调用一个值，运行到它返回
    pub fn call_value(&mut self, f: &Value, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        let func = match f {
            Value::Function(func) => func.clone(),
            other => return Err(operators::uncallable(other)),
        };

        match &*func {
            Function::Native(native) => {
                let body = native.body.clone();
                match body(self, args)? {
                    Flow::Return(values) => Ok(values),
                    Flow::Yield(_) => Err(VmError::new("attempt to yield across a native call boundary")),
                }
            }
            Function::Lua(closure) => {
                self.enter_native()?;
                self.native_depth += 1;

                let base = self.frames.len();
                let result = self
                    .push_frame(closure.clone(), args, ReturnTo::Native)
                    .and_then(|_| execution::run(self, base));

                self.native_depth -= 1;
                self.leave_native();

                match result? {
                    Exit::Return(values) => Ok(values),
                    Exit::Yield(_) => Err(VmError::new("attempt to yield across a native call boundary")),
                }
            }
        }
    }

    /// 启动协程主体
    pub(crate) fn start_body(&mut self, body: Value, args: Vec<Value>) -> Result<Exit, VmError> {
        let func = match &body {
            Value::Function(func) => func.clone(),
            other => return Err(operators::uncallable(other)),
        };

        match &*func {
            Function::Lua(closure) => {
                self.push_frame(closure.clone(), args, ReturnTo::Base)?;
                execution::run(self, 0)
            }
            Function::Native(native) => {
                let body = native.body.clone();
                Ok(match body(self, args)? {
                    Flow::Return(values) => Exit::Return(values),
                    Flow::Yield(values) => Exit::Yield(values),
                })
            }
        }
    }

    /// 继续一个已挂起的协程：恢复值写回让出点后继续执行
    pub(crate) fn continue_frames(&mut self, args: Vec<Value>) -> Result<Exit, VmError> {
        let dest = match self.frames.last_mut() {
            Some(frame) => frame.resume_dest.take(),
            // 主体是直接让出的原生函数
            None => return Ok(Exit::Return(args)),
        };
        if let Some(dest) = dest {
            call::deliver(self, dest, args);
        }
        execution::run(self, 0)
    }
}
