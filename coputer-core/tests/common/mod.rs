//! 测试辅助工具
//!
//! VM 从不编译源码，所以集成测试用这里的小汇编器直接拼出字节码，
//! 再交给真正的反序列化器和解释器执行。

#![allow(dead_code)]

use coputer_core::binary::opcode::*;
use coputer_core::runtime::{Env, MemoryLoader, ModuleLoader, Vm};
use coputer_core::{Value, VmError};

/// 常量表项
#[derive(Clone, Debug, PartialEq)]
pub enum K {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    /// 模块级 proto 下标
    Closure(usize),
}

impl K {
    pub fn str(s: &str) -> K {
        K::Str(s.to_string())
    }
}

/// 一个函数原型的汇编器
#[derive(Clone, Debug)]
pub struct ProtoBuilder {
    max_stack: u8,
    params: u8,
    upvals: u8,
    vararg: bool,
    name: Option<String>,
    code: Vec<u32>,
    lines: Vec<u32>,
    line: u32,
    k: Vec<K>,
    children: Vec<usize>,
}

impl Default for ProtoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtoBuilder {
    pub fn new() -> Self {
        Self {
            max_stack: 16,
            params: 0,
            upvals: 0,
            vararg: false,
            name: None,
            code: Vec::new(),
            lines: Vec::new(),
            line: 1,
            k: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn params(mut self, n: u8) -> Self {
        self.params = n;
        self
    }

    pub fn upvals(mut self, n: u8) -> Self {
        self.upvals = n;
        self
    }

    pub fn vararg(mut self) -> Self {
        self.vararg = true;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// 之后的指令记在第 `line` 行（小于 256）
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// 常量下标；相同常量只存一份
    pub fn constant(&mut self, k: K) -> u32 {
        if let Some(i) = self.k.iter().position(|x| *x == k) {
            return i as u32;
        }
        self.k.push(k);
        (self.k.len() - 1) as u32
    }

    /// 子函数在本 proto 子函数表中的下标
    pub fn child(&mut self, proto: usize) -> i16 {
        if let Some(i) = self.children.iter().position(|p| *p == proto) {
            return i as i16;
        }
        self.children.push(proto);
        (self.children.len() - 1) as i16
    }

    pub fn pc(&self) -> usize {
        self.code.len()
    }

    fn word(&mut self, w: u32) -> usize {
        self.code.push(w);
        self.lines.push(self.line);
        self.code.len() - 1
    }

    // ===== 原始编码 =====

    pub fn abc(&mut self, op: u8, a: u8, b: u8, c: u8) -> usize {
        self.word(op as u32 | (a as u32) << 8 | (b as u32) << 16 | (c as u32) << 24)
    }

    pub fn ad(&mut self, op: u8, a: u8, d: i16) -> usize {
        self.word(op as u32 | (a as u32) << 8 | (d as u16 as u32) << 16)
    }

    pub fn e(&mut self, op: u8, e: i32) -> usize {
        self.word(op as u32 | ((e as u32) & 0xff_ffff) << 8)
    }

    pub fn aux(&mut self, aux: u32) -> usize {
        self.word(aux)
    }

    /// 把 `at` 处指令的 D 改成跳到 `target`
    pub fn jump_to(&mut self, at: usize, target: usize) {
        let d = target as i64 - at as i64 - 1;
        self.code[at] = (self.code[at] & 0xffff) | ((d as i16 as u16 as u32) << 16);
    }

    // ===== 常用指令 =====

    pub fn loadnil(&mut self, a: u8) -> usize {
        self.abc(LOADNIL, a, 0, 0)
    }

    pub fn loadb(&mut self, a: u8, b: bool) -> usize {
        self.abc(LOADB, a, b as u8, 0)
    }

    pub fn loadn(&mut self, a: u8, n: i16) -> usize {
        self.ad(LOADN, a, n)
    }

    pub fn loadk(&mut self, a: u8, k: K) -> usize {
        let index = self.constant(k);
        self.ad(LOADK, a, index as i16)
    }

    pub fn mov(&mut self, a: u8, b: u8) -> usize {
        self.abc(MOVE, a, b, 0)
    }

    /// GETIMPORT，`path` 形如 `"coroutine.yield"`
    pub fn import(&mut self, a: u8, path: &str) -> usize {
        let ids: Vec<u32> = path.split('.').map(|name| self.constant(K::str(name))).collect();
        let mut aux = (ids.len() as u32) << 30;
        for (n, id) in ids.iter().enumerate() {
            aux |= id << (20 - 10 * n as u32);
        }
        let at = self.ad(GETIMPORT, a, 0);
        self.aux(aux);
        at
    }

    pub fn getglobal(&mut self, a: u8, name: &str) -> usize {
        let index = self.constant(K::str(name));
        let at = self.abc(GETGLOBAL, a, 0, 0);
        self.aux(index);
        at
    }

    pub fn setglobal(&mut self, a: u8, name: &str) -> usize {
        let index = self.constant(K::str(name));
        let at = self.abc(SETGLOBAL, a, 0, 0);
        self.aux(index);
        at
    }

    pub fn gettableks(&mut self, a: u8, b: u8, key: &str) -> usize {
        let index = self.constant(K::str(key));
        let at = self.abc(GETTABLEKS, a, b, 0);
        self.aux(index);
        at
    }

    pub fn settableks(&mut self, a: u8, b: u8, key: &str) -> usize {
        let index = self.constant(K::str(key));
        let at = self.abc(SETTABLEKS, a, b, 0);
        self.aux(index);
        at
    }

    pub fn newtable(&mut self, a: u8) -> usize {
        let at = self.abc(NEWTABLE, a, 0, 0);
        self.aux(0);
        at
    }

    /// SETLIST：寄存器 b.. 共 count 个值写到 start 开始的下标
    pub fn setlist(&mut self, a: u8, b: u8, count: u8, start: u32) -> usize {
        let at = self.abc(SETLIST, a, b, count + 1);
        self.aux(start);
        at
    }

    pub fn namecall(&mut self, a: u8, b: u8, method: &str) -> usize {
        let index = self.constant(K::str(method));
        let at = self.abc(NAMECALL, a, b, 0);
        self.aux(index);
        at
    }

    /// 参数或结果个数为 `None` 时表示不定个数
    pub fn call(&mut self, a: u8, nargs: Option<u8>, nresults: Option<u8>) -> usize {
        self.abc(CALL, a, nargs.map_or(0, |n| n + 1), nresults.map_or(0, |n| n + 1))
    }

    pub fn ret(&mut self, a: u8, n: Option<u8>) -> usize {
        self.abc(RETURN, a, n.map_or(0, |n| n + 1), 0)
    }

    /// NEWCLOSURE；随后要跟上每个 upvalue 的 `capture`
    pub fn closure(&mut self, a: u8, proto: usize) -> usize {
        let d = self.child(proto);
        self.ad(NEWCLOSURE, a, d)
    }

    /// kind：0 值捕获，1 引用捕获，2 外层 upvalue
    pub fn capture(&mut self, kind: u8, slot: u8) -> usize {
        self.abc(CAPTURE, kind, slot, 0)
    }

    // ===== 编码 =====

    fn encode(&self, out: &mut Vec<u8>, strings: &Strings) {
        out.extend_from_slice(&[self.max_stack, self.params, self.upvals, self.vararg as u8, 0]);
        varint(out, 0); // typesize

        varint(out, self.code.len());
        for w in &self.code {
            out.extend_from_slice(&w.to_le_bytes());
        }

        varint(out, self.k.len());
        for k in &self.k {
            match k {
                K::Nil => out.push(0),
                K::Bool(b) => out.extend_from_slice(&[1, *b as u8]),
                K::Number(n) => {
                    out.push(2);
                    out.extend_from_slice(&n.to_le_bytes());
                }
                K::Str(s) => {
                    out.push(3);
                    varint(out, strings.index(s));
                }
                K::Closure(p) => {
                    out.push(6);
                    varint(out, *p);
                }
            }
        }

        varint(out, self.children.len());
        for p in &self.children {
            varint(out, *p);
        }

        varint(out, 0); // linedefined
        varint(out, self.name.as_deref().map_or(0, |n| strings.index(n)));

        // 行信息：间隔取 24，全部指令共用一个绝对值 0，逐字增量
        out.push(1);
        out.push(24);
        let mut last = 0u8;
        for line in &self.lines {
            let line = *line as u8;
            out.push(line.wrapping_sub(last));
            last = line;
        }
        if !self.code.is_empty() {
            out.extend_from_slice(&0u32.to_le_bytes());
        }

        out.push(0); // debuginfo
    }
}

/// 字符串表；下标从 1 开始
#[derive(Default)]
struct Strings(Vec<String>);

impl Strings {
    fn intern(&mut self, s: &str) {
        if !self.0.iter().any(|x| x == s) {
            self.0.push(s.to_string());
        }
    }

    fn index(&self, s: &str) -> usize {
        self.0.iter().position(|x| x == s).map_or(0, |i| i + 1)
    }
}

fn varint(out: &mut Vec<u8>, mut n: usize) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// 多个 proto 组成的模块
#[derive(Default)]
pub struct ModuleBuilder {
    protos: Vec<ProtoBuilder>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个 proto，返回模块级下标
    pub fn proto(&mut self, p: ProtoBuilder) -> usize {
        self.protos.push(p);
        self.protos.len() - 1
    }

    pub fn build(&self, main: usize) -> Vec<u8> {
        let mut strings = Strings::default();
        for p in &self.protos {
            for k in &p.k {
                if let K::Str(s) = k {
                    strings.intern(s);
                }
            }
            if let Some(name) = &p.name {
                strings.intern(name);
            }
        }

        let mut out = vec![6, 3];
        varint(&mut out, strings.0.len());
        for s in &strings.0 {
            varint(&mut out, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        out.push(0); // userdata types

        varint(&mut out, self.protos.len());
        for p in &self.protos {
            p.encode(&mut out, &strings);
        }
        varint(&mut out, main);
        out
    }
}

/// 只有一个 proto 的模块
pub fn single(main: ProtoBuilder) -> Vec<u8> {
    let mut m = ModuleBuilder::new();
    let index = m.proto(main);
    m.build(index)
}

// ===== 执行 =====

/// 以 `main` 为入口运行一组内存中的文件
pub fn run_files(files: Vec<(&str, Vec<u8>)>, entry: &str, env: Env) -> Result<Vec<Value>, VmError> {
    let mut loader = MemoryLoader::new();
    for (path, bytecode) in files {
        loader.insert(path, bytecode);
    }
    let compiled = loader.load(entry).expect("entry module should load");
    let mut vm = Vm::new(env).with_loader(Box::new(loader));
    vm.run(compiled, Vec::new())
}

pub fn run_with_env(bytecode: Vec<u8>, env: Env) -> Result<Vec<Value>, VmError> {
    run_files(vec![("main", bytecode)], "main", env)
}

pub fn run(bytecode: Vec<u8>) -> Result<Vec<Value>, VmError> {
    run_with_env(bytecode, Env::default())
}

pub fn num(n: f64) -> Value {
    Value::Number(n)
}

pub fn s(text: &str) -> Value {
    Value::from(text)
}
