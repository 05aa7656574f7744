//! API 集成测试的共享工具
//!
//! 程序用一个只有单个函数原型的小汇编器拼成字节码，
//! 执行器通过内存加载器按入口路径取到它们。

#![allow(dead_code)]

use coputer_api::{Executor, LoaderFactory, VmConfig, WebArgs};
use coputer_core::binary::opcode::*;
use coputer_core::{MemoryLoader, ModuleLoader};
use coputer_net::{Keypair, SK};
use coputer_store::{bundle_files, bundle_hash, BundleFile, MemoryFileSystem, ProgramStore, StoreConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ===== 汇编器 =====

#[derive(Clone, Debug, PartialEq)]
enum K {
    Number(f64),
    Str(String),
}

/// 单个 proto 的模块
#[derive(Default)]
pub struct Asm {
    code: Vec<u32>,
    k: Vec<K>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    fn constant(&mut self, k: K) -> u32 {
        if let Some(i) = self.k.iter().position(|x| *x == k) {
            return i as u32;
        }
        self.k.push(k);
        (self.k.len() - 1) as u32
    }

    fn str(&mut self, s: &str) -> u32 {
        self.constant(K::Str(s.to_string()))
    }

    fn abc(&mut self, op: u8, a: u8, b: u8, c: u8) -> &mut Self {
        self.code.push(op as u32 | (a as u32) << 8 | (b as u32) << 16 | (c as u32) << 24);
        self
    }

    fn ad(&mut self, op: u8, a: u8, d: i16) -> &mut Self {
        self.code.push(op as u32 | (a as u32) << 8 | (d as u16 as u32) << 16);
        self
    }

    fn aux(&mut self, aux: u32) -> &mut Self {
        self.code.push(aux);
        self
    }

    pub fn loadn(&mut self, a: u8, n: i16) -> &mut Self {
        self.ad(LOADN, a, n)
    }

    pub fn loadk_str(&mut self, a: u8, s: &str) -> &mut Self {
        let index = self.str(s);
        self.ad(LOADK, a, index as i16)
    }

    pub fn loadk_number(&mut self, a: u8, n: f64) -> &mut Self {
        let index = self.constant(K::Number(n));
        self.ad(LOADK, a, index as i16)
    }

    /// GETIMPORT，`path` 形如 `"args.web"`
    pub fn import(&mut self, a: u8, path: &str) -> &mut Self {
        let ids: Vec<u32> = path.split('.').map(|name| self.str(name)).collect();
        let mut aux = (ids.len() as u32) << 30;
        for (n, id) in ids.iter().enumerate() {
            aux |= id << (20 - 10 * n as u32);
        }
        self.ad(GETIMPORT, a, 0).aux(aux)
    }

    pub fn getglobal(&mut self, a: u8, name: &str) -> &mut Self {
        let index = self.str(name);
        self.abc(GETGLOBAL, a, 0, 0).aux(index)
    }

    pub fn gettableks(&mut self, a: u8, b: u8, key: &str) -> &mut Self {
        let index = self.str(key);
        self.abc(GETTABLEKS, a, b, 0).aux(index)
    }

    /// `R(b)[key] = R(a)`
    pub fn settableks(&mut self, a: u8, b: u8, key: &str) -> &mut Self {
        let index = self.str(key);
        self.abc(SETTABLEKS, a, b, 0).aux(index)
    }

    pub fn newtable(&mut self, a: u8) -> &mut Self {
        self.abc(NEWTABLE, a, 0, 0).aux(0)
    }

    pub fn call(&mut self, a: u8, nargs: u8, nresults: u8) -> &mut Self {
        self.abc(CALL, a, nargs + 1, nresults + 1)
    }

    pub fn ret(&mut self, a: u8, n: u8) -> &mut Self {
        self.abc(RETURN, a, n + 1, 0)
    }

    /// 跳回自身，永不结束
    pub fn spin(&mut self) -> &mut Self {
        self.ad(JUMPBACK, 0, -1)
    }

    pub fn build(&self) -> Vec<u8> {
        let strings: Vec<&str> = self
            .k
            .iter()
            .filter_map(|k| match k {
                K::Str(s) => Some(s.as_str()),
                K::Number(_) => None,
            })
            .collect();

        let mut out = vec![6, 3];
        varint(&mut out, strings.len());
        for s in &strings {
            varint(&mut out, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        out.push(0); // userdata types

        varint(&mut out, 1);
        out.extend_from_slice(&[16, 0, 0, 0, 0]);
        varint(&mut out, 0); // typesize

        varint(&mut out, self.code.len());
        for w in &self.code {
            out.extend_from_slice(&w.to_le_bytes());
        }

        varint(&mut out, self.k.len());
        for k in &self.k {
            match k {
                K::Number(n) => {
                    out.push(2);
                    out.extend_from_slice(&n.to_le_bytes());
                }
                K::Str(s) => {
                    out.push(3);
                    let index = strings.iter().position(|x| x == s).map_or(0, |i| i + 1);
                    varint(&mut out, index);
                }
            }
        }

        varint(&mut out, 0); // children
        varint(&mut out, 0); // linedefined
        varint(&mut out, 0); // debugname
        out.push(0); // lineinfo
        out.push(0); // debuginfo

        varint(&mut out, 0); // main
        out
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

// ===== 示例程序 =====

/// 返回 `{body = buffer.fromstring(url.path), headers = {["x-method"] = method}}`
pub fn echo_program() -> Vec<u8> {
    let mut p = Asm::new();
    p.import(0, "args.web")
        .call(0, 0, 1)
        .newtable(1)
        .import(2, "buffer.fromstring")
        .gettableks(3, 0, "url")
        .gettableks(3, 3, "path")
        .call(2, 1, 1)
        .settableks(2, 1, "body")
        .newtable(4)
        .gettableks(5, 0, "method")
        .settableks(5, 4, "x-method")
        .settableks(4, 1, "headers")
        .ret(1, 1);
    p.build()
}

/// 返回 `{statuscode = code}`
pub fn status_program(code: i16) -> Vec<u8> {
    let mut p = Asm::new();
    p.newtable(0).loadn(1, code).settableks(1, 0, "statuscode").ret(0, 1);
    p.build()
}

pub fn number_program(n: i16) -> Vec<u8> {
    let mut p = Asm::new();
    p.loadn(0, n).ret(0, 1);
    p.build()
}

pub fn empty_program() -> Vec<u8> {
    let mut p = Asm::new();
    p.ret(0, 0);
    p.build()
}

pub fn spin_program() -> Vec<u8> {
    let mut p = Asm::new();
    p.spin().ret(0, 0);
    p.build()
}

/// `print("hello", "world")`，不返回值
pub fn print_program() -> Vec<u8> {
    let mut p = Asm::new();
    p.getglobal(0, "print")
        .loadk_str(1, "hello")
        .loadk_str(2, "world")
        .call(0, 2, 0)
        .ret(0, 0);
    p.build()
}

// ===== 执行器 =====

/// 满足工作量证明的真实私钥
pub const SAMPLE_KEYS: [&str; 3] = [
    "cosec:0aqouiilz3-ynmmxunwx1-7u6e5xppqa-hmz7q8yd3f-5l92e17yos",
    "cosec:0ot4jpb8z4-iq7yu96m3f-9bh2ze9s7w-m7r7vowu2k-tl8pmbetoz",
    "cosec:50u4onk3m0-owyszhfou0-5uvrymlofu-brye4mkomo-3vr2cta2sa",
];

pub fn sample_keypair(i: usize) -> Keypair {
    let sk = SK::decode(SAMPLE_KEYS[i % SAMPLE_KEYS.len()]).expect("valid sample key");
    Keypair::from_secret(sk).expect("sample key is proof-of-work")
}

/// 程序包里只有 `init.luau`，内容就是字节码
pub fn program_bundle(bytecode: &[u8]) -> Vec<u8> {
    bundle_files(vec![BundleFile::new("init.luau", bytecode.to_vec())]).expect("bundle")
}

pub fn web_args(method: &str, path: &str) -> WebArgs {
    let mut args = WebArgs::default();
    args.method = method.to_string();
    args.url.rawpath = path.to_string();
    args.url.path = path.to_string();
    args
}

/// 内存存储上的执行器；加载器按入口路径提供这些程序的字节码
pub struct Fixture {
    pub executor: Executor<MemoryFileSystem>,
    /// 加载器被创建的次数，即实际执行的次数
    pub loads: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn new(programs: &[Vec<u8>], timeout_ms: u64) -> Self {
        let store = ProgramStore::with_fs(MemoryFileSystem::new(), StoreConfig::from_data_dir("/data"));
        let vm = VmConfig {
            timeout_ms,
            ..VmConfig::default()
        };
        let executor = Executor::with_store(store, vm);

        let mut loader = MemoryLoader::new();
        for bytecode in programs {
            let hash = bundle_hash(&program_bundle(bytecode));
            loader.insert(executor.entry_module(&hash), bytecode.clone());
        }

        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let factory: LoaderFactory = Arc::new(move |_: &VmConfig| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(loader.clone()) as Box<dyn ModuleLoader>
        });

        Self {
            executor: executor.with_loader(factory),
            loads,
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// 以 `owner` 的名义保存程序
    pub fn store(&self, owner: &str, name: &str, bytecode: &[u8]) -> [u8; 32] {
        let (hash, _) = self
            .executor
            .store_program(owner, name, &program_bundle(bytecode))
            .expect("store program");
        hash
    }
}
