//! 测试辅助工具
//!
//! 提供端到端测试的辅助函数

#![allow(dead_code)]

use coputer_workspace::api::{LoaderFactory, VmConfig};
use coputer_workspace::core::binary::opcode::{LOADN, NEWTABLE, RETURN, SETTABLEKS};
use coputer_workspace::core::{MemoryLoader, ModuleLoader};
use std::sync::Arc;

fn word(op: u8, a: u8, b: u8, c: u8) -> u32 {
    op as u32 | (a as u32) << 8 | (b as u32) << 16 | (c as u32) << 24
}

/// `return { statuscode = code }` 的字节码
pub fn status_program(code: i16) -> Vec<u8> {
    let code = [
        word(NEWTABLE, 0, 0, 0),
        0,
        LOADN as u32 | 1 << 8 | (code as u16 as u32) << 16,
        word(SETTABLEKS, 1, 0, 0),
        0, // 常量 0："statuscode"
        word(RETURN, 0, 2, 0),
    ];

    let mut out = vec![6, 3];
    out.push(1); // 字符串表
    out.push(10);
    out.extend_from_slice(b"statuscode");
    out.push(0); // userdata types

    out.push(1); // proto 数
    out.extend_from_slice(&[16, 0, 0, 0, 0]);
    out.push(0); // typesize
    out.push(code.len() as u8);
    for w in code {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out.extend_from_slice(&[1, 3, 1]); // 一个字符串常量，字符串下标 1
    out.push(0); // children
    out.push(0); // linedefined
    out.push(0); // debugname
    out.push(0); // lineinfo
    out.push(0); // debuginfo

    out.push(0); // main
    out
}

/// 按入口路径提供字节码的加载器
pub fn loader_for(files: Vec<(String, Vec<u8>)>) -> LoaderFactory {
    let mut loader = MemoryLoader::new();
    for (path, bytecode) in files {
        loader.insert(path, bytecode);
    }
    Arc::new(move |_: &VmConfig| Box::new(loader.clone()) as Box<dyn ModuleLoader>)
}
