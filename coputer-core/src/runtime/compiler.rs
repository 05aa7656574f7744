//! 编译器句柄
//!
//! VM 从不编译源码。`ModuleLoader` 把一个不带扩展名的路径变成反序列化后的模块；
//! `Compiler` 调用外部的 `luau-compile`，`MemoryLoader` 直接提供字节码（测试与嵌入使用）。

use crate::binary::{deserialise, Module};
use crate::core::DeserialiseError;
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

pub const EXT: &str = ".luau";

/// 加载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("error finding file")]
    NotFound(String),

    #[error("error compiling file: {0}")]
    Compile(String),

    #[error("error deserialising bytecode: {0}")]
    Deserialise(#[from] DeserialiseError),
}

/// 已加载的模块及其路径
#[derive(Clone, Debug)]
pub struct Compiled {
    pub module: Rc<Module>,
    /// 不带扩展名
    pub filepath: String,
    /// 实际读取的文件，带扩展名
    pub dbgpath: String,
}

/// 路径到模块的加载器
pub trait ModuleLoader {
    fn load(&mut self, path: &str) -> Result<Compiled, LoadError>;
}

/// 外部编译器
pub struct Compiler {
    program: String,
    optimisation_level: u8,
    cache: HashMap<[u8; 32], (Rc<Module>, String)>,
}

impl Compiler {
    pub fn new(optimisation_level: u8) -> Self {
        Self::with_program("luau-compile", optimisation_level)
    }

    pub fn with_program(program: impl Into<String>, optimisation_level: u8) -> Self {
        Self {
            program: program.into(),
            optimisation_level,
            cache: HashMap::new(),
        }
    }

    pub fn from_config(config: &coputer_config::VmConfig) -> Self {
        Self::with_program(config.compiler_program.clone(), config.optimisation_level)
    }

    pub fn optimisation_level(&self) -> u8 {
        self.optimisation_level
    }

    fn compile_file(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let output = Command::new(&self.program)
            .arg("--binary")
            .arg(format!("-O{}", self.optimisation_level))
            .arg(path)
            .output()
            .map_err(|e| LoadError::Compile(e.to_string()))?;

        // 编译错误以 0 开头的字节码返回，交给反序列化器报告
        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(LoadError::Compile(stderr));
        }
        Ok(output.stdout)
    }
}

/// `path.luau`，否则目录下的 `main.luau`
fn resolve_source(path: &str) -> Option<String> {
    let with_ext = format!("{path}{EXT}");
    if Path::new(&with_ext).is_file() {
        return Some(with_ext);
    }
    if Path::new(path).exists() {
        return Some(format!("{path}/main{EXT}"));
    }
    None
}

impl ModuleLoader for Compiler {
    fn load(&mut self, path: &str) -> Result<Compiled, LoadError> {
        let key: [u8; 32] = Sha3_256::digest(path.as_bytes()).into();
        if let Some((module, dbgpath)) = self.cache.get(&key) {
            return Ok(Compiled {
                module: module.clone(),
                filepath: path.to_string(),
                dbgpath: dbgpath.clone(),
            });
        }

        let source = resolve_source(path).ok_or_else(|| LoadError::NotFound(path.to_string()))?;
        let bytecode = self.compile_file(&source)?;
        let module = deserialise(&bytecode)?;

        debug!(target: "coputer::require", path = %source, "compiled module");
        self.cache.insert(key, (module.clone(), source.clone()));

        Ok(Compiled {
            module,
            filepath: path.to_string(),
            dbgpath: source,
        })
    }
}

/// 内存中的字节码，按不带扩展名的路径索引
#[derive(Default, Clone)]
pub struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytecode: Vec<u8>) {
        self.files.insert(path.into(), bytecode);
    }

    pub fn with(mut self, path: impl Into<String>, bytecode: Vec<u8>) -> Self {
        self.insert(path, bytecode);
        self
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&mut self, path: &str) -> Result<Compiled, LoadError> {
        let main = format!("{path}/main");
        let (found, bytecode) = match self.files.get(path) {
            Some(b) => (path.to_string(), b),
            None => match self.files.get(&main) {
                Some(b) => (main, b),
                None => return Err(LoadError::NotFound(path.to_string())),
            },
        };

        Ok(Compiled {
            module: deserialise(bytecode)?,
            filepath: path.to_string(),
            dbgpath: format!("{found}{EXT}"),
        })
    }
}
