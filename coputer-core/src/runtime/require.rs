//! 模块加载
//!
//! `require("./x")` 相对于当前脚本解析路径，通过 VM 的 `ModuleLoader` 加载，
//! 在共享同一环境和缓存的新协程中同步运行。每个路径只执行一次。

use super::compiler::LoadError;
use super::vm::Vm;
use crate::core::{Value, VmError};
use tracing::debug;

/// `C:/`、`C:\`、`/` 或 `\` 开头
fn is_absolute(path: &str) -> bool {
    let b = path.as_bytes();
    (b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && (b[2] == b'/' || b[2] == b'\\'))
        || b.first().is_some_and(|c| *c == b'/' || *c == b'\\')
}

fn has_valid_prefix(path: &str) -> bool {
    path.starts_with("./") || path.starts_with("../")
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => ".",
    }
}

/// 词法规整：去掉 `.` 和空段，消解 `..`
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// 相对于 `from`（当前脚本，不带扩展名）解析被引用模块的路径
pub fn resolve(from: &str, name: &str) -> Result<String, VmError> {
    if is_absolute(name) {
        return Err(VmError::new(
            "invalid argument #1 to 'require' (cannot require an absolute path)",
        ));
    }

    let name = name.replace('\\', "/");
    if !has_valid_prefix(&name) {
        return Err(VmError::new(
            "require path must start with a valid prefix: ./ or ../",
        ));
    }

    Ok(clean_path(&format!("{}/{}", parent_dir(from), name)))
}

pub(crate) fn require(vm: &mut Vm, name: &str) -> Result<Value, VmError> {
    let script = vm.current_script();
    let from = script.as_ref().map(|s| s.filepath.as_str()).unwrap_or("");
    let path = resolve(from, name)?;

    if path == from {
        return Err(VmError::new("cyclic module dependency: file requires itself"));
    }

    let compiled = match vm.loader.as_mut() {
        Some(loader) => loader.load(&path),
        None => Err(LoadError::NotFound(path.clone())),
    }
    .map_err(|e| VmError::new(format!("error requiring module: {e}")))?;

    let mut history = script.as_ref().map(|s| s.require_history.clone()).unwrap_or_default();
    if history.contains(&path) {
        return Err(VmError::new(
            "cyclic module dependency: file requires itself indirectly",
        ));
    }

    if let Some(cached) = vm.require_cache.get(&path) {
        return Ok(cached.clone());
    }

    history.push(from.to_string());
    debug!(target: "coputer::require", path = %path, "running module");

    let co = vm.load_with_history(compiled, history);
    let values = vm.resume(&co, Vec::new())?.into_values();

    // 只看最后一个返回值
    let Some(result) = values.last().cloned() else {
        return Err(VmError::new("module must return a value"));
    };
    if !matches!(result, Value::Table(_) | Value::Function(_)) {
        return Err(VmError::new("module must return a table or function"));
    }

    vm.require_cache.insert(path, result.clone());
    Ok(result)
}
