//! 存储集成测试的共享工具

#![allow(dead_code)]

use std::path::Path;
use tempfile::TempDir;

/// 在临时目录中写出一个程序源码目录
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (path, content) in files {
        write(dir.path(), path, content);
    }
    dir
}

pub fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(full, content).expect("write file");
}

/// 一个最小的 web 程序
pub fn web_project() -> TempDir {
    project(&[
        ("init.luau", "local util = require(\"./lib/util\")\nreturn { body = util.greet() }\n"),
        ("lib/util.luau", "return { greet = function() return \"hi\" end }\n"),
        ("README.md", "# hello\n"),
    ])
}
