//! API 类型定义
//!
//! 执行的输入输出类型。

use coputer_core::{ModuleLoader, Value, VmConfig};
use std::sync::Arc;

/// 执行输出
#[derive(Debug)]
pub struct ExecuteOutput {
    /// 返回值
    pub values: Vec<Value>,
    /// `print` 输出捕获
    pub stdout: String,
}

/// 每次运行创建一个新的加载器（VM 不跨线程共享）
pub type LoaderFactory = Arc<dyn Fn(&VmConfig) -> Box<dyn ModuleLoader> + Send + Sync>;
