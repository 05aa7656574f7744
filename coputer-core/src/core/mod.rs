//! Core 模块 - 值、表、数字格式化与错误的纯定义

// ==================== 基础类型 ====================

/// 值类型
pub mod value;
pub use value::{BufferRef, CoroutineRef, TableRef, Value, Vector};

/// 表
pub mod table;
pub use table::Table;

/// 数字格式化
pub mod number;
pub use number::{num2str, str2num};

// ==================== 错误 ====================

/// 错误类型
pub mod error;
pub use error::{DeserialiseError, TableError, VmError};
