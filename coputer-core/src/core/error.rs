//! 错误类型 (Core 层)
//!
//! VM 内部的错误消息保持为纯字符串，离开协程时只包装一次位置信息。

use thiserror::Error;

/// 运行时错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    /// 未定位的错误（刚从指令或原生函数中产生）
    #[error("{0}")]
    Runtime(String),

    /// 已附加 (文件, 行, 函数) 的错误
    #[error("{path}:{line}: function {name}\n{message}")]
    Located {
        path: String,
        line: u32,
        name: String,
        message: String,
    },

    /// 活性标志被清除
    #[error("program execution cancelled")]
    Cancelled,
}

impl VmError {
    pub fn new(message: impl Into<String>) -> Self {
        VmError::Runtime(message.into())
    }

    /// 底层消息，不含位置前缀
    pub fn message(&self) -> String {
        match self {
            VmError::Runtime(m) => m.clone(),
            VmError::Located { message, .. } => message.clone(),
            VmError::Cancelled => "program execution cancelled".to_string(),
        }
    }

    pub fn is_located(&self) -> bool {
        !matches!(self, VmError::Runtime(_))
    }
}

impl From<String> for VmError {
    fn from(message: String) -> Self {
        VmError::Runtime(message)
    }
}

impl From<&str> for VmError {
    fn from(message: &str) -> Self {
        VmError::Runtime(message.to_string())
    }
}

impl From<TableError> for VmError {
    fn from(err: TableError) -> Self {
        VmError::Runtime(err.to_string())
    }
}

/// 表写入错误
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    #[error("attempt to modify a readonly table")]
    Readonly,
    #[error("table index is nil")]
    NilIndex,
    #[error("table index is NaN")]
    NanIndex,
}

/// 字节码反序列化错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeserialiseError {
    /// 版本字节为 0 时，其余字节是编译器给出的错误消息
    #[error("{0}")]
    CompilerMessage(String),

    #[error("the version of the provided bytecode is unsupported")]
    UnsupportedVersion(u8),

    #[error("the types version of the provided bytecode is unsupported")]
    UnsupportedTypesVersion(u8),

    #[error("unknown ktype {0}")]
    UnknownConstantKind(u8),

    #[error("unexpected end of bytecode at offset {0}")]
    UnexpectedEof(usize),

    #[error("string index {0} out of range")]
    StringIndexOutOfRange(usize),

    #[error("constant index {index} out of range in {opcode}")]
    ConstantIndexOutOfRange { opcode: &'static str, index: usize },

    #[error("proto index {0} out of range")]
    ProtoIndexOutOfRange(usize),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("deserialiser position mismatch")]
    PositionMismatch { position: usize, length: usize },
}
