//! 字节码格式
//!
//! 外部 Luau 编译器 `--binary` 输出的读取与反序列化。

pub mod deserialise;
pub mod opcode;
pub mod proto;
pub mod reader;

pub use deserialise::{deserialise, BYTECODE_VERSION, TYPES_VERSION};
pub use opcode::{OpInfo, OPS};
pub use proto::{Instruction, Konst, Module, Proto};
pub use reader::ByteReader;
