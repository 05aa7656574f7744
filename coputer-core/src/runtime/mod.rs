//! 运行时
//!
//! 解释器、协程、require 与标准库。一个 `Vm` 只在一个线程上使用。

pub mod compiler;
pub mod coroutine;
pub mod env;
pub mod function;
pub mod require;
pub mod stdlib;
pub mod vm;

pub use compiler::{Compiled, Compiler, LoadError, MemoryLoader, ModuleLoader};
pub use coroutine::{CoStatus, Coroutine};
pub use env::Env;
pub use function::{Flow, Function};
pub use vm::{CancelHandle, Resumed, Vm};
