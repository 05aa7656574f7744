//! Coputer Core - Bytecode deserialiser and deterministic VM (no network, no storage)
//!
//! Loads Luau bytecode produced by the external compiler and runs it inside
//! coroutines. The same program with the same inputs always produces the same
//! outputs: there is no clock, no randomness and no host IO inside the VM.
//!
//! Configuration is passed explicitly via parameters, not via global state.

pub mod binary;
pub mod core;
pub mod program;
pub mod runtime;

// Re-export common types
pub use crate::binary::{deserialise, Module};
pub use crate::core::{Table, Value, VmError};
pub use program::{ProgramArgs, ProgramRets, ProgramType, WebArgs, WebArgsUrl, WebRets};
pub use runtime::{Compiled, Compiler, Env, LoadError, MemoryLoader, ModuleLoader, Vm};

// Re-export config types from coputer-config
pub use coputer_config::{Phase, VmConfig};
