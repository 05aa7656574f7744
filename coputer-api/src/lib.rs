//! Coputer API - Execution orchestration layer
//!
//! Provides unified execution interface, including:
//! - Running stored web programs under a deadline (Executor)
//! - Converting returned tables into web results
//! - Configuration abstraction (RunConfig)
//! - Unified error handling (CoputerError)
//!
//! For CLI convenience, this crate provides a global singleton config.
//! For library use, prefer passing `RunConfig` explicitly.
//!
//! # Usage
//! ```rust,ignore
//! use coputer_api::{Executor, RunConfig};
//!
//! let executor = Executor::open(&RunConfig::default());
//! executor.store_program(&owner, "hello", &bundle)?;
//! let rets = executor.run_web(&owner, "hello", &args)?;
//! ```

pub mod config;
pub mod error;
pub mod execute;
pub mod executor;
pub mod types;
pub mod web;

pub use config::{config as get_config, config_or_default, init as init_config, is_initialized, RunConfig};
pub use error::{CoputerError, ErrorReport};
pub use execute::{default_loader, execute, program_env, run_file};
pub use executor::Executor;
pub use types::{ExecuteOutput, LoaderFactory};
pub use web::{status_text, web_rets};

// Re-export config types from coputer-config
pub use coputer_config::{CoputerConfig, LogConfig, LogLevel, NodeConfig, Phase, StoreConfig, VmConfig};

// Re-export core types
pub use coputer_core::{ProgramArgs, ProgramRets, Value, WebArgs, WebArgsUrl, WebRets};
