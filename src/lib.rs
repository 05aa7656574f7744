//! Coputer - Deterministic Luau programs on a peer-to-peer network
//!
//! Programs are uploaded as bundles, stored by content hash under their
//! owner's proof-of-work key, and executed by any node that has them. The same
//! program with the same input always produces the same output, so results
//! can be cached and compared across nodes.
//!
//! # Architecture
//!
//! ```text
//! coputer-config  - Pure configuration data (VM, store, node, logging)
//! coputer-core    - Bytecode deserialiser and interpreter (no IO)
//! coputer-store   - Bundles, virtual file systems, name index
//! coputer-net     - Keys, sealed frames, messages, nodes
//! coputer-api     - Executor, web results, unified errors
//! coputer-cli     - `coputer` binary
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use coputer_workspace::api::{Executor, RunConfig};
//!
//! let executor = Executor::open(&RunConfig::default());
//! executor.store_program(&owner, "hello", &bundle)?;
//! let rets = executor.run_web(&owner, "hello", &args)?;
//! ```

pub use coputer_api as api;
pub use coputer_config as config;
pub use coputer_core as core;
pub use coputer_net as net;
pub use coputer_store as store;

// 重导出常用类型
pub use coputer_api::{CoputerError, ErrorReport, Executor, RunConfig};
pub use coputer_config::{CoputerConfig, Phase};
pub use coputer_core::{WebArgs, WebRets};
