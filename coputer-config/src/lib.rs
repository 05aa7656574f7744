//! Coputer Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Coputer crates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for program execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Optimisation level passed to the external compiler (`-O<level>`)
    pub optimisation_level: u8,
    /// Execution deadline in milliseconds
    pub timeout_ms: u64,
    /// External compiler executable
    pub compiler_program: String,
}

impl VmConfig {
    /// Execution deadline as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for the on-disk program store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root data directory
    pub data_dir: PathBuf,
    /// Materialised bundles, one directory per hex hash
    pub programs_dir: PathBuf,
    /// Name index, one directory per public key
    pub names_dir: PathBuf,
}

impl StoreConfig {
    /// Derive the standard layout from a data directory
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            programs_dir: data_dir.join("programs"),
            names_dir: data_dir.join("names"),
            data_dir,
        }
    }
}

/// Configuration for a network node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Worker threads used for the proof-of-work key search
    pub key_threads: usize,
    /// Try the local program host before asking peers
    pub use_local: bool,
    /// How long to wait for a run reply, in milliseconds
    pub reply_timeout_ms: u64,
}

impl NodeConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Log level vocabulary shared by the CLI and embedders
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse a level name; "silent" maps to errors only
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "silent" | "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Logging configuration with per-phase overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub global: LogLevel,
    pub vm: Option<LogLevel>,
    pub require: Option<LogLevel>,
    pub store: Option<LogLevel>,
    pub net: Option<LogLevel>,
    pub api: Option<LogLevel>,
}

impl LogConfig {
    /// Get log level for a specific target
    pub fn level_for(&self, target: &str) -> LogLevel {
        let specific = match target {
            "coputer::vm" => self.vm,
            "coputer::require" => self.require,
            "coputer::store" => self.store,
            "coputer::net" => self.net,
            "coputer::api" => self.api,
            _ => None,
        };
        specific.unwrap_or(self.global)
    }
}

/// Execution phase enum for phase-specific configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Deserialise,
    Vm,
    Require,
    Store,
    Net,
    Api,
}

impl Phase {
    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Deserialise => "deserialise",
            Phase::Vm => "vm",
            Phase::Require => "require",
            Phase::Store => "store",
            Phase::Net => "net",
            Phase::Api => "api",
        }
    }

    /// Get the log target name for this phase
    pub fn target(&self) -> String {
        format!("coputer::{}", self.as_str())
    }
}

/// Aggregate configuration, as read from `coputer.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoputerConfig {
    pub vm: VmConfig,
    pub store: StoreConfig,
    pub node: NodeConfig,
    pub log: LogConfig,
}

impl CoputerConfig {
    /// Parse a JSON document; missing sections fall back to defaults
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            optimisation_level: 1,
            timeout_ms: 5000,
            compiler_program: "luau-compile".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_data_dir("./data")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            key_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            use_local: true,
            reply_timeout_ms: 10_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: LogLevel::Info,
            vm: None,
            require: None,
            store: None,
            net: None,
            api: None,
        }
    }
}
