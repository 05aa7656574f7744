//! API 层配置
//!
//! 包含执行配置 RunConfig 和全局单例（供 CLI 使用）

use crate::error::CoputerError;
use coputer_config::{CoputerConfig, NodeConfig, StoreConfig, VmConfig};
use once_cell::sync::OnceCell;

/// Execution configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    /// VM configuration (compiler, deadline)
    pub vm: VmConfig,
    /// Where programs and the name index live
    pub store: StoreConfig,
    /// Node behaviour
    pub node: NodeConfig,
}

impl From<&CoputerConfig> for RunConfig {
    fn from(config: &CoputerConfig) -> Self {
        Self {
            vm: config.vm.clone(),
            store: config.store.clone(),
            node: config.node.clone(),
        }
    }
}

// Global config singleton for CLI convenience
static GLOBAL_CONFIG: OnceCell<RunConfig> = OnceCell::new();

/// Initialize global configuration; fails if it was already set
pub fn init(config: RunConfig) -> Result<(), CoputerError> {
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| CoputerError::Config("config already initialized".to_string()))
}

/// Get global config reference
pub fn config() -> Option<&'static RunConfig> {
    GLOBAL_CONFIG.get()
}

/// Get global config, initializing it with defaults if needed
pub fn config_or_default() -> &'static RunConfig {
    GLOBAL_CONFIG.get_or_init(RunConfig::default)
}

/// Check if config is initialized
pub fn is_initialized() -> bool {
    GLOBAL_CONFIG.get().is_some()
}
