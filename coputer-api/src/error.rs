//! API 错误类型
//!
//! 提供统一的错误类型和结构化错误报告。

use coputer_config::Phase;
use coputer_core::core::DeserialiseError;
use coputer_core::{LoadError, VmError};
use coputer_net::NodeError;
use coputer_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Coputer 错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoputerError {
    /// 模块加载错误（查找、编译、反序列化）
    #[error("{0}")]
    Load(#[from] LoadError),

    /// 运行时错误（已包含位置信息）
    #[error("{0}")]
    Vm(#[from] VmError),

    /// 存储错误
    #[error("{0}")]
    Store(#[from] StoreError),

    /// 网络错误
    #[error("{0}")]
    Net(#[from] NodeError),

    /// 名称索引中没有这个程序
    #[error("program {owner}/{name} not found")]
    NotFound { owner: String, name: String },

    /// 程序返回值不合要求
    #[error("{0}")]
    Result(String),

    /// 配置错误
    #[error("config error: {0}")]
    Config(String),
}

impl CoputerError {
    /// 获取错误阶段
    pub fn phase(&self) -> Phase {
        match self {
            CoputerError::Load(LoadError::Deserialise(_)) => Phase::Deserialise,
            CoputerError::Load(_) => Phase::Require,
            CoputerError::Vm(_) => Phase::Vm,
            CoputerError::Store(_) | CoputerError::NotFound { .. } => Phase::Store,
            CoputerError::Net(_) => Phase::Net,
            CoputerError::Result(_) | CoputerError::Config(_) => Phase::Api,
        }
    }

    /// 错误类型名（可用于程序化处理）
    pub fn kind(&self) -> &'static str {
        match self {
            CoputerError::Load(LoadError::NotFound(_)) => "ModuleNotFound",
            CoputerError::Load(LoadError::Compile(_)) => "CompileError",
            CoputerError::Load(LoadError::Deserialise(e)) => match e {
                DeserialiseError::CompilerMessage(_) => "CompileError",
                _ => "DeserialiseError",
            },
            CoputerError::Vm(VmError::Cancelled) => "Cancelled",
            CoputerError::Vm(_) => "RuntimeError",
            CoputerError::Store(StoreError::Bundle(_)) => "BundleError",
            CoputerError::Store(_) => "StoreError",
            CoputerError::NotFound { .. } => "ProgramNotFound",
            CoputerError::Net(NodeError::Timeout) => "Timeout",
            CoputerError::Net(_) => "NetError",
            CoputerError::Result(_) => "ResultError",
            CoputerError::Config(_) => "ConfigError",
        }
    }

    /// 转换为结构化错误报告
    ///
    /// CLI 可以直接打印，上层应用可以序列化为 JSON。
    ///
    /// # Example
    /// ```ignore
    /// match executor.run_web(&owner, "hello", &args) {
    ///     Err(e) => {
    ///         let report = e.to_report();
    ///         // CLI: 直接打印
    ///         println!("{}", report);
    ///         // Web: 序列化为 JSON
    ///         let json = report.to_json();
    ///     }
    ///     Ok(rets) => { /* ... */ }
    /// }
    /// ```
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            phase: self.phase().as_str(),
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// 结构化错误报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// 错误阶段: deserialise, vm, require, store, net, api
    pub phase: &'static str,
    /// 错误类型
    pub kind: String,
    /// 人类可读的错误消息
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    /// 默认的 CLI 友好格式
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.phase, self.kind, self.message)
    }
}

impl ErrorReport {
    /// 转换为 JSON 格式
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// 简洁格式（适合终端）
    pub fn to_short(&self) -> String {
        format!("{}: {}", self.phase, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coputer_store::BundleError;

    #[test]
    fn test_phases() {
        assert_eq!(CoputerError::Vm(VmError::Cancelled).phase(), Phase::Vm);
        assert_eq!(
            CoputerError::Load(LoadError::NotFound("x".into())).phase(),
            Phase::Require
        );
        assert_eq!(
            CoputerError::Load(LoadError::Deserialise(DeserialiseError::UnsupportedVersion(9))).phase(),
            Phase::Deserialise
        );
        assert_eq!(CoputerError::Net(NodeError::NoPeers).phase(), Phase::Net);
        assert_eq!(
            CoputerError::Store(StoreError::Bundle(BundleError::Empty)).phase(),
            Phase::Store
        );
        assert_eq!(CoputerError::Result("x".into()).phase(), Phase::Api);
    }

    #[test]
    fn test_report() {
        let err = CoputerError::Vm(VmError::new("attempt to index nil with 'foo'"));
        let report = err.to_report();
        assert_eq!(report.phase, "vm");
        assert_eq!(report.kind, "RuntimeError");
        assert_eq!(report.message, "attempt to index nil with 'foo'");
        assert_eq!(report.to_string(), "[vm] RuntimeError: attempt to index nil with 'foo'");
        assert_eq!(report.to_short(), "vm: attempt to index nil with 'foo'");
    }

    #[test]
    fn test_report_json() {
        let report = CoputerError::Result("web program did not return a table".into()).to_report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(value["phase"], "api");
        assert_eq!(value["kind"], "ResultError");
        assert_eq!(value["message"], "web program did not return a table");
    }

    #[test]
    fn test_not_found_message() {
        let err = CoputerError::NotFound {
            owner: "abc".into(),
            name: "hello".into(),
        };
        assert_eq!(err.to_string(), "program abc/hello not found");
        assert_eq!(err.kind(), "ProgramNotFound");
    }
}
