//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现分阶段日志控制。
//! 日志写到 stderr，stdout 留给程序输出。

use coputer_config::{LogConfig, LogLevel};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

const TARGETS: [&str; 5] = ["coputer::vm", "coputer::require", "coputer::store", "coputer::net", "coputer::api"];

pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

/// 按阶段构建过滤器
pub fn targets(log_config: &LogConfig) -> Targets {
    let targets = TARGETS.iter().fold(
        Targets::new().with_default(level_filter(log_config.global)),
        |targets, target| targets.with_target(*target, level_filter(log_config.level_for(target))),
    );
    targets.with_target("coputer::cli", level_filter(log_config.global))
}

/// 使用指定格式和日志配置初始化日志系统；指定文件时同时写入文件
pub fn init_with_file<P: AsRef<Path>>(log_config: &LogConfig, format: LogFormat, file: Option<P>) -> io::Result<()> {
    let targets = targets(log_config);
    let console = create_format_layer(format, io::stderr).with_filter(targets.clone());

    match file {
        Some(path) => {
            let file_handle = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file_handle))
                .with_filter(targets);
            tracing_subscriber::registry().with(console).with(file_layer).init();
        }
        None => tracing_subscriber::registry().with(console).init(),
    }
    Ok(())
}

/// Create formatter layer based on format
fn create_format_layer<S, W, F>(format: LogFormat, make_writer: F) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: io::Write + Send + Sync + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}
