//! 单次执行
//!
//! 每次运行都有自己的 `Vm` 与加载器。超时由一个看门狗线程负责：
//! 到期时通过 `CancelHandle` 取消，VM 在下一条指令处返回 `Cancelled`。

use crate::error::CoputerError;
use crate::types::{ExecuteOutput, LoaderFactory};
use coputer_core::runtime::CancelHandle;
use coputer_core::{Compiler, Env, ModuleLoader, ProgramArgs, Vm, VmConfig};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// 默认使用外部编译器
pub fn default_loader() -> LoaderFactory {
    Arc::new(|config: &VmConfig| Box::new(Compiler::from_config(config)) as Box<dyn ModuleLoader>)
}

/// 程序可见的宿主环境
///
/// `print` 按制表符连接参数，写入捕获缓冲而不是进程的标准输出。
pub fn program_env(stdout: Rc<RefCell<String>>) -> Env {
    let mut env = Env::new();
    env.add_fn("print", move |_, args| {
        let line = args
            .iter()
            .map(|v| String::from_utf8_lossy(&v.to_lua_string()).into_owned())
            .collect::<Vec<_>>()
            .join("\t");
        let mut out = stdout.borrow_mut();
        out.push_str(&line);
        out.push('\n');
        Ok(Vec::new())
    });
    env
}

/// 在截止时间内运行 `f`；超时后取消 VM
fn with_deadline<T>(cancel: CancelHandle, timeout: Duration, f: impl FnOnce() -> T) -> T {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let watchdog = thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
            warn!(target: "coputer::api", timeout_ms = timeout.as_millis() as u64, "deadline reached, cancelling program");
            cancel.cancel();
        }
    });
    let out = f();
    drop(done_tx);
    let _ = watchdog.join();
    out
}

/// 加载并运行 `path`（不带扩展名）处的程序
pub fn execute(
    path: &str,
    mut loader: Box<dyn ModuleLoader>,
    args: ProgramArgs,
    timeout: Duration,
) -> Result<ExecuteOutput, CoputerError> {
    let compiled = loader.load(path)?;
    debug!(target: "coputer::api", path, dbgpath = %compiled.dbgpath, "loaded entry module");

    let stdout = Rc::new(RefCell::new(String::new()));
    let mut vm = Vm::new(program_env(stdout.clone()))
        .with_loader(loader)
        .with_program_args(args);
    let cancel = vm.cancel_handle();
    let values = with_deadline(cancel, timeout, || vm.run(compiled, Vec::new()))?;
    drop(vm);

    let stdout = stdout.borrow().clone();
    Ok(ExecuteOutput { values, stdout })
}

/// 运行一个本地脚本（CLI 使用）
///
/// `path` 可以带 `.luau` 扩展名；目录则运行其中的 `main.luau`。
pub fn run_file(path: &str, loader: &LoaderFactory, config: &VmConfig) -> Result<ExecuteOutput, CoputerError> {
    let path = path.strip_suffix(".luau").unwrap_or(path);
    execute(path, loader(config), ProgramArgs::None, config.timeout())
}
