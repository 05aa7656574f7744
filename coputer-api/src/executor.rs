//! 存储程序的执行器
//!
//! 通过名称索引找到程序包，加载 `init.luau`，注入 web 参数并在截止时间内运行。
//! 相同程序包与相同输入的结果（包括错误）会被缓存：程序是确定性的。

use crate::config::RunConfig;
use crate::error::CoputerError;
use crate::execute::{default_loader, execute};
use crate::types::LoaderFactory;
use crate::web::web_rets;
use coputer_core::{ProgramArgs, ProgramRets, VmConfig, VmError, WebArgs, WebRets};
use coputer_net::{input_hash, NodeError, ProgramHost, PK};
use coputer_store::{NativeFileSystem, ProgramStore, StoreOutcome, VirtualFileSystem, ENTRYPOINT};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

const TARGET: &str = "coputer::api";

type CacheKey = ([u8; 32], [u8; 32]);

pub struct Executor<F: VirtualFileSystem = NativeFileSystem> {
    store: ProgramStore<F>,
    vm: VmConfig,
    loader: LoaderFactory,
    cache: Mutex<HashMap<CacheKey, Result<WebRets, CoputerError>>>,
}

impl Executor<NativeFileSystem> {
    /// 使用本机文件系统与外部编译器
    pub fn open(config: &RunConfig) -> Self {
        Self::with_store(ProgramStore::open(config.store.clone()), config.vm.clone())
    }
}

impl<F: VirtualFileSystem> Executor<F> {
    pub fn with_store(store: ProgramStore<F>, vm: VmConfig) -> Self {
        Self {
            store,
            vm,
            loader: default_loader(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 替换模块加载器（测试中使用内存字节码）
    pub fn with_loader(mut self, loader: LoaderFactory) -> Self {
        self.loader = loader;
        self
    }

    pub fn store(&self) -> &ProgramStore<F> {
        &self.store
    }

    pub fn vm_config(&self) -> &VmConfig {
        &self.vm
    }

    pub fn store_program(
        &self,
        owner: &str,
        name: &str,
        bundle: &[u8],
    ) -> Result<([u8; 32], StoreOutcome), CoputerError> {
        let (hash, outcome) = self.store.store(owner, name, bundle)?;
        info!(target: TARGET, owner, name, hash = %hex::encode(hash), ?outcome, "stored program");
        Ok((hash, outcome))
    }

    pub fn names(&self, owner: &str) -> Result<Vec<String>, CoputerError> {
        Ok(self.store.names(owner)?)
    }

    /// 入口模块路径（不带扩展名）
    pub fn entry_module(&self, hash: &[u8; 32]) -> String {
        self.store.program_dir(hash).join(ENTRYPOINT).to_string_lossy().into_owned()
    }

    /// 按名称运行 web 程序
    pub fn run_web(&self, owner: &str, name: &str, args: &WebArgs) -> Result<WebRets, CoputerError> {
        let hash = self
            .store
            .lookup(owner, name)?
            .ok_or_else(|| CoputerError::NotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            })?;
        self.run_hash(&hash, args)
    }

    /// 按程序包哈希运行 web 程序
    pub fn run_hash(&self, hash: &[u8; 32], args: &WebArgs) -> Result<WebRets, CoputerError> {
        let key = (*hash, input_hash(args));
        if let Some(cached) = self.cache.lock().get(&key) {
            debug!(target: TARGET, hash = %hex::encode(hash), "cached result");
            return cached.clone();
        }

        let path = self.entry_module(hash);
        info!(target: TARGET, hash = %hex::encode(hash), method = %args.method, path = %args.url.path, "running web program");
        let result = execute(
            &path,
            (self.loader)(&self.vm),
            ProgramArgs::Web(args.clone()),
            self.vm.timeout(),
        )
        .and_then(|output| web_rets(&output.values));

        // 取消取决于时间，不缓存
        if !matches!(result, Err(CoputerError::Vm(VmError::Cancelled))) {
            self.cache.lock().insert(key, result.clone());
        }
        result
    }

    pub fn cached_results(&self) -> usize {
        self.cache.lock().len()
    }
}

fn host_error(e: CoputerError) -> NodeError {
    NodeError::Host(e.to_string())
}

impl<F: VirtualFileSystem> ProgramHost for Executor<F> {
    fn store(&self, pk: &PK, name: &str, bundle: &[u8]) -> Result<[u8; 32], NodeError> {
        self.store_program(&pk.encode_no_prefix(), name, bundle)
            .map(|(hash, _)| hash)
            .map_err(host_error)
    }

    fn run(&self, pk: &PK, name: &str, input: &ProgramArgs) -> Result<ProgramRets, NodeError> {
        let ProgramArgs::Web(args) = input else {
            return Err(NodeError::InvalidProgramType);
        };
        self.run_web(&pk.encode_no_prefix(), name, args)
            .map(ProgramRets::Web)
            .map_err(host_error)
    }
}
