//! Coputer CLI - Command line interface
//!
//! Runs local scripts, bundles program directories, manages proof-of-work keys
//! and drives an in-process network. Settings come from `coputer.json`.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

mod logging;
mod output;

use crate::logging::LogFormat;
use crate::output::{format_values, format_web_rets, print_error};
use coputer_api::{
    default_loader, init_config, run_file, CoputerConfig, CoputerError, Executor, LogLevel, RunConfig, WebArgs,
    WebArgsUrl,
};
use coputer_net::{Address, Identity, Keypair, LocalNet, ProgramHost, SK};
use coputer_store::bundle_dir;

const TARGET: &str = "coputer::cli";

#[derive(Parser)]
#[command(
    name = "coputer",
    about = "Coputer - deterministic Luau programs on a peer-to-peer network",
    version = "0.1.0"
)]
struct Cli {
    /// Configuration file path
    #[arg(long, short, value_name = "CONFIG", default_value = "coputer.json", global = true)]
    config: PathBuf,

    /// Log level: silent, error, warn, info, debug, trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a local script and print its output
    Run {
        /// Script path (with or without .luau)
        script: String,
    },
    /// Bundle a program directory containing init.luau
    Bundle {
        dir: PathBuf,
        /// Output file (default: <dir>.bundle)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a proof-of-work keypair
    Keygen {
        /// Worker threads (default: from config)
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Print the find string for a secret key
    Find {
        /// Secret key (cosec:...)
        #[arg(long)]
        key: String,
        /// Main address
        #[arg(long, default_value = "::1")]
        addr: Ipv6Addr,
        /// Alternative addresses
        #[arg(long)]
        alt: Vec<Ipv6Addr>,
    },
    /// Store a bundle and run it as a web program
    Web {
        /// Bundle file or program directory
        bundle: PathBuf,
        /// Program name
        #[arg(long, default_value = "main")]
        name: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request path, optionally with a query string
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(long)]
        body: Option<String>,
        /// Owner secret key (default: a fresh key)
        #[arg(long)]
        key: Option<String>,
        /// Run in this process instead of through a peer
        #[arg(long)]
        local: bool,
    },
}

/// CLI 错误：API 错误打印结构化报告，其余打印消息
enum CliError {
    Api(CoputerError),
    Message(String),
}

impl From<CoputerError> for CliError {
    fn from(e: CoputerError) -> Self {
        CliError::Api(e)
    }
}

impl From<String> for CliError {
    fn from(e: String) -> Self {
        CliError::Message(e)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match read_config(&cli.config, cli.log_level.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_with_file(&config.log, cli.log_format, cli.log_file.as_ref()) {
        eprintln!("Error: cannot open log file: {e}");
        return ExitCode::FAILURE;
    }
    debug!(target: TARGET, config = %cli.config.display(), "configuration loaded");

    let result = init_config(RunConfig::from(&config))
        .map_err(CliError::from)
        .and_then(|()| dispatch(cli.command, &config));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Api(e)) => {
            print_error(&e);
            ExitCode::FAILURE
        }
        Err(CliError::Message(e)) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// 读取配置文件；文件不存在时使用默认配置
fn read_config(path: &Path, log_level: Option<&str>) -> Result<CoputerConfig, String> {
    let mut config = if path.exists() {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        CoputerConfig::from_json(&content).map_err(|e| format!("cannot parse '{}': {}", path.display(), e))?
    } else {
        CoputerConfig::default()
    };

    if let Some(level) = log_level {
        config.log.global = LogLevel::parse(level).ok_or_else(|| format!("unknown log level '{level}'"))?;
    }
    Ok(config)
}

fn dispatch(command: Command, config: &CoputerConfig) -> Result<(), CliError> {
    match command {
        Command::Run { script } => handle_run(&script, config),
        Command::Bundle { dir, output } => handle_bundle(&dir, output),
        Command::Keygen { threads } => {
            let kp = Keypair::generate(threads.unwrap_or(config.node.key_threads));
            println!("public key: {}", kp.pk.encode());
            println!("secret key: {}", kp.sk.encode());
            Ok(())
        }
        Command::Find { key, addr, alt } => {
            let kp = read_key(&key)?;
            let alts = alt.iter().map(|a| Address(a.octets())).collect();
            let identity = Identity::new(kp, Address(addr.octets()), alts);
            let find = identity.find_string().map_err(|e| CliError::Message(e.to_string()))?;
            println!("{find}");
            Ok(())
        }
        Command::Web {
            bundle,
            name,
            method,
            path,
            body,
            key,
            local,
        } => {
            let bundle = read_bundle(&bundle)?;
            let owner = match key {
                Some(key) => read_key(&key)?,
                None => Keypair::generate(config.node.key_threads),
            };
            let args = web_args(&method, &path, body);
            handle_web(config, owner, &name, &bundle, args, local || config.node.use_local)
        }
    }
}

fn handle_run(script: &str, config: &CoputerConfig) -> Result<(), CliError> {
    let output = run_file(script, &default_loader(), &config.vm)?;
    print!("{}", output.stdout);
    if !output.values.is_empty() {
        println!("{}", format_values(&output.values));
    }
    Ok(())
}

fn handle_bundle(dir: &Path, output: Option<PathBuf>) -> Result<(), CliError> {
    let bundle = bundle_dir(dir).map_err(|e| e.to_string())?;
    let output = output.unwrap_or_else(|| dir.with_extension("bundle"));
    std::fs::write(&output, &bundle).map_err(|e| format!("cannot write '{}': {}", output.display(), e))?;
    info!(target: TARGET, output = %output.display(), bytes = bundle.len(), "wrote bundle");
    println!("{}", hex::encode(coputer_store::bundle_hash(&bundle)));
    Ok(())
}

fn handle_web(
    config: &CoputerConfig,
    owner: Keypair,
    name: &str,
    bundle: &[u8],
    args: WebArgs,
    local: bool,
) -> Result<(), CliError> {
    let run_config = RunConfig::from(config);
    let executor = Arc::new(Executor::open(&run_config));

    let rets = if local {
        let owner = owner.pk.encode_no_prefix();
        executor.store_program(&owner, name, bundle)?;
        executor.run_web(&owner, name, &args)?
    } else {
        // 执行节点持有程序，客户端节点以所有者身份上传并请求运行
        let net = LocalNet::new();
        let host: Arc<dyn ProgramHost> = executor;
        let server = net
            .spawn_node(
                Keypair::generate(config.node.key_threads),
                Address::numbered(1),
                &[],
                Some(host),
                &config.node,
            )
            .map_err(CoputerError::from)?;
        let owner_pk = owner.pk;
        let client = net
            .spawn_node(owner, Address::numbered(2), &[server.identity().peer()], None, &config.node)
            .map_err(CoputerError::from)?;

        let result = client
            .store_program(name, bundle)
            .and_then(|_| client.run_web_program(&owner_pk, name, args, false));
        client.stop();
        server.stop();
        result.map_err(CoputerError::from)?
    };

    println!("{}", format_web_rets(&rets));
    Ok(())
}

fn read_key(key: &str) -> Result<Keypair, CliError> {
    let sk = SK::decode(key).map_err(|e| format!("bad secret key: {e}"))?;
    Ok(Keypair::from_secret(sk).map_err(|e| format!("bad secret key: {e}"))?)
}

fn read_bundle(path: &Path) -> Result<Vec<u8>, CliError> {
    if path.is_dir() {
        return Ok(bundle_dir(path).map_err(|e| e.to_string())?);
    }
    Ok(std::fs::read(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?)
}

/// 拆分 `path?query`；查询参数不做百分号解码
fn web_args(method: &str, target: &str, body: Option<String>) -> WebArgs {
    let (path, rawquery) = target.split_once('?').unwrap_or((target, ""));
    let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in rawquery.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        query.entry(k.to_string()).or_default().push(v.to_string());
    }

    WebArgs {
        url: WebArgsUrl {
            rawpath: path.to_string(),
            path: path.to_string(),
            rawquery: rawquery.to_string(),
            query,
        },
        method: method.to_uppercase(),
        headers: BTreeMap::new(),
        body: body.map(String::into_bytes).unwrap_or_default(),
    }
}
