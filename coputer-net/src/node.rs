//! 节点
//!
//! 节点持有身份、已知对端表和等待结果表，并通过两个通道与传输层交互：
//! 发出的加密帧（[`AddressedMsg`]）和收到的原始帧（`Vec<u8>`）。
//!
//! 线程模型：
//! - 一个接收线程解码收到的帧并分发
//! - 每个运行请求在独立的短命线程中执行
//! - 调用 [`Node::run_web_program`] 的线程阻塞在一次性回复通道上，直到超时

use crate::error::{CryptoError, NodeError};
use crate::keys::{Address, Keypair, PK};
use crate::messages::{self, Message, HASH_SIZE};
use crate::peer::{Identity, Peer};
use coputer_core::{ProgramArgs, ProgramRets, ProgramType, WebArgs, WebRets};
use parking_lot::Mutex;
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TARGET: &str = "coputer::net";

/// 接收线程检查运行标志的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// 能保存和运行程序的宿主
pub trait ProgramHost: Send + Sync {
    /// 保存 `pk` 名下的程序包，返回包哈希
    fn store(&self, pk: &PK, name: &str, bundle: &[u8]) -> Result<[u8; 32], NodeError>;

    /// 运行本地保存的程序
    fn run(&self, pk: &PK, name: &str, input: &ProgramArgs) -> Result<ProgramRets, NodeError>;
}

/// 发往某个对端的加密帧
#[derive(Debug, Clone)]
pub struct AddressedMsg {
    pub peer: Peer,
    pub frame: Vec<u8>,
}

/// 传输层持有的一端
pub struct NodeTransport {
    /// 节点要发出的帧
    pub outgoing: Receiver<AddressedMsg>,
    /// 收到的帧交给节点
    pub incoming: Sender<Vec<u8>>,
}

/// 等待结果的键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WaitKey {
    pk: PK,
    name: String,
    input_hash: [u8; HASH_SIZE],
}

type Reply = Option<ProgramRets>;

/// 同一键可能有多个调用者同时等待；只广播一次
struct Waiting {
    replies: Vec<(u64, Sender<Reply>)>,
    /// 尚未回复的对端数
    pending: usize,
}

struct NodeInner {
    identity: Identity,
    log_id: String,
    host: Option<Arc<dyn ProgramHost>>,
    peers: Mutex<HashMap<PK, Peer>>,
    waiting: Mutex<HashMap<WaitKey, Waiting>>,
    send_raw: Mutex<Option<Sender<AddressedMsg>>>,
    receive_raw: Mutex<Option<Receiver<Vec<u8>>>>,
    running: AtomicBool,
    next_waiter: AtomicU64,
    reply_timeout: Duration,
}

/// P2P 节点；克隆得到同一节点的另一个句柄
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("pk", &self.inner.identity.pk())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Node {
    pub fn new(keypair: Keypair, main_addr: Address, alt_addrs: Vec<Address>) -> (Node, NodeTransport) {
        Self::with_identity(Identity::new(keypair, main_addr, alt_addrs), None, DEFAULT_REPLY_TIMEOUT)
    }

    pub fn with_identity(
        identity: Identity,
        host: Option<Arc<dyn ProgramHost>>,
        reply_timeout: Duration,
    ) -> (Node, NodeTransport) {
        let (send_tx, send_rx) = mpsc::channel();
        let (recv_tx, recv_rx) = mpsc::channel();
        let inner = NodeInner {
            log_id: identity.pk().log_id(),
            identity,
            host,
            peers: Mutex::new(HashMap::new()),
            waiting: Mutex::new(HashMap::new()),
            send_raw: Mutex::new(Some(send_tx)),
            receive_raw: Mutex::new(Some(recv_rx)),
            running: AtomicBool::new(false),
            next_waiter: AtomicU64::new(0),
            reply_timeout,
        };
        let transport = NodeTransport {
            outgoing: send_rx,
            incoming: recv_tx,
        };
        (
            Node {
                inner: Arc::new(inner),
            },
            transport,
        )
    }

    pub fn pk(&self) -> PK {
        self.inner.identity.pk()
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn find_string(&self) -> Result<String, CryptoError> {
        self.inner.identity.find_string()
    }

    /// 添加对端；已知的对端保持不变
    pub fn add_peer(&self, peer: Peer) {
        if peer.pk == self.pk() {
            return;
        }
        self.inner.peers.lock().entry(peer.pk).or_insert(peer);
    }

    pub fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.inner.peers.lock().values().cloned().collect();
        peers.sort_by_key(|p| p.pk);
        peers
    }

    pub fn peer(&self, pk: &PK) -> Option<Peer> {
        self.inner.peers.lock().get(pk).cloned()
    }

    /// 启动接收线程并向所有已知对端问好
    pub fn start(&self) -> Result<(), NodeError> {
        let receiver = self.inner.receive_raw.lock().take().ok_or(NodeError::Stopped)?;
        self.inner.running.store(true, Ordering::SeqCst);

        let peers = self.peers();
        info!(
            target: TARGET,
            node = %self.inner.log_id,
            pk = %self.pk(),
            peers = peers.len(),
            "starting"
        );

        let node = self.clone();
        thread::Builder::new()
            .name(format!("coputer-recv-{}", self.inner.log_id))
            .spawn(move || node.receive(receiver))
            .map_err(|e| NodeError::Host(e.to_string()))?;

        for peer in &peers {
            debug!(target: TARGET, node = %self.inner.log_id, peer = %peer.pk, "sending hi");
            if let Err(e) = self.send(peer, &Message::Hi) {
                warn!(target: TARGET, node = %self.inner.log_id, error = %e, "failed to send hi");
            }
        }
        Ok(())
    }

    /// 停止：关闭发送通道，接收线程在下一次轮询时退出，等待中的调用立即失败
    pub fn stop(&self) {
        info!(target: TARGET, node = %self.inner.log_id, "stopping");
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.send_raw.lock().take();
        self.inner.receive_raw.lock().take();
        self.inner.waiting.lock().clear();
    }

    fn send(&self, peer: &Peer, msg: &Message) -> Result<(), NodeError> {
        let frame = self.inner.identity.encrypt(&msg.encode()?, &peer.pk)?;
        let guard = self.inner.send_raw.lock();
        let sender = guard.as_ref().ok_or(NodeError::Stopped)?;
        sender
            .send(AddressedMsg {
                peer: peer.clone(),
                frame,
            })
            .map_err(|_| NodeError::Stopped)
    }

    fn receive(&self, receiver: Receiver<Vec<u8>>) {
        loop {
            let frame = match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_running() {
                        continue;
                    }
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if !self.is_running() {
                break;
            }
            self.receive_frame(&frame);
        }
        debug!(target: TARGET, node = %self.inner.log_id, "receiver stopped");
    }

    /// 解码并处理一帧；格式错误的帧记录后丢弃
    fn receive_frame(&self, frame: &[u8]) {
        let opened = match self.inner.identity.decrypt(frame) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(target: TARGET, node = %self.inner.log_id, error = %e, "failed to decode message");
                return;
            }
        };
        let Some(from) = Peer::from_opened(&opened) else {
            return;
        };
        let from = self.seen_peer(from);

        let msg = match Message::decode(&opened.message) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(target: TARGET, node = %self.inner.log_id, from = %from.pk, error = %e, "failed to deserialise message");
                return;
            }
        };
        debug!(
            target: TARGET,
            node = %self.inner.log_id,
            from = %from.pk,
            kind = msg.type_name(),
            len = opened.message.len(),
            "received"
        );
        self.handle(from, msg);
    }

    /// 记录对端最后一次出现的时间
    fn seen_peer(&self, peer: Peer) -> Peer {
        let mut peers = self.inner.peers.lock();
        let known = peers.entry(peer.pk).or_insert(peer);
        known.last_seen = Some(Instant::now());
        known.clone()
    }

    fn handle(&self, from: Peer, msg: Message) {
        match msg {
            Message::Hi => {
                info!(target: TARGET, node = %self.inner.log_id, from = %from.pk, "received hi");
            }
            Message::Store {
                name,
                pk,
                signature,
                bundle,
            } => {
                if !messages::verify_store(&pk, &name, &bundle, &signature) {
                    warn!(target: TARGET, node = %self.inner.log_id, from = %from.pk, "invalid store signature");
                    return;
                }
                let Some(host) = &self.inner.host else {
                    debug!(target: TARGET, node = %self.inner.log_id, "no host to store program");
                    return;
                };
                match host.store(&pk, &name, &bundle) {
                    Ok(hash) => {
                        if let Err(e) = self.send(&from, &Message::StoreResult { hash }) {
                            warn!(target: TARGET, node = %self.inner.log_id, error = %e, "failed to send store result");
                        }
                    }
                    Err(e) => warn!(target: TARGET, node = %self.inner.log_id, error = %e, "failed to store program"),
                }
            }
            Message::StoreResult { hash } => {
                info!(
                    target: TARGET,
                    node = %self.inner.log_id,
                    from = %from.pk,
                    hash = %hex::encode(hash),
                    "program storage successful"
                );
            }
            Message::Run { pk, name, input } => {
                let node = self.clone();
                let spawned = thread::Builder::new()
                    .name(format!("coputer-run-{}", self.inner.log_id))
                    .spawn(move || node.run_for_peer(from, pk, name, input));
                if let Err(e) = spawned {
                    warn!(target: TARGET, node = %self.inner.log_id, error = %e, "failed to spawn run");
                }
            }
            Message::RunResult {
                pk,
                name,
                input_hash,
                result,
                ..
            } => self.deliver(WaitKey { pk, name, input_hash }, result),
        }
    }

    /// 为对端运行程序；失败时回复空结果
    fn run_for_peer(&self, from: Peer, pk: PK, name: String, input: ProgramArgs) {
        let ProgramArgs::Web(args) = &input else {
            warn!(target: TARGET, node = %self.inner.log_id, "unknown program type");
            return;
        };
        info!(target: TARGET, node = %self.inner.log_id, pk = %pk, name = %name, "running program");

        let result = match &self.inner.host {
            Some(host) => match host.run(&pk, &name, &input) {
                Ok(rets) => Some(rets),
                Err(e) => {
                    warn!(target: TARGET, node = %self.inner.log_id, error = %e, "failed to run program");
                    None
                }
            },
            None => None,
        };

        let reply = Message::RunResult {
            ptype: ProgramType::Web,
            pk,
            name,
            input_hash: messages::input_hash(args),
            result,
        };
        if let Err(e) = self.send(&from, &reply) {
            warn!(target: TARGET, node = %self.inner.log_id, error = %e, "failed to send run result");
        }
    }

    /// 第一个非空结果获胜；所有对端都失败时发出空结果
    fn deliver(&self, key: WaitKey, result: Reply) {
        let mut waiting = self.inner.waiting.lock();
        let Some(entry) = waiting.get_mut(&key) else {
            debug!(target: TARGET, node = %self.inner.log_id, name = %key.name, "result for unexpected program");
            return;
        };

        entry.pending = entry.pending.saturating_sub(1);
        if result.is_none() && entry.pending > 0 {
            return;
        }
        if let Some(entry) = waiting.remove(&key) {
            for (_, reply) in entry.replies {
                let _ = reply.send(result.clone());
            }
        }
    }

    /// 本地保存（若有宿主）并发送给所有对端，返回包哈希
    pub fn store_program(&self, name: &str, bundle: &[u8]) -> Result<[u8; 32], NodeError> {
        let kp = &self.inner.identity.keypair;
        let hash = match &self.inner.host {
            Some(host) => host.store(&kp.pk, name, bundle)?,
            None => Sha3_256::digest(bundle).into(),
        };

        let msg = Message::store(&kp.sk, kp.pk, name, bundle.to_vec())?;
        for peer in self.peers() {
            self.send(&peer, &msg)?;
        }
        Ok(hash)
    }

    /// 运行 web 程序：`use_local` 时先尝试本地宿主，否则广播给所有对端
    pub fn run_web_program(
        &self,
        pk: &PK,
        name: &str,
        input: WebArgs,
        use_local: bool,
    ) -> Result<WebRets, NodeError> {
        let input = ProgramArgs::Web(input);
        if use_local {
            if let Some(host) = &self.inner.host {
                match host.run(pk, name, &input) {
                    Ok(ProgramRets::Web(rets)) => return Ok(rets),
                    Err(e) => debug!(target: TARGET, node = %self.inner.log_id, error = %e, "local run failed"),
                }
            }
        }

        match self.peer_run(pk, name, input)? {
            Some(ProgramRets::Web(rets)) => Ok(rets),
            None => Err(NodeError::RunFailed),
        }
    }

    /// 我们没有这个程序，请对端运行
    fn peer_run(&self, pk: &PK, name: &str, input: ProgramArgs) -> Result<Reply, NodeError> {
        if !self.is_running() {
            return Err(NodeError::Stopped);
        }
        let ProgramArgs::Web(args) = &input else {
            return Err(NodeError::InvalidProgramType);
        };
        let peers = self.peers();
        if peers.is_empty() {
            return Err(NodeError::NoPeers);
        }

        let key = WaitKey {
            pk: *pk,
            name: name.to_string(),
            input_hash: messages::input_hash(args),
        };
        let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        let first = {
            let mut waiting = self.inner.waiting.lock();
            match waiting.get_mut(&key) {
                Some(entry) => {
                    entry.replies.push((id, tx));
                    false
                }
                None => {
                    waiting.insert(
                        key.clone(),
                        Waiting {
                            replies: vec![(id, tx)],
                            pending: peers.len(),
                        },
                    );
                    true
                }
            }
        };

        if first {
            let msg = Message::Run {
                pk: *pk,
                name: name.to_string(),
                input,
            };
            for peer in &peers {
                if let Err(e) = self.send(peer, &msg) {
                    self.forget(&key, id);
                    return Err(e);
                }
            }
        }

        match rx.recv_timeout(self.inner.reply_timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => {
                self.forget(&key, id);
                Err(NodeError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(NodeError::Stopped),
        }
    }

    fn forget(&self, key: &WaitKey, id: u64) {
        let mut waiting = self.inner.waiting.lock();
        if let Some(entry) = waiting.get_mut(key) {
            entry.replies.retain(|(waiter, _)| *waiter != id);
            if entry.replies.is_empty() {
                waiting.remove(key);
            }
        }
    }
}
