//! 进程内网络
//!
//! 按公钥把 [`AddressedMsg`] 路由到对应节点的接收通道。测试和命令行演示用它
//! 代替真实传输；每个节点有一个路由线程，节点停止后随发送通道关闭而退出。

use crate::error::NodeError;
use crate::keys::{Address, Keypair, PK};
use crate::node::{AddressedMsg, Node, NodeTransport, ProgramHost};
use crate::peer::{Identity, Peer};
use coputer_config::NodeConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

#[derive(Clone, Default)]
pub struct LocalNet {
    routes: Arc<Mutex<HashMap<PK, Sender<Vec<u8>>>>>,
}

impl LocalNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接入一个节点：登记它的接收通道并转发它发出的帧
    pub fn attach(&self, node: &Node, transport: NodeTransport) -> Result<(), NodeError> {
        let NodeTransport { outgoing, incoming } = transport;
        self.routes.lock().insert(node.pk(), incoming);

        let routes = self.routes.clone();
        let log_id = node.pk().log_id();
        thread::Builder::new()
            .name(format!("coputer-route-{log_id}"))
            .spawn(move || {
                for AddressedMsg { peer, frame } in outgoing {
                    let route = routes.lock().get(&peer.pk).cloned();
                    match route {
                        Some(route) => {
                            trace!(target: "coputer::net", node = %log_id, to = %peer.pk, len = frame.len(), "routing");
                            let _ = route.send(frame);
                        }
                        None => debug!(target: "coputer::net", node = %log_id, to = %peer.pk, "no route to peer"),
                    }
                }
            })
            .map_err(|e| NodeError::Host(e.to_string()))?;
        Ok(())
    }

    /// 创建、接入并启动一个节点
    pub fn spawn_node(
        &self,
        keypair: Keypair,
        main_addr: Address,
        peers: &[Peer],
        host: Option<Arc<dyn ProgramHost>>,
        config: &NodeConfig,
    ) -> Result<Node, NodeError> {
        let identity = Identity::new(keypair, main_addr, Vec::new());
        let (node, transport) = Node::with_identity(identity, host, config.reply_timeout());
        for peer in peers {
            node.add_peer(peer.clone());
        }
        self.attach(&node, transport)?;
        node.start()?;
        Ok(node)
    }

    /// 断开节点；发往它的帧此后被丢弃
    pub fn detach(&self, pk: &PK) {
        self.routes.lock().remove(pk);
    }

    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.lock().is_empty()
    }
}
