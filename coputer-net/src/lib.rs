//! Coputer Net - Identities, sealed frames and peer routing
//!
//! Every node is identified by a proof-of-work Curve25519 public key whose
//! first three bytes are zero. Nodes exchange sealed frames that reveal the
//! sender's key and addresses only to the recipient, carrying store and run
//! requests for programs addressed by `(owner key, name)`.
//!
//! # Usage
//! ```rust,ignore
//! use coputer_net::{Keypair, LocalNet, Address, NodeConfig};
//!
//! let net = LocalNet::new();
//! let server = net.spawn_node(Keypair::generate(4), Address::numbered(1), &[], Some(host), &NodeConfig::default())?;
//! let client = net.spawn_node(Keypair::generate(4), Address::numbered(2), &[server.identity().peer()], None, &NodeConfig::default())?;
//! let rets = client.run_web_program(&owner, "hello", args, false)?;
//! ```

pub mod crypto;
pub mod encoding;
mod error;
pub mod keys;
pub mod local;
pub mod messages;
pub mod node;
pub mod peer;

pub use crypto::{decrypt, encrypt, sign, verify, Opened};
pub use error::{CryptoError, FindError, KeyError, MessageError, NodeError};
pub use keys::{Address, Keypair, ADDRESS_LEN, PK, PK_SIZE, SK, SK_SIZE};
pub use local::LocalNet;
pub use messages::{input_hash, Message};
pub use node::{AddressedMsg, Node, NodeTransport, ProgramHost};
pub use peer::{Identity, Peer, FIND_START};

// Re-export config types from coputer-config
pub use coputer_config::NodeConfig;
