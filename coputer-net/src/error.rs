//! 网络层错误类型

use thiserror::Error;

/// 密钥解码与生成错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid key type")]
    InvalidKeyType,

    #[error("invalid key format")]
    InvalidFormat,

    #[error("non-base character '{0}'")]
    NonBaseCharacter(char),

    #[error("key out of range")]
    OutOfRange,

    #[error("public key does not have the required prefix")]
    MissingPrefix,
}

/// 加密帧错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("too many addresses")]
    TooManyAddresses,

    #[error("peer has no address")]
    NoAddress,

    #[error("encryption failed")]
    Encryption,

    #[error("message too short ({0})")]
    TooShort(usize),

    #[error("key decryption failed")]
    KeyDecryption,

    #[error("addresses decryption failed")]
    AddressDecryption,

    #[error("chunk decryption failed")]
    ChunkDecryption,

    #[error("signing failed")]
    Signing,
}

/// 查找串解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FindError {
    #[error("not a valid find string")]
    Invalid,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("invalid addresses encoding: {0}")]
    Encoding(String),

    #[error("invalid addresses signature")]
    Signature,

    #[error("invalid addresses part length")]
    AddressLength,
}

/// 消息编解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("invalid message length")]
    InvalidLength,

    #[error("invalid name length")]
    InvalidNameLength,

    #[error("unknown message type")]
    UnknownType,

    #[error("unknown program type")]
    UnknownProgramType,

    #[error("failed to unmarshal web args: {0}")]
    WebArgs(String),

    #[error("failed to unmarshal web result: {0}")]
    WebResult(String),

    #[error("invalid store signature")]
    InvalidSignature,
}

/// 节点错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("no peers to run program")]
    NoPeers,

    #[error("no peer could run program")]
    RunFailed,

    #[error("timed out waiting for a run result")]
    Timeout,

    #[error("node is stopped")]
    Stopped,

    #[error("invalid program type")]
    InvalidProgramType,

    #[error("node has no program host")]
    NoHost,

    #[error("program host error: {0}")]
    Host(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Message(#[from] MessageError),
}
