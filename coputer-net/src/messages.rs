//! 节点间消息
//!
//! 每条消息是一个类型字节加上类型相关的消息体：
//!
//! | 类型 | 消息体 |
//! |------|--------|
//! | 0 Hi | 空 |
//! | 1 Store | 名字长度 u8 + 名字 + 公钥 29 + 签名 64 + 包 |
//! | 2 StoreResult | 哈希 32 |
//! | 3 Run | 程序类型 u8 + 公钥 29 + 名字长度 u8 + 名字 + JSON 输入 |
//! | 4 RunResult | 程序类型 u8 + 公钥 29 + 名字长度 u8 + 名字 + 输入哈希 32 + JSON 输出（空表示失败） |

use crate::crypto;
use crate::error::{CryptoError, MessageError};
use crate::keys::{PK, PK_SIZE, SK};
use coputer_core::{ProgramArgs, ProgramRets, ProgramType, WebArgs, WebRets};
use sha3::{Digest, Sha3_256, Sha3_384};

pub const HASH_SIZE: usize = 32;
/// SHA3-384 摘要加上签名开销
pub const SIGNATURE_SIZE: usize = 48 + crypto::OVERHEAD;

const T_HI: u8 = 0;
const T_STORE: u8 = 1;
const T_STORE_RESULT: u8 = 2;
const T_RUN: u8 = 3;
const T_RUN_RESULT: u8 = 4;

/// 节点间传递的消息
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hi,
    /// 请求对端保存一个程序包；签名证明上传者持有 `pk` 的私钥
    Store {
        name: String,
        pk: PK,
        signature: [u8; SIGNATURE_SIZE],
        bundle: Vec<u8>,
    },
    StoreResult { hash: [u8; HASH_SIZE] },
    Run {
        pk: PK,
        name: String,
        input: ProgramArgs,
    },
    /// `result` 为 `None` 表示对端未能运行该程序
    RunResult {
        ptype: ProgramType,
        pk: PK,
        name: String,
        input_hash: [u8; HASH_SIZE],
        result: Option<ProgramRets>,
    },
}

/// 输入的规范 JSON 编码的 SHA3-256
pub fn input_hash(input: &WebArgs) -> [u8; HASH_SIZE] {
    Sha3_256::digest(input.encode()).into()
}

fn store_digest(name: &str, bundle: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_384::new();
    hasher.update([name.len() as u8]);
    hasher.update(name.as_bytes());
    hasher.update(bundle);
    hasher.finalize().to_vec()
}

/// 对（名字，包）签名
pub fn sign_store(sk: &SK, name: &str, bundle: &[u8]) -> Result<[u8; SIGNATURE_SIZE], CryptoError> {
    let signed = crypto::sign(sk, &store_digest(name, bundle))?;
    signed.try_into().map_err(|_| CryptoError::Signing)
}

/// 检查签名是否由 `pk` 的持有者对这个（名字，包）作出
pub fn verify_store(pk: &PK, name: &str, bundle: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> bool {
    crypto::verify(pk, signature).is_some_and(|digest| digest == store_digest(name, bundle))
}

fn check_name(name: &str) -> Result<u8, MessageError> {
    match u8::try_from(name.len()) {
        Ok(0) | Err(_) => Err(MessageError::InvalidNameLength),
        Ok(n) => Ok(n),
    }
}

fn push_name(out: &mut Vec<u8>, name: &str) -> Result<(), MessageError> {
    out.push(check_name(name)?);
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

/// 读取消息体的游标；越界统一报 "invalid message length"
struct Reader<'a> {
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], MessageError> {
        if self.rest.len() < n {
            return Err(MessageError::InvalidLength);
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn byte(&mut self) -> Result<u8, MessageError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn pk(&mut self) -> Result<PK, MessageError> {
        self.array::<PK_SIZE>().map(PK)
    }

    fn name(&mut self) -> Result<String, MessageError> {
        let len = usize::from(self.byte()?);
        if len == 0 || len > self.rest.len() {
            return Err(MessageError::InvalidNameLength);
        }
        String::from_utf8(self.take(len)?.to_vec()).map_err(|_| MessageError::InvalidNameLength)
    }

    fn ptype(&mut self) -> Result<ProgramType, MessageError> {
        match ProgramType::from_byte(self.byte()?) {
            Some(ProgramType::Web) => Ok(ProgramType::Web),
            _ => Err(MessageError::UnknownProgramType),
        }
    }

    fn remaining(self) -> &'a [u8] {
        self.rest
    }
}

impl Message {
    pub fn type_byte(&self) -> u8 {
        match self {
            Message::Hi => T_HI,
            Message::Store { .. } => T_STORE,
            Message::StoreResult { .. } => T_STORE_RESULT,
            Message::Run { .. } => T_RUN,
            Message::RunResult { .. } => T_RUN_RESULT,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Hi => "hi",
            Message::Store { .. } => "store",
            Message::StoreResult { .. } => "store result",
            Message::Run { .. } => "run",
            Message::RunResult { .. } => "run result",
        }
    }

    /// 构造一条已签名的保存请求
    pub fn store(sk: &SK, pk: PK, name: &str, bundle: Vec<u8>) -> Result<Message, CryptoError> {
        Ok(Message::Store {
            name: name.to_string(),
            pk,
            signature: sign_store(sk, name, &bundle)?,
            bundle,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let mut out = vec![self.type_byte()];
        match self {
            Message::Hi => {}
            Message::Store {
                name,
                pk,
                signature,
                bundle,
            } => {
                out.reserve(1 + name.len() + PK_SIZE + SIGNATURE_SIZE + bundle.len());
                push_name(&mut out, name)?;
                out.extend_from_slice(&pk.0);
                out.extend_from_slice(signature);
                out.extend_from_slice(bundle);
            }
            Message::StoreResult { hash } => out.extend_from_slice(hash),
            Message::Run { pk, name, input } => {
                let ProgramArgs::Web(args) = input else {
                    return Err(MessageError::UnknownProgramType);
                };
                check_name(name)?;
                out.push(ProgramType::Web.as_byte());
                out.extend_from_slice(&pk.0);
                push_name(&mut out, name)?;
                out.extend_from_slice(&args.encode());
            }
            Message::RunResult {
                ptype,
                pk,
                name,
                input_hash,
                result,
            } => {
                check_name(name)?;
                out.push(ptype.as_byte());
                out.extend_from_slice(&pk.0);
                push_name(&mut out, name)?;
                out.extend_from_slice(input_hash);
                if let Some(result) = result {
                    out.extend_from_slice(&result.encode());
                }
            }
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, MessageError> {
        let (&ty, body) = bytes.split_first().ok_or(MessageError::InvalidLength)?;
        let mut r = Reader { rest: body };

        let msg = match ty {
            T_HI => Message::Hi,
            T_STORE => {
                let name = r.name()?;
                let pk = r.pk()?;
                let signature = r.array::<SIGNATURE_SIZE>()?;
                Message::Store {
                    name,
                    pk,
                    signature,
                    bundle: r.remaining().to_vec(),
                }
            }
            T_STORE_RESULT => {
                if body.len() != HASH_SIZE {
                    return Err(MessageError::InvalidLength);
                }
                Message::StoreResult { hash: r.array()? }
            }
            T_RUN => {
                r.ptype()?;
                let pk = r.pk()?;
                let name = r.name()?;
                let args = WebArgs::decode(r.remaining()).map_err(|e| MessageError::WebArgs(e.to_string()))?;
                Message::Run {
                    pk,
                    name,
                    input: ProgramArgs::Web(args),
                }
            }
            T_RUN_RESULT => {
                let ptype = r.ptype()?;
                let pk = r.pk()?;
                let name = r.name()?;
                let input_hash = r.array::<HASH_SIZE>()?;
                let rest = r.remaining();
                let result = if rest.is_empty() {
                    None
                } else {
                    let rets = WebRets::decode(rest).map_err(|e| MessageError::WebResult(e.to_string()))?;
                    Some(ProgramRets::Web(rets))
                };
                Message::RunResult {
                    ptype,
                    pk,
                    name,
                    input_hash,
                    result,
                }
            }
            _ => return Err(MessageError::UnknownType),
        };
        Ok(msg)
    }
}
