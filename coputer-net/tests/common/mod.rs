//! 网络集成测试的共享工具

#![allow(dead_code)]

use coputer_core::{ProgramArgs, ProgramRets, WebRets};
use coputer_net::{Keypair, NodeError, ProgramHost, PK, SK};
use parking_lot::Mutex;
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;

/// 满足工作量证明的真实私钥，避免测试中生成密钥
pub const SAMPLE_KEYS: [&str; 7] = [
    "cosec:0aqouiilz3-ynmmxunwx1-7u6e5xppqa-hmz7q8yd3f-5l92e17yos",
    "cosec:0ot4jpb8z4-iq7yu96m3f-9bh2ze9s7w-m7r7vowu2k-tl8pmbetoz",
    "cosec:50u4onk3m0-owyszhfou0-5uvrymlofu-brye4mkomo-3vr2cta2sa",
    "cosec:1omi5wd5ry-acq82a36oo-d73ls1y7h8-tna64ml180-gb4cxjpgk4",
    "cosec:1nikowcxso-yaxz7ewktj-n4cj0bklsd-xbdsl2ipaw-91vww4cex4",
    "cosec:3a1r7x85ki-duan0b0wlk-ate5tun2ag-mdmk5kghrc-3rcpir16w6",
    "cosec:08al1krxnf-u0kmgplotd-yr7fatryv8-9ktqeba3xz-xmzwviykjc",
];

pub fn sample_keypair(i: usize) -> Keypair {
    let sk = SK::decode(SAMPLE_KEYS[i % SAMPLE_KEYS.len()]).expect("valid sample key");
    Keypair::from_secret(sk).expect("sample key is proof-of-work")
}

/// 内存宿主：web 程序回显请求的方法和路径
#[derive(Default)]
pub struct EchoHost {
    programs: Mutex<HashMap<(PK, String), [u8; 32]>>,
    pub runs: Mutex<usize>,
}

impl EchoHost {
    pub fn with_program(pk: PK, name: &str) -> Self {
        let host = Self::default();
        host.programs.lock().insert((pk, name.to_string()), [0; 32]);
        host
    }

    pub fn has(&self, pk: &PK, name: &str) -> bool {
        self.programs.lock().contains_key(&(*pk, name.to_string()))
    }
}

impl ProgramHost for EchoHost {
    fn store(&self, pk: &PK, name: &str, bundle: &[u8]) -> Result<[u8; 32], NodeError> {
        let hash: [u8; 32] = Sha3_256::digest(bundle).into();
        self.programs.lock().insert((*pk, name.to_string()), hash);
        Ok(hash)
    }

    fn run(&self, pk: &PK, name: &str, input: &ProgramArgs) -> Result<ProgramRets, NodeError> {
        if !self.has(pk, name) {
            return Err(NodeError::Host(format!("program {name} not found")));
        }
        let ProgramArgs::Web(args) = input else {
            return Err(NodeError::InvalidProgramType);
        };
        *self.runs.lock() += 1;
        Ok(ProgramRets::Web(WebRets {
            statuscode: 200,
            statusmessage: "OK".to_string(),
            headers: Default::default(),
            body: format!("hello {} {}", args.method, args.url.path).into_bytes(),
        }))
    }
}
