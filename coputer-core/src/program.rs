//! 程序参数与返回值
//!
//! 这些类型在网络上以 JSON 传输；字节字段按 base64 编码。
//! 映射使用 BTreeMap，保证同一输入总是得到相同的编码（输入哈希依赖于此）。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 程序类型（线上的单字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProgramType {
    /// 仅用于调试与测试
    Test = 0,
    Web = 1,
}

impl ProgramType {
    pub fn from_byte(b: u8) -> Option<ProgramType> {
        match b {
            0 => Some(ProgramType::Test),
            1 => Some(ProgramType::Web),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = Option::<String>::deserialize(d)?;
        match text {
            Some(text) => STANDARD.decode(text).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

/// 解析后的 URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebArgsUrl {
    pub rawpath: String,
    pub path: String,
    pub rawquery: String,
    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,
}

/// Web 程序的输入
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebArgs {
    pub url: WebArgsUrl,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl WebArgs {
    pub fn encode(&self) -> Vec<u8> {
        // 只含字符串与字节，序列化不会失败
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<WebArgs, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Web 程序的返回
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRets {
    pub statuscode: u16,
    #[serde(default)]
    pub statusmessage: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl WebRets {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<WebRets, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// 宿主注入给程序的参数
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ProgramArgs {
    #[default]
    None,
    Web(WebArgs),
}

impl ProgramArgs {
    pub fn program_type(&self) -> Option<ProgramType> {
        match self {
            ProgramArgs::None => None,
            ProgramArgs::Web(_) => Some(ProgramType::Web),
        }
    }
}

/// 程序返回给宿主的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramRets {
    Web(WebRets),
}

impl ProgramRets {
    pub fn program_type(&self) -> ProgramType {
        match self {
            ProgramRets::Web(_) => ProgramType::Web,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ProgramRets::Web(r) => r.encode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_args_json_shape() {
        let mut args = WebArgs {
            method: "GET".to_string(),
            body: b"hi".to_vec(),
            ..WebArgs::default()
        };
        args.url.path = "/a".to_string();
        args.url.query.insert("q".to_string(), vec!["1".to_string()]);

        let json: serde_json::Value = serde_json::from_slice(&args.encode()).unwrap();
        assert_eq!(json["url"]["path"], "/a");
        assert_eq!(json["url"]["query"]["q"][0], "1");
        assert_eq!(json["body"], "aGk=");
        assert_eq!(WebArgs::decode(&args.encode()).unwrap(), args);
    }

    #[test]
    fn test_null_body() {
        let rets = WebRets::decode(br#"{"statuscode": 204, "headers": {}, "body": null}"#).unwrap();
        assert_eq!(rets.statuscode, 204);
        assert!(rets.body.is_empty());
    }

    #[test]
    fn test_program_type_byte() {
        assert_eq!(ProgramType::from_byte(1), Some(ProgramType::Web));
        assert_eq!(ProgramType::Web.as_byte(), 1);
        assert_eq!(ProgramType::from_byte(7), None);
    }
}
