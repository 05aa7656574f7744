//! Web 程序返回值转换
//!
//! Web 程序必须返回恰好一个表：
//! - `statuscode`：数字，100..=599，默认 200
//! - `statusmessage`：字符串，默认为标准原因短语，没有时为 `Error N`
//! - `headers`：字符串到字符串的表
//! - `body`：缓冲区；缺省时正文为状态消息，并设置 `content-type: text/plain; charset=utf-8`

use crate::error::CoputerError;
use coputer_core::{Value, WebRets};
use std::collections::BTreeMap;

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

fn fail(message: &str) -> CoputerError {
    CoputerError::Result(message.to_string())
}

/// HTTP 状态码的标准原因短语
pub fn status_text(code: u16) -> Option<&'static str> {
    let text = match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        103 => "Early Hints",

        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        208 => "Already Reported",
        226 => "IM Used",

        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",

        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",

        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => return None,
    };
    Some(text)
}

fn lua_string(v: &Value) -> Option<String> {
    v.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned())
}

/// 把程序的返回值转换为 web 结果
pub fn web_rets(values: &[Value]) -> Result<WebRets, CoputerError> {
    let [value] = values else {
        return Err(fail("program did not return a single value"));
    };
    let table = value
        .as_table()
        .ok_or_else(|| fail("web program did not return a table"))?
        .borrow();

    let statuscode = match table.get_str("statuscode") {
        Value::Nil => 200.0,
        Value::Number(n) => n,
        _ => return Err(fail("return statuscode, if provided, must be a number")),
    };
    // 小数部分截断
    if !(100.0..600.0).contains(&statuscode) {
        return Err(fail("return statuscode, if provided, must be between 100 and 599"));
    }
    let statuscode = statuscode as u16;

    let statusmessage = match table.get_str("statusmessage") {
        Value::Nil => status_text(statuscode)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Error {statuscode}")),
        v => lua_string(&v).ok_or_else(|| fail("return statusmessage, if provided, must be a string"))?,
    };

    let mut headers = BTreeMap::new();
    match table.get_str("headers") {
        Value::Nil => {}
        Value::Table(t) => {
            for (k, v) in t.borrow().iter() {
                let k = lua_string(&k).ok_or_else(|| fail("header keys must be strings"))?;
                let v = lua_string(&v).ok_or_else(|| fail("header values must be strings"))?;
                headers.insert(k, v);
            }
        }
        _ => return Err(fail("return headers, if provided, must be a table")),
    }

    let body = match table.get_str("body") {
        Value::Nil => {
            headers.insert("content-type".to_string(), DEFAULT_CONTENT_TYPE.to_string());
            statusmessage.clone().into_bytes()
        }
        Value::Buffer(b) => b.borrow().clone(),
        _ => return Err(fail("return body, if provided, must be a buffer")),
    };

    Ok(WebRets {
        statuscode,
        statusmessage,
        headers,
        body,
    })
}
