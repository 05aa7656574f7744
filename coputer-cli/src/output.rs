//! CLI 格式化输出
//!
//! 错误报告与 web 响应的终端显示。

use coputer_api::{CoputerError, Value, WebRets};

/// 打印结构化错误报告
pub fn print_error(e: &CoputerError) {
    let report = e.to_report();
    eprintln!("❌ {report}");
}

/// 按 Lua 的 `tostring` 规则连接返回值
pub fn format_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| String::from_utf8_lossy(&v.to_lua_string()).into_owned())
        .collect::<Vec<_>>()
        .join("\t")
}

/// 类似 HTTP 响应的文本形式
pub fn format_web_rets(rets: &WebRets) -> String {
    let mut out = format!("{} {}\n", rets.statuscode, rets.statusmessage);
    for (k, v) in &rets.headers {
        out.push_str(&format!("{k}: {v}\n"));
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&rets.body));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_format_web_rets() {
        let rets = WebRets {
            statuscode: 404,
            statusmessage: "Not Found".into(),
            headers: BTreeMap::from([("content-type".to_string(), "text/plain; charset=utf-8".to_string())]),
            body: b"Not Found".to_vec(),
        };
        assert_eq!(
            format_web_rets(&rets),
            "404 Not Found\ncontent-type: text/plain; charset=utf-8\n\nNot Found"
        );
    }

    #[test]
    fn test_format_values() {
        let values = vec![Value::Number(1.0), Value::from("two"), Value::Nil];
        assert_eq!(format_values(&values), "1\ttwo\tnil");
    }
}
