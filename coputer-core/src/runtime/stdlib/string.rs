//! string 库
//!
//! 字符串按字节处理。`lower`/`upper` 只转换 ASCII 字母。

use super::pattern::{self, posrelat, MatchState};
use super::{invalid_arg, missing_arg, new_lib, Args};
use crate::core::{num2str, Table, TableRef, Value, VmError};
use crate::runtime::function::Function;
use crate::runtime::vm::Vm;
use std::cell::Cell;
use std::rc::Rc;

type R = Result<Vec<Value>, VmError>;

/// rep 结果的最大长度
const MAX_STRING: usize = 1 << 30;

fn string_byte(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let l = s.len();

    let i = args.opt_number(1.0)? as i64;
    let posi = posrelat(i, l);
    let j = args.opt_number(posi as f64)? as i64;
    let pose = posrelat(j, l).min(l);
    let posi = posi.max(1);

    if posi > pose {
        return Ok(vec![]);
    }
    Ok(s[posi - 1..pose].iter().map(|b| Value::Number(*b as f64)).collect())
}

fn string_char(_: &mut Vm, args: &mut Args) -> R {
    let mut bytes = Vec::with_capacity(args.len());
    for i in 0..args.len() {
        let n = args.number()?;
        let b = n as u8;
        if b as f64 != n {
            return Err(invalid_arg(i + 1, "char", "invalid value"));
        }
        bytes.push(b);
    }
    Ok(vec![Value::string(bytes)])
}

fn string_find(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let p = args.string()?;
    let init = args.opt_number(1.0)? as i64;
    let plain = args.opt_any().is_truthy();
    pattern::find_aux(&s, &p, init, plain, true)
}

fn string_match(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let p = args.string()?;
    let init = args.opt_number(1.0)? as i64;
    pattern::find_aux(&s, &p, init, false, false)
}

fn string_gmatch(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let p = args.string()?;
    let pos = Cell::new(0usize);

    let iter = Function::simple("gmatch", move |_, _| {
        let mut ms = MatchState::new(&s, &p);
        let mut start = pos.get();
        while start <= s.len() {
            ms.reset();
            if let Some(end) = ms.match_at(start, 0)? {
                // 空匹配时至少前进一个字节
                pos.set(if end == start { end + 1 } else { end });
                return ms.captures(start, end, true);
            }
            start += 1;
        }
        pos.set(start);
        Ok(vec![])
    });
    Ok(vec![Value::function(iter)])
}

// ===== gsub =====

fn add_s(ms: &MatchState, src: &[u8], s: usize, e: usize, repl: &[u8], out: &mut Vec<u8>) -> Result<(), VmError> {
    let mut i = 0;
    while i < repl.len() {
        let c = repl[i];
        i += 1;
        if c != b'%' {
            out.push(c);
            continue;
        }

        match repl.get(i) {
            Some(b'%') => out.push(b'%'),
            Some(b'0') => out.extend_from_slice(&src[s..e]),
            Some(d @ b'1'..=b'9') => {
                let cap = ms.capture((d - b'1') as usize, s, e)?;
                out.extend_from_slice(&cap.to_lua_string());
            }
            _ => return Err(VmError::new("invalid use of '%' in replacement string")),
        }
        i += 1;
    }
    Ok(())
}

fn add_value(
    vm: &mut Vm,
    ms: &MatchState,
    src: &[u8],
    s: usize,
    e: usize,
    repl: &Value,
    out: &mut Vec<u8>,
) -> Result<(), VmError> {
    let value = match repl {
        Value::String(r) => return add_s(ms, src, s, e, r, out),
        Value::Table(t) => {
            let key = ms.capture(0, s, e)?;
            let v = t.borrow().get(&key);
            v
        }
        _ => {
            let captures = ms.captures(s, e, true)?;
            vm.call_value(repl, captures)?.into_iter().next().unwrap_or_default()
        }
    };

    match value {
        // 假值保留原文
        v if v.is_falsy() => out.extend_from_slice(&src[s..e]),
        Value::String(r) => out.extend_from_slice(&r),
        Value::Number(n) => out.extend_from_slice(num2str(n).as_bytes()),
        other => {
            return Err(VmError::new(format!(
                "invalid replacement value (a {})",
                other.type_name()
            )))
        }
    }
    Ok(())
}

fn string_gsub(vm: &mut Vm, args: &mut Args) -> R {
    let src = args.string()?;
    let p = args.string()?;
    let repl = args.any()?;
    if !matches!(repl, Value::String(_) | Value::Table(_) | Value::Function(_)) {
        return Err(super::invalid_arg_type(3, "gsub", "string/function/table", repl.type_name()));
    }
    let max_n = args.opt_number((src.len() + 1) as f64)?;

    let (anchor, pstart) = match p.first() {
        Some(b'^') => (true, 1),
        _ => (false, 0),
    };

    let mut ms = MatchState::new(&src, &p);
    let mut out = Vec::with_capacity(src.len());
    let mut s = 0;
    let mut n = 0usize;
    while (n as f64) < max_n {
        ms.reset();
        let e = ms.match_at(s, pstart)?;
        if let Some(e) = e {
            n += 1;
            add_value(vm, &ms, &src, s, e, &repl, &mut out)?;
        }

        match e {
            Some(e) if e > s => s = e,
            _ if s < src.len() => {
                out.push(src[s]);
                s += 1;
            }
            _ => break,
        }
        if anchor {
            break;
        }
    }
    out.extend_from_slice(&src[s.min(src.len())..]);

    Ok(vec![Value::string(out), Value::Number(n as f64)])
}

// ===== format =====

#[derive(Default)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

/// 解析 '%' 之后的标志、宽度和精度，返回规格和转换字符的位置
fn scan_format(f: &[u8], mut p: usize) -> Result<(Spec, usize), VmError> {
    const FLAGS: &[u8] = b"-+ #0";

    let mut spec = Spec::default();
    let start = p;
    while let Some(c) = f.get(p).filter(|c| FLAGS.contains(c)) {
        match c {
            b'-' => spec.left = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'#' => spec.alt = true,
            _ => spec.zero = true,
        }
        p += 1;
    }
    if p - start > FLAGS.len() {
        return Err(VmError::new("invalid format (repeated flags)"));
    }

    let digits = |p: &mut usize| {
        let mut n = 0;
        for _ in 0..2 {
            match f.get(*p) {
                Some(d) if d.is_ascii_digit() => {
                    n = n * 10 + (d - b'0') as usize;
                    *p += 1;
                }
                _ => break,
            }
        }
        n
    };

    spec.width = digits(&mut p);
    if f.get(p) == Some(&b'.') {
        p += 1;
        spec.precision = Some(digits(&mut p));
    }
    if f.get(p).is_some_and(u8::is_ascii_digit) {
        return Err(VmError::new("invalid format (width or precision too long)"));
    }
    Ok((spec, p))
}

impl Spec {
    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }

    /// 按宽度填充；`zero_ok` 为真时 '0' 标志在前缀之后补零
    fn pad(&self, prefix: &str, body: &str, zero_ok: bool, out: &mut Vec<u8>) {
        let len = prefix.len() + body.len();
        let fill = self.width.saturating_sub(len);
        if self.left {
            out.extend_from_slice(prefix.as_bytes());
            out.extend_from_slice(body.as_bytes());
            out.extend(std::iter::repeat(b' ').take(fill));
        } else if self.zero && zero_ok {
            out.extend_from_slice(prefix.as_bytes());
            out.extend(std::iter::repeat(b'0').take(fill));
            out.extend_from_slice(body.as_bytes());
        } else {
            out.extend(std::iter::repeat(b' ').take(fill));
            out.extend_from_slice(prefix.as_bytes());
            out.extend_from_slice(body.as_bytes());
        }
    }
}

fn with_precision(digits: String, precision: Option<usize>) -> String {
    match precision {
        Some(0) if digits == "0" => String::new(),
        Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
        _ => digits,
    }
}

fn non_finite(n: f64, upper: bool) -> String {
    let s = if n.is_nan() { "nan" } else { "inf" };
    if upper {
        s.to_uppercase()
    } else {
        s.to_string()
    }
}

/// C 风格的指数形式：尾数、'e'、带符号的至少两位指数
fn fmt_exp(n: f64, precision: usize, upper: bool) -> String {
    let rust = format!("{:.*e}", precision, n);
    let (mantissa, exp) = rust.split_once('e').unwrap_or((&rust, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

fn strip_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn fmt_general(n: f64, precision: usize, alt: bool, upper: bool) -> String {
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, n);
    let x: i64 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    if x < -4 || x >= p as i64 {
        let s = fmt_exp(n, p - 1, upper);
        if alt {
            return s;
        }
        let at = s.find(['e', 'E']).unwrap_or(s.len());
        return format!("{}{}", strip_zeros(&s[..at]), &s[at..]);
    }

    let s = format!("{:.*}", (p as i64 - 1 - x).max(0) as usize, n);
    if alt {
        s
    } else {
        strip_zeros(&s)
    }
}

fn format_item(conv: u8, spec: &Spec, args: &mut Args, out: &mut Vec<u8>) -> Result<(), VmError> {
    match conv {
        b'c' => {
            let n = args.number()?;
            out.push(n as i64 as u8);
        }
        b'd' | b'i' => {
            let n = args.number()? as i64;
            let digits = with_precision(n.unsigned_abs().to_string(), spec.precision);
            spec.pad(spec.sign(n < 0), &digits, spec.precision.is_none(), out);
        }
        b'o' | b'u' | b'x' | b'X' => {
            let n = args.number()?;
            let v = if n < 0.0 { n as i64 as u64 } else { n as u64 };
            let (digits, prefix) = match conv {
                b'o' => (format!("{v:o}"), if spec.alt { "0" } else { "" }),
                b'x' => (format!("{v:x}"), if spec.alt && v != 0 { "0x" } else { "" }),
                b'X' => (format!("{v:X}"), if spec.alt && v != 0 { "0X" } else { "" }),
                _ => (v.to_string(), ""),
            };
            let digits = with_precision(digits, spec.precision);
            spec.pad(prefix, &digits, spec.precision.is_none(), out);
        }
        b'e' | b'E' | b'f' | b'F' | b'g' | b'G' => {
            let n = args.number()?;
            let upper = conv.is_ascii_uppercase();
            let precision = spec.precision.unwrap_or(6);
            let sign = spec.sign(n.is_sign_negative() && !n.is_nan());
            let body = if !n.is_finite() {
                non_finite(n, upper)
            } else {
                let a = n.abs();
                match conv {
                    b'e' | b'E' => fmt_exp(a, precision, upper),
                    b'f' | b'F' => format!("{:.*}", precision, a),
                    _ => fmt_general(a, precision, spec.alt, upper),
                }
            };
            spec.pad(sign, &body, n.is_finite(), out);
        }
        b'q' => {
            let s = args.string()?;
            out.push(b'"');
            for &c in s.iter() {
                match c {
                    b'"' | b'\\' | b'\n' => {
                        out.push(b'\\');
                        out.push(c);
                    }
                    b'\r' => out.extend_from_slice(b"\\r"),
                    0 => out.extend_from_slice(b"\\000"),
                    _ => out.push(c),
                }
            }
            out.push(b'"');
        }
        b's' => {
            let s = args.string()?;
            let s = match spec.precision {
                Some(p) if p < s.len() => &s[..p],
                _ => &s[..],
            };
            let fill = spec.width.saturating_sub(s.len());
            if !spec.left {
                out.extend(std::iter::repeat(b' ').take(fill));
            }
            out.extend_from_slice(s);
            if spec.left {
                out.extend(std::iter::repeat(b' ').take(fill));
            }
        }
        _ => {
            return Err(VmError::new(format!(
                "invalid option '%{}' to 'format'",
                conv as char
            )))
        }
    }
    Ok(())
}

fn string_format(_: &mut Vm, args: &mut Args) -> R {
    let f = args.string()?;
    let mut out = Vec::with_capacity(f.len());

    let mut i = 0;
    while i < f.len() {
        if f[i] != b'%' {
            out.push(f[i]);
            i += 1;
            continue;
        }
        i += 1;

        match f.get(i) {
            Some(b'%') => {
                out.push(b'%');
                i += 1;
            }
            Some(b'*') => {
                let v = args.any()?;
                out.extend_from_slice(&v.to_lua_string());
                i += 1;
            }
            _ => {
                if args.position() >= args.len() {
                    return Err(missing_arg(args.position() + 1, "format", None));
                }
                let (spec, p) = scan_format(&f, i)?;
                let conv = f.get(p).copied().unwrap_or(b'%');
                format_item(conv, &spec, args, &mut out)?;
                i = p + 1;
            }
        }
    }
    Ok(vec![Value::string(out)])
}

// ===== 其余函数 =====

fn string_len(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    Ok(vec![Value::Number(s.len() as f64)])
}

fn string_lower(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    Ok(vec![Value::string(s.to_ascii_lowercase())])
}

fn string_upper(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    Ok(vec![Value::string(s.to_ascii_uppercase())])
}

fn string_rep(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let n = args.number()?;
    if n <= 0.0 || s.is_empty() {
        return Ok(vec![Value::from("")]);
    }
    if s.len() as f64 * n > MAX_STRING as f64 {
        return Err(VmError::new("resulting string too large"));
    }
    Ok(vec![Value::string(s.repeat(n as usize))])
}

fn string_reverse(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let mut bytes = s.to_vec();
    bytes.reverse();
    Ok(vec![Value::string(bytes)])
}

fn string_split(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let sep = args.opt_string(b",")?;

    let parts: Vec<Value> = if sep.is_empty() {
        s.iter().map(|b| Value::string([*b])).collect()
    } else {
        let mut parts = Vec::new();
        let mut rest: &[u8] = &s;
        while let Some(at) = rest.windows(sep.len()).position(|w| w == &sep[..]) {
            parts.push(Value::string(&rest[..at]));
            rest = &rest[at + sep.len()..];
        }
        parts.push(Value::string(rest));
        parts
    };
    Ok(vec![Value::table(Table::from_values(parts))])
}

fn string_sub(_: &mut Vm, args: &mut Args) -> R {
    let s = args.string()?;
    let i = args.opt_number(1.0)? as i64;
    let j = args.opt_number(-1.0)? as i64;

    let l = s.len();
    let start = posrelat(i, l).max(1);
    let end = posrelat(j, l).min(l);
    if end < start {
        return Ok(vec![Value::from("")]);
    }
    Ok(vec![Value::String(Rc::from(&s[start - 1..end]))])
}

pub(super) fn lib() -> TableRef {
    new_lib(
        &[
            ("byte", string_byte),
            ("char", string_char),
            ("find", string_find),
            ("format", string_format),
            ("gmatch", string_gmatch),
            ("gsub", string_gsub),
            ("len", string_len),
            ("lower", string_lower),
            ("match", string_match),
            ("rep", string_rep),
            ("reverse", string_reverse),
            ("split", string_split),
            ("sub", string_sub),
            ("upper", string_upper),
        ],
        vec![],
    )
}
