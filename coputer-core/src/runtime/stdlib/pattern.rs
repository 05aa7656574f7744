//! Lua 模式匹配
//!
//! 字节级的回溯匹配器。支持字符类、集合、四种量词、捕获与位置捕获、
//! `%b` 平衡匹配、`%f` 边界和 `%1`..`%9` 反向引用。

use crate::core::{Value, VmError};

pub const MAX_CAPTURES: usize = 32;
/// 匹配递归深度上限
const MAX_DEPTH: usize = 200;
const L_ESC: u8 = b'%';
const SPECIALS: &[u8] = b"^$*+?.([%-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapLen {
    Unfinished,
    Position,
    Len(usize),
}

/// 一次匹配的状态；`src` 与 `pat` 都按字节处理
pub struct MatchState<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    level: usize,
    captures: [(usize, CapLen); MAX_CAPTURES],
    depth: usize,
}

// ===== 字符类 =====

fn match_class(c: u8, class: u8) -> bool {
    let res = match class.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => c == b' ' || (b'\t'..=b'\r').contains(&c),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        b'z' => c == 0,
        _ => return class == c,
    };
    // 大写的类取补集
    if class.is_ascii_uppercase() {
        !res
    } else {
        res
    }
}

/// 模式中没有任何特殊字符时可以直接做子串查找
pub fn no_specials(pat: &[u8]) -> bool {
    !pat.iter().any(|c| SPECIALS.contains(c))
}

impl<'a> MatchState<'a> {
    pub fn new(src: &'a [u8], pat: &'a [u8]) -> Self {
        Self {
            src,
            pat,
            level: 0,
            captures: [(0, CapLen::Unfinished); MAX_CAPTURES],
            depth: MAX_DEPTH,
        }
    }

    /// 开始新一次尝试前清空捕获
    pub fn reset(&mut self) {
        self.level = 0;
        self.depth = MAX_DEPTH;
    }

    fn class_end(&self, mut p: usize) -> Result<usize, VmError> {
        let c = self.pat[p];
        p += 1;

        if c == L_ESC {
            if p >= self.pat.len() {
                return Err(VmError::new("malformed pattern (ends with '%')"));
            }
            return Ok(p + 1);
        }

        if c == b'[' {
            if self.pat.get(p) == Some(&b'^') {
                p += 1;
            }
            // 第一个字符总是集合的一部分，因此 "[]]" 合法
            loop {
                if p >= self.pat.len() {
                    return Err(VmError::new("malformed pattern (missing ']')"));
                }
                let cc = self.pat[p];
                p += 1;
                if cc == L_ESC {
                    if p >= self.pat.len() {
                        return Err(VmError::new("malformed pattern (missing ']')"));
                    }
                    p += 1;
                }
                match self.pat.get(p) {
                    Some(b']') => break,
                    Some(_) => {}
                    None => return Err(VmError::new("malformed pattern (missing ']')")),
                }
            }
            return Ok(p + 1);
        }

        Ok(p)
    }

    /// `p` 指向 '['，`ec` 指向对应的 ']'
    fn match_bracket_class(&self, c: u8, p: usize, ec: usize) -> bool {
        let mut p = p + 1;
        let mut sig = true;
        if self.pat.get(p) == Some(&b'^') {
            sig = false;
            p += 1;
        }

        while p < ec {
            if self.pat[p] == L_ESC {
                p += 1;
                if self.pat.get(p).is_some_and(|cl| match_class(c, *cl)) {
                    return sig;
                }
                p += 1;
            } else if self.pat.get(p + 1) == Some(&b'-') && p + 2 < ec {
                if self.pat[p] <= c && c <= self.pat[p + 2] {
                    return sig;
                }
                p += 3;
            } else {
                if self.pat[p] == c {
                    return sig;
                }
                p += 1;
            }
        }
        !sig
    }

    fn single_match(&self, s: usize, p: usize, ep: usize) -> bool {
        let Some(&c) = self.src.get(s) else {
            return false;
        };
        match self.pat[p] {
            b'.' => true,
            L_ESC => self.pat.get(p + 1).is_some_and(|cl| match_class(c, *cl)),
            b'[' => self.match_bracket_class(c, p, ep - 1),
            pc => pc == c,
        }
    }

    // ===== 匹配 =====

    /// 从 s 开始匹配 p 之后的模式，返回匹配结束的位置
    pub fn match_at(&mut self, s: usize, p: usize) -> Result<Option<usize>, VmError> {
        if self.depth == 0 {
            return Err(VmError::new("pattern too complex"));
        }
        self.depth -= 1;
        let result = self.do_match(s, p);
        self.depth += 1;
        result
    }

    fn do_match(&mut self, mut s: usize, mut p: usize) -> Result<Option<usize>, VmError> {
        loop {
            if p == self.pat.len() {
                return Ok(Some(s));
            }

            match self.pat[p] {
                b'(' => {
                    return if self.pat.get(p + 1) == Some(&b')') {
                        self.start_capture(s, p + 2, CapLen::Position)
                    } else {
                        self.start_capture(s, p + 1, CapLen::Unfinished)
                    };
                }
                b')' => return self.end_capture(s, p + 1),
                b'$' if p + 1 == self.pat.len() => {
                    return Ok((s == self.src.len()).then_some(s));
                }
                L_ESC => match self.pat.get(p + 1) {
                    Some(b'b') => {
                        match self.match_balance(s, p + 2)? {
                            Some(next) => {
                                s = next;
                                p += 4;
                                continue;
                            }
                            None => return Ok(None),
                        }
                    }
                    Some(b'f') => {
                        p += 2;
                        if self.pat.get(p) != Some(&b'[') {
                            return Err(VmError::new("missing '[' after '%f' in pattern"));
                        }
                        let ep = self.class_end(p)?;
                        let previous = if s == 0 { 0 } else { self.src[s - 1] };
                        let current = self.src.get(s).copied().unwrap_or(0);
                        if !self.match_bracket_class(previous, p, ep - 1)
                            && self.match_bracket_class(current, p, ep - 1)
                        {
                            p = ep;
                            continue;
                        }
                        return Ok(None);
                    }
                    Some(d) if d.is_ascii_digit() => {
                        match self.match_capture(s, *d)? {
                            Some(next) => {
                                s = next;
                                p += 2;
                                continue;
                            }
                            None => return Ok(None),
                        }
                    }
                    None => return Err(VmError::new("malformed pattern (ends with '%')")),
                    _ => {}
                },
                _ => {}
            }

            // 单个字符类加可选量词
            let ep = self.class_end(p)?;
            let matched = self.single_match(s, p, ep);
            match self.pat.get(ep) {
                Some(b'?') => {
                    if matched {
                        if let Some(end) = self.match_at(s + 1, ep + 1)? {
                            return Ok(Some(end));
                        }
                    }
                    p = ep + 1;
                }
                Some(b'+') => {
                    return if matched {
                        self.max_expand(s + 1, p, ep)
                    } else {
                        Ok(None)
                    };
                }
                Some(b'*') => return self.max_expand(s, p, ep),
                Some(b'-') => return self.min_expand(s, p, ep),
                _ => {
                    if !matched {
                        return Ok(None);
                    }
                    s += 1;
                    p = ep;
                }
            }
        }
    }

    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, VmError> {
        let mut i = 0;
        while self.single_match(s + i, p, ep) {
            i += 1;
        }
        // 从最长开始逐个回退
        loop {
            if let Some(end) = self.match_at(s + i, ep + 1)? {
                return Ok(Some(end));
            }
            if i == 0 {
                return Ok(None);
            }
            i -= 1;
        }
    }

    fn min_expand(&mut self, mut s: usize, p: usize, ep: usize) -> Result<Option<usize>, VmError> {
        loop {
            if let Some(end) = self.match_at(s, ep + 1)? {
                return Ok(Some(end));
            }
            if !self.single_match(s, p, ep) {
                return Ok(None);
            }
            s += 1;
        }
    }

    fn match_balance(&self, s: usize, p: usize) -> Result<Option<usize>, VmError> {
        if p + 1 >= self.pat.len() {
            return Err(VmError::new("malformed pattern (missing arguments to '%b')"));
        }
        let (open, close) = (self.pat[p], self.pat[p + 1]);
        if self.src.get(s) != Some(&open) {
            return Ok(None);
        }

        let mut depth = 1;
        for i in s + 1..self.src.len() {
            let c = self.src[i];
            if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(i + 1));
                }
            } else if c == open {
                depth += 1;
            }
        }
        Ok(None)
    }

    // ===== 捕获 =====

    fn start_capture(&mut self, s: usize, p: usize, what: CapLen) -> Result<Option<usize>, VmError> {
        if self.level >= MAX_CAPTURES {
            return Err(VmError::new("too many captures"));
        }
        self.captures[self.level] = (s, what);
        self.level += 1;

        let result = self.match_at(s, p)?;
        if result.is_none() {
            self.level -= 1;
        }
        Ok(result)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> Result<Option<usize>, VmError> {
        let l = self.capture_to_close()?;
        self.captures[l].1 = CapLen::Len(s - self.captures[l].0);

        let result = self.match_at(s, p)?;
        if result.is_none() {
            self.captures[l].1 = CapLen::Unfinished;
        }
        Ok(result)
    }

    fn capture_to_close(&self) -> Result<usize, VmError> {
        (0..self.level)
            .rev()
            .find(|l| self.captures[*l].1 == CapLen::Unfinished)
            .ok_or_else(|| VmError::new("invalid pattern capture"))
    }

    fn match_capture(&self, s: usize, digit: u8) -> Result<Option<usize>, VmError> {
        let index = digit as i32 - b'1' as i32;
        let len = match usize::try_from(index).ok().filter(|l| *l < self.level) {
            Some(l) => match self.captures[l].1 {
                CapLen::Len(len) => Some((self.captures[l].0, len)),
                CapLen::Position => Some((self.captures[l].0, 0)),
                CapLen::Unfinished => None,
            },
            None => None,
        };
        let Some((init, len)) = len else {
            return Err(VmError::new(format!("invalid capture index %{}", index + 1)));
        };

        let captured = &self.src[init..init + len];
        if self.src.len() - s >= len && &self.src[s..s + len] == captured {
            return Ok(Some(s + len));
        }
        Ok(None)
    }

    /// 第 i 个捕获；没有捕获时第 0 个就是整个匹配
    pub fn capture(&self, i: usize, s: usize, e: usize) -> Result<Value, VmError> {
        if i >= self.level {
            if i != 0 {
                return Err(VmError::new("invalid capture index"));
            }
            return Ok(Value::string(&self.src[s..e]));
        }

        let (init, len) = self.captures[i];
        match len {
            CapLen::Unfinished => Err(VmError::new("unfinished capture")),
            CapLen::Position => Ok(Value::Number((init + 1) as f64)),
            CapLen::Len(len) => Ok(Value::string(&self.src[init..init + len])),
        }
    }

    /// 全部捕获；`whole_if_none` 为真时没有捕获返回整个匹配
    pub fn captures(&self, s: usize, e: usize, whole_if_none: bool) -> Result<Vec<Value>, VmError> {
        let n = if self.level == 0 && whole_if_none { 1 } else { self.level };
        (0..n).map(|i| self.capture(i, s, e)).collect()
    }
}

// ===== 查找 =====

/// 相对位置：负数从末尾算起
pub fn posrelat(pos: i64, len: usize) -> usize {
    let pos = if pos < 0 { pos + len as i64 + 1 } else { pos };
    pos.max(0) as usize
}

fn find_plain(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `string.find`（find 为真）与 `string.match`
pub fn find_aux(src: &[u8], pat: &[u8], init: i64, plain: bool, find: bool) -> Result<Vec<Value>, VmError> {
    let ls = src.len();
    let init = posrelat(init, ls).max(1);
    if init > ls + 1 {
        return Ok(vec![Value::Nil]);
    }

    if find && (plain || no_specials(pat)) {
        return Ok(match find_plain(&src[init - 1..], pat) {
            Some(pos) => vec![
                Value::Number((pos + init) as f64),
                Value::Number((pos + init + pat.len() - 1) as f64),
            ],
            None => vec![Value::Nil],
        });
    }

    let (anchor, p) = match pat.first() {
        Some(b'^') => (true, 1),
        _ => (false, 0),
    };

    let mut ms = MatchState::new(src, pat);
    let mut s = init - 1;
    loop {
        ms.reset();
        if let Some(e) = ms.match_at(s, p)? {
            if !find {
                return ms.captures(s, e, true);
            }
            let mut out = vec![Value::Number((s + 1) as f64), Value::Number(e as f64)];
            out.extend(ms.captures(s, e, false)?);
            return Ok(out);
        }
        s += 1;
        if anchor || s > ls {
            return Ok(vec![Value::Nil]);
        }
    }
}
