//! 表：列表部分 + 哈希部分
//!
//! 列表部分只保存连续的非 nil 值 1..n。把 nil 写入列表中间会把列表截断，
//! 其后的元素迁移到哈希部分；写入 n+1 会追加，并把哈希部分中的 n+2, n+3, ...
//! 迁回列表。哈希部分按键的字符串形式排序迭代（相同字符串按插入顺序），
//! 排序结果由 `order` 索引随写入维护。

use super::error::TableError;
use super::value::{Key, Value};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

#[derive(Clone, Default)]
pub struct Table {
    list: Vec<Value>,
    hash: HashMap<Key, Slot>,
    /// (排序键, 插入序号) -> 哈希键
    order: BTreeMap<(Vec<u8>, u64), Key>,
    next_seq: u64,
    readonly: bool,
}

#[derive(Clone)]
struct Slot {
    value: Value,
    sort: Vec<u8>,
    seq: u64,
}

impl Slot {
    fn order_key(&self) -> (Vec<u8>, u64) {
        (self.sort.clone(), self.seq)
    }
}

/// 可以进入列表部分的键
fn list_key(k: &Value) -> Option<usize> {
    match k {
        Value::Number(n) if *n >= 1.0 && n.fract() == 0.0 && *n <= usize::MAX as f64 => {
            Some(*n as usize)
        }
        _ => None,
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次写入 1..n（中间的 nil 按普通写入规则处理）
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut t = Table::new();
        for (i, v) in values.into_iter().enumerate() {
            t.set_int(i + 1, v);
        }
        t
    }

    /// 字符串键的记录表
    pub fn from_pairs<K: Into<Value>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let mut t = Table::new();
        for (k, v) in pairs {
            // 构造时键由调用方保证非 nil
            let _ = t.raw_set(k.into(), v);
        }
        t
    }

    // ===== 只读 =====

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn freeze(&mut self) {
        self.readonly = true;
    }

    pub fn frozen(mut self) -> Self {
        self.readonly = true;
        self
    }

    fn check_writable(&self) -> Result<(), TableError> {
        if self.readonly {
            Err(TableError::Readonly)
        } else {
            Ok(())
        }
    }

    // ===== 读取 =====

    /// 列表部分长度
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty() && self.hash.is_empty()
    }

    pub fn list(&self) -> &[Value] {
        &self.list
    }

    pub fn get(&self, k: &Value) -> Value {
        if let Some(i) = list_key(k) {
            if i <= self.list.len() {
                return self.list[i - 1].clone();
            }
        }
        self.hash
            .get(&Key(k.clone()))
            .map(|slot| slot.value.clone())
            .unwrap_or(Value::Nil)
    }

    pub fn get_int(&self, i: usize) -> Value {
        if (1..=self.list.len()).contains(&i) {
            return self.list[i - 1].clone();
        }
        self.get(&Value::Number(i as f64))
    }

    pub fn get_str(&self, k: &str) -> Value {
        self.get(&Value::string(k))
    }

    // ===== 写入 =====

    /// 带只读检查的写入
    pub fn set(&mut self, k: Value, v: Value) -> Result<(), TableError> {
        self.check_writable()?;
        self.raw_set(k, v)
    }

    /// 忽略只读标志的写入（用于构造库表）
    pub fn raw_set(&mut self, k: Value, v: Value) -> Result<(), TableError> {
        match &k {
            Value::Nil => return Err(TableError::NilIndex),
            Value::Number(n) if n.is_nan() => return Err(TableError::NanIndex),
            _ => {}
        }

        match list_key(&k) {
            Some(i) => self.set_int(i, v),
            None => self.set_hash(k, v),
        }
        Ok(())
    }

    pub fn set_str(&mut self, k: &str, v: Value) {
        self.set_hash(Value::string(k), v);
    }

    /// 按整数下标写入，在列表和哈希部分之间迁移
    pub fn set_int(&mut self, i: usize, v: Value) {
        let len = self.list.len();

        if i >= 1 && i <= len {
            if !v.is_nil() {
                self.list[i - 1] = v;
                return;
            }

            // 截断列表，剩余部分进入哈希
            let after = self.list.split_off(i);
            self.list.truncate(i - 1);
            for (offset, v2) in after.into_iter().enumerate() {
                self.set_hash(Value::Number((i + 1 + offset) as f64), v2);
            }
            return;
        }

        if i == len + 1 && !v.is_nil() {
            self.list.push(v);
            self.migrate_to_list();
            return;
        }

        self.set_hash(Value::Number(i as f64), v);
    }

    fn set_hash(&mut self, k: Value, v: Value) {
        let key = Key(k);
        if v.is_nil() {
            self.remove_hash(&key);
            return;
        }

        match self.hash.get_mut(&key) {
            Some(slot) => slot.value = v,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let sort = key.0.sort_key();
                self.order.insert((sort.clone(), seq), key.clone());
                self.hash.insert(key, Slot { value: v, sort, seq });
            }
        }
    }

    fn remove_hash(&mut self, key: &Key) -> Option<Slot> {
        let slot = self.hash.remove(key)?;
        self.order.remove(&slot.order_key());
        Some(slot)
    }

    /// 把哈希中紧接列表末尾的整数键迁回列表
    fn migrate_to_list(&mut self) {
        if self.hash.is_empty() {
            return;
        }
        loop {
            let next = Key(Value::Number((self.list.len() + 1) as f64));
            match self.remove_hash(&next) {
                Some(slot) => self.list.push(slot.value),
                None => break,
            }
        }
    }

    // ===== 列表操作 =====

    /// 在 pos 处插入并后移其后的元素
    pub fn insert(&mut self, pos: usize, v: Value) -> Result<(), TableError> {
        self.check_writable()?;
        let len = self.list.len();
        if pos >= 1 && pos <= len + 1 && !v.is_nil() {
            self.list.insert(pos - 1, v);
            self.migrate_to_list();
            return Ok(());
        }

        for i in (pos..=len).rev() {
            let moved = self.get_int(i);
            self.set_int(i + 1, moved);
        }
        self.set_int(pos, v);
        Ok(())
    }

    /// 追加到列表末尾
    pub fn push(&mut self, v: Value) -> Result<(), TableError> {
        let len = self.list.len();
        self.insert(len + 1, v)
    }

    /// 删除 pos 处的元素并前移其后的元素
    pub fn remove(&mut self, pos: usize) -> Result<Value, TableError> {
        self.check_writable()?;
        let len = self.list.len();
        if pos >= 1 && pos <= len {
            return Ok(self.list.remove(pos - 1));
        }

        let removed = self.get_int(pos);
        self.set_int(pos, Value::Nil);
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), TableError> {
        self.check_writable()?;
        self.list.clear();
        self.hash.clear();
        self.order.clear();
        Ok(())
    }

    /// 非只读的浅拷贝
    pub fn shallow_clone(&self) -> Table {
        Table {
            readonly: false,
            ..self.clone()
        }
    }

    pub(crate) fn list_mut(&mut self) -> Result<&mut Vec<Value>, TableError> {
        self.check_writable()?;
        Ok(&mut self.list)
    }

    /// 哈希部分最大的正数键（`table.maxn`）
    pub fn max_numeric_key(&self) -> f64 {
        let mut max = self.list.len() as f64;
        for key in self.hash.keys() {
            if let Value::Number(n) = key.0 {
                if n > max {
                    max = n;
                }
            }
        }
        max
    }

    // ===== 迭代 =====

    fn hash_entry(&self, key: &Key) -> Option<(Value, Value)> {
        self.hash.get(key).map(|slot| (key.0.clone(), slot.value.clone()))
    }

    fn sorted_hash(&self) -> Vec<(Value, Value)> {
        self.order.values().filter_map(|key| self.hash_entry(key)).collect()
    }

    fn first_hash(&self) -> Option<(Value, Value)> {
        self.order.values().next().and_then(|key| self.hash_entry(key))
    }

    /// 确定性顺序的 (键, 值) 快照：列表 1..n，然后是排序后的哈希部分
    pub fn iter(&self) -> Vec<(Value, Value)> {
        let mut out: Vec<(Value, Value)> = self
            .list
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Number((i + 1) as f64), v.clone()))
            .collect();
        out.extend(self.sorted_hash());
        out
    }

    /// `next(t, k)`；k 为 nil 时返回第一项，末尾或未知键返回 None
    pub fn next(&self, k: &Value) -> Option<(Value, Value)> {
        if k.is_nil() {
            return match self.list.first() {
                Some(v) => Some((Value::Number(1.0), v.clone())),
                None => self.first_hash(),
            };
        }

        if let Some(i) = list_key(k) {
            if i <= self.list.len() {
                return match self.list.get(i) {
                    Some(v) => Some((Value::Number((i + 1) as f64), v.clone())),
                    None => self.first_hash(),
                };
            }
        }

        let from = self.hash.get(&Key(k.clone()))?.order_key();
        self.order
            .range((Bound::Excluded(from), Bound::Unbounded))
            .next()
            .and_then(|(_, key)| self.hash_entry(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    #[test]
    fn test_append_and_len() {
        let mut t = Table::new();
        t.set(n(1.0), "a".into()).unwrap();
        t.set(n(2.0), "b".into()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(&n(2.0)), Value::from("b"));
    }

    #[test]
    fn test_nil_cuts_list() {
        let mut t = Table::from_values(vec!["x".into(), "x".into(), "x".into()]);
        t.set(n(2.0), Value::Nil).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&n(1.0)), Value::from("x"));
        assert_eq!(t.get(&n(2.0)), Value::Nil);
        assert_eq!(t.get(&n(3.0)), Value::from("x"));
    }

    #[test]
    fn test_migrates_hash_back_to_list() {
        let mut t = Table::new();
        t.set(n(3.0), "c".into()).unwrap();
        t.set(n(2.0), "b".into()).unwrap();
        assert_eq!(t.len(), 0);
        t.set(n(1.0), "a".into()).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.list()[2], Value::from("c"));
    }

    #[test]
    fn test_readonly() {
        let mut t = Table::new();
        t.set("k".into(), n(1.0)).unwrap();
        t.freeze();
        assert_eq!(t.set("k".into(), n(2.0)), Err(TableError::Readonly));
        assert_eq!(t.clear(), Err(TableError::Readonly));
        assert_eq!(t.get_str("k"), n(1.0));
    }

    #[test]
    fn test_nil_and_nan_keys() {
        let mut t = Table::new();
        assert_eq!(t.set(Value::Nil, n(1.0)), Err(TableError::NilIndex));
        assert_eq!(t.set(n(f64::NAN), n(1.0)), Err(TableError::NanIndex));
    }

    #[test]
    fn test_iteration_order() {
        let mut t = Table::new();
        t.set("b".into(), n(2.0)).unwrap();
        t.set("a".into(), n(1.0)).unwrap();
        t.set(n(1.0), "first".into()).unwrap();
        t.set(n(10.0), "ten".into()).unwrap();
        let keys: Vec<String> = t.iter().into_iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["1", "10", "a", "b"]);
    }

    #[test]
    fn test_next_walks_everything() {
        let mut t = Table::from_values(vec![n(1.0), n(2.0)]);
        t.set("x".into(), n(3.0)).unwrap();
        let mut k = Value::Nil;
        let mut seen = 0;
        while let Some((nk, _)) = t.next(&k) {
            seen += 1;
            k = nk;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_next_follows_order_after_updates() {
        let mut t = Table::new();
        for key in ["c", "a", "b"] {
            t.set(key.into(), n(1.0)).unwrap();
        }
        t.set("a".into(), Value::Nil).unwrap();
        t.set("c".into(), n(2.0)).unwrap();
        t.set("a".into(), n(3.0)).unwrap();

        let mut walked = Vec::new();
        let mut k = Value::Nil;
        while let Some((nk, v)) = t.next(&k) {
            walked.push((nk.to_string(), v));
            k = nk;
        }
        assert_eq!(
            walked,
            vec![("a".to_string(), n(3.0)), ("b".to_string(), n(1.0)), ("c".to_string(), n(2.0))]
        );
        assert_eq!(t.next(&Value::from("missing")), None);
    }

    #[test]
    fn test_insert_remove() {
        let mut t = Table::from_values(vec![n(1.0), n(3.0)]);
        t.insert(2, n(2.0)).unwrap();
        assert_eq!(t.list(), &[n(1.0), n(2.0), n(3.0)]);
        assert_eq!(t.remove(1).unwrap(), n(1.0));
        assert_eq!(t.list(), &[n(2.0), n(3.0)]);
    }

    proptest! {
        #[test]
        fn prop_iter_visits_each_pair_once(ops in proptest::collection::vec((1usize..20, proptest::option::of(0i32..100)), 0..60)) {
            let mut t = Table::new();
            let mut model = std::collections::BTreeMap::new();
            for (k, v) in ops {
                let value = v.map(|v| Value::Number(v as f64)).unwrap_or(Value::Nil);
                t.set(Value::Number(k as f64), value).unwrap();
                match v {
                    Some(v) => { model.insert(k, v); }
                    None => { model.remove(&k); }
                }
            }

            let pairs = t.iter();
            prop_assert_eq!(pairs.len(), model.len());
            for (k, v) in pairs {
                let k = k.as_number().unwrap() as usize;
                prop_assert_eq!(v.as_number(), model.get(&k).map(|v| *v as f64));
            }
            for i in 1..=t.len() {
                prop_assert!(model.contains_key(&i));
            }
        }

        #[test]
        fn prop_next_matches_iter(ops in proptest::collection::vec((0usize..12, proptest::option::of(0i32..100)), 0..60)) {
            let mut t = Table::new();
            for (k, v) in ops {
                let key = if k % 2 == 0 { Value::Number((k / 2 + 1) as f64) } else { Value::from(format!("k{k}").as_str()) };
                let value = v.map(|v| Value::Number(v as f64)).unwrap_or(Value::Nil);
                t.set(key, value).unwrap();
            }

            let mut walked = Vec::new();
            let mut k = Value::Nil;
            while let Some((nk, v)) = t.next(&k) {
                walked.push((nk.clone(), v));
                k = nk;
            }
            prop_assert_eq!(walked, t.iter());
        }

        #[test]
        fn prop_frozen_table_unchanged(values in proptest::collection::vec(0i32..10, 0..10)) {
            let mut t = Table::from_values(values.iter().map(|v| Value::Number(*v as f64)));
            t.freeze();
            let before = t.iter();
            prop_assert!(t.set(Value::Number(1.0), Value::Nil).is_err());
            prop_assert!(t.insert(1, Value::Number(0.0)).is_err());
            prop_assert!(t.remove(1).is_err());
            prop_assert_eq!(t.len(), values.len());
            prop_assert_eq!(t.iter(), before);
        }
    }
}
