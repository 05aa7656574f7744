//! table 库

use super::{new_lib, Args};
use crate::core::{Table, TableError, TableRef, Value, VmError};
use crate::runtime::vm::operators;
use crate::runtime::vm::Vm;

/// unpack 一次最多返回的值
const MAX_UNPACK: i64 = 8000;

fn writable(t: &TableRef) -> Result<(), VmError> {
    if t.borrow().is_readonly() {
        return Err(TableError::Readonly.into());
    }
    Ok(())
}

fn get_at(t: &Table, i: i64) -> Value {
    if i >= 1 {
        t.get_int(i as usize)
    } else {
        t.get(&Value::Number(i as f64))
    }
}

fn set_at(t: &mut Table, i: i64, v: Value) -> Result<(), VmError> {
    if i >= 1 {
        t.set_int(i as usize, v);
        Ok(())
    } else {
        Ok(t.set(Value::Number(i as f64), v)?)
    }
}

fn table_clear(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    t.borrow_mut().clear()?;
    Ok(vec![])
}

fn table_clone(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let copy = t.borrow().shallow_clone();
    Ok(vec![Value::table(copy)])
}

fn table_concat(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let sep = args.opt_string(b"")?;
    let i = args.opt_number(1.0)? as i64;
    let len = t.borrow().len() as f64;
    let j = args.opt_number(len)? as i64;

    let t = t.borrow();
    let mut out = Vec::new();
    for n in i..=j {
        match get_at(&t, n) {
            Value::String(s) => out.extend_from_slice(&s),
            other => {
                return Err(VmError::new(format!(
                    "invalid value ({}) at index {} in table for 'concat'",
                    other.type_name(),
                    n
                )))
            }
        }
        if n < j {
            out.extend_from_slice(&sep);
        }
    }
    Ok(vec![Value::string(out)])
}

fn table_create(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let size = args.number()?;
    if size < 0.0 {
        return Err(super::invalid_arg(1, "create", "size out of range"));
    }
    let fill = args.opt_any();

    // 不带填充值（或填充 nil）时得到空表
    if fill.is_nil() {
        return Ok(vec![Value::table(Table::new())]);
    }
    let values = std::iter::repeat(fill).take(size as usize);
    Ok(vec![Value::table(Table::from_values(values))])
}

fn table_find(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let needle = args.any()?;
    let init = args.opt_number(1.0)?;
    if init < 1.0 {
        return Err(super::invalid_arg(3, "find", "index out of range"));
    }

    // 只搜索数组部分
    let t = t.borrow();
    let found = t
        .list()
        .iter()
        .enumerate()
        .skip(init as usize - 1)
        .find(|(_, v)| **v == needle)
        .map(|(i, _)| Value::Number((i + 1) as f64));
    Ok(vec![found.unwrap_or_default()])
}

fn table_freeze(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    t.borrow_mut().freeze();
    Ok(vec![Value::Table(t)])
}

fn table_isfrozen(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let frozen = t.borrow().is_readonly();
    Ok(vec![Value::Boolean(frozen)])
}

fn table_insert(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    writable(&t)?;

    match args.len() {
        2 => {
            let v = args.any()?;
            t.borrow_mut().push(v)?;
        }
        3 => {
            let pos = args.number()? as i64;
            let v = args.any()?;
            let mut t = t.borrow_mut();
            if pos >= 1 {
                t.insert(pos as usize, v)?;
            } else {
                set_at(&mut t, pos, v)?;
            }
        }
        _ => return Err(VmError::new("wrong number of arguments to 'insert'")),
    }
    Ok(vec![])
}

fn table_maxn(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let max = t.borrow().max_numeric_key();
    Ok(vec![Value::Number(max)])
}

fn table_move(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let src = args.table()?;
    let a = args.number()? as i64;
    let b = args.number()? as i64;
    let to = args.number()? as i64;
    let dst = args.opt_table()?.unwrap_or_else(|| src.clone());
    writable(&dst)?;

    // 先读出再写入，源与目标重叠时也正确
    let moved: Vec<Value> = {
        let src = src.borrow();
        (a..=b).map(|i| get_at(&src, i)).collect()
    };
    let mut d = dst.borrow_mut();
    for (offset, v) in moved.into_iter().enumerate() {
        set_at(&mut d, to + offset as i64, v)?;
    }
    drop(d);

    Ok(vec![Value::Table(dst)])
}

fn table_pack(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let values = args.rest();
    let n = values.len();
    let mut t = Table::from_values(values);
    t.set_str("n", Value::Number(n as f64));
    Ok(vec![Value::table(t)])
}

fn table_remove(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    writable(&t)?;

    let len = t.borrow().len();
    let pos = args.opt_number(len as f64)? as i64;

    let mut t = t.borrow_mut();
    if pos >= 1 && pos as usize <= len {
        return Ok(vec![t.remove(pos as usize)?]);
    }
    // 范围之外只读取
    Ok(vec![get_at(&t, pos)])
}

fn table_unpack(_: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    let i = args.opt_number(1.0)? as i64;
    let len = t.borrow().len() as f64;
    let j = args.opt_number(len)? as i64;

    if i > j {
        return Ok(vec![]);
    }
    if j - i >= MAX_UNPACK {
        return Err(VmError::new("too many results to unpack"));
    }

    let t = t.borrow();
    Ok((i..=j).map(|n| get_at(&t, n)).collect())
}

// ===== 排序 =====

const INVALID_ORDER: &str = "invalid order function for sorting";

/// 内省排序：快速排序，递归过深时退回堆排序
struct Sorter<'a> {
    vm: &'a mut Vm,
    table: TableRef,
    items: Vec<Value>,
    comparator: Option<Value>,
}

impl Sorter<'_> {
    fn less(&mut self, i: usize, j: usize) -> Result<bool, VmError> {
        let (a, b) = (self.items[i].clone(), self.items[j].clone());
        let result = match &self.comparator {
            None => operators::lt(&a, &b)?,
            Some(f) => {
                let f = f.clone();
                match self.vm.call_value(&f, vec![a, b])?.first() {
                    None | Some(Value::Nil) => false,
                    Some(Value::Boolean(r)) => *r,
                    Some(_) => return Err(VmError::new(INVALID_ORDER)),
                }
            }
        };

        // 比较函数可能改变了表
        if self.table.borrow().len() != self.items.len() {
            return Err(VmError::new("table modified during sorting"));
        }
        Ok(result)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.items.swap(i, j);
    }

    fn sift_heap(&mut self, l: usize, u: usize, mut root: usize) -> Result<(), VmError> {
        let count = u - l + 1;

        // 有两个子节点的元素
        while root * 2 + 2 < count {
            let (left, right) = (root * 2 + 1, root * 2 + 2);
            let mut next = root;
            if self.less(l + next, l + left)? {
                next = left;
            }
            if self.less(l + next, l + right)? {
                next = right;
            }
            if next == root {
                break;
            }
            self.swap(l + root, l + next);
            root = next;
        }

        // 只有一个子节点的最后一个元素
        let last_left = root * 2 + 1;
        if last_left == count - 1 && self.less(l + root, l + last_left)? {
            self.swap(l + root, l + last_left);
        }
        Ok(())
    }

    fn heap_sort(&mut self, l: usize, u: usize) -> Result<(), VmError> {
        let count = u - l + 1;
        for i in (0..count / 2).rev() {
            self.sift_heap(l, u, i)?;
        }
        for i in (1..count).rev() {
            self.swap(l, l + i);
            self.sift_heap(l, l + i - 1, 0)?;
        }
        Ok(())
    }

    /// 排序闭区间 [l, u]
    fn sort(&mut self, mut l: usize, mut u: usize, mut limit: usize) -> Result<(), VmError> {
        while l < u {
            if limit == 0 {
                return self.heap_sort(l, u);
            }

            // l、中点、u 三者排序，同时选出枢轴
            if self.less(u, l)? {
                self.swap(u, l);
            }
            if u - l == 1 {
                break;
            }
            let m = l + ((u - l) >> 1);
            if self.less(m, l)? {
                self.swap(m, l);
            } else if self.less(u, m)? {
                self.swap(m, u);
            }
            if u - l == 2 {
                break;
            }

            let p = u - 1;
            self.swap(m, p);

            let mut i = l;
            let mut j = u - 1;
            loop {
                i += 1;
                while self.less(i, p)? {
                    if i >= u {
                        return Err(VmError::new(INVALID_ORDER));
                    }
                    i += 1;
                }

                j -= 1;
                while self.less(p, j)? {
                    if j <= l {
                        return Err(VmError::new(INVALID_ORDER));
                    }
                    j -= 1;
                }

                if j < i {
                    break;
                }
                self.swap(i, j);
            }
            self.swap(p, i);

            limit = (limit >> 1) + (limit >> 2);

            // 递归较小的一半，较大的一半留给下一轮
            if i - l < u - i {
                if i > l {
                    self.sort(l, i - 1, limit)?;
                }
                l = i + 1;
            } else {
                self.sort(i + 1, u, limit)?;
                if i == 0 {
                    break;
                }
                u = i - 1;
            }
        }
        Ok(())
    }
}

fn table_sort(vm: &mut Vm, args: &mut Args) -> Result<Vec<Value>, VmError> {
    let t = args.table()?;
    writable(&t)?;
    let comparator = args.opt_function()?;

    let items = t.borrow().list().to_vec();
    let n = items.len();
    if n == 0 {
        return Ok(vec![]);
    }

    let mut sorter = Sorter {
        vm,
        table: t.clone(),
        items,
        comparator,
    };
    sorter.sort(0, n - 1, n)?;

    let sorted = sorter.items;
    let mut t = t.borrow_mut();
    t.list_mut()?.clone_from_slice(&sorted);
    Ok(vec![])
}

pub(super) fn lib() -> TableRef {
    new_lib(
        &[
            ("clear", table_clear),
            ("clone", table_clone),
            ("concat", table_concat),
            ("create", table_create),
            ("find", table_find),
            ("freeze", table_freeze),
            ("insert", table_insert),
            ("isfrozen", table_isfrozen),
            ("maxn", table_maxn),
            ("move", table_move),
            ("pack", table_pack),
            ("remove", table_remove),
            ("sort", table_sort),
            ("unpack", table_unpack),
        ],
        vec![],
    )
}
