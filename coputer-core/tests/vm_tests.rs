//! VM 执行测试
//!
//! 端到端测试：汇编字节码，经反序列化后在 VM 中执行

mod common;
use common::{num, run, run_with_env, s, single, ModuleBuilder, ProtoBuilder, K};
use coputer_core::binary::opcode::*;
use coputer_core::{Env, Value, VmError};

// ===== 基础运算测试 =====

#[test]
fn test_basic_arithmetic() {
    // return 1 + 2 * 3
    let mut p = ProtoBuilder::new();
    p.loadn(1, 2);
    p.loadn(2, 3);
    p.abc(MUL, 1, 1, 2);
    p.loadn(0, 1);
    p.abc(ADD, 0, 0, 1);
    p.ret(0, Some(1));

    assert_eq!(run(single(p)).unwrap(), vec![num(7.0)]);
}

#[test]
fn test_constant_operands() {
    // return (10 - 4) / 4, 2 ^ 10, 7 // 2, -7 % 3
    let mut p = ProtoBuilder::new();
    p.loadn(0, 10);
    let four = p.constant(K::Number(4.0));
    p.abc(SUBK, 0, 0, four as u8);
    p.abc(DIVK, 0, 0, four as u8);
    let two = p.constant(K::Number(2.0));
    p.loadn(1, 10);
    p.loadk(2, K::Number(2.0));
    p.abc(POW, 1, 2, 1);
    p.loadn(2, 7);
    p.abc(IDIVK, 2, 2, two as u8);
    p.loadn(3, -7);
    let three = p.constant(K::Number(3.0));
    p.abc(MODK, 3, 3, three as u8);
    p.ret(0, Some(4));

    assert_eq!(
        run(single(p)).unwrap(),
        vec![num(1.5), num(1024.0), num(3.0), num(2.0)]
    );
}

#[test]
fn test_arithmetic_type_error() {
    // return "a" + 1
    let mut p = ProtoBuilder::new();
    p.at_line(1);
    p.loadk(0, K::str("a"));
    p.loadn(1, 1);
    p.abc(ADD, 0, 0, 1);
    p.ret(0, Some(1));

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to perform arithmetic (add) on string and number");
}

#[test]
fn test_concat_and_length() {
    // local s = "ab" .. "1" .. "c"; return s, #s
    let mut p = ProtoBuilder::new();
    p.loadk(1, K::str("ab"));
    p.loadk(2, K::str("1"));
    p.loadk(3, K::str("c"));
    p.abc(CONCAT, 0, 1, 3);
    p.abc(LENGTH, 1, 0, 0);
    p.ret(0, Some(2));

    assert_eq!(run(single(p)).unwrap(), vec![s("ab1c"), num(4.0)]);
}

#[test]
fn test_concat_rejects_numbers() {
    // return "ab" .. 1 .. "c"
    let mut p = ProtoBuilder::new();
    p.loadk(1, K::str("ab"));
    p.loadn(2, 1);
    p.loadk(3, K::str("c"));
    p.abc(CONCAT, 0, 1, 3);
    p.ret(0, Some(1));

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to concatenate string with number");
}

#[test]
fn test_concat_bad_middle_operand() {
    // return "a" .. nil .. "b"
    let mut p = ProtoBuilder::new();
    p.loadk(1, K::str("a"));
    p.loadnil(2);
    p.loadk(3, K::str("b"));
    p.abc(CONCAT, 0, 1, 3);
    p.ret(0, Some(1));

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to concatenate string with nil");
}

#[test]
fn test_logic_operators() {
    // return nil or "x", false and 1, not nil
    let mut p = ProtoBuilder::new();
    p.loadnil(3);
    let x = p.constant(K::str("x"));
    p.abc(ORK, 0, 3, x as u8);
    p.loadb(4, false);
    let one = p.constant(K::Number(1.0));
    p.abc(ANDK, 1, 4, one as u8);
    p.abc(NOT, 2, 3, 0);
    p.ret(0, Some(3));

    assert_eq!(
        run(single(p)).unwrap(),
        vec![s("x"), Value::Boolean(false), Value::Boolean(true)]
    );
}

// ===== 控制流测试 =====

#[test]
fn test_numeric_for() {
    // local sum = 0; for i = 1, 10 do sum += i end; return sum
    let mut p = ProtoBuilder::new();
    p.loadn(0, 0);
    p.loadn(1, 10);
    p.loadn(2, 1);
    p.loadn(3, 1);
    let prep = p.ad(FORNPREP, 1, 0);
    let body = p.abc(ADD, 0, 0, 3);
    let lp = p.ad(FORNLOOP, 1, 0);
    let exit = p.ret(0, Some(1));
    p.jump_to(prep, exit);
    p.jump_to(lp, body);

    assert_eq!(run(single(p)).unwrap(), vec![num(55.0)]);
}

#[test]
fn test_numeric_for_skips_empty_range() {
    // for i = 5, 1 do return "ran" end; return "skipped"
    let mut p = ProtoBuilder::new();
    p.loadn(0, 1);
    p.loadn(1, 1);
    p.loadn(2, 5);
    let prep = p.ad(FORNPREP, 0, 0);
    p.loadk(3, K::str("ran"));
    p.ret(3, Some(1));
    p.ad(FORNLOOP, 0, -3);
    let exit = p.loadk(3, K::str("skipped"));
    p.ret(3, Some(1));
    p.jump_to(prep, exit);

    assert_eq!(run(single(p)).unwrap(), vec![s("skipped")]);
}

#[test]
fn test_conditional_jumps() {
    // local a, b = 3, 5; if a < b then return "lt" else return "ge" end
    let mut p = ProtoBuilder::new();
    p.loadn(0, 3);
    p.loadn(1, 5);
    let jump = p.ad(JUMPIFNOTLT, 0, 0);
    p.aux(1);
    p.loadk(2, K::str("lt"));
    p.ret(2, Some(1));
    let other = p.loadk(2, K::str("ge"));
    p.ret(2, Some(1));
    p.jump_to(jump, other);

    assert_eq!(run(single(p)).unwrap(), vec![s("lt")]);
}

#[test]
fn test_compare_type_error() {
    let mut p = ProtoBuilder::new();
    p.loadn(0, 1);
    p.loadk(1, K::str("x"));
    let jump = p.ad(JUMPIFLT, 0, 0);
    p.aux(1);
    let end = p.ret(0, Some(0));
    p.jump_to(jump, end);

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to compare number < string");
}

#[test]
fn test_generic_for_ipairs() {
    // local sum = 0; for _, v in ipairs({10, 20, 30}) do sum += v end; return sum
    let mut p = ProtoBuilder::new();
    p.newtable(0);
    p.loadn(1, 10);
    p.loadn(2, 20);
    p.loadn(3, 30);
    p.setlist(0, 1, 3, 1);
    p.loadn(1, 0);
    p.import(2, "ipairs");
    p.mov(3, 0);
    p.call(2, Some(1), Some(3));
    let prep = p.ad(FORGPREP_INEXT, 2, 0);
    let body = p.abc(ADD, 1, 1, 6);
    let lp = p.ad(FORGLOOP, 2, 0);
    p.aux(2);
    p.ret(1, Some(1));
    p.jump_to(prep, lp);
    p.jump_to(lp, body);

    assert_eq!(run(single(p)).unwrap(), vec![num(60.0)]);
}

#[test]
fn test_generic_for_pairs_is_ordered() {
    // local t = {b = 2, a = 1, c = 3}; local keys = ""; for k in pairs(t) do keys ..= k end
    let mut p = ProtoBuilder::new();
    p.newtable(0);
    for (key, n) in [("b", 2), ("a", 1), ("c", 3)] {
        p.loadn(1, n);
        p.settableks(1, 0, key);
    }
    p.loadk(1, K::str(""));
    p.import(2, "pairs");
    p.mov(3, 0);
    p.call(2, Some(1), Some(3));
    let prep = p.ad(FORGPREP_NEXT, 2, 0);
    let body = p.mov(7, 1);
    p.mov(8, 5);
    p.abc(CONCAT, 1, 7, 8);
    let lp = p.ad(FORGLOOP, 2, 0);
    p.aux(2);
    p.ret(1, Some(1));
    p.jump_to(prep, lp);
    p.jump_to(lp, body);

    assert_eq!(run(single(p)).unwrap(), vec![s("abc")]);
}

#[test]
fn test_iterate_over_number_fails() {
    let mut p = ProtoBuilder::new();
    p.loadn(0, 5);
    let prep = p.ad(FORGPREP, 0, 0);
    let lp = p.ad(FORGLOOP, 0, 0);
    p.aux(1);
    p.ret(0, Some(0));
    p.jump_to(prep, lp);
    p.jump_to(lp, lp);

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to iterate over a number value");
}

// ===== 表测试 =====

#[test]
fn test_table_nil_truncates_length() {
    // local t = table.create(3, "x"); t[2] = nil; return t[1], t[2], t[3], #t
    let mut p = ProtoBuilder::new();
    p.import(0, "table.create");
    p.loadn(1, 3);
    p.loadk(2, K::str("x"));
    p.call(0, Some(2), Some(1));
    p.loadnil(1);
    p.abc(SETTABLEN, 1, 0, 1);
    p.abc(GETTABLEN, 1, 0, 0);
    p.abc(GETTABLEN, 2, 0, 1);
    p.abc(GETTABLEN, 3, 0, 2);
    p.abc(LENGTH, 4, 0, 0);
    p.ret(1, Some(4));

    assert_eq!(
        run(single(p)).unwrap(),
        vec![s("x"), Value::Nil, s("x"), num(1.0)]
    );
}

#[test]
fn test_frozen_table_rejects_writes() {
    // local t = table.freeze({}); t.x = 1
    let mut p = ProtoBuilder::new();
    p.import(0, "table.freeze");
    p.newtable(1);
    p.call(0, Some(1), Some(1));
    p.loadn(1, 1);
    p.settableks(1, 0, "x");
    p.ret(0, Some(0));

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to modify a readonly table");
}

#[test]
fn test_index_nil_fails() {
    let mut p = ProtoBuilder::new();
    p.loadnil(0);
    p.gettableks(1, 0, "field");
    p.ret(1, Some(1));

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to index nil with 'field'");
}

// ===== 函数与闭包 =====

#[test]
fn test_closure_shares_upvalue() {
    // local n = 0; local function inc() n += 1; return n end; inc(); return n, inc()
    let mut inc = ProtoBuilder::new().upvals(1).named("inc");
    inc.abc(GETUPVAL, 0, 0, 0);
    let one = inc.constant(K::Number(1.0));
    inc.abc(ADDK, 0, 0, one as u8);
    inc.abc(SETUPVAL, 0, 0, 0);
    inc.ret(0, Some(1));

    let mut m = ModuleBuilder::new();
    let inc = m.proto(inc);

    let mut main = ProtoBuilder::new();
    main.loadn(0, 0);
    main.closure(1, inc);
    main.capture(1, 0);
    main.mov(2, 1);
    main.call(2, Some(0), Some(0));
    main.mov(4, 1);
    main.call(4, Some(0), Some(1));
    main.mov(3, 0);
    main.ret(3, Some(2));
    let main = m.proto(main);

    let out = common::run(m.build(main)).unwrap();
    assert_eq!(out, vec![num(2.0), num(2.0)]);
}

#[test]
fn test_value_capture_is_a_copy() {
    // local n = 1; local f = function() return n end (by value); n = 5; return f()
    let mut get = ProtoBuilder::new().upvals(1);
    get.abc(GETUPVAL, 0, 0, 0);
    get.ret(0, Some(1));

    let mut m = ModuleBuilder::new();
    let get = m.proto(get);

    let mut main = ProtoBuilder::new();
    main.loadn(0, 1);
    main.closure(1, get);
    main.capture(0, 0);
    main.loadn(0, 5);
    main.mov(2, 1);
    main.call(2, Some(0), Some(1));
    main.ret(2, Some(1));
    let main = m.proto(main);

    assert_eq!(common::run(m.build(main)).unwrap(), vec![num(1.0)]);
}

#[test]
fn test_recursive_call_depth_overflow() {
    // local function f() return f() end (f captured by reference)
    let mut f = ProtoBuilder::new().upvals(1).named("f");
    f.abc(GETUPVAL, 0, 0, 0);
    f.call(0, Some(0), None);
    f.ret(0, None);

    let mut m = ModuleBuilder::new();
    let f = m.proto(f);

    let mut main = ProtoBuilder::new();
    main.closure(0, f);
    main.capture(1, 0);
    main.mov(1, 0);
    main.call(1, Some(0), Some(0));
    main.ret(0, Some(0));
    let main = m.proto(main);

    let err = common::run(m.build(main)).unwrap_err();
    assert_eq!(err.message(), "stack overflow");
}

#[test]
fn test_varargs() {
    // local function f(...) return ... end; return f(1, 2, 3)
    let mut f = ProtoBuilder::new().vararg();
    f.abc(PREPVARARGS, 0, 0, 0);
    f.abc(GETVARARGS, 0, 0, 0);
    f.ret(0, None);

    let mut m = ModuleBuilder::new();
    let f = m.proto(f);

    let mut main = ProtoBuilder::new();
    main.closure(0, f);
    main.loadn(1, 1);
    main.loadn(2, 2);
    main.loadn(3, 3);
    main.call(0, Some(3), None);
    main.ret(0, None);
    let main = m.proto(main);

    assert_eq!(
        common::run(m.build(main)).unwrap(),
        vec![num(1.0), num(2.0), num(3.0)]
    );
}

#[test]
fn test_call_non_function() {
    let mut p = ProtoBuilder::new();
    p.loadn(0, 1);
    p.call(0, Some(0), Some(0));
    p.ret(0, Some(0));

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to call a number value");
}

// ===== 字符串方法 =====

#[test]
fn test_string_namecall() {
    // return ("abc"):upper(), ("a,b"):split(",")
    let mut p = ProtoBuilder::new();
    p.loadk(2, K::str("abc"));
    p.namecall(0, 2, "upper");
    p.call(0, Some(1), Some(1));
    p.loadk(3, K::str("a,b"));
    p.namecall(1, 3, "split");
    p.loadk(3, K::str(","));
    p.call(1, Some(2), Some(1));
    p.abc(LENGTH, 1, 1, 0);
    p.ret(0, Some(2));

    assert_eq!(run(single(p)).unwrap(), vec![s("ABC"), num(2.0)]);
}

#[test]
fn test_missing_method() {
    let mut p = ProtoBuilder::new();
    p.loadk(1, K::str("abc"));
    p.namecall(0, 1, "nothing");
    p.call(0, Some(1), Some(0));
    p.ret(0, Some(0));

    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to call missing method 'nothing' of string");
}

#[test]
fn test_gsub_scenario() {
    // return (string.gsub("hello world", "(%w+)", "<%1>"))
    let mut p = ProtoBuilder::new();
    p.import(0, "string.gsub");
    p.loadk(1, K::str("hello world"));
    p.loadk(2, K::str("(%w+)"));
    p.loadk(3, K::str("<%1>"));
    p.call(0, Some(3), Some(2));
    p.ret(0, Some(2));

    assert_eq!(run(single(p)).unwrap(), vec![s("<hello> <world>"), num(2.0)]);
}

// ===== 全局变量 =====

#[test]
fn test_setglobal_is_rejected() {
    let mut p = ProtoBuilder::new();
    p.loadn(0, 1);
    p.setglobal(0, "answer");
    p.ret(0, Some(0));
    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to set global 'answer'");

    let mut p = ProtoBuilder::new();
    p.loadn(0, 1);
    p.setglobal(0, "string");
    p.ret(0, Some(0));
    let err = run(single(p)).unwrap_err();
    assert_eq!(err.message(), "attempt to redefine global 'string'");
}

#[test]
fn test_environment_globals() {
    let mut env = Env::new();
    env.set("greeting", Value::from("hi"));
    env.add_fn("double", |_, args| {
        let n = args.first().and_then(Value::as_number).unwrap_or_default();
        Ok(vec![Value::Number(n * 2.0)])
    });
    // 内置名字优先于环境
    env.set("type", Value::from("shadowed"));

    let mut p = ProtoBuilder::new();
    p.getglobal(0, "greeting");
    p.import(1, "double");
    p.loadn(2, 21);
    p.call(1, Some(1), Some(1));
    p.getglobal(2, "type");
    p.loadn(3, 0);
    p.call(2, Some(1), Some(1));
    p.getglobal(3, "missing");
    p.ret(0, Some(4));

    assert_eq!(
        run_with_env(single(p), env).unwrap(),
        vec![s("hi"), num(42.0), s("number"), Value::Nil]
    );
}

// ===== 错误定位与取消 =====

#[test]
fn test_error_is_located() {
    let mut p = ProtoBuilder::new();
    p.at_line(1);
    p.loadnil(0);
    p.at_line(3);
    p.loadn(1, 1);
    p.abc(ADD, 0, 0, 1);
    p.ret(0, Some(1));

    let err = run(single(p)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "main.luau:3: function (main)\nattempt to perform arithmetic (add) on nil and number"
    );
}

#[test]
fn test_error_in_named_function() {
    let mut f = ProtoBuilder::new().named("explode");
    f.at_line(7);
    f.loadnil(0);
    f.abc(MINUS, 0, 0, 0);
    f.ret(0, Some(1));

    let mut m = ModuleBuilder::new();
    let f = m.proto(f);

    let mut main = ProtoBuilder::new();
    main.at_line(10);
    main.closure(0, f);
    main.call(0, Some(0), Some(0));
    main.ret(0, Some(0));
    let main = m.proto(main);

    let err = common::run(m.build(main)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "main.luau:7: function explode\nattempt to perform arithmetic (unm) on nil"
    );
}

#[test]
fn test_cancel_stops_infinite_loop() {
    let mut env = Env::new();
    env.add_fn("stop", |vm, _| {
        vm.cancel_handle().cancel();
        Ok(vec![])
    });

    // stop(); while true do end
    let mut p = ProtoBuilder::new();
    p.import(0, "stop");
    p.call(0, Some(0), Some(0));
    let lp = p.ad(JUMPBACK, 0, 0);
    p.jump_to(lp, lp);

    let err = run_with_env(single(p), env).unwrap_err();
    assert_eq!(err, VmError::Cancelled);
    assert_eq!(err.to_string(), "program execution cancelled");
}

#[test]
fn test_cancel_from_another_thread() {
    let mut p = ProtoBuilder::new();
    let lp = p.ad(JUMPBACK, 0, 0);
    p.jump_to(lp, lp);

    let mut loader = coputer_core::MemoryLoader::new().with("main", single(p));
    let compiled = coputer_core::ModuleLoader::load(&mut loader, "main").unwrap();
    let mut vm = coputer_core::Vm::new(Env::default());
    let handle = vm.cancel_handle();

    let timer = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        handle.cancel();
    });
    let err = vm.run(compiled, Vec::new()).unwrap_err();
    timer.join().unwrap();

    assert_eq!(err, VmError::Cancelled);
}

#[test]
fn test_vector_lanes() {
    // local v = vector.create(1, 2, 3); return v.x + v.Z
    let mut p = ProtoBuilder::new();
    p.import(0, "vector.create");
    p.loadn(1, 1);
    p.loadn(2, 2);
    p.loadn(3, 3);
    p.call(0, Some(3), Some(1));
    p.gettableks(1, 0, "x");
    p.gettableks(2, 0, "Z");
    p.abc(ADD, 1, 1, 2);
    p.ret(1, Some(1));

    assert_eq!(run(single(p)).unwrap(), vec![num(4.0)]);
}
