//! 字节码反序列化测试

mod common;
use common::{single, ModuleBuilder, ProtoBuilder, K};
use coputer_core::binary::opcode::*;
use coputer_core::binary::Konst;
use coputer_core::core::DeserialiseError;
use coputer_core::{deserialise, Value};

#[test]
fn test_constants_are_resolved() {
    let mut p = ProtoBuilder::new();
    p.loadk(0, K::Number(2.5));
    p.loadk(1, K::str("hi"));
    p.loadk(2, K::Bool(true));
    p.loadk(3, K::Nil);
    p.ret(0, Some(4));

    let module = deserialise(&single(p)).unwrap();
    let code = &module.main_proto().code;
    assert_eq!(code[0].k_value(), Value::Number(2.5));
    assert_eq!(code[1].k_value(), Value::from("hi"));
    assert_eq!(code[2].k_value(), Value::Boolean(true));
    assert_eq!(code[3].k_value(), Value::Nil);
}

#[test]
fn test_aux_instructions_keep_word_alignment() {
    let mut p = ProtoBuilder::new();
    p.import(0, "math.floor");
    p.gettableks(1, 0, "pi");
    p.ret(0, Some(1));

    let module = deserialise(&single(p)).unwrap();
    let code = &module.main_proto().code;
    assert_eq!(code.len(), 5);
    assert_eq!(code[0].op, GETIMPORT);
    assert_eq!(code[2].op, GETTABLEKS);
    assert_eq!(code[4].op, RETURN);

    match &code[0].k {
        Konst::Import(names) => {
            let names: Vec<&[u8]> = names.iter().map(|n| &n[..]).collect();
            assert_eq!(names, vec![b"math".as_slice(), b"floor".as_slice()]);
        }
        other => panic!("expected import, got {other:?}"),
    }
    assert_eq!(code[2].k_value(), Value::from("pi"));
}

#[test]
fn test_jump_constant_modes() {
    let mut p = ProtoBuilder::new();
    // JUMPXEQKB 取反：aux 最高位
    p.ad(JUMPXEQKB, 0, 0);
    p.aux(1 | 1 << 31);
    let s = p.constant(K::str("key"));
    p.ad(JUMPXEQKS, 0, 0);
    p.aux(s);
    p.ad(FORGLOOP, 0, 0);
    p.aux(3);
    p.ret(0, Some(0));

    let module = deserialise(&single(p)).unwrap();
    let code = &module.main_proto().code;
    assert_eq!(code[0].k_value(), Value::Boolean(true));
    assert!(code[0].kn);
    assert_eq!(code[2].k_value(), Value::from("key"));
    assert!(!code[2].kn);
    assert!(matches!(code[4].k, Konst::Count(3)));
}

#[test]
fn test_negative_d_operand() {
    let mut p = ProtoBuilder::new();
    p.loadn(0, -300);
    p.ret(0, Some(1));

    let module = deserialise(&single(p)).unwrap();
    assert_eq!(module.main_proto().code[0].d, -300);
}

#[test]
fn test_debug_names_and_lines() {
    let mut f = ProtoBuilder::new().named("helper");
    f.at_line(12);
    f.ret(0, Some(0));

    let mut m = ModuleBuilder::new();
    let f = m.proto(f);
    let mut main = ProtoBuilder::new().named("ignored");
    main.at_line(2);
    main.closure(0, f);
    main.at_line(3);
    main.ret(0, Some(0));
    let main = m.proto(main);

    let module = deserialise(&m.build(main)).unwrap();
    assert_eq!(module.main_proto().debug_name, "(main)");
    assert_eq!(module.main_proto().lines, vec![2, 3]);
    assert_eq!(module.protos[0].debug_name, "helper");
    assert_eq!(module.protos[0].line_at(0), 12);
    assert_eq!(module.main_proto().protos, vec![0]);
}

#[test]
fn test_anonymous_proto_name() {
    let mut f = ProtoBuilder::new();
    f.ret(0, Some(0));
    let mut m = ModuleBuilder::new();
    let f = m.proto(f);
    let mut main = ProtoBuilder::new();
    main.closure(0, f);
    main.ret(0, Some(0));
    let main = m.proto(main);

    let module = deserialise(&m.build(main)).unwrap();
    assert_eq!(module.protos[0].debug_name, "(??)");
}

#[test]
fn test_closure_constant() {
    let mut f = ProtoBuilder::new();
    f.ret(0, Some(0));
    let mut m = ModuleBuilder::new();
    let f = m.proto(f);
    let mut main = ProtoBuilder::new();
    let k = main.constant(K::Closure(f));
    main.ad(DUPCLOSURE, 0, k as i16);
    main.ret(0, Some(1));
    let main = m.proto(main);

    let module = deserialise(&m.build(main)).unwrap();
    assert!(matches!(module.main_proto().code[0].k, Konst::Proto(0)));
}

// ===== 错误 =====

#[test]
fn test_constant_index_out_of_range() {
    let mut p = ProtoBuilder::new();
    p.ad(LOADK, 0, 5);
    p.ret(0, Some(1));

    assert_eq!(
        deserialise(&single(p)).unwrap_err().to_string(),
        "constant index 5 out of range in LOADK"
    );
}

#[test]
fn test_unknown_opcode() {
    let mut p = ProtoBuilder::new();
    p.abc(200, 0, 0, 0);
    assert_eq!(deserialise(&single(p)).unwrap_err(), DeserialiseError::UnknownOpcode(200));
}

#[test]
fn test_closure_proto_out_of_range() {
    let mut p = ProtoBuilder::new();
    let k = p.constant(K::Closure(9));
    p.ad(DUPCLOSURE, 0, k as i16);
    p.ret(0, Some(1));

    assert_eq!(
        deserialise(&single(p)).unwrap_err(),
        DeserialiseError::ProtoIndexOutOfRange(9)
    );
}

#[test]
fn test_unknown_constant_kind() {
    // 一个 proto，一个类型为 9 的常量
    let mut b = vec![6, 3, 0, 0, 1];
    b.extend_from_slice(&[1, 0, 0, 0, 0, 0]);
    b.push(0); // sizecode
    b.push(1); // sizek
    b.push(9);
    assert_eq!(deserialise(&b).unwrap_err().to_string(), "unknown ktype 9");
}

#[test]
fn test_string_index_out_of_range() {
    let mut b = vec![6, 3, 0, 0, 1];
    b.extend_from_slice(&[1, 0, 0, 0, 0, 0]);
    b.push(0); // sizecode
    b.push(1); // sizek
    b.extend_from_slice(&[3, 4]);
    assert_eq!(
        deserialise(&b).unwrap_err(),
        DeserialiseError::StringIndexOutOfRange(4)
    );
}

#[test]
fn test_compiler_error_passthrough() {
    let mut b = vec![0];
    b.extend_from_slice(b"main.luau:1: Expected identifier\n");
    assert_eq!(
        deserialise(&b).unwrap_err().to_string(),
        "main.luau:1: Expected identifier"
    );
}

#[test]
fn test_every_prefix_fails_cleanly() {
    let mut p = ProtoBuilder::new().named("f");
    p.import(0, "string.format");
    p.loadk(1, K::str("%d"));
    p.loadk(2, K::Number(1.0));
    p.call(0, Some(2), Some(1));
    p.ret(0, Some(1));
    let bytes = single(p);

    assert!(deserialise(&bytes).is_ok());
    for len in 0..bytes.len() {
        assert!(deserialise(&bytes[..len]).is_err(), "prefix of length {len}");
    }
}
