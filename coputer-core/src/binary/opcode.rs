//! 操作码表
//!
//! 83 个操作码，每个声明寻址模式（0..5）、常量类型（0..8）以及是否带 AUX 字。

/// 寻址模式：
/// - 0: 无操作数
/// - 1: A
/// - 2: A, B
/// - 3: A, B, C
/// - 4: A, D（有符号 16 位）
/// - 5: E（有符号 24 位，存放在 A 中）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub name: &'static str,
    pub mode: u8,
    pub kmode: u8,
    pub aux: bool,
}

pub const NOP: u8 = 0;
pub const BREAK: u8 = 1;
pub const LOADNIL: u8 = 2;
pub const LOADB: u8 = 3;
pub const LOADN: u8 = 4;
pub const LOADK: u8 = 5;
pub const MOVE: u8 = 6;
pub const GETGLOBAL: u8 = 7;
pub const SETGLOBAL: u8 = 8;
pub const GETUPVAL: u8 = 9;
pub const SETUPVAL: u8 = 10;
pub const CLOSEUPVALS: u8 = 11;
pub const GETIMPORT: u8 = 12;
pub const GETTABLE: u8 = 13;
pub const SETTABLE: u8 = 14;
pub const GETTABLEKS: u8 = 15;
pub const SETTABLEKS: u8 = 16;
pub const GETTABLEN: u8 = 17;
pub const SETTABLEN: u8 = 18;
pub const NEWCLOSURE: u8 = 19;
pub const NAMECALL: u8 = 20;
pub const CALL: u8 = 21;
pub const RETURN: u8 = 22;
pub const JUMP: u8 = 23;
pub const JUMPBACK: u8 = 24;
pub const JUMPIF: u8 = 25;
pub const JUMPIFNOT: u8 = 26;
pub const JUMPIFEQ: u8 = 27;
pub const JUMPIFLE: u8 = 28;
pub const JUMPIFLT: u8 = 29;
pub const JUMPIFNOTEQ: u8 = 30;
pub const JUMPIFNOTLE: u8 = 31;
pub const JUMPIFNOTLT: u8 = 32;
pub const ADD: u8 = 33;
pub const SUB: u8 = 34;
pub const MUL: u8 = 35;
pub const DIV: u8 = 36;
pub const MOD: u8 = 37;
pub const POW: u8 = 38;
pub const ADDK: u8 = 39;
pub const SUBK: u8 = 40;
pub const MULK: u8 = 41;
pub const DIVK: u8 = 42;
pub const MODK: u8 = 43;
pub const POWK: u8 = 44;
pub const AND: u8 = 45;
pub const OR: u8 = 46;
pub const ANDK: u8 = 47;
pub const ORK: u8 = 48;
pub const CONCAT: u8 = 49;
pub const NOT: u8 = 50;
pub const MINUS: u8 = 51;
pub const LENGTH: u8 = 52;
pub const NEWTABLE: u8 = 53;
pub const DUPTABLE: u8 = 54;
pub const SETLIST: u8 = 55;
pub const FORNPREP: u8 = 56;
pub const FORNLOOP: u8 = 57;
pub const FORGLOOP: u8 = 58;
pub const FORGPREP_INEXT: u8 = 59;
pub const FASTCALL3: u8 = 60;
pub const FORGPREP_NEXT: u8 = 61;
pub const FORGLOOP_NEXT: u8 = 62;
pub const GETVARARGS: u8 = 63;
pub const DUPCLOSURE: u8 = 64;
pub const PREPVARARGS: u8 = 65;
pub const LOADKX: u8 = 66;
pub const JUMPX: u8 = 67;
pub const FASTCALL: u8 = 68;
pub const COVERAGE: u8 = 69;
pub const CAPTURE: u8 = 70;
pub const SUBRK: u8 = 71;
pub const DIVRK: u8 = 72;
pub const FASTCALL1: u8 = 73;
pub const FASTCALL2: u8 = 74;
pub const FASTCALL2K: u8 = 75;
pub const FORGPREP: u8 = 76;
pub const JUMPXEQKNIL: u8 = 77;
pub const JUMPXEQKB: u8 = 78;
pub const JUMPXEQKN: u8 = 79;
pub const JUMPXEQKS: u8 = 80;
pub const IDIV: u8 = 81;
pub const IDIVK: u8 = 82;

pub const OP_COUNT: usize = 83;

const fn op(name: &'static str, mode: u8, kmode: u8, aux: bool) -> OpInfo {
    OpInfo { name, mode, kmode, aux }
}

pub static OPS: [OpInfo; OP_COUNT] = [
    op("NOP", 0, 0, false),
    op("BREAK", 0, 0, false),
    op("LOADNIL", 1, 0, false),
    op("LOADB", 3, 0, false),
    op("LOADN", 4, 0, false),
    op("LOADK", 4, 3, false),
    op("MOVE", 2, 0, false),
    op("GETGLOBAL", 1, 1, true),
    op("SETGLOBAL", 1, 1, true),
    op("GETUPVAL", 2, 0, false),
    op("SETUPVAL", 2, 0, false),
    op("CLOSEUPVALS", 1, 0, false),
    op("GETIMPORT", 4, 4, true),
    op("GETTABLE", 3, 0, false),
    op("SETTABLE", 3, 0, false),
    op("GETTABLEKS", 3, 1, true),
    op("SETTABLEKS", 3, 1, true),
    op("GETTABLEN", 3, 0, false),
    op("SETTABLEN", 3, 0, false),
    op("NEWCLOSURE", 4, 0, false),
    op("NAMECALL", 3, 1, true),
    op("CALL", 3, 0, false),
    op("RETURN", 2, 0, false),
    op("JUMP", 4, 0, false),
    op("JUMPBACK", 4, 0, false),
    op("JUMPIF", 4, 0, false),
    op("JUMPIFNOT", 4, 0, false),
    op("JUMPIFEQ", 4, 0, true),
    op("JUMPIFLE", 4, 0, true),
    op("JUMPIFLT", 4, 0, true),
    op("JUMPIFNOTEQ", 4, 0, true),
    op("JUMPIFNOTLE", 4, 0, true),
    op("JUMPIFNOTLT", 4, 0, true),
    op("ADD", 3, 0, false),
    op("SUB", 3, 0, false),
    op("MUL", 3, 0, false),
    op("DIV", 3, 0, false),
    op("MOD", 3, 0, false),
    op("POW", 3, 0, false),
    op("ADDK", 3, 2, false),
    op("SUBK", 3, 2, false),
    op("MULK", 3, 2, false),
    op("DIVK", 3, 2, false),
    op("MODK", 3, 2, false),
    op("POWK", 3, 2, false),
    op("AND", 3, 0, false),
    op("OR", 3, 0, false),
    op("ANDK", 3, 2, false),
    op("ORK", 3, 2, false),
    op("CONCAT", 3, 0, false),
    op("NOT", 2, 0, false),
    op("MINUS", 2, 0, false),
    op("LENGTH", 2, 0, false),
    op("NEWTABLE", 2, 0, true),
    op("DUPTABLE", 4, 3, false),
    op("SETLIST", 3, 0, true),
    op("FORNPREP", 4, 0, false),
    op("FORNLOOP", 4, 0, false),
    op("FORGLOOP", 4, 8, true),
    op("FORGPREP_INEXT", 4, 0, false),
    op("FASTCALL3", 3, 1, true),
    op("FORGPREP_NEXT", 4, 0, false),
    op("FORGLOOP_NEXT", 0, 0, false),
    op("GETVARARGS", 2, 0, false),
    op("DUPCLOSURE", 4, 3, false),
    op("PREPVARARGS", 1, 0, false),
    op("LOADKX", 1, 1, true),
    op("JUMPX", 5, 0, false),
    op("FASTCALL", 3, 0, false),
    op("COVERAGE", 5, 0, false),
    op("CAPTURE", 2, 0, false),
    op("SUBRK", 3, 7, false),
    op("DIVRK", 3, 7, false),
    op("FASTCALL1", 3, 0, false),
    op("FASTCALL2", 3, 0, true),
    op("FASTCALL2K", 3, 1, true),
    op("FORGPREP", 4, 0, false),
    op("JUMPXEQKNIL", 4, 5, true),
    op("JUMPXEQKB", 4, 5, true),
    op("JUMPXEQKN", 4, 6, true),
    op("JUMPXEQKS", 4, 6, true),
    op("IDIV", 3, 0, false),
    op("IDIVK", 3, 2, false),
];

/// 查询操作码信息
pub fn info(opcode: u8) -> Option<&'static OpInfo> {
    OPS.get(opcode as usize)
}
