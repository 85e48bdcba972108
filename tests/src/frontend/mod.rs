//! Translation tests: generated layout, loop wiring, error reporting.

use std::collections::HashSet;

use bfjit_frontend::{compile, CompileError, Op, Program, SourcePos, Translator, TranslatorConfig};
use iced_x86::{Mnemonic, OpKind, Register};
use proptest::prelude::*;

use crate::support::{build, decode_range};

fn mnemonics(program: &Program, range: std::ops::Range<usize>) -> Vec<Mnemonic> {
    decode_range(program, range)
        .iter()
        .map(|i| i.mnemonic())
        .collect()
}

fn offset(program: &Program, label: bfjit_core::LabelId) -> usize {
    program
        .label_offset(label)
        .unwrap_or_else(|| panic!("label {label} unbound"))
}

fn pos(offset: usize, line: u32, column: u32) -> SourcePos {
    SourcePos {
        offset,
        line,
        column,
    }
}

/// Encoded size of one operator's instruction sequence.
fn op_size(b: u8) -> usize {
    match b {
        b'>' | b'<' => 3,
        b'+' | b'-' => 2,
        b'[' => 9,
        b']' => 5,
        b'.' => 9,
        b',' => 1,
        _ => 0,
    }
}

#[test]
fn prologue_sets_up_frame_and_tape() {
    let p = build("");
    let instrs = decode_range(&p, p.layout.prologue.clone());
    let got: Vec<_> = instrs.iter().map(|i| i.mnemonic()).collect();
    assert_eq!(
        got,
        vec![
            Mnemonic::Push,
            Mnemonic::Mov,
            Mnemonic::Push,
            Mnemonic::Push,
            Mnemonic::Mov,
            Mnemonic::Sub,
            Mnemonic::Mov,
            Mnemonic::Mov,
            Mnemonic::Xor,
            Mnemonic::Cld,
            Mnemonic::Stosb,
            Mnemonic::Mov,
        ]
    );
    assert_eq!(instrs[0].op0_register(), Register::RBP);
    assert_eq!(instrs[2].op0_register(), Register::RBX);
    assert_eq!(instrs[3].op0_register(), Register::R12);
    // The entry argument is kept in r12 for the output routine.
    assert_eq!(instrs[4].op0_register(), Register::R12);
    assert_eq!(instrs[4].op1_register(), Register::RDI);
    assert_eq!(instrs[5].immediate32to64(), 30_000);
    assert_eq!(instrs[7].immediate32to64(), 30_000);
    assert!(instrs[10].has_rep_prefix());
    assert_eq!(instrs[11].op0_register(), Register::RBX);
    assert_eq!(instrs[11].op1_register(), Register::RSP);
}

#[test]
fn epilogue_mirrors_prologue() {
    let p = build("+");
    let instrs = decode_range(&p, p.layout.epilogue.clone());
    let got: Vec<_> = instrs.iter().map(|i| i.mnemonic()).collect();
    assert_eq!(
        got,
        vec![
            Mnemonic::Add,
            Mnemonic::Pop,
            Mnemonic::Pop,
            Mnemonic::Pop,
            Mnemonic::Ret
        ]
    );
    assert_eq!(instrs[0].op0_register(), Register::RSP);
    assert_eq!(instrs[0].immediate32to64(), 30_000);
    let popped: Vec<_> = instrs[1..4].iter().map(|i| i.op0_register()).collect();
    assert_eq!(popped, vec![Register::R12, Register::RBX, Register::RBP]);
}

#[test]
fn tape_size_reaches_prologue_and_epilogue() {
    let config = TranslatorConfig::with_tape_size(500).unwrap();
    assert_eq!(config.tape_size(), 512);
    let p = compile(b"+.", &config, bfjit_exec::host_routines()).unwrap();

    let prologue = decode_range(&p, p.layout.prologue.clone());
    assert_eq!(prologue[5].mnemonic(), Mnemonic::Sub);
    assert_eq!(prologue[5].immediate32to64(), 512);
    assert_eq!(prologue[7].immediate32to64(), 512);

    let epilogue = decode_range(&p, p.layout.epilogue.clone());
    assert_eq!(epilogue[0].mnemonic(), Mnemonic::Add);
    assert_eq!(epilogue[0].immediate32to64(), 512);
}

#[test]
fn output_stub_calls_host_routine() {
    let p = build(".");
    assert_eq!(offset(&p, p.output_label), p.layout.output_stub.start);

    let instrs = decode_range(&p, p.layout.output_stub.clone());
    let got: Vec<_> = instrs.iter().map(|i| i.mnemonic()).collect();
    assert_eq!(
        got,
        vec![
            Mnemonic::Push,
            Mnemonic::Mov,
            Mnemonic::Mov,
            Mnemonic::Call,
            Mnemonic::Pop,
            Mnemonic::Ret
        ]
    );
    assert_eq!(instrs[1].op0_register(), Register::RDI);
    assert_eq!(instrs[1].op1_register(), Register::R12);
    assert_eq!(instrs[2].op1_kind(), OpKind::Immediate64);
    assert_eq!(
        instrs[2].immediate64(),
        bfjit_exec::host_routines().write_byte as usize as u64
    );
    assert_eq!(instrs[3].op0_register(), Register::RAX);
}

#[test]
fn increments_then_output() {
    let p = build("+++.");
    let body = decode_range(&p, p.layout.body.clone());
    let got: Vec<_> = body.iter().map(|i| i.mnemonic()).collect();
    assert_eq!(
        got,
        vec![
            Mnemonic::Inc,
            Mnemonic::Inc,
            Mnemonic::Inc,
            Mnemonic::Movzx,
            Mnemonic::Call
        ]
    );
    for inc in &body[..3] {
        assert_eq!(inc.memory_base(), Register::RBX);
    }
    assert_eq!(body[3].op0_register(), Register::RSI);
    assert_eq!(body[3].memory_base(), Register::RBX);
    assert_eq!(
        body[4].near_branch_target() as usize,
        offset(&p, p.output_label)
    );
    assert_eq!(p.stats.ops, 4);
    assert_eq!(p.stats.loops, 0);
}

#[test]
fn pointer_moves_step_data_register() {
    let p = build("><");
    let body = decode_range(&p, p.layout.body.clone());
    assert_eq!(body[0].mnemonic(), Mnemonic::Inc);
    assert_eq!(body[0].op0_register(), Register::RBX);
    assert_eq!(body[1].mnemonic(), Mnemonic::Dec);
    assert_eq!(body[1].op0_register(), Register::RBX);
}

#[test]
fn input_compiles_to_trap() {
    let p = build(",");
    assert_eq!(mnemonics(&p, p.layout.body.clone()), vec![Mnemonic::Int3]);
}

#[test]
fn comments_generate_nothing() {
    let plain = build("+[-].");
    let commented = build("add one + then loop [ clear - ] and print .\n");
    assert_eq!(plain.code, commented.code);
    assert!(build("no operators here").layout.body.is_empty());
}

#[test]
fn simple_loop_wiring() {
    let p = build("[-]");
    assert_eq!(p.loops.len(), 1);
    assert_eq!(p.labels.len(), 3);

    let frame = p.loops[0];
    let begin = offset(&p, frame.begin);
    let end = offset(&p, frame.end);
    assert_eq!(begin, p.layout.body.start);
    assert_eq!(end, p.layout.body.end);

    let body = decode_range(&p, p.layout.body.clone());
    let got: Vec<_> = body.iter().map(|i| i.mnemonic()).collect();
    assert_eq!(
        got,
        vec![Mnemonic::Cmp, Mnemonic::Je, Mnemonic::Dec, Mnemonic::Jmp]
    );
    assert_eq!(body[0].memory_base(), Register::RBX);
    assert_eq!(body[0].immediate8(), 0);
    assert_eq!(body[1].near_branch_target() as usize, end);
    assert_eq!(body[3].near_branch_target() as usize, begin);
}

#[test]
fn nested_loops_bind_inner_end_first() {
    let p = build("[[-]]");
    assert_eq!(p.loops.len(), 2);
    assert_eq!(p.stats.max_depth, 2);
    let (outer, inner) = (p.loops[0], p.loops[1]);

    let outer_begin = offset(&p, outer.begin);
    let inner_begin = offset(&p, inner.begin);
    let inner_end = offset(&p, inner.end);
    let outer_end = offset(&p, outer.end);
    assert_eq!(inner_begin, outer_begin + 9);
    assert!(inner_end < outer_end);
    assert_eq!(outer_end, inner_end + 5);
    assert_eq!(outer.opened_at, pos(0, 1, 1));
    assert_eq!(inner.opened_at, pos(1, 1, 2));

    let body = decode_range(&p, p.layout.body.clone());
    let branches: Vec<_> = body
        .iter()
        .filter(|i| i.op0_kind() == OpKind::NearBranch64)
        .map(|i| (i.mnemonic(), i.near_branch_target() as usize))
        .collect();
    assert_eq!(
        branches,
        vec![
            (Mnemonic::Je, outer_end),
            (Mnemonic::Je, inner_end),
            (Mnemonic::Jmp, inner_begin),
            (Mnemonic::Jmp, outer_begin),
        ]
    );
}

#[test]
fn empty_loop_is_valid() {
    let p = build("[]");
    let frame = p.loops[0];
    assert_eq!(offset(&p, frame.end) - offset(&p, frame.begin), 9 + 5);
}

#[test]
fn unmatched_close_is_reported_at_its_position() {
    assert_eq!(
        compile(b"]", &TranslatorConfig::default(), bfjit_exec::host_routines()).unwrap_err(),
        CompileError::UnmatchedClose { pos: pos(0, 1, 1) }
    );
    assert_eq!(
        compile(b"+\n+]", &TranslatorConfig::default(), bfjit_exec::host_routines()).unwrap_err(),
        CompileError::UnmatchedClose { pos: pos(3, 2, 2) }
    );
}

#[test]
fn unmatched_close_emits_nothing() {
    let mut t = Translator::new(TranslatorConfig::default(), bfjit_exec::host_routines());
    t.emit(Op::Inc, pos(0, 1, 1)).unwrap();
    let before = t.cursor();
    let err = t.emit(Op::LoopEnd, pos(1, 1, 2)).unwrap_err();
    assert_eq!(err, CompileError::UnmatchedClose { pos: pos(1, 1, 2) });
    assert_eq!(t.cursor(), before);
    assert_eq!(t.depth(), 0);
}

#[test]
fn unmatched_open_reports_innermost_loop() {
    let err = compile(b"[", &TranslatorConfig::default(), bfjit_exec::host_routines())
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::UnmatchedOpen {
            pos: pos(0, 1, 1),
            depth: 1
        }
    );

    let err = compile(b"[+[\n[]", &TranslatorConfig::default(), bfjit_exec::host_routines())
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::UnmatchedOpen {
            pos: pos(2, 1, 3),
            depth: 2
        }
    );
    assert_eq!(err.to_string(), "unmatched '[' at 1:3 (2 loop(s) left open)");
}

#[test]
fn separate_compilations_do_not_interfere() {
    let a = build("[.]");
    let b = build("[.]");
    assert_eq!(a.code, b.code);
    assert_ne!(a.loops[0].begin, b.loops[0].begin);
}

fn program() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(vec!["+", "-", ">", "<", ".", ",", "x", "\n"])
        .prop_map(String::from);
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(|v| v.concat()),
            prop::collection::vec(inner, 0..6).prop_map(|v| format!("[{}]", v.concat())),
        ]
    })
}

proptest! {
    #[test]
    fn balanced_programs_resolve_completely(src in program()) {
        let p = build(&src);
        let opens = src.bytes().filter(|&b| b == b'[').count();

        prop_assert_eq!(p.loops.len(), opens);
        prop_assert_eq!(p.labels.len(), 1 + 2 * opens);
        prop_assert!(p.labels.iter().all(|l| l.is_bound()));
        prop_assert_eq!(p.labels.pending_count(), 0);

        let body_len: usize = src.bytes().map(op_size).sum();
        prop_assert_eq!(p.layout.body.len(), body_len);
        prop_assert_eq!(p.stats.code_len, p.code.len());
    }

    #[test]
    fn branches_land_on_their_labels(src in program()) {
        let p = build(&src);
        let begins: HashSet<usize> = p.loops.iter().map(|f| offset(&p, f.begin)).collect();
        let ends: HashSet<usize> = p.loops.iter().map(|f| offset(&p, f.end)).collect();
        let output = offset(&p, p.output_label);

        for instr in decode_range(&p, 0..p.code.len()) {
            if instr.op0_kind() != OpKind::NearBranch64 {
                continue;
            }
            let target = instr.near_branch_target() as usize;
            match instr.mnemonic() {
                Mnemonic::Je => prop_assert!(ends.contains(&target)),
                Mnemonic::Jmp => prop_assert!(begins.contains(&target)),
                Mnemonic::Call => prop_assert_eq!(target, output),
                other => prop_assert!(false, "unexpected branch {:?}", other),
            }
        }

        for frame in &p.loops {
            let begin = offset(&p, frame.begin);
            let end = offset(&p, frame.end);
            let head = decode_range(&p, begin..begin + 9);
            prop_assert_eq!(head[1].mnemonic(), Mnemonic::Je);
            prop_assert_eq!(head[1].near_branch_target() as usize, end);
            let back = decode_range(&p, end - 5..end);
            prop_assert_eq!(back[0].mnemonic(), Mnemonic::Jmp);
            prop_assert_eq!(back[0].near_branch_target() as usize, begin);
        }
    }
}
