//! Source → x86-64 translation.
//!
//! Generated programs follow the System V calling convention:
//! `extern "sysv64" fn(ctx: *mut c_void)`, where `ctx` is handed back to
//! the host output routine on every `.`. The working region is reserved
//! and zero-filled on the native stack by the prologue; [`DATA_PTR`]
//! points into it for the whole run.

use std::ffi::c_void;
use std::ops::Range;

use bfjit_backend::x86_64::regs::{
    ArithOp, Prefix, Reg, X86Cond, CALL_ARG_REGS, DATA_PTR, HOST_CTX, SAVED_REGS,
};
use bfjit_backend::X86Assembler;
use bfjit_core::{LabelId, Labels};
use tracing::{debug, warn};

use crate::config::TranslatorConfig;
use crate::error::{CompileError, Result};
use crate::source::{Op, Ops, SourcePos};

/// Host routine called once per output operator with the context pointer
/// the program was entered with and the byte at the data pointer.
pub type WriteByteFn = unsafe extern "sysv64" fn(ctx: *mut c_void, byte: u32);

/// Signature of a generated program, entered at offset 0.
pub type EntryFn = unsafe extern "sysv64" fn(ctx: *mut c_void);

/// Host routines whose addresses are embedded in generated code.
#[derive(Debug, Clone, Copy)]
pub struct HostRoutines {
    pub write_byte: WriteByteFn,
}

/// An open loop: `begin` is bound at the head test, `end` is bound after
/// the backward jump once the matching `]` is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchFrame {
    pub begin: LabelId,
    pub end: LabelId,
    pub opened_at: SourcePos,
}

/// Counters collected while translating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramStats {
    pub ops: usize,
    pub loops: usize,
    pub max_depth: usize,
    pub code_len: usize,
}

/// Offsets of the fixed parts of a generated program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub prologue: Range<usize>,
    pub body: Range<usize>,
    pub epilogue: Range<usize>,
    pub output_stub: Range<usize>,
}

/// A translated program: finalized code plus the bookkeeping that
/// produced it.
#[derive(Debug)]
pub struct Program {
    pub code: Vec<u8>,
    pub labels: Labels,
    /// Every loop in source order of its `[`.
    pub loops: Vec<BranchFrame>,
    pub output_label: LabelId,
    pub layout: Layout,
    pub stats: ProgramStats,
}

impl Program {
    /// Bound offset of `label`.
    pub fn label_offset(&self, label: LabelId) -> Option<usize> {
        self.labels.get(label).rip()
    }
}

/// Emit the entry sequence: save callee-saved registers, reserve and
/// zero-fill the working region, point [`DATA_PTR`] at its first byte.
pub fn gen_prologue(asm: &mut X86Assembler, config: &TranslatorConfig) {
    let tape = config.tape_size() as i32;

    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    for &reg in SAVED_REGS {
        asm.push(reg);
    }
    asm.mov_rr(HOST_CTX, CALL_ARG_REGS[0]);
    asm.arith_ri(ArithOp::Sub, Reg::Rsp, tape);

    // rep stosb: rdi = region, rcx = length, al = 0.
    asm.mov_rr(Reg::Rdi, Reg::Rsp);
    asm.mov_ri32(Reg::Rcx, tape);
    asm.xor_rr(Reg::Rax, Reg::Rax);
    asm.cld();
    asm.prefix(Prefix::Rep);
    asm.stosb();

    asm.mov_rr(DATA_PTR, Reg::Rsp);
}

/// Emit the exit sequence; the exact mirror of [`gen_prologue`].
pub fn gen_epilogue(asm: &mut X86Assembler, config: &TranslatorConfig) {
    asm.arith_ri(ArithOp::Add, Reg::Rsp, config.tape_size() as i32);
    for &reg in SAVED_REGS.iter().rev() {
        asm.pop(reg);
    }
    asm.pop(Reg::Rbp);
    asm.ret(0);
}

/// Emit the shared output routine, reached by `call` from every `.` with
/// the byte already zero-extended into the second argument register.
pub fn gen_output_stub(asm: &mut X86Assembler, write_byte: WriteByteFn) {
    // Entered with rsp 8 off alignment; the push restores it for the call.
    asm.push(Reg::Rbp);
    asm.mov_rr(CALL_ARG_REGS[0], HOST_CTX);
    asm.mov_ri64(Reg::Rax, write_byte as usize as u64);
    asm.call_r(Reg::Rax);
    asm.pop(Reg::Rbp);
    asm.ret(0);
}

/// Single-pass translator driving an [`X86Assembler`].
pub struct Translator {
    asm: X86Assembler,
    config: TranslatorConfig,
    routines: HostRoutines,
    frames: Vec<BranchFrame>,
    loops: Vec<BranchFrame>,
    output_label: LabelId,
    prologue_end: usize,
    stats: ProgramStats,
}

impl Translator {
    /// Start a new program; the prologue is emitted immediately.
    pub fn new(config: TranslatorConfig, routines: HostRoutines) -> Self {
        let mut asm = X86Assembler::new();
        let output_label = asm.new_label();
        gen_prologue(&mut asm, &config);
        let prologue_end = asm.cursor();
        Self {
            asm,
            config,
            routines,
            frames: Vec::new(),
            loops: Vec::new(),
            output_label,
            prologue_end,
            stats: ProgramStats::default(),
        }
    }

    /// Offset the next instruction will be emitted at.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.asm.cursor()
    }

    /// Current loop nesting depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Translate one operator found at `pos`.
    pub fn emit(&mut self, op: Op, pos: SourcePos) -> Result<()> {
        match op {
            Op::Right => self.asm.inc_r(DATA_PTR),
            Op::Left => self.asm.dec_r(DATA_PTR),
            Op::Inc => self.asm.inc_m8(DATA_PTR),
            Op::Dec => self.asm.dec_m8(DATA_PTR),
            Op::LoopBegin => self.begin_loop(pos)?,
            Op::LoopEnd => self.end_loop(pos)?,
            Op::Output => {
                self.asm.movzx_rm8(CALL_ARG_REGS[1], DATA_PTR);
                self.asm.call(self.output_label)?;
            }
            Op::Input => {
                warn!(%pos, "input is not supported; ',' compiles to a trap");
                self.asm.int3();
            }
        }
        self.stats.ops += 1;
        Ok(())
    }

    fn begin_loop(&mut self, pos: SourcePos) -> Result<()> {
        let frame = BranchFrame {
            begin: self.asm.new_label(),
            end: self.asm.new_label(),
            opened_at: pos,
        };
        self.asm.bind(frame.begin);
        self.asm.cmp_mi8(DATA_PTR, 0);
        self.asm.jcc(X86Cond::Je, frame.end)?;

        self.frames.push(frame);
        self.loops.push(frame);
        self.stats.loops += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.frames.len());
        Ok(())
    }

    fn end_loop(&mut self, pos: SourcePos) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or(CompileError::UnmatchedClose { pos })?;
        self.asm.jmp(frame.begin)?;
        self.asm.bind(frame.end);
        Ok(())
    }

    /// Close the program: epilogue, output routine, back-patch resolution.
    pub fn finish(mut self) -> Result<Program> {
        if let Some(frame) = self.frames.last() {
            return Err(CompileError::UnmatchedOpen {
                pos: frame.opened_at,
                depth: self.frames.len(),
            });
        }

        let body_end = self.asm.cursor();
        gen_epilogue(&mut self.asm, &self.config);
        let stub_start = self.asm.cursor();
        self.asm.bind(self.output_label);
        gen_output_stub(&mut self.asm, self.routines.write_byte);
        let code_len = self.asm.finalize()?.len();

        let layout = Layout {
            prologue: 0..self.prologue_end,
            body: self.prologue_end..body_end,
            epilogue: body_end..stub_start,
            output_stub: stub_start..code_len,
        };
        let stats = ProgramStats {
            code_len,
            ..self.stats
        };
        debug!(
            ops = stats.ops,
            loops = stats.loops,
            max_depth = stats.max_depth,
            code_len,
            "translated program"
        );

        let (code, labels) = self.asm.into_parts();
        Ok(Program {
            code,
            labels,
            loops: self.loops,
            output_label: self.output_label,
            layout,
            stats,
        })
    }
}

/// Translate a whole source text.
pub fn compile(
    source: &[u8],
    config: &TranslatorConfig,
    routines: HostRoutines,
) -> Result<Program> {
    let mut t = Translator::new(*config, routines);
    for (op, pos) in Ops::new(source) {
        t.emit(op, pos)?;
    }
    t.finish()
}
