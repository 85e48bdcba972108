use bfjit_core::error::Result;
use bfjit_core::{EmitError, LabelId, Labels, PendingPatch, RelocKind};
use tracing::trace;

use crate::code_buffer::CodeBuffer;
use crate::x86_64::encoding::*;
use crate::x86_64::regs::{ArithOp, Prefix, Reg, X86Cond};

/// x86-64 instruction encoder.
///
/// Owns the code buffer and the label arena of one compilation session.
/// Every method appends one correctly encoded instruction; branches and
/// calls to labels register a back-patch when the target is not bound yet.
#[derive(Debug, Default)]
pub struct X86Assembler {
    buf: CodeBuffer,
    labels: Labels,
}

impl X86Assembler {
    pub fn new() -> Self {
        Self {
            buf: CodeBuffer::new(),
            labels: Labels::new(),
        }
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.buf.cursor()
    }

    #[inline]
    pub fn buffer(&self) -> &CodeBuffer {
        &self.buf
    }

    #[inline]
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    // -- Labels --

    pub fn new_label(&mut self) -> LabelId {
        self.labels.create()
    }

    /// Bind `label` to the current cursor.
    ///
    /// References registered earlier stay pending until
    /// [`resolve_all`](Self::resolve_all); later ones are patched inline.
    ///
    /// # Panics
    /// If the label is already bound or belongs to another session.
    pub fn bind(&mut self, label: LabelId) {
        let rip = self.buf.cursor();
        let l = self.labels.get_mut(label);
        l.bind(rip);
        trace!(%label, rip, pending = l.pending().len(), "bind label");
    }

    /// Record a relative reference to `label` from the instruction at
    /// `site_offset`. Bound labels are patched immediately.
    pub fn register_patch(
        &mut self,
        label: LabelId,
        site_offset: usize,
        insn_len: usize,
        kind: RelocKind,
        field_offset: usize,
    ) -> Result<()> {
        let patch = PendingPatch {
            site_offset,
            insn_len,
            kind,
            field_offset,
        };
        match self.labels.get(label).rip() {
            Some(rip) => self.apply(label, rip, &patch),
            None => {
                self.labels.get_mut(label).add_patch(patch);
                Ok(())
            }
        }
    }

    /// Patch every pending reference. Idempotent.
    ///
    /// Fails if a label that is still referenced was never bound.
    pub fn resolve_all(&mut self) -> Result<()> {
        if let Some(l) = self.labels.iter().find(|l| l.has_pending() && !l.is_bound()) {
            return Err(EmitError::UnboundLabel {
                label: l.id(),
                pending: l.pending().len(),
            });
        }
        let mut work = Vec::new();
        for l in self.labels.iter_mut() {
            if let Some(rip) = l.rip() {
                for patch in l.take_pending() {
                    work.push((l.id(), rip, patch));
                }
            }
        }
        for (label, rip, patch) in work {
            self.apply(label, rip, &patch)?;
        }
        Ok(())
    }

    /// Resolve all references and return the finished code.
    pub fn finalize(&mut self) -> Result<&[u8]> {
        self.resolve_all()?;
        debug_assert_eq!(self.labels.pending_count(), 0);
        Ok(self.buf.as_slice())
    }

    /// Split into the finished code and the label arena.
    ///
    /// Call [`finalize`](Self::finalize) first; pending references are
    /// not resolved here.
    pub fn into_parts(self) -> (Vec<u8>, Labels) {
        (self.buf.into_vec(), self.labels)
    }

    fn apply(&mut self, label: LabelId, target: usize, patch: &PendingPatch) -> Result<()> {
        let disp = patch.displacement(target);
        if !patch.kind.fits(disp) {
            return Err(EmitError::DisplacementOverflow {
                label,
                site: patch.site_offset,
                disp,
                width: patch.kind.width(),
            });
        }
        match patch.kind {
            RelocKind::Rel8 => self.buf.patch_u8(patch.field_pos(), disp as i8 as u8),
            RelocKind::Rel32 => self.buf.patch_u32(patch.field_pos(), disp as i32 as u32),
        }
        trace!(%label, site = patch.site_offset, disp, "patch");
        Ok(())
    }

    /// Emit a rel32 branch to `label`: opcode bytes, then the displacement,
    /// either inline (bound target) or a zero placeholder.
    fn emit_branch(&mut self, opcode: &[u8], label: LabelId) -> Result<()> {
        let site = self.buf.cursor();
        let insn_len = opcode.len() + RelocKind::Rel32.width();
        self.buf.emit_bytes(opcode);
        self.buf.emit_u32(0);
        self.register_patch(label, site, insn_len, RelocKind::Rel32, opcode.len())
    }

    // -- Stack --

    pub fn push(&mut self, reg: Reg) {
        emit_opc_plus_r(&mut self.buf, OPC_PUSH_r32, reg);
    }

    pub fn pop(&mut self, reg: Reg) {
        emit_opc_plus_r(&mut self.buf, OPC_POP_r32, reg);
    }

    // -- Data movement --

    /// MOV r64, imm32 (sign-extended).
    pub fn mov_ri32(&mut self, reg: Reg, imm: i32) {
        emit_modrm_ext(&mut self.buf, OPC_MOVL_EvIz | P_REXW, 0, reg);
        self.buf.emit_i32(imm);
    }

    /// MOVABS r64, imm64.
    pub fn mov_ri64(&mut self, reg: Reg, imm: u64) {
        emit_opc_plus_r(&mut self.buf, OPC_MOVL_Iv | P_REXW, reg);
        self.buf.emit_u64(imm);
    }

    /// MOV dst, src (64-bit).
    pub fn mov_rr(&mut self, dst: Reg, src: Reg) {
        emit_modrm(&mut self.buf, OPC_MOVL_EvGv | P_REXW, src, dst);
    }

    /// MOVZX dst, byte [base].
    pub fn movzx_rm8(&mut self, dst: Reg, base: Reg) {
        emit_modrm_indirect(&mut self.buf, OPC_MOVZBL | P_REXW, dst as u8, base);
    }

    // -- Arithmetic --

    /// XOR dst, src (64-bit).
    pub fn xor_rr(&mut self, dst: Reg, src: Reg) {
        emit_modrm(&mut self.buf, OPC_XOR_EvGv | P_REXW, src, dst);
    }

    /// Arithmetic reg, imm (auto-selects imm8 vs imm32).
    pub fn arith_ri(&mut self, op: ArithOp, reg: Reg, imm: i32) {
        if let Ok(imm8) = i8::try_from(imm) {
            emit_modrm_ext(&mut self.buf, OPC_ARITH_EvIb | P_REXW, op as u8, reg);
            self.buf.emit_u8(imm8 as u8);
        } else {
            emit_modrm_ext(&mut self.buf, OPC_ARITH_EvIz | P_REXW, op as u8, reg);
            self.buf.emit_i32(imm);
        }
    }

    pub fn inc_r(&mut self, reg: Reg) {
        emit_modrm_ext(&mut self.buf, OPC_GRP5 | P_REXW, Ext5Op::Inc as u8, reg);
    }

    pub fn dec_r(&mut self, reg: Reg) {
        emit_modrm_ext(&mut self.buf, OPC_GRP5 | P_REXW, Ext5Op::Dec as u8, reg);
    }

    /// INC byte [base].
    pub fn inc_m8(&mut self, base: Reg) {
        emit_modrm_indirect(&mut self.buf, OPC_GRP4_Eb, Ext5Op::Inc as u8, base);
    }

    /// DEC byte [base].
    pub fn dec_m8(&mut self, base: Reg) {
        emit_modrm_indirect(&mut self.buf, OPC_GRP4_Eb, Ext5Op::Dec as u8, base);
    }

    /// CMP byte [base], imm8.
    pub fn cmp_mi8(&mut self, base: Reg, imm: i8) {
        emit_modrm_indirect(&mut self.buf, OPC_ARITH_EbIb, ArithOp::Cmp as u8, base);
        self.buf.emit_u8(imm as u8);
    }

    // -- Control flow --

    /// JMP rel32 to `label`.
    pub fn jmp(&mut self, label: LabelId) -> Result<()> {
        self.emit_branch(&[OPC_JMP_long as u8], label)
    }

    /// Jcc rel32 to `label`.
    pub fn jcc(&mut self, cond: X86Cond, label: LabelId) -> Result<()> {
        self.emit_branch(&[0x0F, OPC_JCC_long as u8 + cond as u8], label)
    }

    /// CALL rel32 to `label`.
    pub fn call(&mut self, label: LabelId) -> Result<()> {
        self.emit_branch(&[OPC_CALL_Jz as u8], label)
    }

    /// CALL *reg.
    pub fn call_r(&mut self, reg: Reg) {
        emit_modrm_ext(&mut self.buf, OPC_GRP5, Ext5Op::CallN as u8, reg);
    }

    /// RET, or RET imm16 popping `pop_bytes` of arguments.
    pub fn ret(&mut self, pop_bytes: u16) {
        if pop_bytes == 0 {
            self.buf.emit_u8(OPC_RET as u8);
        } else {
            self.buf.emit_u8(OPC_RET_Iw as u8);
            self.buf.emit_u16(pop_bytes);
        }
    }

    // -- Misc --

    pub fn prefix(&mut self, prefix: Prefix) {
        self.buf.emit_u8(prefix as u8);
    }

    /// STOSB: store AL at [rdi], step rdi by the direction flag.
    pub fn stosb(&mut self) {
        self.buf.emit_u8(OPC_STOSB as u8);
    }

    pub fn cld(&mut self) {
        self.buf.emit_u8(OPC_CLD as u8);
    }

    pub fn int3(&mut self) {
        self.buf.emit_u8(OPC_INT3 as u8);
    }
}
