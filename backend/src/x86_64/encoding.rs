//! Bit-level x86-64 encoding: REX prefix, ModR/M and SIB bytes.
//!
//! Everything here appends raw bytes to a [`CodeBuffer`]; the
//! instruction-level API lives in [`super::assembler`].

#![allow(non_upper_case_globals)]

use crate::code_buffer::CodeBuffer;
use crate::x86_64::regs::Reg;

// -- Prefix flags --

pub const P_EXT: u32 = 0x100; // 0x0F escape
pub const P_REXW: u32 = 0x1000; // REX.W = 1

// -- Opcodes --

pub const OPC_ARITH_EvIb: u32 = 0x83;
pub const OPC_ARITH_EvIz: u32 = 0x81;
pub const OPC_ARITH_EbIb: u32 = 0x80;
pub const OPC_XOR_EvGv: u32 = 0x31;
pub const OPC_MOVL_EvGv: u32 = 0x89;
pub const OPC_MOVL_EvIz: u32 = 0xC7;
pub const OPC_MOVL_Iv: u32 = 0xB8;
pub const OPC_MOVZBL: u32 = 0xB6 | P_EXT;
pub const OPC_GRP4_Eb: u32 = 0xFE;
pub const OPC_GRP5: u32 = 0xFF;
pub const OPC_PUSH_r32: u32 = 0x50;
pub const OPC_POP_r32: u32 = 0x58;
pub const OPC_JCC_long: u32 = 0x80 | P_EXT;
pub const OPC_JMP_long: u32 = 0xE9;
pub const OPC_CALL_Jz: u32 = 0xE8;
pub const OPC_RET: u32 = 0xC3;
pub const OPC_RET_Iw: u32 = 0xC2;
pub const OPC_STOSB: u32 = 0xAA;
pub const OPC_CLD: u32 = 0xFC;
pub const OPC_INT3: u32 = 0xCC;

/// Group 4/5 extension codes (the /r field of 0xFE/0xFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext5Op {
    Inc = 0,
    Dec = 1,
    CallN = 2,
}

/// ModR/M `mod` for a register operand.
pub const MOD_REG: u8 = 0b11;
/// ModR/M `rm` / SIB `index` value meaning "SIB follows" / "no index".
const RM_SIB: u8 = 0b100;
/// `rm` value that means RIP-relative when `mod == 00`.
const RM_DISP32: u8 = 0b101;

/// Build a REX prefix: `0100WRXB`.
#[inline]
pub const fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    0x40 | (w as u8) << 3 | (r as u8) << 2 | (x as u8) << 1 | b as u8
}

/// Build a ModR/M byte: `mod:2 reg:3 rm:3`.
#[inline]
pub const fn modrm(md: u8, reg: u8, rm: u8) -> u8 {
    (md & 3) << 6 | (reg & 7) << 3 | (rm & 7)
}

/// Build a SIB byte: `scale:2 index:3 base:3`.
#[inline]
pub const fn sib(scale: u8, index: u8, base: u8) -> u8 {
    (scale & 3) << 6 | (index & 7) << 3 | (base & 7)
}

/// Emit the REX prefix (when needed), escape byte and opcode.
///
/// `r` and `rm` are raw register numbers (0-15) or /r extension codes.
/// REX is required for 64-bit operand size or any register >= 8; byte
/// sized memory operands need it only for an extended base.
pub fn emit_opc(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    let w = opc & P_REXW != 0;
    let (ext_r, ext_b) = (r >= 8, rm >= 8);
    if w || ext_r || ext_b {
        buf.emit_u8(rex(w, ext_r, false, ext_b));
    }
    if opc & P_EXT != 0 {
        buf.emit_u8(0x0F);
    }
    buf.emit_u8(opc as u8);
}

/// Emit a one-byte `+r` opcode (push/pop/movabs) with REX.B when needed.
pub fn emit_opc_plus_r(buf: &mut CodeBuffer, opc: u32, reg: Reg) {
    emit_opc(buf, (opc & !0x7) | reg.low3() as u32, 0, reg as u8);
}

/// Emit opcode + ModR/M for a register-register operation.
pub fn emit_modrm(buf: &mut CodeBuffer, opc: u32, r: Reg, rm: Reg) {
    emit_opc(buf, opc, r as u8, rm as u8);
    buf.emit_u8(modrm(MOD_REG, r.low3(), rm.low3()));
}

/// Emit opcode + ModR/M with /r extension on a register operand.
pub fn emit_modrm_ext(buf: &mut CodeBuffer, opc: u32, ext: u8, rm: Reg) {
    emit_opc(buf, opc, ext, rm as u8);
    buf.emit_u8(modrm(MOD_REG, ext, rm.low3()));
}

/// Emit opcode + ModR/M (+ SIB / disp8) for the memory operand `[base]`.
///
/// `reg` is a register number or /r extension code. Two base encodings
/// cannot be expressed as plain `mod=00` register-indirect:
/// - low bits `100` (`rsp`, `r12`) select a SIB byte, so one is emitted
///   with no index and the base repeated;
/// - low bits `101` (`rbp`, `r13`) select RIP-relative, so `mod=01` with a
///   zero disp8 is used instead.
pub fn emit_modrm_indirect(buf: &mut CodeBuffer, opc: u32, reg: u8, base: Reg) {
    emit_opc(buf, opc, reg, base as u8);
    match base.low3() {
        RM_SIB => {
            buf.emit_u8(modrm(0b00, reg, RM_SIB));
            buf.emit_u8(sib(0, RM_SIB, base.low3()));
        }
        RM_DISP32 => {
            buf.emit_u8(modrm(0b01, reg, base.low3()));
            buf.emit_u8(0);
        }
        b3 => buf.emit_u8(modrm(0b00, reg, b3)),
    }
}
