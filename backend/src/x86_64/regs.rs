/// x86-64 general-purpose register indices.
///
/// Encoding matches the x86-64 ModR/M and REX register numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    pub const ALL: [Reg; 16] = [
        Reg::Rax,
        Reg::Rcx,
        Reg::Rdx,
        Reg::Rbx,
        Reg::Rsp,
        Reg::Rbp,
        Reg::Rsi,
        Reg::Rdi,
        Reg::R8,
        Reg::R9,
        Reg::R10,
        Reg::R11,
        Reg::R12,
        Reg::R13,
        Reg::R14,
        Reg::R15,
    ];

    /// Low 3 bits of the register encoding (for ModR/M, SIB and +r opcodes).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Whether this register is one of R8-R15 and needs a REX extension bit.
    #[inline]
    pub const fn is_extended(self) -> bool {
        (self as u8) >= 8
    }
}

/// Legacy prefix bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Prefix {
    Lock = 0xF0,
    Repne = 0xF2,
    Rep = 0xF3,
    SegCs = 0x2E,
    SegSs = 0x36,
    SegDs = 0x3E,
    SegEs = 0x26,
    SegFs = 0x64,
    SegGs = 0x65,
    OperandSize = 0x66,
    AddressSize = 0x67,
}

/// x86 condition codes for Jcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Cond {
    Jo = 0x0,
    Jno = 0x1,
    Jb = 0x2,
    Jae = 0x3,
    Je = 0x4,
    Jne = 0x5,
    Jbe = 0x6,
    Ja = 0x7,
    Js = 0x8,
    Jns = 0x9,
    Jp = 0xA,
    Jnp = 0xB,
    Jl = 0xC,
    Jge = 0xD,
    Jle = 0xE,
    Jg = 0xF,
}

/// Arithmetic sub-opcodes (the /r field of 0x81/0x83).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// Data pointer of generated programs. Callee-saved, so it survives the
/// call into the host output routine.
pub const DATA_PTR: Reg = Reg::Rbx;

/// Holds the host output context for the lifetime of the program.
pub const HOST_CTX: Reg = Reg::R12;

/// Callee-saved registers the prologue pushes after `rbp`, in push order.
pub const SAVED_REGS: &[Reg] = &[DATA_PTR, HOST_CTX];

/// Function argument registers (System V AMD64 ABI).
pub const CALL_ARG_REGS: &[Reg] = &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

pub const STACK_ALIGN: usize = 16;

/// Bytes pushed by the call into generated code plus the prologue:
/// return address, `rbp` and [`SAVED_REGS`].
pub const PUSH_SIZE: usize = (2 + SAVED_REGS.len()) * 8;

// The working region is a multiple of STACK_ALIGN, so the pushes alone
// must keep rsp aligned for calls made from generated code.
const _: () = assert!(PUSH_SIZE % STACK_ALIGN == 0);
