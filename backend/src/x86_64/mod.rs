pub mod assembler;
pub mod encoding;
pub mod regs;

pub use assembler::X86Assembler;
pub use regs::{ArithOp, Prefix, Reg, X86Cond};
