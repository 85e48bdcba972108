//! Native code emission: a growable code buffer and an x86-64
//! instruction encoder with label back-patching.

pub mod code_buffer;
pub mod x86_64;

pub use code_buffer::CodeBuffer;
pub use x86_64::X86Assembler;
