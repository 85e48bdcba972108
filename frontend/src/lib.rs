//! Front end: turns source text into a finalized x86-64 program.
//!
//! Each operator maps to a fixed instruction sequence; loops become a
//! head test with a forward exit branch plus a backward jump. There is
//! no intermediate representation and no optimization.

pub mod config;
pub mod error;
pub mod source;
pub mod translate;

pub use config::{ConfigError, TranslatorConfig};
pub use error::CompileError;
pub use source::{is_program_text, Op, Ops, SourcePos};
pub use translate::{
    compile, BranchFrame, EntryFn, HostRoutines, Layout, Program, ProgramStats, Translator,
    WriteByteFn,
};
