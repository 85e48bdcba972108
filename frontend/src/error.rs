use bfjit_core::EmitError;
use thiserror::Error;

use crate::source::SourcePos;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unmatched ']' at {pos}")]
    UnmatchedClose { pos: SourcePos },

    /// `pos` is the innermost loop still open at end of input.
    #[error("unmatched '[' at {pos} ({depth} loop(s) left open)")]
    UnmatchedOpen { pos: SourcePos, depth: usize },

    #[error("internal code generation error: {0}")]
    Emit(#[from] EmitError),
}

pub type Result<T> = std::result::Result<T, CompileError>;
