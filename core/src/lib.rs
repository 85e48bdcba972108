//! Session-scoped building blocks shared by the assembler and the
//! translator: forward-reference labels and emission errors.

pub mod error;
pub mod label;

pub use error::EmitError;
pub use label::{Label, LabelId, LabelState, Labels, PendingPatch, RelocKind};
