use thiserror::Error;

use crate::label::LabelId;

/// Errors reported while resolving emitted code.
///
/// Both indicate a defect in whatever drove the assembler: structured
/// control flow always binds its labels, and code stays far below the
/// reach of a 32-bit displacement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("label {label} is still unbound with {pending} pending reference(s)")]
    UnboundLabel { label: LabelId, pending: usize },

    #[error("displacement {disp} to label {label} does not fit a {width}-byte field at {site:#x}")]
    DisplacementOverflow {
        label: LabelId,
        site: usize,
        disp: i64,
        width: usize,
    },
}

pub type Result<T> = std::result::Result<T, EmitError>;
