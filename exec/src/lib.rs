//! Execution trampoline: load a finalized program into executable memory,
//! enter it with an injected output capability, release the mapping.
//!
//! Only unix hosts on x86-64 can run generated code; elsewhere
//! [`execute`] reports [`ExecError::Unsupported`].

#[cfg(unix)]
pub mod memory;
pub mod output;

use std::io::{self, Write};

use bfjit_frontend::HostRoutines;
use thiserror::Error;

#[cfg(unix)]
pub use memory::ExecMemory;
pub use output::{write_byte, OutputSink};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to allocate executable memory: {0}")]
    Alloc(#[source] io::Error),

    #[error("failed to make code executable: {0}")]
    Protect(#[source] io::Error),

    #[error("no code to execute")]
    EmptyCode,

    #[error("failed to write program output: {0}")]
    Output(#[source] io::Error),

    #[error("executing generated code requires an x86-64 unix host")]
    Unsupported,
}

/// Summary of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub code_len: usize,
    pub bytes_written: u64,
}

/// Routines to embed into programs that will run through [`execute`].
pub fn host_routines() -> HostRoutines {
    HostRoutines { write_byte }
}

/// Run a finalized program, sending its output to `out`.
///
/// `code` must come from a program compiled against [`host_routines`].
/// A trap or fault inside the program terminates the process.
#[cfg(all(unix, target_arch = "x86_64"))]
pub fn execute(code: &[u8], out: &mut dyn Write) -> Result<RunStats, ExecError> {
    use std::ffi::c_void;

    let mem = ExecMemory::load(code)?;
    let mut sink = OutputSink::new(out);
    tracing::debug!(code_len = mem.len(), mapped = mem.capacity(), "entering program");

    // SAFETY: the code follows the EntryFn convention and only touches
    // its own stack frame and the sink passed back to write_byte.
    unsafe {
        let entry = mem.entry();
        entry(&mut sink as *mut OutputSink<'_> as *mut c_void);
    }
    drop(mem);

    let bytes_written = sink.finish().map_err(ExecError::Output)?;
    tracing::debug!(bytes_written, "program returned");
    Ok(RunStats {
        code_len: code.len(),
        bytes_written,
    })
}

#[cfg(not(all(unix, target_arch = "x86_64")))]
pub fn execute(_code: &[u8], _out: &mut dyn Write) -> Result<RunStats, ExecError> {
    Err(ExecError::Unsupported)
}
