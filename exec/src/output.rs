use std::ffi::c_void;
use std::io::{self, Write};

/// Output capability handed to a running program.
///
/// Generated code receives a pointer to this as its entry argument and
/// passes it back to [`write_byte`] for every output operator. The first
/// write error is kept and later writes are skipped, since generated code
/// has no way to react to a failure.
pub struct OutputSink<'a> {
    out: &'a mut dyn Write,
    written: u64,
    error: Option<io::Error>,
}

impl<'a> OutputSink<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            written: 0,
            error: None,
        }
    }

    /// Bytes successfully written so far.
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn put(&mut self, byte: u8) {
        if self.error.is_some() {
            return;
        }
        match self.out.write_all(&[byte]) {
            Ok(()) => self.written += 1,
            Err(err) => self.error = Some(err),
        }
    }

    /// Flush the writer and surface the first error, if any.
    pub fn finish(mut self) -> io::Result<u64> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()?;
        Ok(self.written)
    }
}

/// Host side of the output operator.
///
/// # Safety
/// `ctx` must point to a live [`OutputSink`] not otherwise borrowed for
/// the duration of the call.
pub unsafe extern "sysv64" fn write_byte(ctx: *mut c_void, byte: u32) {
    let sink = &mut *(ctx as *mut OutputSink<'_>);
    sink.put(byte as u8);
}
