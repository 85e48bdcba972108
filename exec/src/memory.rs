use std::io;
use std::ptr;

use bfjit_frontend::EntryFn;

use crate::ExecError;

/// Executable mapping holding one finalized program.
///
/// The code is copied in while the mapping is writable, then the mapping
/// is flipped to read/execute before anything runs: it is never writable
/// and executable at the same time. Dropping it unmaps the memory.
pub struct ExecMemory {
    ptr: *mut u8,
    size: usize,
    len: usize,
}

impl ExecMemory {
    /// Map, copy `code` verbatim and make it executable.
    pub fn load(code: &[u8]) -> Result<Self, ExecError> {
        if code.is_empty() {
            return Err(ExecError::EmptyCode);
        }
        let page_size = page_size().map_err(ExecError::Alloc)?;
        let size = (code.len() + page_size - 1) & !(page_size - 1);

        // SAFETY: mmap with MAP_ANONYMOUS | MAP_PRIVATE, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ExecError::Alloc(io::Error::last_os_error()));
        }

        let mem = Self {
            ptr: ptr as *mut u8,
            size,
            len: code.len(),
        };
        // SAFETY: the mapping is writable and at least code.len() bytes.
        unsafe { ptr::copy_nonoverlapping(code.as_ptr(), mem.ptr, code.len()) };
        mem.set_executable().map_err(ExecError::Protect)?;
        Ok(mem)
    }

    /// Raw pointer to the start of the code.
    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// Length of the loaded code (not the page-rounded mapping size).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total mapped bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+len was written in load() and stays readable.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Entry point at offset 0.
    ///
    /// # Safety
    /// The loaded bytes must be a complete program following the
    /// [`EntryFn`] convention, and `self` must outlive every call.
    pub unsafe fn entry(&self) -> EntryFn {
        std::mem::transmute::<*mut u8, EntryFn>(self.ptr)
    }

    fn set_executable(&self) -> io::Result<()> {
        let ret = unsafe {
            libc::mprotect(
                self.ptr as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for ExecMemory {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

fn page_size() -> io::Result<usize> {
    // SAFETY: sysconf is always safe to call.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size as usize)
}
