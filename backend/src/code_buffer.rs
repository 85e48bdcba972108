/// Initial capacity reserved for generated code.
const DEFAULT_CODE_BUF_CAPACITY: usize = 4096;

/// Growable buffer holding generated host code.
///
/// Bytes are only ever appended; already written bytes may be overwritten
/// in place (back-patching) but the buffer never grows through a patch.
/// The current length doubles as the instruction pointer of the next
/// emitted instruction, since all branches are encoded relative.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CODE_BUF_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Current write offset.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    // -- Emit methods --

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.bytes.push(val);
    }

    #[inline]
    pub fn emit_u16(&mut self, val: u16) {
        self.bytes.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        self.bytes.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_i32(&mut self, val: i32) {
        self.bytes.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        self.bytes.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_bytes(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    // -- Patch methods --

    /// Overwrite `data.len()` bytes starting at `offset`.
    ///
    /// # Panics
    /// If the range reaches past the bytes written so far.
    pub fn patch(&mut self, offset: usize, data: &[u8]) {
        let end = offset.checked_add(data.len());
        assert!(
            end.is_some_and(|end| end <= self.bytes.len()),
            "patch of {} byte(s) at {offset:#x} outside code buffer (len {:#x})",
            data.len(),
            self.bytes.len(),
        );
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Patch a u8 at the given offset.
    #[inline]
    pub fn patch_u8(&mut self, offset: usize, val: u8) {
        self.patch(offset, &[val]);
    }

    /// Patch a u32 at the given offset.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        self.patch(offset, &val.to_le_bytes());
    }

    // -- Read back --

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    /// Read a u32 at the given offset.
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    /// Get the generated code as a byte slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}
