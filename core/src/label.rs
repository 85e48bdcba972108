use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Source of per-arena session numbers. Only used to tell handles of
/// different compilations apart; it carries no other state.
static NEXT_SESSION: AtomicU32 = AtomicU32::new(0);

/// Handle to a label inside one [`Labels`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId {
    session: u32,
    index: u32,
}

impl LabelId {
    /// Position of the label in its arena (creation order).
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.index)
    }
}

/// Binding state of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelState {
    /// Referenced, but the target offset is not known yet.
    Unbound,
    /// Placed at the given code buffer offset. Terminal.
    Bound(usize),
}

/// Width of a relative displacement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// Signed 8-bit displacement (short jcc/jmp).
    Rel8,
    /// Signed 32-bit displacement (jmp/jcc/call rel32).
    Rel32,
}

impl RelocKind {
    /// Size of the displacement field in bytes.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            RelocKind::Rel8 => 1,
            RelocKind::Rel32 => 4,
        }
    }

    /// Whether `disp` can be stored in a field of this kind.
    pub fn fits(self, disp: i64) -> bool {
        match self {
            RelocKind::Rel8 => i8::try_from(disp).is_ok(),
            RelocKind::Rel32 => i32::try_from(disp).is_ok(),
        }
    }
}

/// A branch or call emitted before its target label was bound.
///
/// `site_offset` is where the instruction starts; the displacement is
/// measured from the end of the instruction (`site_offset + insn_len`),
/// the same origin the processor uses for relative branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPatch {
    pub site_offset: usize,
    pub insn_len: usize,
    pub kind: RelocKind,
    /// Offset of the displacement field within the instruction.
    pub field_offset: usize,
}

impl PendingPatch {
    /// Buffer offset of the displacement field.
    #[inline]
    pub fn field_pos(&self) -> usize {
        self.site_offset + self.field_offset
    }

    /// Offset of the byte following the instruction.
    #[inline]
    pub fn origin(&self) -> usize {
        self.site_offset + self.insn_len
    }

    /// Displacement from the end of the instruction to `target`.
    #[inline]
    pub fn displacement(&self, target: usize) -> i64 {
        target as i64 - self.origin() as i64
    }
}

/// A forward-referenceable code address.
///
/// Starts `Unbound`; branches to it record a [`PendingPatch`] until it is
/// bound, after which they are resolved and the list is emptied.
#[derive(Debug, Clone)]
pub struct Label {
    id: LabelId,
    state: LabelState,
    pending: Vec<PendingPatch>,
}

impl Label {
    fn new(id: LabelId) -> Self {
        Self {
            id,
            state: LabelState::Unbound,
            pending: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> LabelId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> LabelState {
        self.state
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        matches!(self.state, LabelState::Bound(_))
    }

    /// Bound offset, if any.
    #[inline]
    pub fn rip(&self) -> Option<usize> {
        match self.state {
            LabelState::Bound(rip) => Some(rip),
            LabelState::Unbound => None,
        }
    }

    /// Place this label at `rip`.
    ///
    /// # Panics
    /// If the label is already bound.
    pub fn bind(&mut self, rip: usize) {
        if let LabelState::Bound(prev) = self.state {
            panic!("label {} bound twice (at {prev:#x} and {rip:#x})", self.id);
        }
        self.state = LabelState::Bound(rip);
    }

    /// Record a forward reference to this label.
    pub fn add_patch(&mut self, patch: PendingPatch) {
        self.pending.push(patch);
    }

    #[inline]
    pub fn pending(&self) -> &[PendingPatch] {
        &self.pending
    }

    /// Whether there are unresolved forward references.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Remove and return the pending patches.
    pub fn take_pending(&mut self) -> Vec<PendingPatch> {
        std::mem::take(&mut self.pending)
    }
}

/// Arena of labels for one compilation session.
///
/// Handles created by one arena are rejected by every other arena.
#[derive(Debug)]
pub struct Labels {
    session: u32,
    labels: Vec<Label>,
}

impl Labels {
    pub fn new() -> Self {
        Self {
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            labels: Vec::with_capacity(32),
        }
    }

    /// Create a new unbound label.
    pub fn create(&mut self) -> LabelId {
        let id = LabelId {
            session: self.session,
            index: self.labels.len() as u32,
        };
        self.labels.push(Label::new(id));
        id
    }

    /// Whether `id` was created by this arena.
    #[inline]
    pub fn owns(&self, id: LabelId) -> bool {
        id.session == self.session && id.index() < self.labels.len()
    }

    /// # Panics
    /// If `id` belongs to another arena.
    pub fn get(&self, id: LabelId) -> &Label {
        self.check(id);
        &self.labels[id.index()]
    }

    /// # Panics
    /// If `id` belongs to another arena.
    pub fn get_mut(&mut self, id: LabelId) -> &mut Label {
        self.check(id);
        &mut self.labels[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Label> {
        self.labels.iter_mut()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Total number of unresolved forward references.
    pub fn pending_count(&self) -> usize {
        self.labels.iter().map(|l| l.pending.len()).sum()
    }

    fn check(&self, id: LabelId) {
        assert!(
            self.owns(id),
            "label {id} does not belong to this compilation session"
        );
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::new()
    }
}
