//! The dead-object header and the `fill_dead` helper that writes it.
//!
//! This is the single most pervasive correctness constraint in the whole
//! crate: every place that leaves a gap in the committed region — a refill
//! tail, alignment padding, a dark-matter span — must cover that gap with a
//! well-formed dead-object cell, or a heap walker (the sweeper, a future
//! debugger, the property tests in [`crate::region`]) cannot parse past it.
//!
//! The live-object header format is out of scope for this crate (it is
//! defined by the runtime's type system); a dead-object header only needs
//! to record "this cell is dead" and "this cell is `size` bytes long", so
//! it is a single machine word rather than the multi-field packed header a
//! live object would carry.

use crate::util::{is_aligned, WORD_SIZE};

/// Low bit of the header word is always zero in a real size (every cell
/// size is word-aligned), so it doubles as the dead-object tag.
const DEAD_TAG: usize = 1;

/// A one-word filler header covering `size` bytes (including itself).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct DeadObjectHeader(usize);

impl DeadObjectHeader {
    /// Minimum cell a dead-object header can describe: itself.
    pub const MIN_SIZE: usize = WORD_SIZE;

    /// Encodes a dead-object header for a cell of `size` bytes, `size`
    /// including the header word itself.
    #[inline]
    pub fn encode(size: usize) -> Self {
        debug_assert!(size >= Self::MIN_SIZE, "dead cell smaller than one word");
        debug_assert!(is_aligned(size, WORD_SIZE), "dead cell size not word-aligned");
        DeadObjectHeader(size | DEAD_TAG)
    }

    #[inline]
    pub fn size(self) -> usize {
        self.0 & !DEAD_TAG
    }

    #[inline]
    pub fn is_dead(self) -> bool {
        self.0 & DEAD_TAG != 0
    }

    /// Writes this header at `at`.
    ///
    /// # Safety
    /// `at` must be a word-aligned address with at least [`WORD_SIZE`]
    /// writable bytes, exclusively owned by the caller.
    #[inline]
    pub unsafe fn write_at(self, at: crate::address::Address) {
        at.write_word(0, self.0);
    }

    /// Reads a header previously written by [`DeadObjectHeader::write_at`].
    ///
    /// # Safety
    /// `at` must point at a word this crate itself wrote with `write_at`.
    #[inline]
    pub unsafe fn read_at(at: crate::address::Address) -> Self {
        DeadObjectHeader(at.read_word(0))
    }
}

/// Covers `[from, to)` with a single dead-object cell, preserving
/// parseability. A no-op when `from == to`: there is no gap to fill.
///
/// Every chunk size and every allocation request passing through this
/// crate is word-aligned, so `to - from` is always zero or at least
/// [`WORD_SIZE`]; a gap smaller than one word cannot occur and this
/// function does not special-case it (matching the unconditional write the
/// original allocator performs in `fillUp`).
///
/// # Safety
/// `[from, to)` must be writable memory not concurrently accessed by any
/// other thread.
#[inline]
pub unsafe fn fill_dead(from: crate::address::Address, to: crate::address::Address) {
    if from == to {
        return;
    }
    let size = from.offset_to(to);
    debug_assert!(is_aligned(size, WORD_SIZE));
    DeadObjectHeader::encode(size).write_at(from);
}
