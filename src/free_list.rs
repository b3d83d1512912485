//! The free-chunk list: a singly linked list of free ranges threaded
//! through the heap itself, pointer-chased rather than indexed.
//!
//! Each entry stores its link and its size in its own trailing two words
//! (`(next, size)`), not behind a header, and the list head is a plain
//! [`Address`] rather than a managed reference — this is what keeps the
//! tracing collector from ever walking into it (see [`crate::address`]).
//! Mutation is not lock-free: callers serialize through whatever mutex
//! owns the list (see [`crate::region::RegionManager`]).
//!
//! Because the footer sits at the *end* of a chunk, every address this
//! list threads together — `head`, every `next` link, every entry a walk
//! visits — points at that trailing footer, not at the chunk's allocatable
//! start. That is what lets a pure pointer-chase read `(next, size)` at a
//! fixed two-word offset without first having to already know the chunk's
//! size to locate it. The chunk's allocatable start is only recovered, from
//! the footer address and the size just read out of it, at the point a
//! chunk is handed back to a caller.

use crate::address::Address;
use crate::util::WORD_SIZE;

/// Offset of the `next` word within a free chunk's trailing footer.
const NEXT_OFFSET: usize = 0;
/// Offset of the `size` word within a free chunk's trailing footer.
const SIZE_OFFSET: usize = WORD_SIZE;
/// A free chunk's footer occupies the last two words of the chunk.
const FOOTER_SIZE: usize = 2 * WORD_SIZE;

/// Address of the trailing footer of a `size`-byte chunk starting at
/// `chunk_start`.
#[inline]
fn footer_of(chunk_start: Address, size: usize) -> Address {
    chunk_start.add(size - FOOTER_SIZE)
}

/// Recovers a chunk's allocatable start address from its footer's address
/// and the size read out of that footer.
#[inline]
fn chunk_start_of(footer: Address, size: usize) -> Address {
    Address::from_usize(footer.as_usize() + FOOTER_SIZE - size)
}

/// A free chunk handed back by [`FreeChunkList::take_first_fit`]: its
/// address and full size, ready to be passed to
/// [`crate::linear_allocator::LinearAllocator::refill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeChunk {
    pub address: Address,
    pub size: usize,
}

/// The list itself. `min_size` is this region's `FreeChunkMinSize`: pushing
/// anything smaller is a caller bug (such spans are dark matter and must be
/// filled dead instead, never linked).
pub struct FreeChunkList {
    head: Address,
    min_size: usize,
}

impl FreeChunkList {
    pub fn new(min_size: usize) -> Self {
        Self {
            head: Address::NULL,
            min_size,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Address of the first entry's trailing footer (not its allocatable
    /// start — see module docs), or null if the list is empty.
    #[inline]
    pub fn head(&self) -> Address {
        self.head
    }

    /// External interface: the sweeper installs a freshly built list after
    /// a collection cycle by handing over just the head address, pointing
    /// at the first chunk's trailing `(next, size)` footer. This crate
    /// never builds the list itself outside of tests.
    pub fn install(&mut self, head: Address) {
        self.head = head;
    }

    /// Links a single chunk `[address, address + size)` onto the front of
    /// the list, writing `(next, size)` into its trailing two words. Used
    /// by tests (standing in for the sweeper); a splitting variant is
    /// intentionally absent, since this crate never splits a chunk (see
    /// module docs).
    ///
    /// # Safety
    /// `[address, address + size)` must be writable, unreachable memory not
    /// owned by any allocator or already linked into this or any other
    /// list.
    pub unsafe fn push_front(&mut self, address: Address, size: usize) {
        debug_assert!(size >= self.min_size, "chunk below FreeChunkMinSize");
        debug_assert!(size >= FOOTER_SIZE, "chunk too small for its own footer");
        let footer = footer_of(address, size);
        footer.write_word(NEXT_OFFSET, self.head.as_usize());
        footer.write_word(SIZE_OFFSET, size);
        self.head = footer;
    }

    /// Reads the `next` link out of the footer at `entry`.
    #[inline]
    unsafe fn next_of(entry: Address) -> Address {
        Address::from_usize(entry.read_word(NEXT_OFFSET))
    }

    /// Reads the `size` word out of the footer at `entry`.
    #[inline]
    unsafe fn size_of(entry: Address) -> usize {
        entry.read_word(SIZE_OFFSET)
    }

    #[inline]
    unsafe fn set_next(entry: Address, next: Address) {
        entry.write_word(NEXT_OFFSET, next.as_usize());
    }

    /// First-fit scan: walks from `head`, remembering the previous link,
    /// and unlinks the first chunk whose size is at least `requested`.
    ///
    /// The found chunk is spliced to the head of the list before being
    /// handed to the caller (a move-to-front heuristic biasing the next
    /// scan toward the same region of the heap) — since the chunk is
    /// entirely consumed by the caller's refill right afterward, this has
    /// no externally observable effect beyond a plain unlink, but is kept
    /// as a distinct step to match the documented algorithm.
    ///
    /// No splitting: a chunk larger than `requested` is returned whole.
    ///
    /// # Safety
    /// Every entry reachable from `head` must be a chunk this list itself
    /// linked (via `install` or `push_front`), and no other thread may
    /// observe or mutate the list concurrently with this call.
    pub unsafe fn take_first_fit(&mut self, requested: usize) -> Option<FreeChunk> {
        let mut prev: Option<Address> = None;
        let mut cur = self.head;
        while !cur.is_null() {
            let size = Self::size_of(cur);
            let next = Self::next_of(cur);
            if size >= requested {
                // Unlink `cur`. Splicing it to the head first and then
                // immediately handing it to the caller (who consumes it
                // whole) collapses to the same list state as a direct
                // unlink, so that is what is implemented here.
                match prev {
                    Some(p) => Self::set_next(p, next),
                    None => self.head = next,
                }
                return Some(FreeChunk {
                    address: chunk_start_of(cur, size),
                    size,
                });
            }
            prev = Some(cur);
            cur = next;
        }
        None
    }

    /// Walks the list, asserting that no two entries overlap and every
    /// entry is at least `min_size`. Intended for tests.
    ///
    /// # Safety
    /// Same requirements as [`FreeChunkList::take_first_fit`].
    pub unsafe fn debug_check_invariants(&self) -> Vec<FreeChunk> {
        let mut entries = Vec::new();
        let mut cur = self.head;
        while !cur.is_null() {
            let size = Self::size_of(cur);
            assert!(size >= self.min_size, "free chunk below FreeChunkMinSize");
            let start = chunk_start_of(cur, size);
            let end = start.add(size);
            for seen in &entries {
                let seen: &FreeChunk = seen;
                let seen_end = seen.address.add(seen.size);
                let disjoint = end <= seen.address || seen_end <= start;
                assert!(disjoint, "overlapping free-chunk-list entries");
            }
            entries.push(FreeChunk { address: start, size });
            cur = Self::next_of(cur);
        }
        entries
    }
}
