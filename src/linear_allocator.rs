//! The bump-pointer fast path shared by all three size-segregated
//! allocators. See module docs on [`crate::region`] for how the three
//! instances are wired together.

use std::cell::Cell;
use std::sync::atomic::Ordering;

use atomic::Atomic;

use crate::address::Address;
use crate::header::fill_dead;
use crate::util::{align_up, is_aligned, word_align, TINY_CELL_SIZE, WORD_SIZE};

/// A size-segregated bump allocator over one contiguous chunk at a time.
///
/// `start`/`end` are plain cells rather than atomics: `clear` and `refill`
/// may only be called while the owning refill mutex is held, and readers
/// only ever consult them after an acquire-load of `mark` has already told
/// them a valid chunk is published.
pub struct LinearAllocator {
    start: Cell<usize>,
    end: Cell<usize>,
    mark: Atomic<usize>,
    ceiling: Cell<usize>,
}

// SAFETY: `start`/`end` are only mutated under the owning refill mutex and
// only read after acquiring `mark`; `mark` itself is a genuine atomic.
unsafe impl Sync for LinearAllocator {}

impl LinearAllocator {
    /// An allocator with no chunk: refuses every allocation until
    /// `initialize` or `refill` gives it one.
    pub fn uninitialized() -> Self {
        Self {
            start: Cell::new(0),
            end: Cell::new(0),
            mark: Atomic::new(0),
            ceiling: Cell::new(0),
        }
    }

    /// Sets bounds and ceiling. Called exactly once, before the allocator
    /// is shared across threads.
    pub fn initialize(&self, start: Address, end: Address, ceiling: usize) {
        self.start.set(start.as_usize());
        self.mark.store(start.as_usize(), Ordering::Relaxed);
        self.end.set(end.as_usize());
        self.ceiling.set(ceiling);
    }

    #[inline]
    pub fn ceiling(&self) -> usize {
        self.ceiling.get()
    }

    #[inline]
    pub fn start(&self) -> Address {
        Address::from_usize(self.start.get())
    }

    #[inline]
    pub fn end(&self) -> Address {
        Address::from_usize(self.end.get())
    }

    #[inline]
    pub fn mark(&self) -> Address {
        Address::from_usize(self.mark.load(Ordering::Acquire))
    }

    /// Bytes left between `mark` and `end` right now. Racy under
    /// contention; only meaningful as a snapshot (tests, diagnostics).
    pub fn remaining(&self) -> usize {
        self.end.get().saturating_sub(self.mark.load(Ordering::Acquire))
    }

    /// Fast-path allocation of exactly `size` bytes, `size` a positive
    /// multiple of the machine word. Returns `None` on a miss; the caller
    /// (a refill policy) is responsible for refilling and retrying.
    #[inline]
    pub fn allocate(&self, size: usize) -> Option<Address> {
        debug_assert!(size > 0 && is_aligned(size, WORD_SIZE), "unaligned request");
        let size = word_align(size);
        loop {
            let mark = self.mark.load(Ordering::Acquire);
            let next = mark + size;
            if next > self.end.get() {
                return None;
            }
            if self
                .mark
                .compare_exchange_weak(mark, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                debug_assert!(self.start.get() <= mark && next <= self.end.get());
                return Some(Address::from_usize(mark));
            }
        }
    }

    /// Aligned fast-path allocation. If satisfying `alignment` would leave
    /// a gap smaller than a tiny cell (too small to ever become a
    /// dead-object cell on its own), the alignment point is bumped forward
    /// by one further `alignment` increment so the gap is always zero or at
    /// least [`TINY_CELL_SIZE`]. On success, any gap before the aligned
    /// cell is filled dead before the address is returned.
    #[inline]
    pub fn allocate_aligned(&self, size: usize, alignment: usize) -> Option<Address> {
        debug_assert!(size > 0 && is_aligned(size, WORD_SIZE), "unaligned request");
        debug_assert!(alignment.is_power_of_two());
        let size = word_align(size);
        loop {
            let mark = self.mark.load(Ordering::Acquire);
            let mut aligned = align_up(mark, alignment);
            let gap = aligned - mark;
            if gap != 0 && gap < TINY_CELL_SIZE {
                aligned += alignment;
            }
            let next = aligned + size;
            if next > self.end.get() {
                return None;
            }
            if self
                .mark
                .compare_exchange_weak(mark, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                let gap = aligned - mark;
                if gap != 0 {
                    unsafe {
                        fill_dead(Address::from_usize(mark), Address::from_usize(aligned));
                    }
                }
                return Some(Address::from_usize(aligned));
            }
        }
    }

    /// Forces every racer off the current chunk by setting `mark := end`
    /// and filling the vacated `[old_mark, end)` with a dead-object cell.
    /// Idempotent: calling it again when `mark == end` already returns
    /// `end` and writes nothing (there is no gap left to fill).
    ///
    /// Must be called while holding the allocator's refill mutex; it is
    /// the signal that forces concurrent fast-path CASes to fail and
    /// serialize on that same mutex.
    pub fn fill_up(&self) -> Address {
        let end = self.end.get();
        let old_mark = self.mark.swap(end, Ordering::AcqRel);
        if old_mark < end {
            unsafe {
                fill_dead(Address::from_usize(old_mark), Address::from_usize(end));
            }
        }
        Address::from_usize(old_mark)
    }

    /// Installs a new chunk. Precondition: the caller holds the refill
    /// mutex and has already called `fill_up`. Publishes `start`, then
    /// `end`, then `mark`, in that order — `end` must be visible before
    /// `mark` moves so a concurrent reader never observes a stale `end`
    /// paired with a fresh `mark`.
    pub fn refill(&self, chunk: Address, chunk_size: usize) {
        debug_assert!(is_aligned(chunk_size, WORD_SIZE));
        self.start.set(chunk.as_usize());
        self.end.set(chunk.as_usize() + chunk_size);
        self.mark.store(chunk.as_usize(), Ordering::Release);
    }

    /// Sets `start`, `end`, and `mark` to zero: the allocator refuses every
    /// allocation until the next `refill`. Used at construction time for
    /// the Large allocator, whose bounds start empty and are only ever
    /// populated through Small delegating up (see
    /// [`crate::region::RegionManager::with_collector`]).
    pub fn clear(&self) {
        self.start.set(0);
        self.end.set(0);
        self.mark.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(words: usize) -> Vec<usize> {
        vec![0usize; words]
    }

    #[test]
    fn allocate_within_chunk_succeeds_and_advances_mark() {
        let mut buf = region(32);
        let base = Address::from_ptr(buf.as_mut_ptr().cast());
        let alloc = LinearAllocator::uninitialized();
        alloc.initialize(base, base.add(32 * WORD_SIZE), usize::MAX);
        let a = alloc.allocate(WORD_SIZE * 2).unwrap();
        assert_eq!(a, base);
        assert_eq!(alloc.mark(), base.add(WORD_SIZE * 2));
    }

    #[test]
    fn allocate_exact_remaining_succeeds_one_more_byte_fails() {
        let mut buf = region(4);
        let base = Address::from_ptr(buf.as_mut_ptr().cast());
        let alloc = LinearAllocator::uninitialized();
        alloc.initialize(base, base.add(4 * WORD_SIZE), usize::MAX);
        assert!(alloc.allocate(4 * WORD_SIZE).is_some());
        assert_eq!(alloc.mark(), alloc.end());

        let mut buf2 = region(4);
        let base2 = Address::from_ptr(buf2.as_mut_ptr().cast());
        let alloc2 = LinearAllocator::uninitialized();
        alloc2.initialize(base2, base2.add(4 * WORD_SIZE), usize::MAX);
        assert!(alloc2.allocate(4 * WORD_SIZE + WORD_SIZE).is_none());
    }

    #[test]
    fn fill_up_is_idempotent() {
        let mut buf = region(8);
        let base = Address::from_ptr(buf.as_mut_ptr().cast());
        let alloc = LinearAllocator::uninitialized();
        alloc.initialize(base, base.add(8 * WORD_SIZE), usize::MAX);
        alloc.allocate(2 * WORD_SIZE).unwrap();

        let first = alloc.fill_up();
        assert_eq!(first, base.add(2 * WORD_SIZE));
        assert_eq!(alloc.mark(), alloc.end());

        let second = alloc.fill_up();
        assert_eq!(second, alloc.end());
    }

    #[test]
    fn refill_resets_bounds_and_mark() {
        let alloc = LinearAllocator::uninitialized();
        let mut buf = region(16);
        let chunk = Address::from_ptr(buf.as_mut_ptr().cast());
        alloc.refill(chunk, 16 * WORD_SIZE);
        assert_eq!(alloc.start(), chunk);
        assert_eq!(alloc.end(), chunk.add(16 * WORD_SIZE));
        assert_eq!(alloc.mark(), chunk);
    }

    #[test]
    fn clear_zeroes_everything() {
        let alloc = LinearAllocator::uninitialized();
        let mut buf = region(4);
        let chunk = Address::from_ptr(buf.as_mut_ptr().cast());
        alloc.refill(chunk, 4 * WORD_SIZE);
        alloc.clear();
        assert!(alloc.start().is_null());
        assert!(alloc.end().is_null());
        assert!(alloc.mark().is_null());
    }

    #[test]
    fn aligned_allocation_is_congruent_and_pads_gap() {
        let mut buf = region(64);
        let base = Address::from_ptr(buf.as_mut_ptr().cast());
        let alloc = LinearAllocator::uninitialized();
        // Misalign the starting mark by one word so a gap is forced.
        alloc.initialize(base.add(WORD_SIZE), base.add(64 * WORD_SIZE), usize::MAX);
        let addr = alloc.allocate_aligned(WORD_SIZE * 2, 64).unwrap();
        assert!(is_aligned(addr.as_usize(), 64));
    }

    #[test]
    fn concurrent_allocations_are_disjoint() {
        use std::sync::Arc;
        let words = 8 * 10_000 + 1024;
        let mut buf = region(words);
        let base = Address::from_ptr(buf.as_mut_ptr().cast());
        let alloc = Arc::new(LinearAllocator::uninitialized());
        alloc.initialize(base, base.add(words * WORD_SIZE), usize::MAX);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let alloc = alloc.clone();
            handles.push(std::thread::spawn(move || {
                let mut addrs = Vec::with_capacity(10_000);
                for _ in 0..10_000 {
                    addrs.push(alloc.allocate(2 * WORD_SIZE).unwrap());
                }
                addrs
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        all.sort();
        for w in all.windows(2) {
            assert!(w[0].as_usize() + 2 * WORD_SIZE <= w[1].as_usize());
        }
        assert_eq!(alloc.mark(), base.add(2 * WORD_SIZE * 20_000));
    }
}
