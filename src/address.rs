//! An address into the committed region that is deliberately *not* a typed
//! object reference.
//!
//! The tracing collector's root-scanning and pointer-chasing code walks
//! live-object references; it must never follow the free-chunk list or
//! treat a dead-object filler as live. Representing both with a plain
//! [`Address`] rather than a managed reference type is what keeps them out
//! of that graph by construction.

use std::fmt;

/// A raw byte address, `Copy` and comparable, carrying no ownership or
/// liveness information.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address(usize);

impl Address {
    /// The null address, used as the empty free-chunk-list head and as the
    /// "uninitialized" sentinel for allocator bounds.
    pub const NULL: Address = Address(0);

    #[inline]
    pub fn from_ptr(ptr: *mut u8) -> Self {
        Address(ptr as usize)
    }

    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    pub fn from_usize(value: usize) -> Self {
        Address(value)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Advances the address by `bytes`. Does not check for overflow past
    /// any particular bound; callers compare the result against `end`.
    #[inline]
    pub fn add(self, bytes: usize) -> Self {
        Address(self.0 + bytes)
    }

    /// Distance in bytes from `self` to `other`; `other` must be `>= self`.
    #[inline]
    pub fn offset_to(self, other: Address) -> usize {
        other.0 - self.0
    }

    /// Reads the word at this address. The caller must ensure the word is
    /// within committed, owned memory (this is only ever used on free-chunk
    /// footers and dead-object headers this crate itself wrote).
    ///
    /// # Safety
    /// `self` must be a valid, word-aligned address within the committed
    /// region that the caller has exclusive access to.
    #[inline]
    pub unsafe fn read_word(self, offset: usize) -> usize {
        (self.0 as *const usize).add(offset / std::mem::size_of::<usize>()).read()
    }

    /// Writes a word at this address plus `offset` bytes.
    ///
    /// # Safety
    /// See [`Address::read_word`].
    #[inline]
    pub unsafe fn write_word(self, offset: usize, value: usize) {
        (self.0 as *mut usize)
            .add(offset / std::mem::size_of::<usize>())
            .write(value);
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Pointer for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.as_ptr())
    }
}
