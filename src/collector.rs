//! The collector is an external collaborator: this crate never traces
//! or marks anything. It only calls into whatever implements [`Collector`]
//! when a refill policy exhausts the free-chunk list, and trusts that
//! implementation's contract: on entry, every allocator is already at a
//! safepoint (`mark == end`, courtesy of `fill_up`), and on a `true`
//! return a fresh free-chunk list sized to satisfy `requested_size` has
//! already been installed (standing in for "the sweeper has run and
//! published a new list"). A real collector gets at that list through
//! whatever handle it was constructed with, not through this trait — see
//! [`crate::region::RegionManager::with_collector`], which hands the
//! region's shared free-chunk list to a collector-constructing closure
//! before the collector is ever asked to `collect`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::free_list::FreeChunkList;

/// Triggers a collection cycle and reports whether it freed enough space.
pub trait Collector {
    /// Returns `true` if, after this call returns, the free-chunk list this
    /// collector was wired to holds a chunk of at least `requested_size`
    /// bytes. Returning `false` causes the calling refill policy to raise
    /// [`crate::error::AllocError::OutOfMemory`].
    fn collect(&self, requested_size: usize) -> bool;
}

/// The collector this crate ships by default: always declines. This is
/// what every allocation eventually hits once both the free-chunk list and
/// the backing region are exhausted and no real tracing collector has been
/// wired in yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCollector;

impl Collector for NullCollector {
    fn collect(&self, _requested_size: usize) -> bool {
        false
    }
}

/// A test double standing in for "collector + sweeper": holds the shared
/// free-chunk list it was constructed with, and runs a closure that may
/// install a freshly "swept" chunk into it before reporting success.
pub struct ClosureCollector<F>
where
    F: Fn(usize, &Mutex<FreeChunkList>) -> bool,
{
    free_list: Arc<Mutex<FreeChunkList>>,
    f: F,
}

impl<F> ClosureCollector<F>
where
    F: Fn(usize, &Mutex<FreeChunkList>) -> bool,
{
    pub fn new(free_list: Arc<Mutex<FreeChunkList>>, f: F) -> Self {
        Self { free_list, f }
    }
}

impl<F> Collector for ClosureCollector<F>
where
    F: Fn(usize, &Mutex<FreeChunkList>) -> bool,
{
    fn collect(&self, requested_size: usize) -> bool {
        (self.f)(requested_size, &self.free_list)
    }
}
