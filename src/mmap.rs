//! Thin OS-level reservation/commit wrapper the [`crate::region::RegionManager`]
//! uses to back its committed region. Reserves address space up front and
//! exposes `aligned()` so the caller can carve an arbitrarily-aligned
//! sub-range out of it — the region's `base` must land on a 1 KiB boundary.

#[cfg(windows)]
pub mod _win {
    use core::ptr::null_mut;
    use winapi::um::{
        memoryapi::{VirtualAlloc, VirtualFree},
        winnt::{MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE},
    };

    pub struct Mmap {
        start: *mut u8,
        end: *mut u8,
        size: usize,
    }

    impl Mmap {
        pub const fn uninit() -> Self {
            Self {
                start: null_mut(),
                end: null_mut(),
                size: 0,
            }
        }

        pub fn new(size: usize) -> Self {
            unsafe {
                let mem = VirtualAlloc(null_mut(), size, MEM_RESERVE, PAGE_READWRITE) as *mut u8;
                if mem.is_null() {
                    panic!("VirtualAlloc reservation failed");
                }
                let end = mem.add(size);
                Self { start: mem, end, size }
            }
        }

        /// Returns a pointer into the reservation aligned up to `align`.
        /// Callers reserve `align` extra bytes of slack so the aligned
        /// sub-range is always fully contained.
        pub fn aligned(&self, align: usize) -> *mut u8 {
            let offset = crate::util::align_up(self.start as usize, align) - self.start as usize;
            unsafe { self.start.add(offset) }
        }

        pub fn start(&self) -> *mut u8 {
            self.start
        }

        pub fn end(&self) -> *mut u8 {
            self.end
        }

        pub fn dontneed(&self, page: *mut u8, size: usize) {
            unsafe {
                VirtualFree(page.cast(), size, MEM_DECOMMIT);
            }
        }

        pub fn commit(&self, page: *mut u8, size: usize) {
            unsafe {
                VirtualAlloc(page.cast(), size, MEM_COMMIT, PAGE_READWRITE);
            }
        }

        pub const fn size(&self) -> usize {
            self.size
        }
    }

    impl Drop for Mmap {
        fn drop(&mut self) {
            unsafe {
                VirtualFree(self.start.cast(), 0, MEM_RELEASE);
            }
        }
    }
}

#[cfg(unix)]
pub mod _unix {
    use std::ptr::null_mut;

    pub struct Mmap {
        start: *mut u8,
        end: *mut u8,
        size: usize,
    }

    impl Mmap {
        pub const fn size(&self) -> usize {
            self.size
        }

        pub const fn uninit() -> Self {
            Self {
                start: null_mut(),
                end: null_mut(),
                size: 0,
            }
        }

        pub fn new(size: usize) -> Self {
            unsafe {
                let map = libc::mmap(
                    null_mut(),
                    size as _,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANON,
                    -1,
                    0,
                );
                if map == libc::MAP_FAILED {
                    panic!("mmap failed");
                }
                libc::madvise(map, size, libc::MADV_SEQUENTIAL);
                Self {
                    start: map as *mut u8,
                    end: (map as usize + size) as *mut u8,
                    size,
                }
            }
        }

        /// Returns a pointer into the reservation aligned up to `align`.
        /// Callers reserve `align` extra bytes of slack so the aligned
        /// sub-range is always fully contained.
        pub fn aligned(&self, align: usize) -> *mut u8 {
            let offset = crate::util::align_up(self.start as usize, align) - self.start as usize;
            unsafe { self.start.add(offset) }
        }

        pub fn start(&self) -> *mut u8 {
            self.start
        }

        pub fn end(&self) -> *mut u8 {
            self.end
        }

        pub fn dontneed(&self, page: *mut u8, size: usize) {
            unsafe {
                libc::madvise(page as *mut _, size as _, libc::MADV_DONTNEED);
            }
        }

        pub fn commit(&self, page: *mut u8, size: usize) {
            unsafe {
                libc::madvise(page as *mut _, size as _, libc::MADV_WILLNEED | libc::MADV_SEQUENTIAL);
            }
        }
    }

    impl Drop for Mmap {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.start() as *mut _, self.size as _);
            }
        }
    }
}

#[cfg(unix)]
pub use _unix::*;
#[cfg(windows)]
pub use _win::*;
