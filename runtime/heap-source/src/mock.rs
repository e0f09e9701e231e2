//! Mock heap source - a simulated process heap for unit testing
//!
//! Backed by one page-aligned arena obtained up front at `reserve` time, so
//! every address handed to the allocator stays stable for the life of the
//! value. Freshly grown ranges are filled with a poison byte: a consumer that
//! wrongly assumes boundary growth hands back zeroed memory fails loudly.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr;

use log::trace;

use crate::{HeapSource, Result, SourceError};

/// Default page granularity of the simulated heap
pub const MOCK_PAGE_SIZE: usize = 4096;

/// Fill pattern for newly grown memory. Growth must not look zero-initialized.
pub const POISON_BYTE: u8 = 0xA5;

/// Simulated boundary-growth source for tests
pub struct MockHeapSource {
    arena: *mut u8,
    max_bytes: usize,
    boundary_offset: usize,
    page_size: usize,
    grow_calls: usize,
    shrink_calls: usize,
}

impl MockHeapSource {
    /// Create an unreserved source with the default page size
    pub fn new() -> Self {
        Self::with_page_size(MOCK_PAGE_SIZE)
    }

    /// Create an unreserved source with a custom page granularity
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size.is_power_of_two());
        Self {
            arena: ptr::null_mut(),
            max_bytes: 0,
            boundary_offset: 0,
            page_size,
            grow_calls: 0,
            shrink_calls: 0,
        }
    }

    /// Number of boundary moves that grew the heap
    pub fn grow_calls(&self) -> usize {
        self.grow_calls
    }

    /// Number of boundary moves that shrank the heap
    pub fn shrink_calls(&self) -> usize {
        self.shrink_calls
    }

    fn reserved(&self) -> bool {
        !self.arena.is_null()
    }

    fn layout(&self) -> Layout {
        // Reserve is checked to have run before this is consulted
        Layout::from_size_align(self.max_bytes, self.page_size).unwrap()
    }
}

impl Default for MockHeapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapSource for MockHeapSource {
    fn reserve(&mut self, max_bytes: usize) -> Result<()> {
        if self.reserved() {
            return Err(SourceError::AlreadyReserved);
        }

        // Round up so the arena is page-granular and never zero-sized
        let pages = max_bytes.div_ceil(self.page_size).max(1);
        self.max_bytes = pages * self.page_size;

        let arena = unsafe { alloc(self.layout()) };
        if arena.is_null() {
            return Err(SourceError::PlatformFailure { errno: 0 });
        }

        self.arena = arena;
        trace!(
            "mock heap reserved: base {:#x}, limit {:#x}",
            self.heap_base(),
            self.heap_base() + self.max_bytes
        );
        Ok(())
    }

    fn grow_or_shrink_boundary(&mut self, new_boundary: usize) -> Result<usize> {
        if !self.reserved() {
            return Err(SourceError::NotReserved);
        }

        let base = self.heap_base();
        let limit = base + self.max_bytes;
        if new_boundary < base || new_boundary > limit {
            return Err(SourceError::OutOfRange {
                requested: new_boundary,
                base,
                limit,
            });
        }

        let old_boundary = self.boundary();
        if new_boundary > old_boundary {
            // Content of grown memory is undefined; poison it so consumers
            // that assume zeroes are caught
            unsafe {
                ptr::write_bytes(
                    self.arena.add(self.boundary_offset),
                    POISON_BYTE,
                    new_boundary - old_boundary,
                );
            }
            self.grow_calls += 1;
        } else if new_boundary < old_boundary {
            self.shrink_calls += 1;
        }

        self.boundary_offset = new_boundary - base;
        trace!(
            "mock boundary moved {:#x} -> {:#x}",
            old_boundary,
            new_boundary
        );
        Ok(old_boundary)
    }

    fn heap_base(&self) -> usize {
        self.arena as usize
    }

    fn boundary(&self) -> usize {
        self.heap_base() + self.boundary_offset
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

impl Drop for MockHeapSource {
    fn drop(&mut self) {
        if self.reserved() {
            unsafe { dealloc(self.arena, self.layout()) };
        }
    }
}
