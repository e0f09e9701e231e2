//! Heap allocator core - locator, splitter, growth adapter, public API
//!
//! All mutable allocator state lives in an explicit [`HeapAllocator`] value
//! owned by the caller: the heap source, the left-most-free hint, and the
//! recency cache. The hint bounds the first-fit scan window; it is a hint,
//! not a guarantee, and may lag behind the true left-most free block.

use core::ptr;

use heap_source::HeapSource;
use log::{debug, error, trace};

use crate::block::BlockRef;
use crate::cache::RecentFreed;
use crate::descriptor::{align_up, Descriptor, ALIGNMENT, HEADER_SIZE};
use crate::{AllocError, Result};

/// Largest request whose aligned size still leaves room for a header word.
/// Anything above this cannot be represented as a block span.
const MAX_REQUEST: usize = usize::MAX - HEADER_SIZE - (ALIGNMENT - 1);

/// Round a request up to the alignment unit, rejecting sizes so large the
/// rounding itself (or adding the header) would wrap the address space
fn checked_align(size: usize) -> Result<usize> {
    if size > MAX_REQUEST {
        return Err(AllocError::OutOfMemory { requested: size });
    }
    Ok(align_up(size))
}

/// First-fit heap allocator over an injected boundary-growth source
pub struct HeapAllocator<S: HeapSource> {
    source: S,
    /// Left-most known free block; scans anchor here instead of the base
    first_free: Option<BlockRef>,
    recent: RecentFreed,
}

impl<S: HeapSource> HeapAllocator<S> {
    /// Create an allocator over `source`, declaring the maximum heap extent.
    ///
    /// The heap starts empty; no pages are obtained until the first
    /// allocation.
    pub fn new(mut source: S, max_heap_bytes: usize) -> Result<Self> {
        source.reserve(max_heap_bytes)?;
        Ok(Self {
            source,
            first_free: None,
            recent: RecentFreed::default(),
        })
    }

    /// The underlying heap source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Total bytes obtained from the heap source so far
    pub fn heap_bytes(&self) -> usize {
        self.source.boundary() - self.source.heap_base()
    }

    /// Allocate `size` bytes, returning a unit-aligned data pointer.
    ///
    /// `size == 0` returns null without side effects. A size too large to
    /// carry a header is [`AllocError::OutOfMemory`]. The returned region is
    /// not zeroed.
    pub fn allocate(&mut self, size: usize) -> Result<*mut u8> {
        if size == 0 {
            return Ok(ptr::null_mut());
        }

        let aligned_size = checked_align(size)?;
        let block = unsafe { self.find_free_block(aligned_size)? };
        unsafe { block.mark_in_use() };

        trace!(
            "allocated {} bytes ({} aligned) at {:#x}",
            size,
            aligned_size,
            block.data_ptr() as usize
        );
        Ok(block.data_ptr())
    }

    /// Allocate `count * size` bytes and zero them.
    ///
    /// Either argument being 0 returns null. Overflow of `count * size` is a
    /// caller contract violation and is not checked here.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<*mut u8> {
        let total = count * size;
        let data = self.allocate(total)?;

        if count != 0 && size != 0 {
            // Grown memory has undefined content; zero exactly what was asked
            unsafe { ptr::write_bytes(data, 0, total) };
        }
        Ok(data)
    }

    /// Resize the allocation at `ptr` to `size` bytes.
    ///
    /// A null `ptr` behaves as `allocate(size)`; `size == 0` behaves as
    /// `release(ptr)` and returns null. Growing may move the data to a new
    /// block; shrinking never moves it and keeps the original pointer.
    ///
    /// # Safety
    /// A non-null `ptr` must have been returned by this allocator and still
    /// be live.
    pub unsafe fn reallocate(&mut self, ptr_in: *mut u8, size: usize) -> Result<*mut u8> {
        if (ptr_in as usize) % ALIGNMENT != 0 {
            error!("reallocate: pointer {:#x} is not unit-aligned", ptr_in as usize);
            return Err(AllocError::InvalidPointer {
                addr: ptr_in as usize,
            });
        }
        let Some(block) = BlockRef::from_data_ptr(ptr_in) else {
            return self.allocate(size);
        };
        if size == 0 {
            self.release(ptr_in)?;
            return Ok(ptr::null_mut());
        }

        let aligned_size = checked_align(size)?;
        let capacity = block.capacity();

        if aligned_size > capacity {
            // Does not fit in place: move to a fresh block
            let new_ptr = self.allocate(size)?;
            ptr::copy_nonoverlapping(ptr_in as *const u8, new_ptr, capacity);
            self.release(ptr_in)?;
            trace!(
                "reallocate moved {:#x} -> {:#x} ({} -> {} bytes)",
                ptr_in as usize,
                new_ptr as usize,
                capacity,
                aligned_size
            );
            return Ok(new_ptr);
        }

        // Shrink in place when the slack forms a viable free block; otherwise
        // hand the block back unchanged at its full capacity
        if capacity - aligned_size > HEADER_SIZE + ALIGNMENT {
            self.split_block(block, aligned_size);
        }
        Ok(ptr_in)
    }

    /// Release the allocation at `ptr`.
    ///
    /// A null `ptr` is a no-op. A pointer that is misaligned or does not
    /// match the data start of an in-use block is
    /// [`AllocError::InvalidPointer`]; the heap must be considered corrupt
    /// and the caller should terminate.
    ///
    /// # Safety
    /// A non-null `ptr` must have been returned by this allocator.
    pub unsafe fn release(&mut self, ptr_in: *mut u8) -> Result<()> {
        if ptr_in.is_null() {
            return Ok(());
        }

        let addr = ptr_in as usize;
        if addr % ALIGNMENT != 0 {
            error!("release: pointer {:#x} is not unit-aligned", addr);
            return Err(AllocError::InvalidPointer { addr });
        }

        // Walk the whole chain; an interior pointer must not match
        let end = self.source.boundary();
        let mut cursor = match self.chain_head() {
            Some(block) => block,
            None => {
                error!("release: pointer {:#x} but no memory was ever allocated", addr);
                return Err(AllocError::InvalidPointer { addr });
            }
        };

        while cursor.header_addr() < end {
            if cursor.data_ptr() as usize == addr && !cursor.is_free() {
                cursor.mark_free();

                if self.first_free.map_or(true, |hint| cursor < hint) {
                    self.first_free = Some(cursor);
                }
                self.recent.push(cursor);

                trace!("released {:#x}", addr);
                return Ok(());
            }
            cursor = cursor.next();
        }

        error!("release: no in-use block starts its data at {:#x}", addr);
        Err(AllocError::InvalidPointer { addr })
    }

    /// Log every block span at debug level
    pub fn dump_heap(&self) {
        let end = self.source.boundary();
        let mut cursor = self.chain_head();
        while let Some(block) = cursor.filter(|b| b.header_addr() < end) {
            let desc = unsafe { block.descriptor() };
            debug!(
                "[{:#x} - {:#x}] {} total {} data {}",
                block.header_addr(),
                block.header_addr() + desc.total_bytes(),
                if desc.free { "free" } else { "used" },
                desc.total_bytes(),
                desc.data_bytes()
            );
            cursor = Some(unsafe { block.next() });
        }
    }

    /// Number of blocks in the chain
    pub fn block_count(&self) -> usize {
        let end = self.source.boundary();
        let mut count = 0;
        let mut cursor = self.chain_head();
        while let Some(block) = cursor.filter(|b| b.header_addr() < end) {
            count += 1;
            cursor = Some(unsafe { block.next() });
        }
        count
    }

    /// First block of the chain, or `None` while the heap is still empty
    fn chain_head(&self) -> Option<BlockRef> {
        let base = self.source.heap_base();
        if self.source.boundary() > base {
            Some(unsafe { BlockRef::from_header(base) })
        } else {
            None
        }
    }

    /// Locate a free block able to hold `aligned_size` data bytes and trim
    /// any excess. The result is still flagged free; the caller marks it.
    unsafe fn find_free_block(&mut self, aligned_size: usize) -> Result<BlockRef> {
        let block = self.locate(aligned_size)?;

        // Trim only when the leftover exceeds a minimum viable block, so no
        // unusably small fragment is ever created
        if block.capacity() - aligned_size > HEADER_SIZE + ALIGNMENT {
            self.split_block(block, aligned_size);
        }
        Ok(block)
    }

    /// The locator proper: recency cache, then first-fit scan from the
    /// left-most-free hint, then heap growth.
    unsafe fn locate(&mut self, aligned_size: usize) -> Result<BlockRef> {
        if let Some(block) = self.recent.take_fit(aligned_size) {
            trace!(
                "recency cache hit for {} bytes at {:#x}",
                aligned_size,
                block.header_addr()
            );
            return Ok(block);
        }

        let end = self.source.boundary();
        let mut cursor = match self.first_free.or_else(|| self.chain_head()) {
            Some(block) => block,
            None => return self.expand_heap(aligned_size),
        };

        while cursor.header_addr() < end {
            let desc = cursor.descriptor();
            if desc.free && desc.data_bytes() >= aligned_size {
                // The scan may reach a block the cache still holds
                self.recent.forget(cursor);
                return Ok(cursor);
            }
            cursor = cursor.next();
        }

        self.expand_heap(aligned_size)
    }

    /// Obtain a new span from the heap source, batched in page multiples,
    /// and shape it into a single free block.
    unsafe fn expand_heap(&mut self, aligned_size: usize) -> Result<BlockRef> {
        let page_size = self.source.page_size();
        let pages = (aligned_size + HEADER_SIZE) / page_size + 1;
        let grow_bytes = pages * page_size;

        let old_boundary = self.source.boundary();
        let new_boundary =
            old_boundary
                .checked_add(grow_bytes)
                .ok_or(AllocError::OutOfMemory {
                    requested: grow_bytes,
                })?;

        if let Err(err) = self.source.grow_or_shrink_boundary(new_boundary) {
            error!("heap growth to {:#x} failed: {}", new_boundary, err);
            return Err(AllocError::OutOfMemory {
                requested: grow_bytes,
            });
        }

        debug!(
            "heap grown by {} bytes ({} pages), boundary {:#x} -> {:#x}",
            grow_bytes, pages, old_boundary, new_boundary
        );

        let block = BlockRef::from_header(old_boundary);
        block.write_descriptor(Descriptor::new(grow_bytes, true));

        // Only adopt the new block as the hint when no lower-addressed free
        // block is already known; the new span sits above everything else
        if self.first_free.is_none() {
            self.first_free = Some(block);
        }
        Ok(block)
    }

    /// Partition `left` so it keeps exactly `aligned_size` data bytes; the
    /// remainder becomes a free block immediately after it.
    ///
    /// `left` keeps its current free/in-use flag, which lets the reallocate
    /// shrink path split a live block without un-owning it. The new right
    /// block becomes the left-most-free hint.
    unsafe fn split_block(&mut self, left: BlockRef, aligned_size: usize) -> BlockRef {
        let desc = left.descriptor();
        let old_total = desc.total_bytes();

        left.write_descriptor(Descriptor::new(aligned_size + HEADER_SIZE, desc.free));

        let right = left.next();
        right.write_descriptor(Descriptor::new(old_total - aligned_size - HEADER_SIZE, true));
        self.first_free = Some(right);

        trace!(
            "split {:#x}: kept {} data bytes, free remainder of {} total at {:#x}",
            left.header_addr(),
            aligned_size,
            old_total - aligned_size - HEADER_SIZE,
            right.header_addr()
        );
        right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heap_source::MockHeapSource;

    const MAX_HEAP: usize = 1 << 22;

    fn allocator() -> HeapAllocator<MockHeapSource> {
        HeapAllocator::new(MockHeapSource::new(), MAX_HEAP).unwrap()
    }

    #[test]
    fn test_zero_size_returns_null() {
        let mut heap = allocator();
        assert!(heap.allocate(0).unwrap().is_null());
        assert_eq!(heap.heap_bytes(), 0);
    }

    #[test]
    fn test_allocate_marks_in_use_and_aligns() {
        let mut heap = allocator();
        let data = heap.allocate(13).unwrap();
        assert_eq!(data as usize % ALIGNMENT, 0);

        let block = unsafe { BlockRef::from_data_ptr(data) }.unwrap();
        unsafe {
            assert!(!block.is_free());
            assert_eq!(block.capacity(), align_up(13));
        }
    }

    #[test]
    fn test_first_allocation_grows_one_batch() {
        let mut heap = allocator();
        heap.allocate(16).unwrap();
        assert_eq!(heap.source().grow_calls(), 1);
        assert_eq!(heap.heap_bytes(), heap.source().page_size());
        // Split into the served block plus the free remainder
        assert_eq!(heap.block_count(), 2);
    }

    #[test]
    fn test_release_and_cache_reuse() {
        let mut heap = allocator();
        let first = heap.allocate(64).unwrap();
        let _second = heap.allocate(64).unwrap();

        unsafe { heap.release(first).unwrap() };
        let again = heap.allocate(64).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn test_release_null_is_noop() {
        let mut heap = allocator();
        unsafe { heap.release(ptr::null_mut()).unwrap() };
    }

    #[test]
    fn test_release_unknown_pointer_is_fatal() {
        let mut heap = allocator();
        let data = heap.allocate(64).unwrap();

        // Interior pointers must not match
        let interior = unsafe { data.add(ALIGNMENT) };
        let err = unsafe { heap.release(interior) }.unwrap_err();
        assert!(matches!(err, AllocError::InvalidPointer { .. }));

        // Misaligned pointers are rejected before the chain walk
        let misaligned = unsafe { data.add(1) };
        let err = unsafe { heap.release(misaligned) }.unwrap_err();
        assert!(matches!(err, AllocError::InvalidPointer { .. }));
    }

    #[test]
    fn test_release_before_any_allocation_is_fatal() {
        let mut heap = allocator();
        let bogus = ALIGNMENT as *mut u8;
        let err = unsafe { heap.release(bogus) }.unwrap_err();
        assert!(matches!(err, AllocError::InvalidPointer { .. }));
    }

    #[test]
    fn test_double_release_is_fatal() {
        let mut heap = allocator();
        let data = heap.allocate(64).unwrap();
        unsafe {
            heap.release(data).unwrap();
            let err = heap.release(data).unwrap_err();
            assert!(matches!(err, AllocError::InvalidPointer { .. }));
        }
    }

    #[test]
    fn test_split_preserves_total_span() {
        let mut heap = allocator();
        heap.allocate(32).unwrap();
        heap.allocate(48).unwrap();
        heap.allocate(4096).unwrap();

        // Whatever the chain looks like, block sizes must tile the heap
        let mut total = 0;
        let end = heap.source().boundary();
        let mut cursor = unsafe { BlockRef::from_header(heap.source().heap_base()) };
        while cursor.header_addr() < end {
            let desc = unsafe { cursor.descriptor() };
            assert!(desc.size_units >= 1);
            total += desc.total_bytes();
            cursor = unsafe { cursor.next() };
        }
        assert_eq!(total, heap.heap_bytes());
    }

    #[test]
    fn test_no_split_below_minimum_fragment() {
        let mut heap = allocator();
        let page = heap.source().page_size();

        // Leave exactly header + unit of slack in the remainder block: it
        // must be served whole instead of split
        let data = heap.allocate(page).unwrap();
        let block = unsafe { BlockRef::from_data_ptr(data) }.unwrap();
        let blocks_before = heap.block_count();

        unsafe { heap.release(data).unwrap() };
        let again = heap.allocate(page - HEADER_SIZE - ALIGNMENT).unwrap();
        assert_eq!(again, data);
        // Capacity stays at the original span; no remainder was carved off
        assert_eq!(unsafe { block.capacity() }, page);
        assert_eq!(heap.block_count(), blocks_before);
    }

    #[test]
    fn test_huge_request_is_out_of_memory() {
        let mut heap = allocator();

        // Sizes near the top of the address space cannot be aligned without
        // wrapping; they must fail cleanly, never wrap to a tiny block
        let err = heap.allocate(usize::MAX).unwrap_err();
        assert!(matches!(err, AllocError::OutOfMemory { requested } if requested == usize::MAX));
        assert_eq!(heap.heap_bytes(), 0);

        let data = heap.allocate(64).unwrap();
        let err = unsafe { heap.reallocate(data, usize::MAX - ALIGNMENT) }.unwrap_err();
        assert!(matches!(err, AllocError::OutOfMemory { .. }));
    }

    #[test]
    fn test_reallocate_misaligned_pointer_is_fatal() {
        let mut heap = allocator();
        let data = heap.allocate(64).unwrap();

        let misaligned = unsafe { data.add(1) };
        let err = unsafe { heap.reallocate(misaligned, 128) }.unwrap_err();
        assert!(matches!(err, AllocError::InvalidPointer { .. }));
    }

    #[test]
    fn test_reallocate_null_allocates() {
        let mut heap = allocator();
        let data = unsafe { heap.reallocate(ptr::null_mut(), 128) }.unwrap();
        assert!(!data.is_null());
    }

    #[test]
    fn test_reallocate_zero_releases() {
        let mut heap = allocator();
        let data = heap.allocate(128).unwrap();
        let out = unsafe { heap.reallocate(data, 0) }.unwrap();
        assert!(out.is_null());

        let block = unsafe { BlockRef::from_data_ptr(data) }.unwrap();
        assert!(unsafe { block.is_free() });
    }

    #[test]
    fn test_reallocate_shrink_without_slack_keeps_capacity() {
        let mut heap = allocator();
        let data = heap.allocate(64).unwrap();
        let block = unsafe { BlockRef::from_data_ptr(data) }.unwrap();

        // Not enough slack for a viable remainder: block stays whole
        let out = unsafe { heap.reallocate(data, 56) }.unwrap();
        assert_eq!(out, data);
        assert_eq!(unsafe { block.capacity() }, 64);
    }
}
