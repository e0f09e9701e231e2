//! Block references and chain navigation
//!
//! A [`BlockRef`] is a copyable handle on a block's header address. The
//! chain is forward-only: a block's successor is computed from its own size
//! and there is no stored predecessor, so reverse traversal (and with it
//! adjacent-free coalescing) is unsupported by construction.

use core::ptr::NonNull;

use crate::descriptor::{self, Descriptor, HEADER_SIZE};

/// Handle on one block of the heap chain, addressed by its header word
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockRef(NonNull<usize>);

impl BlockRef {
    /// Wrap a header address.
    ///
    /// # Safety
    /// `addr` must be non-zero, word-aligned, and inside the heap region.
    pub unsafe fn from_header(addr: usize) -> Self {
        debug_assert!(addr != 0);
        debug_assert!(addr % HEADER_SIZE == 0);
        Self(NonNull::new_unchecked(addr as *mut usize))
    }

    /// Recover the block owning a data pointer, or `None` for null.
    ///
    /// # Safety
    /// A non-null `ptr` must be a data pointer previously handed out by this
    /// allocator (the header sits one word below it).
    pub unsafe fn from_data_ptr(ptr: *mut u8) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(Self::from_header(ptr as usize - HEADER_SIZE))
    }

    /// Address of the header word
    pub fn header_addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Pointer to the data region, one header past the block start
    pub fn data_ptr(self) -> *mut u8 {
        (self.header_addr() + HEADER_SIZE) as *mut u8
    }

    /// Read and decode the header word.
    ///
    /// # Safety
    /// The block must lie within the live heap chain.
    pub unsafe fn descriptor(self) -> Descriptor {
        Descriptor::decode(self.0.as_ptr().read())
    }

    /// Encode and write the header word.
    ///
    /// # Safety
    /// The whole span the descriptor claims must lie within the heap.
    pub unsafe fn write_descriptor(self, desc: Descriptor) {
        self.0.as_ptr().write(desc.encode());
    }

    /// Set the free flag, preserving the size.
    ///
    /// # Safety
    /// Same contract as [`BlockRef::descriptor`].
    pub unsafe fn mark_free(self) {
        self.0.as_ptr().write(descriptor::set_free(self.0.as_ptr().read()));
    }

    /// Clear the free flag, preserving the size.
    ///
    /// # Safety
    /// Same contract as [`BlockRef::descriptor`].
    pub unsafe fn mark_in_use(self) {
        self.0
            .as_ptr()
            .write(descriptor::set_in_use(self.0.as_ptr().read()));
    }

    /// Whether the block is free
    ///
    /// # Safety
    /// Same contract as [`BlockRef::descriptor`].
    pub unsafe fn is_free(self) -> bool {
        self.descriptor().free
    }

    /// Usable data bytes of this block
    ///
    /// # Safety
    /// Same contract as [`BlockRef::descriptor`].
    pub unsafe fn capacity(self) -> usize {
        self.descriptor().data_bytes()
    }

    /// The implicit successor: this block's address plus its total size.
    ///
    /// The result equals the heap boundary when `self` is the last block.
    ///
    /// # Safety
    /// Same contract as [`BlockRef::descriptor`]; the successor address is
    /// only a valid block while it lies below the boundary.
    pub unsafe fn next(self) -> Self {
        Self::from_header(self.header_addr() + self.descriptor().total_bytes())
    }
}
