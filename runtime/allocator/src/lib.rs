//! brkheap - First-fit heap allocator over a growable boundary
//!
//! # Purpose
//! A drop-in replacement for a process's general-purpose allocator: it
//! satisfies allocation, zeroed-allocation, resizing, and release requests
//! for arbitrarily sized byte buffers out of a single contiguous region
//! obtained incrementally from a [`HeapSource`].
//!
//! # Integration Points
//! - Depends on: `heap-source` (the injected boundary-growth capability)
//! - Provides to: any caller needing heap memory without a platform allocator
//!
//! # Architecture
//! The heap is an ordered chain of blocks tiling `[heap_base, boundary)`.
//! Each block is one header word (size in alignment units, free flag packed
//! into the most-significant bit) followed by its data region. Navigation is
//! purely size-driven: a block's successor is computed from its own size, and
//! there are no backward pointers. Free blocks are found through a five-slot
//! recency cache first, then a linear first-fit scan anchored at the
//! left-most known free block. Oversized candidates are split; growth is
//! batched in page multiples. Adjacent free blocks are never coalesced.
//!
//! The allocator is strictly single-threaded. Sharing one instance across
//! threads requires an external lock around every public call; there is no
//! finer-grained protection inside.
//!
//! # Error Handling
//! Degenerate arguments (zero sizes, null pointers) are defined no-ops, never
//! errors. Everything else in the error taxonomy is fatal to the heap:
//! continuing after an `Err` risks silent corruption of every later call, so
//! callers are expected to abort on any error this crate returns.
//!
//! # Testing Strategy
//! - Unit tests: descriptor codec, recency cache, chain bookkeeping
//! - Integration tests: end-to-end allocate/release workloads against the
//!   mock heap source (`tests/integration_test.rs`)
//! - Benches: allocate/release churn under criterion

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

use thiserror::Error;

mod block;
mod cache;
mod descriptor;
mod heap;

pub use block::BlockRef;
pub use cache::{RecentFreed, RECENT_FREE_SLOTS};
pub use descriptor::{align_up, Descriptor, ALIGNMENT, HEADER_SIZE};
pub use heap::HeapAllocator;

pub use heap_source::{HeapSource, SbrkHeapSource, SourceError};

/// Error types for allocator operations
///
/// Every variant is fatal: the documented recovery policy is to terminate
/// with a diagnostic rather than keep calling into a heap whose bookkeeping
/// can no longer be trusted.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("out of memory (requested: {requested} bytes)")]
    OutOfMemory { requested: usize },

    #[error("invalid pointer {addr:#x}: not the start of an in-use block")]
    InvalidPointer { addr: usize },

    #[error("heap source error: {0}")]
    Source(#[from] SourceError),
}

pub type Result<T> = core::result::Result<T, AllocError>;
