//! # Heap Source Abstraction Layer
//!
//! This crate models the operating-system boundary-growth primitive the
//! allocator consumes. The allocator never issues a syscall directly; it
//! calls through the [`HeapSource`] trait, which keeps the core testable
//! against a simulated memory source.
//!
//! Two backends are provided:
//! - **Mock Mode**: an in-process simulated heap for fast unit testing
//! - **Sbrk Mode**: the real process break, driven by `sbrk(2)`/`brk(2)`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use heap_source::{HeapSource, MockHeapSource};
//!
//! let mut source = MockHeapSource::new();
//! source.reserve(1 << 20)?;
//! let old = source.grow_or_shrink_boundary(source.heap_base() + 4096)?;
//! assert_eq!(old, source.heap_base());
//! ```
//!
//! ## Build Modes
//!
//! ```bash
//! # Sbrk (default - real process break)
//! cargo build
//!
//! # Mock (testing only)
//! cargo build --no-default-features --features mock
//! ```

#![no_std]

#[cfg(any(test, feature = "mock"))]
extern crate std;

use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "sbrk")]
mod sbrk;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockHeapSource, MOCK_PAGE_SIZE, POISON_BYTE};
#[cfg(feature = "sbrk")]
pub use sbrk::SbrkHeapSource;

/// Errors raised by a heap source backend
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    #[error("heap source already reserved")]
    AlreadyReserved,

    #[error("heap source used before reserve")]
    NotReserved,

    #[error("boundary {requested:#x} outside [{base:#x}, {limit:#x}]")]
    OutOfRange {
        requested: usize,
        base: usize,
        limit: usize,
    },

    #[error("platform break move failed (errno {errno})")]
    PlatformFailure { errno: i32 },
}

pub type Result<T> = core::result::Result<T, SourceError>;

/// The boundary-growth capability consumed by the allocator.
///
/// The heap is one contiguous region `[heap_base, boundary)`. Moving the
/// boundary is the only way to obtain or return bulk memory. Growing makes
/// the newly covered range readable and writable with UNDEFINED content;
/// callers must not assume zero-initialization. Shrinking makes the vacated
/// range inaccessible.
pub trait HeapSource {
    /// One-time declaration of the maximum heap extent.
    ///
    /// May be emulated by reserving address space without committing it.
    /// A second call is `SourceError::AlreadyReserved`.
    fn reserve(&mut self, max_bytes: usize) -> Result<()>;

    /// Move the heap boundary to `new_boundary`, returning the old boundary.
    ///
    /// # Errors
    /// `SourceError::OutOfRange` if `new_boundary` falls outside
    /// `[heap_base, heap_base + max_bytes]`. Callers treat this as fatal.
    fn grow_or_shrink_boundary(&mut self, new_boundary: usize) -> Result<usize>;

    /// Lowest address of the heap region. Valid after `reserve`.
    fn heap_base(&self) -> usize;

    /// Current upper limit of the heap region. Equals `heap_base` until the
    /// first grow.
    fn boundary(&self) -> usize;

    /// Granularity used to batch growth requests.
    fn page_size(&self) -> usize;
}

/// Backend configuration and detection
pub mod config {
    /// Name of the backend compiled in by default feature selection
    pub fn backend_name() -> &'static str {
        #[cfg(feature = "sbrk")]
        return "sbrk";

        #[cfg(all(feature = "mock", not(feature = "sbrk")))]
        return "mock";

        #[cfg(not(any(feature = "mock", feature = "sbrk")))]
        compile_error!("No heap source backend selected. Use either 'mock' or 'sbrk' feature.");
    }

    /// Check if the mock backend is available (testing)
    pub const fn is_mock() -> bool {
        cfg!(feature = "mock")
    }

    /// Check if the process-break backend is available
    pub const fn is_sbrk() -> bool {
        cfg!(feature = "sbrk")
    }
}
