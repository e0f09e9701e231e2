//! Process-break heap source - drives the real `sbrk(2)`/`brk(2)` boundary
//!
//! The reserve step only records where the break currently sits and caps how
//! far it may travel; address space is not committed up front. Unix only.

use log::trace;

use crate::{HeapSource, Result, SourceError};

/// Boundary-growth source backed by the process data segment break
pub struct SbrkHeapSource {
    base: usize,
    max_bytes: usize,
    boundary: usize,
    page_size: usize,
}

impl SbrkHeapSource {
    /// Create an unreserved source over the current process break
    pub fn new() -> Self {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        // sysconf cannot fail for _SC_PAGESIZE on any supported platform,
        // but keep a sane fallback rather than a bogus granularity
        let page_size = if page_size > 0 { page_size as usize } else { 4096 };
        Self {
            base: 0,
            max_bytes: 0,
            boundary: 0,
            page_size,
        }
    }

    fn reserved(&self) -> bool {
        self.base != 0
    }
}

impl Default for SbrkHeapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapSource for SbrkHeapSource {
    fn reserve(&mut self, max_bytes: usize) -> Result<()> {
        if self.reserved() {
            return Err(SourceError::AlreadyReserved);
        }

        // Emulated reservation: record the current break as the heap base and
        // enforce the extent in software. Nothing is committed yet.
        let brk = unsafe { libc::sbrk(0) };
        if brk == usize::MAX as *mut libc::c_void {
            return Err(SourceError::PlatformFailure {
                errno: errno_last(),
            });
        }

        self.base = brk as usize;
        self.boundary = self.base;
        self.max_bytes = max_bytes;
        trace!(
            "process break reserved: base {:#x}, limit {:#x}",
            self.base,
            self.base + self.max_bytes
        );
        Ok(())
    }

    fn grow_or_shrink_boundary(&mut self, new_boundary: usize) -> Result<usize> {
        if !self.reserved() {
            return Err(SourceError::NotReserved);
        }

        let limit = self.base + self.max_bytes;
        if new_boundary < self.base || new_boundary > limit {
            return Err(SourceError::OutOfRange {
                requested: new_boundary,
                base: self.base,
                limit,
            });
        }

        let rc = unsafe { libc::brk(new_boundary as *mut libc::c_void) };
        if rc != 0 {
            return Err(SourceError::PlatformFailure {
                errno: errno_last(),
            });
        }

        let old_boundary = self.boundary;
        self.boundary = new_boundary;
        trace!(
            "process break moved {:#x} -> {:#x}",
            old_boundary,
            new_boundary
        );
        Ok(old_boundary)
    }

    fn heap_base(&self) -> usize {
        self.base
    }

    fn boundary(&self) -> usize {
        self.boundary
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

// std::io::Error::last_os_error is unavailable in no_std builds
#[cfg(target_os = "linux")]
fn errno_last() -> i32 {
    unsafe { *libc::__errno_location() }
}

#[cfg(not(target_os = "linux"))]
fn errno_last() -> i32 {
    unsafe { *libc::__error() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_sane() {
        let source = SbrkHeapSource::new();
        assert!(source.page_size() >= 4096);
        assert!(source.page_size().is_power_of_two());
    }

    // Moving the real break inside the test harness races with the process
    // allocator, so growth itself is exercised through MockHeapSource only.
    #[test]
    fn test_unreserved_rejects_moves() {
        let mut source = SbrkHeapSource::new();
        assert_eq!(
            source.grow_or_shrink_boundary(0x1000),
            Err(SourceError::NotReserved)
        );
    }
}
