//! Owning, cache-line-aligned heap backing for an [`AtomicBuffer`].

use crate::atomic::{AtomicBuffer, CACHE_LINE_LENGTH};
use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};

/// A zeroed heap allocation aligned to [`CACHE_LINE_LENGTH`].
///
/// `Vec<u8>` only guarantees byte alignment, which is not enough for the
/// aligned atomic access the registry layouts demand, so the allocation is
/// made directly with an explicit [`Layout`] and released on `Drop`.
pub struct AlignedBuffer {
    ptr: *mut u8,
    layout: Layout,
}

// SAFETY: the allocation is owned uniquely; shared access happens only
// through AtomicBuffer views, which carry their own contract.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `len` zeroed bytes at cache-line alignment.
    ///
    /// # Panics
    /// Panics if `len` is zero or overflows an allocation layout; aborts on
    /// allocator failure.
    pub fn with_capacity(len: usize) -> Self {
        assert!(len > 0, "buffer capacity must be non-zero");
        let layout = Layout::from_size_align(len, CACHE_LINE_LENGTH).expect("invalid buffer layout");

        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        Self { ptr, layout }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// A view over the whole allocation. The view must not outlive `self`.
    #[inline]
    pub fn buffer(&self) -> AtomicBuffer {
        // SAFETY: the allocation is live, writable, and cache-line aligned
        unsafe { AtomicBuffer::from_raw_parts(self.ptr, self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout
        unsafe { dealloc(self.ptr, self.layout) };
    }
}
