//! Per-slot counter handle over the values region.

use crate::CountersError;
use crate::layout::counter_offset;
use crate::manager::CountersManager;
use basalt_buffer::AtomicBuffer;

/// A handle to one allocated value slot.
///
/// Increments and adds are fetch-and-add operations, safe for concurrent use
/// from multiple threads of the owning process. The plain/ordered split
/// follows the buffer's convention: `_ordered` variants release-publish,
/// volatile reads acquire, and the weak forms carry no ordering at all for
/// callers that synchronise elsewhere.
pub struct AtomicCounter {
    buffer: AtomicBuffer,
    id: i32,
    offset: usize,
}

impl AtomicCounter {
    pub(crate) fn new(values: AtomicBuffer, id: i32) -> Self {
        Self {
            buffer: values,
            id,
            offset: counter_offset(id),
        }
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Fetch-and-add 1 with full ordering, returning the previous value.
    #[inline]
    pub fn increment(&self) -> i64 {
        self.buffer.get_and_add_i64(self.offset, 1)
    }

    /// Fetch-and-add 1 with release ordering, returning the previous value.
    #[inline]
    pub fn increment_ordered(&self) -> i64 {
        self.buffer.get_and_add_i64_ordered(self.offset, 1)
    }

    /// Fetch-and-add with full ordering, returning the previous value.
    #[inline]
    pub fn add(&self, delta: i64) -> i64 {
        self.buffer.get_and_add_i64(self.offset, delta)
    }

    /// Fetch-and-add with release ordering, returning the previous value.
    #[inline]
    pub fn add_ordered(&self, delta: i64) -> i64 {
        self.buffer.get_and_add_i64_ordered(self.offset, delta)
    }

    /// Plain store, no ordering guarantee.
    #[inline]
    pub fn set(&self, value: i64) {
        self.buffer.put_i64(self.offset, value);
    }

    /// Release store.
    #[inline]
    pub fn set_ordered(&self, value: i64) {
        self.buffer.put_i64_ordered(self.offset, value);
    }

    /// Acquire load.
    #[inline]
    pub fn get(&self) -> i64 {
        self.buffer.get_i64_volatile(self.offset)
    }

    /// Plain load, no ordering guarantee.
    #[inline]
    pub fn get_weak(&self) -> i64 {
        self.buffer.get_i64(self.offset)
    }

    /// Returns the id to the owning manager's free list.
    ///
    /// The manager is the single allocation owner, so disposal goes back
    /// through it explicitly rather than via a drop hook.
    pub fn close(self, manager: &mut CountersManager) -> Result<(), CountersError> {
        manager.free(self.id)
    }
}
