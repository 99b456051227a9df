//! Monotonic progress cursors over a value slot.

use crate::CountersError;
use crate::layout::counter_offset;
use crate::manager::CountersManager;
use basalt_buffer::AtomicBuffer;
use std::sync::atomic::{AtomicI64, Ordering};

/// A counter specialised to never move backwards.
///
/// `propose_max` is the only mutation primitive that is safe when multiple
/// producers race to advance the same position: it is an atomic fetch-max,
/// so exactly one racing proposal wins per instant and the stored value never
/// regresses. `set`/`set_ordered` remain available for the single-writer
/// cases where the caller knows no race is possible.
pub trait Position {
    /// Acquire load.
    fn get(&self) -> i64;

    /// Plain load, no ordering guarantee.
    fn get_weak(&self) -> i64;

    /// Plain store, no ordering guarantee.
    fn set(&self, value: i64);

    /// Release store.
    fn set_ordered(&self, value: i64);

    /// Advances to `value` only if it is strictly greater than the stored
    /// value, with full ordering. Returns whether the position moved.
    fn propose_max(&self, value: i64) -> bool;

    /// As [`Self::propose_max`] with release ordering.
    fn propose_max_ordered(&self, value: i64) -> bool;
}

/// An in-memory position with no registry slot behind it.
#[derive(Debug, Default)]
pub struct OwnedPosition {
    value: AtomicI64,
}

impl OwnedPosition {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Position for OwnedPosition {
    #[inline]
    fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    fn get_weak(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[inline]
    fn set_ordered(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    fn propose_max(&self, value: i64) -> bool {
        self.value.fetch_max(value, Ordering::SeqCst) < value
    }

    #[inline]
    fn propose_max_ordered(&self, value: i64) -> bool {
        self.value.fetch_max(value, Ordering::Release) < value
    }
}

/// A position backed by an allocated counter slot in the values region.
pub struct BufferPosition {
    buffer: AtomicBuffer,
    id: i32,
    offset: usize,
}

impl BufferPosition {
    /// Wraps an allocated counter id in the given values region.
    pub fn new(values: AtomicBuffer, id: i32) -> Self {
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

    /// Returns the id to the owning manager's free list.
    pub fn close(self, manager: &mut CountersManager) -> Result<(), CountersError> {
        manager.free(self.id)
    }
}

impl Position for BufferPosition {
    #[inline]
    fn get(&self) -> i64 {
        self.buffer.get_i64_volatile(self.offset)
    }

    #[inline]
    fn get_weak(&self) -> i64 {
        self.buffer.get_i64(self.offset)
    }

    #[inline]
    fn set(&self, value: i64) {
        self.buffer.put_i64(self.offset, value);
    }

    #[inline]
    fn set_ordered(&self, value: i64) {
        self.buffer.put_i64_ordered(self.offset, value);
    }

    #[inline]
    fn propose_max(&self, value: i64) -> bool {
        self.buffer.get_and_max_i64(self.offset, value) < value
    }

    #[inline]
    fn propose_max_ordered(&self, value: i64) -> bool {
        self.buffer.get_and_max_i64_ordered(self.offset, value) < value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{COUNTER_LENGTH, METADATA_LENGTH};
    use basalt_buffer::AlignedBuffer;
    use basalt_clock::CachedEpochClock;
    use std::sync::Arc;

    #[test]
    fn propose_max_reports_exactly_the_advancing_calls() {
        let position = OwnedPosition::new();

        assert!(position.propose_max(5));
        assert!(!position.propose_max(5));
        assert!(!position.propose_max(3));
        assert!(position.propose_max_ordered(9));
        assert!(!position.propose_max_ordered(7));
        assert_eq!(position.get(), 9);
    }

    #[test]
    fn stored_value_is_the_maximum_of_all_proposals() {
        let position = OwnedPosition::new();
        for value in [3, 17, 2, 17, 11, 16] {
            position.propose_max(value);
        }
        assert_eq!(position.get(), 17);
    }

    #[test]
    fn buffer_position_advances_its_counter_slot() {
        let metadata = AlignedBuffer::with_capacity(8 * METADATA_LENGTH);
        let values = AlignedBuffer::with_capacity(8 * COUNTER_LENGTH);
        let mut manager = CountersManager::new(
            metadata.buffer(),
            values.buffer(),
            Box::new(CachedEpochClock::default()),
        )
        .expect("valid region sizes");

        let id = manager.allocate("publisher-pos", 0, |_| {}).expect("allocate");
        let position = BufferPosition::new(manager.reader().values_buffer(), id);

        assert!(position.propose_max_ordered(100));
        assert_eq!(manager.reader().counter_value(id).unwrap(), 100);

        position.set_ordered(50);
        assert_eq!(position.get(), 50);
        assert!(position.propose_max(60));
        assert_eq!(position.get_weak(), 60);

        position.close(&mut manager).expect("close");
    }

    /// Racing producers: the final value must be the maximum proposed and
    /// the position must never be observed moving backwards.
    #[test]
    fn racing_proposals_never_regress() {
        const THREADS: usize = 4;
        const PROPOSALS_PER_THREAD: i64 = 10_000;

        let position = Arc::new(OwnedPosition::new());

        let producers: Vec<_> = (0..THREADS)
            .map(|t| {
                let position = Arc::clone(&position);
                std::thread::spawn(move || {
                    for i in 0..PROPOSALS_PER_THREAD {
                        // Interleaved sequences so threads constantly race.
                        position.propose_max_ordered(i * THREADS as i64 + t as i64);
                    }
                })
            })
            .collect();

        let watcher = {
            let position = Arc::clone(&position);
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..100_000 {
                    let now = position.get();
                    assert!(now >= last, "position regressed from {last} to {now}");
                    last = now;
                }
            })
        };

        for producer in producers {
            producer.join().expect("producer panicked");
        }
        watcher.join().expect("watcher panicked");

        let max_proposed = (PROPOSALS_PER_THREAD - 1) * THREADS as i64 + (THREADS as i64 - 1);
        assert_eq!(position.get(), max_proposed);
    }
}
