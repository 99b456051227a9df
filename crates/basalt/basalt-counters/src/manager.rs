//! Read-write capability over the counters registry, single owner.

use crate::CountersError;
use crate::counter::AtomicCounter;
use crate::layout::{
    COUNTER_LENGTH, FREE_FOR_REUSE_DEADLINE_OFFSET, KEY_OFFSET, LABEL_OFFSET, MAX_KEY_LENGTH,
    MAX_LABEL_LENGTH, METADATA_LENGTH, NOT_FREE_TO_REUSE, RECORD_ALLOCATED, RECORD_RECLAIMED,
    STATE_OFFSET, TYPE_ID_OFFSET, counter_offset, metadata_offset,
};
use crate::reader::CountersReader;
use basalt_buffer::AtomicBuffer;
use basalt_clock::EpochClock;
use std::collections::VecDeque;

/// Allocator of counter ids and sole writer of the metadata region.
///
/// Exactly one manager owns a registry at a time; observers use
/// [`CountersReader`] over the same regions, possibly from other processes.
/// The free list is an owned field of this instance, never shared: handing
/// the manager to another owner would break the single-writer discipline the
/// whole layout depends on.
///
/// # Record Publication
///
/// Allocation is a two-phase write. All record fields (reuse deadline, type
/// id, key, label) are staged with plain writes first; the `ALLOCATED` state
/// is release-stored last. A reader that acquire-loads the state and sees
/// `ALLOCATED` is therefore guaranteed to see every other field of the
/// record. This mirrors how a seqlock publishes data before its sequence.
pub struct CountersManager {
    reader: CountersReader,
    free_list: VecDeque<i32>,
    high_water_mark: i32,
    free_to_reuse_timeout_ms: i64,
    clock: Box<dyn EpochClock>,
}

impl CountersManager {
    /// Wraps the two regions with immediate reuse of freed ids.
    ///
    /// # Errors
    /// Configuration errors if the values capacity is not a whole number of
    /// counter slots, or the metadata region is too small to describe every
    /// value slot the values region can hold.
    pub fn new(
        metadata: AtomicBuffer,
        values: AtomicBuffer,
        clock: Box<dyn EpochClock>,
    ) -> Result<Self, CountersError> {
        Self::with_free_to_reuse_timeout(metadata, values, clock, 0)
    }

    /// Like [`Self::new`] but freed ids only become reusable `timeout_ms`
    /// after their `free`, giving late readers a grace period.
    pub fn with_free_to_reuse_timeout(
        metadata: AtomicBuffer,
        values: AtomicBuffer,
        clock: Box<dyn EpochClock>,
        free_to_reuse_timeout_ms: i64,
    ) -> Result<Self, CountersError> {
        if values.capacity() % COUNTER_LENGTH != 0 {
            return Err(CountersError::InvalidValuesCapacity {
                capacity: values.capacity(),
                counter_length: COUNTER_LENGTH,
            });
        }
        if metadata.capacity() < values.capacity() * 2 {
            return Err(CountersError::MetadataTooSmall {
                metadata_capacity: metadata.capacity(),
                values_capacity: values.capacity(),
            });
        }

        Ok(Self {
            reader: CountersReader::new(metadata, values),
            free_list: VecDeque::new(),
            high_water_mark: 0,
            free_to_reuse_timeout_ms,
            clock,
        })
    }

    /// Read-only view over the same regions.
    pub fn reader(&self) -> &CountersReader {
        &self.reader
    }

    /// Allocates a counter id, writes its metadata record, and publishes it.
    ///
    /// `key_writer` is handed the zeroed 112-byte key region to fill with
    /// caller-defined binary data. Labels longer than the record's label
    /// capacity are truncated at a character boundary.
    ///
    /// # Errors
    /// A capacity error when neither the free list nor the regions can yield
    /// another id; the registry is left untouched and the caller may retry
    /// after freeing counters.
    pub fn allocate(
        &mut self,
        label: &str,
        type_id: i32,
        key_writer: impl FnOnce(&mut [u8]),
    ) -> Result<i32, CountersError> {
        let id = self.next_counter_id()?;
        let record_offset = metadata_offset(id);

        // Phase one: stage every field with plain writes.
        self.reader
            .metadata
            .put_i64(record_offset + FREE_FOR_REUSE_DEADLINE_OFFSET, NOT_FREE_TO_REUSE);
        self.reader.metadata.put_i32(record_offset + TYPE_ID_OFFSET, type_id);
        self.reader
            .metadata
            .set_memory(record_offset + KEY_OFFSET, MAX_KEY_LENGTH, 0);
        // SAFETY: this manager is the sole writer of the metadata region and
        // the record is not published until the state store below
        let key = unsafe {
            self.reader
                .metadata
                .bytes_mut(record_offset + KEY_OFFSET, MAX_KEY_LENGTH)
        };
        key_writer(key);
        self.put_label(record_offset, label);

        // Phase two: publish. Readers that observe ALLOCATED with an acquire
        // load are guaranteed to see the staged fields.
        self.reader
            .metadata
            .put_i32_ordered(record_offset + STATE_OFFSET, RECORD_ALLOCATED);

        Ok(id)
    }

    /// Allocates an id and wraps it in an [`AtomicCounter`] handle.
    pub fn new_counter(
        &mut self,
        label: &str,
        type_id: i32,
        key_writer: impl FnOnce(&mut [u8]),
    ) -> Result<AtomicCounter, CountersError> {
        let id = self.allocate(label, type_id, key_writer)?;
        Ok(AtomicCounter::new(self.reader.values, id))
    }

    /// Reclaims a counter id for later reuse.
    ///
    /// The value slot is left untouched; it is zeroed lazily when the id is
    /// handed out again, so in-flight observers of the old counter read its
    /// final value rather than a surprise zero.
    pub fn free(&mut self, id: i32) -> Result<(), CountersError> {
        self.reader.validate_counter_id(id)?;
        let record_offset = metadata_offset(id);

        if self.reader.metadata.get_i32_volatile(record_offset + STATE_OFFSET) != RECORD_ALLOCATED {
            return Err(CountersError::CounterNotAllocated { id });
        }

        self.reader.metadata.put_i64_ordered(
            record_offset + FREE_FOR_REUSE_DEADLINE_OFFSET,
            self.clock.time() + self.free_to_reuse_timeout_ms,
        );
        self.reader
            .metadata
            .put_i32_ordered(record_offset + STATE_OFFSET, RECORD_RECLAIMED);
        self.free_list.push_back(id);

        Ok(())
    }

    /// Release-stores a value into a counter's slot.
    pub fn set_counter_value(&mut self, id: i32, value: i64) -> Result<(), CountersError> {
        self.reader.validate_counter_id(id)?;
        self.reader.values.put_i64_ordered(counter_offset(id), value);
        Ok(())
    }

    /// Next id to hand out: the head of the FIFO free list when its reuse
    /// deadline has passed, otherwise the high-water mark.
    fn next_counter_id(&mut self) -> Result<i32, CountersError> {
        if let Some(&id) = self.free_list.front() {
            let deadline = self
                .reader
                .metadata
                .get_i64_volatile(metadata_offset(id) + FREE_FOR_REUSE_DEADLINE_OFFSET);
            if self.clock.time() >= deadline {
                self.free_list.pop_front();
                // Reset lazily on reuse, not on free.
                self.reader.values.put_i64_ordered(counter_offset(id), 0);
                return Ok(id);
            }
        }

        let id = self.high_water_mark;
        if counter_offset(id) + COUNTER_LENGTH > self.reader.values.capacity()
            || metadata_offset(id) + METADATA_LENGTH > self.reader.metadata.capacity()
        {
            return Err(CountersError::CountersExhausted {
                max_counter_id: self.reader.max_counter_id(),
            });
        }
        self.high_water_mark += 1;

        Ok(id)
    }

    fn put_label(&mut self, record_offset: usize, label: &str) {
        let mut end = label.len().min(MAX_LABEL_LENGTH);
        while !label.is_char_boundary(end) {
            end -= 1;
        }
        self.reader
            .metadata
            .put_string_utf8(record_offset + LABEL_OFFSET, &label[..end]);
    }
}
