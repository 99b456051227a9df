//! Read-only capability over the counters registry.

use crate::CountersError;
use crate::layout::{
    COUNTER_LENGTH, FREE_FOR_REUSE_DEADLINE_OFFSET, KEY_OFFSET, LABEL_OFFSET, MAX_KEY_LENGTH,
    METADATA_LENGTH, RECORD_ALLOCATED, RECORD_UNUSED, STATE_OFFSET, TYPE_ID_OFFSET, counter_offset,
    metadata_offset,
};
use basalt_buffer::AtomicBuffer;

/// Observer over the metadata and values regions of a registry.
///
/// Readers may run in a different process from the owning manager. Iteration
/// scans the metadata region from offset 0 and stops at the first `UNUSED`
/// record: ids are only ever granted as a contiguous prefix extended by the
/// high-water mark, so an `UNUSED` record means nothing was ever allocated
/// beyond it. `RECLAIMED` records are skipped without ending the scan, since
/// a freed id leaves a gap that a later allocation may fill.
pub struct CountersReader {
    pub(crate) metadata: AtomicBuffer,
    pub(crate) values: AtomicBuffer,
    max_counter_id: i32,
}

impl CountersReader {
    pub fn new(metadata: AtomicBuffer, values: AtomicBuffer) -> Self {
        let max_counter_id = (values.capacity() / COUNTER_LENGTH) as i32 - 1;
        Self {
            metadata,
            values,
            max_counter_id,
        }
    }

    /// Highest id the values region can hold, derived once at construction.
    #[inline]
    pub fn max_counter_id(&self) -> i32 {
        self.max_counter_id
    }

    #[inline]
    pub fn metadata_buffer(&self) -> AtomicBuffer {
        self.metadata
    }

    #[inline]
    pub fn values_buffer(&self) -> AtomicBuffer {
        self.values
    }

    pub(crate) fn validate_counter_id(&self, id: i32) -> Result<(), CountersError> {
        if id < 0 || id > self.max_counter_id {
            return Err(CountersError::CounterIdOutOfRange {
                id,
                max_counter_id: self.max_counter_id,
            });
        }
        Ok(())
    }

    /// Acquire-load of a counter's value.
    pub fn counter_value(&self, id: i32) -> Result<i64, CountersError> {
        self.validate_counter_id(id)?;
        Ok(self.values.get_i64_volatile(counter_offset(id)))
    }

    /// Acquire-load of a record's state field.
    pub fn counter_state(&self, id: i32) -> Result<i32, CountersError> {
        self.validate_counter_id(id)?;
        Ok(self.metadata.get_i32_volatile(metadata_offset(id) + STATE_OFFSET))
    }

    pub fn counter_type_id(&self, id: i32) -> Result<i32, CountersError> {
        self.validate_counter_id(id)?;
        Ok(self.metadata.get_i32(metadata_offset(id) + TYPE_ID_OFFSET))
    }

    /// Acquire-load of the earliest time a reclaimed id may be reallocated.
    pub fn free_for_reuse_deadline_ms(&self, id: i32) -> Result<i64, CountersError> {
        self.validate_counter_id(id)?;
        Ok(self
            .metadata
            .get_i64_volatile(metadata_offset(id) + FREE_FOR_REUSE_DEADLINE_OFFSET))
    }

    pub fn counter_label(&self, id: i32) -> Result<String, CountersError> {
        self.validate_counter_id(id)?;
        Ok(self.metadata.get_string_utf8(metadata_offset(id) + LABEL_OFFSET))
    }

    /// Visits `(id, label)` for each allocated counter.
    pub fn for_each(&self, mut f: impl FnMut(i32, &str)) {
        self.scan(|reader, id, record_offset| {
            let label = reader.metadata.get_string_utf8(record_offset + LABEL_OFFSET);
            f(id, &label);
        });
    }

    /// Visits `(value, id, label)` for each allocated counter, with the value
    /// acquire-loaded from the values region.
    pub fn for_each_counter(&self, mut f: impl FnMut(i64, i32, &str)) {
        self.scan(|reader, id, record_offset| {
            let label = reader.metadata.get_string_utf8(record_offset + LABEL_OFFSET);
            let value = reader.values.get_i64_volatile(counter_offset(id));
            f(value, id, &label);
        });
    }

    /// Visits `(id, type_id, key, label)` for each allocated counter. The key
    /// bytes are copied out so the callback never aliases the live region.
    pub fn for_each_metadata(&self, mut f: impl FnMut(i32, i32, &[u8], &str)) {
        self.scan(|reader, id, record_offset| {
            let type_id = reader.metadata.get_i32(record_offset + TYPE_ID_OFFSET);
            let mut key = [0u8; MAX_KEY_LENGTH];
            reader.metadata.get_bytes(record_offset + KEY_OFFSET, &mut key);
            let label = reader.metadata.get_string_utf8(record_offset + LABEL_OFFSET);
            f(id, type_id, &key, &label);
        });
    }

    fn scan(&self, mut visit: impl FnMut(&Self, i32, usize)) {
        let capacity = self.metadata.capacity();
        let mut id = 0;
        let mut record_offset = 0;

        while id <= self.max_counter_id && record_offset + METADATA_LENGTH <= capacity {
            let state = self.metadata.get_i32_volatile(record_offset + STATE_OFFSET);
            if state == RECORD_UNUSED {
                break;
            }
            if state == RECORD_ALLOCATED {
                visit(self, id, record_offset);
            }

            id += 1;
            record_offset += METADATA_LENGTH;
        }
    }
}
