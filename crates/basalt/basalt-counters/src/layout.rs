//! Binary layout of the counters registry regions.
//!
//! The layout is stable across process restarts and shared by every process
//! that maps the regions; a counter id is the common index into both.
//!
//! # Memory Layout
//!
//! ```text
//! metadata region                          values region
//! ┌──────────────────────────────┐         ┌─────────────────────────┐
//! │ record[0]   (512 bytes)      │         │ slot[0]   (128 bytes)   │
//! │  ┌────────┬────────┬───────┐ │         │  ┌────────┬──────────┐  │
//! │  │ state  │ typeId │ reuse │ │         │  │ value  │ padding  │  │
//! │  │ (4B)   │ (4B)   │ (8B)  │ │         │  │ (8B)   │ (120B)   │  │
//! │  ├────────┴────────┴───────┤ │         │  └────────┴──────────┘  │
//! │  │ key           (112B)    │ │         ├─────────────────────────┤
//! │  ├─────────────────────────┤ │         │ slot[1]                 │
//! │  │ label: len(4B) + utf-8  │ │         ├─────────────────────────┤
//! │  │               (384B)    │ │         │ ...                     │
//! │  └─────────────────────────┘ │         └─────────────────────────┘
//! ├──────────────────────────────┤
//! │ record[1]                    │
//! ├──────────────────────────────┤
//! │ ...                          │
//! └──────────────────────────────┘
//! ```
//!
//! Each values slot spans two cache lines so counters updated from different
//! cores never share a line; offsets inside a metadata record are chosen so
//! the label never straddles into the next record.

use basalt_buffer::{CACHE_LINE_LENGTH, SIZE_OF_I32, SIZE_OF_I64};

/// Length of one values slot: an 8-byte value plus padding to two cache lines.
pub const COUNTER_LENGTH: usize = CACHE_LINE_LENGTH * 2;

/// Record state field offset within a metadata record.
pub const STATE_OFFSET: usize = 0;
/// Application-defined type id field offset.
pub const TYPE_ID_OFFSET: usize = STATE_OFFSET + SIZE_OF_I32;
/// Free-for-reuse deadline (epoch-ms) field offset.
pub const FREE_FOR_REUSE_DEADLINE_OFFSET: usize = TYPE_ID_OFFSET + SIZE_OF_I32;
/// Start of the caller-defined opaque key region.
pub const KEY_OFFSET: usize = FREE_FOR_REUSE_DEADLINE_OFFSET + SIZE_OF_I64;
/// Maximum key length: the remainder of the first two cache lines.
pub const MAX_KEY_LENGTH: usize = (CACHE_LINE_LENGTH * 2) - KEY_OFFSET;

/// Start of the length-prefixed label, aligned past the key region.
pub const LABEL_OFFSET: usize = CACHE_LINE_LENGTH * 2;
/// Total space reserved for the label including its length prefix.
pub const FULL_LABEL_LENGTH: usize = CACHE_LINE_LENGTH * 6;
/// Maximum label length in bytes.
pub const MAX_LABEL_LENGTH: usize = FULL_LABEL_LENGTH - SIZE_OF_I32;

/// Length of one metadata record.
pub const METADATA_LENGTH: usize = LABEL_OFFSET + FULL_LABEL_LENGTH;

/// Record has never been used.
pub const RECORD_UNUSED: i32 = 0;
/// Record is currently in use and fully published.
pub const RECORD_ALLOCATED: i32 = 1;
/// Record was freed and its id awaits reuse.
pub const RECORD_RECLAIMED: i32 = -1;

/// Deadline value held while a counter is allocated.
pub const NOT_FREE_TO_REUSE: i64 = i64::MAX;

/// Byte offset of a counter's value slot within the values region.
#[inline(always)]
pub const fn counter_offset(id: i32) -> usize {
    id as usize * COUNTER_LENGTH
}

/// Byte offset of a counter's record within the metadata region.
#[inline(always)]
pub const fn metadata_offset(id: i32) -> usize {
    id as usize * METADATA_LENGTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_hold_their_published_values() {
        assert_eq!(COUNTER_LENGTH, 128);
        assert_eq!(METADATA_LENGTH, 512);
        assert_eq!(KEY_OFFSET, 16);
        assert_eq!(MAX_KEY_LENGTH, 112);
        assert_eq!(LABEL_OFFSET, 128);
        assert_eq!(MAX_LABEL_LENGTH, 380);
    }

    #[test]
    fn offsets_scale_linearly_with_id() {
        assert_eq!(counter_offset(0), 0);
        assert_eq!(counter_offset(3), 3 * COUNTER_LENGTH);
        assert_eq!(metadata_offset(0), 0);
        assert_eq!(metadata_offset(3), 3 * METADATA_LENGTH);
    }
}
