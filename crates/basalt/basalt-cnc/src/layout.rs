//! Concrete cnc file format shared by the driver and its observers.
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     header (128 bytes)                         │
//! │  ┌──────────┬──────────┬────────────────┬──────────────────┐   │
//! │  │ version  │timestamp │ metadata length│ values length    │   │
//! │  │ i32 @ 0  │ i64 @ 8  │ i32 @ 16       │ i32 @ 20         │   │
//! │  └──────────┴──────────┴────────────────┴──────────────────┘   │
//! ├────────────────────────────────────────────────────────────────┤
//! │                counters metadata region                        │
//! ├────────────────────────────────────────────────────────────────┤
//! │                counters values region                          │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The region lengths are plain-written by the creator before
//! `signal_ready` release-stores the version, so a discoverer that has seen
//! a non-zero version may trust them.

use crate::mark_file::MarkFileLayout;
use basalt_buffer::{AtomicBuffer, CACHE_LINE_LENGTH};
use basalt_counters::layout::{COUNTER_LENGTH, METADATA_LENGTH};

/// File name of the cnc file within an instance's directory.
pub const CNC_FILE: &str = "cnc.dat";

pub const VERSION_FIELD_OFFSET: usize = 0;
pub const TIMESTAMP_FIELD_OFFSET: usize = 8;
pub const METADATA_LENGTH_FIELD_OFFSET: usize = 16;
pub const VALUES_LENGTH_FIELD_OFFSET: usize = 20;

/// Header length, one values-slot worth of cache lines.
pub const HEADER_LENGTH: usize = 2 * CACHE_LINE_LENGTH;

/// Current cnc file format version.
pub const CNC_VERSION: i32 = semantic_version_compose(1, 0, 0);

/// Packs `major.minor.patch` into the version field's i32 encoding.
pub const fn semantic_version_compose(major: u8, minor: u8, patch: u8) -> i32 {
    ((major as i32) << 16) | ((minor as i32) << 8) | patch as i32
}

pub const fn semantic_version_major(version: i32) -> u8 {
    ((version >> 16) & 0xFF) as u8
}

pub const fn semantic_version_minor(version: i32) -> u8 {
    ((version >> 8) & 0xFF) as u8
}

pub const fn semantic_version_patch(version: i32) -> u8 {
    (version & 0xFF) as u8
}

/// Region lengths for a registry of `num_counters` slots. The metadata
/// record is four times the values slot, so the manager's structural
/// invariant (metadata at least twice the values region) always holds.
pub const fn counters_region_lengths(num_counters: usize) -> (usize, usize) {
    (num_counters * METADATA_LENGTH, num_counters * COUNTER_LENGTH)
}

pub const fn compute_cnc_file_length(metadata_length: usize, values_length: usize) -> usize {
    HEADER_LENGTH + metadata_length + values_length
}

/// Mark-file layout for a cnc file carrying the given counters regions.
pub const fn cnc_layout(metadata_length: usize, values_length: usize) -> MarkFileLayout {
    MarkFileLayout {
        version_field_offset: VERSION_FIELD_OFFSET,
        timestamp_field_offset: TIMESTAMP_FIELD_OFFSET,
        total_file_length: compute_cnc_file_length(metadata_length, values_length),
    }
}

/// Records the counters region lengths in the header. Creator only, before
/// `signal_ready`.
pub fn store_region_lengths(cnc: &AtomicBuffer, metadata_length: usize, values_length: usize) {
    cnc.put_i32(METADATA_LENGTH_FIELD_OFFSET, metadata_length as i32);
    cnc.put_i32(VALUES_LENGTH_FIELD_OFFSET, values_length as i32);
}

/// View over the counters metadata region described by the header.
pub fn metadata_buffer(cnc: &AtomicBuffer) -> AtomicBuffer {
    let metadata_length = cnc.get_i32(METADATA_LENGTH_FIELD_OFFSET) as usize;
    cnc.view(HEADER_LENGTH, metadata_length)
}

/// View over the counters values region described by the header.
pub fn values_buffer(cnc: &AtomicBuffer) -> AtomicBuffer {
    let metadata_length = cnc.get_i32(METADATA_LENGTH_FIELD_OFFSET) as usize;
    let values_length = cnc.get_i32(VALUES_LENGTH_FIELD_OFFSET) as usize;
    cnc.view(HEADER_LENGTH + metadata_length, values_length)
}
