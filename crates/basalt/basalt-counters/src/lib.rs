//! Shared-memory counters registry.
//!
//! A registry is two co-located regions indexed by counter id: a metadata
//! region describing each slot (state, type id, key, label) and a values
//! region holding the 8-byte values themselves, padded so no two counters
//! share a cache line. One process owns allocation through
//! [`CountersManager`]; any number of processes observe through
//! [`CountersReader`]. There are no locks anywhere: visibility is governed
//! entirely by the release-store of each record's state field and acquire
//! loads on the reader side.

mod counter;
pub mod layout;
mod manager;
mod position;
mod reader;

pub use counter::AtomicCounter;
pub use manager::CountersManager;
pub use position::{BufferPosition, OwnedPosition, Position};
pub use reader::CountersReader;

#[derive(Debug, thiserror::Error)]
pub enum CountersError {
    #[error("values capacity {capacity} is not a multiple of the counter length {counter_length}")]
    InvalidValuesCapacity { capacity: usize, counter_length: usize },

    #[error("metadata capacity {metadata_capacity} cannot describe values capacity {values_capacity}")]
    MetadataTooSmall {
        metadata_capacity: usize,
        values_capacity: usize,
    },

    #[error("unable to allocate counter, registry is full (max counter id {max_counter_id})")]
    CountersExhausted { max_counter_id: i32 },

    #[error("counter id {id} out of range [0, {max_counter_id}]")]
    CounterIdOutOfRange { id: i32, max_counter_id: i32 },

    #[error("counter id {id} is not allocated")]
    CounterNotAllocated { id: i32 },
}
