//! Typed views over contiguous memory regions shared between processes.
//!
//! Everything above this crate (the counters registry, the mark-file
//! handshake) is expressed in terms of [`AtomicBuffer`]: aligned little-endian
//! scalar access with plain, acquire and release variants. The backing store
//! is owned elsewhere, either an [`AlignedBuffer`] heap allocation or a
//! memory-mapped file.

mod aligned;
mod atomic;

pub use aligned::AlignedBuffer;
pub use atomic::{AtomicBuffer, CACHE_LINE_LENGTH, SIZE_OF_I32, SIZE_OF_I64};

// The on-disk and in-memory layouts are little-endian by contract. Rather
// than byte-swapping every accessor on exotic targets, refuse to build there.
#[cfg(not(target_endian = "little"))]
compile_error!("basalt-buffer requires a little-endian target");
