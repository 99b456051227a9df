//! Mark file lifecycle: creation, discovery and liveness checks.
//!
//! # Roles
//!
//! **Creator (owner)**: builds the file inside its own directory, initialises
//! the payload, then release-stores a non-zero version as the "ready" signal.
//! From then on it is the only writer of the version and timestamp fields and
//! must keep the timestamp fresh for as long as it lives.
//!
//! **Discoverer (reader)**: waits for the file, maps it, waits for a non-zero
//! version, validates compatibility, waits for a first heartbeat. Every wait
//! is a bounded poll with a distinct failure per phase so a stalled bootstrap
//! names the stage that stalled.
//!
//! # Memory Ordering
//!
//! The version and timestamp are written with release stores and read with
//! acquire loads. Observing a non-zero version therefore guarantees all
//! payload initialisation that preceded `signal_ready` is visible; observing
//! a timestamp guarantees the version that preceded it.

use crate::MarkFileError;
use basalt_buffer::{AtomicBuffer, SIZE_OF_I32, SIZE_OF_I64};
use basalt_clock::EpochClock;
use basalt_mmap::MmapFileMut;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Pause between attempts in the discovery poll loops.
const POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Placement of the liveness fields within a mark file.
///
/// The version must precede the timestamp: the handshake publishes the
/// version last on creation and reads it first on discovery, so the layout
/// ordering mirrors the ordering of concerns, and every construction entry
/// point rejects a layout that violates it before touching the filesystem.
#[derive(Debug, Copy, Clone)]
pub struct MarkFileLayout {
    pub version_field_offset: usize,
    pub timestamp_field_offset: usize,
    pub total_file_length: usize,
}

impl MarkFileLayout {
    pub fn validate(&self) -> Result<(), MarkFileError> {
        if self.version_field_offset + SIZE_OF_I32 > self.timestamp_field_offset {
            return Err(MarkFileError::InvalidLayout {
                version_field_offset: self.version_field_offset,
                timestamp_field_offset: self.timestamp_field_offset,
            });
        }
        if self.timestamp_field_offset + SIZE_OF_I64 > self.total_file_length {
            return Err(MarkFileError::FileTooShort {
                total_file_length: self.total_file_length,
                timestamp_field_offset: self.timestamp_field_offset,
            });
        }
        Ok(())
    }
}

/// A mapped mark file and its liveness fields.
///
/// Exactly one process at a time is the writer of the version and timestamp;
/// readers share the same type with disciplined, read-only usage of those
/// fields.
#[derive(Debug)]
pub struct MarkFile {
    mmap: Option<MmapFileMut>,
    buffer: AtomicBuffer,
    version_field_offset: usize,
    timestamp_field_offset: usize,
    path: PathBuf,
    closed: bool,
}

impl MarkFile {
    /// Creates a fresh mark file in `dir`, handling leftovers from a
    /// previous instance.
    ///
    /// If `dir` already exists it is either deleted outright
    /// (`dir_delete_on_start`) or first checked for a live owner: an existing
    /// file whose heartbeat is fresh fails construction with
    /// [`MarkFileError::ActiveMarkFile`], since racing a live peer could
    /// corrupt its state. A stale directory is removed and recreated.
    ///
    /// The returned file is mapped and zeroed but **not** ready: the caller
    /// initialises its payload, then calls [`Self::signal_ready`].
    pub fn create(
        dir: &Path,
        filename: &str,
        layout: MarkFileLayout,
        warn_if_directory_exists: bool,
        dir_delete_on_start: bool,
        timeout_ms: u64,
        clock: &dyn EpochClock,
        version_check: &dyn Fn(i32) -> bool,
        logger: &dyn Fn(&str),
    ) -> Result<Self, MarkFileError> {
        layout.validate()?;
        let path = dir.join(filename);

        if dir.exists() {
            if warn_if_directory_exists {
                logger(&format!("WARNING: {} exists", dir.display()));
            }

            if !dir_delete_on_start && path.exists() {
                let mut existing = MmapFileMut::open_rw(&path)?;
                if existing.len() >= layout.timestamp_field_offset + SIZE_OF_I64 {
                    // SAFETY: mapping is live for the duration of this check
                    let existing_buffer = unsafe {
                        AtomicBuffer::from_raw_parts(existing.as_mut_ptr(), existing.len())
                    };
                    let active = Self::is_active(
                        &existing_buffer,
                        clock,
                        timeout_ms,
                        layout.version_field_offset,
                        layout.timestamp_field_offset,
                        version_check,
                        logger,
                    )?;
                    if active {
                        return Err(MarkFileError::ActiveMarkFile { path });
                    }
                }
            }

            fs::remove_dir_all(dir)?;
        }

        fs::create_dir_all(dir)?;
        Self::map_new(&path, layout)
    }

    /// Maps a mark file that may already exist, reclaiming it when stale.
    ///
    /// When the file pre-exists its version is validated and its heartbeat
    /// age measured: an age below `timeout_ms` means another instance is
    /// still active and construction fails; otherwise the liveness fields
    /// are zeroed and the mapping is reused in place. With
    /// `should_pre_exist` a missing file is an error instead of a fresh
    /// creation.
    pub fn map_new_or_existing(
        dir: &Path,
        filename: &str,
        layout: MarkFileLayout,
        should_pre_exist: bool,
        timeout_ms: u64,
        clock: &dyn EpochClock,
        version_check: &dyn Fn(i32) -> bool,
        logger: &dyn Fn(&str),
    ) -> Result<Self, MarkFileError> {
        layout.validate()?;
        let path = dir.join(filename);

        if !path.exists() {
            if should_pre_exist {
                return Err(MarkFileError::FileNotFound { path });
            }
            fs::create_dir_all(dir)?;
            return Self::map_new(&path, layout);
        }

        logger(&format!("mark file exists: {}", path.display()));

        let mut mmap = MmapFileMut::open_rw(&path)?;
        if mmap.len() < layout.timestamp_field_offset + SIZE_OF_I64 {
            return Err(MarkFileError::FileTooShort {
                total_file_length: mmap.len(),
                timestamp_field_offset: layout.timestamp_field_offset,
            });
        }
        // SAFETY: the mapping is owned by the MarkFile being constructed
        let buffer = unsafe { AtomicBuffer::from_raw_parts(mmap.as_mut_ptr(), mmap.len()) };

        let version = buffer.get_i32_volatile(layout.version_field_offset);
        if version != 0 {
            if !version_check(version) {
                return Err(MarkFileError::IncompatibleVersion { version });
            }

            let timestamp = buffer.get_i64_volatile(layout.timestamp_field_offset);
            if timestamp != 0 {
                let age_ms = clock.time() - timestamp;
                logger(&format!("heartbeat is {age_ms} ms old"));
                if age_ms < timeout_ms as i64 {
                    return Err(MarkFileError::ActiveMarkFile { path });
                }
            }
        }

        // Reclaim: clear the ready signal first, then the heartbeat, so no
        // discoverer can mistake the half-reset file for a live instance.
        buffer.put_i32_ordered(layout.version_field_offset, 0);
        buffer.put_i64_ordered(layout.timestamp_field_offset, 0);

        Ok(Self {
            mmap: Some(mmap),
            buffer,
            version_field_offset: layout.version_field_offset,
            timestamp_field_offset: layout.timestamp_field_offset,
            path,
            closed: false,
        })
    }

    /// Discovers a mark file created by another process.
    ///
    /// Bounded poll loop: wait for the file to exist and reach a mappable
    /// length, wait for a non-zero version, validate it, wait for a first
    /// heartbeat. Each phase fails with its own error naming the path, so a
    /// stalled bootstrap is diagnosable from the message alone.
    pub fn map_existing(
        dir: &Path,
        filename: &str,
        version_field_offset: usize,
        timestamp_field_offset: usize,
        timeout_ms: u64,
        clock: &dyn EpochClock,
        version_check: &dyn Fn(i32) -> bool,
        logger: &dyn Fn(&str),
    ) -> Result<Self, MarkFileError> {
        if version_field_offset + SIZE_OF_I32 > timestamp_field_offset {
            return Err(MarkFileError::InvalidLayout {
                version_field_offset,
                timestamp_field_offset,
            });
        }

        let path = dir.join(filename);
        let deadline = clock.time() + timeout_ms as i64;
        let min_length = timestamp_field_offset + SIZE_OF_I64;

        let mut mmap = loop {
            if path.exists() {
                let candidate = MmapFileMut::open_rw(&path)?;
                if candidate.len() >= min_length {
                    logger(&format!("mark file exists: {}", path.display()));
                    break candidate;
                }
            }
            if clock.time() > deadline {
                return Err(MarkFileError::FileNotCreated { path, timeout_ms });
            }
            thread::sleep(POLL_INTERVAL);
        };

        // SAFETY: the mapping is owned by the MarkFile being constructed
        let buffer = unsafe { AtomicBuffer::from_raw_parts(mmap.as_mut_ptr(), mmap.len()) };

        let version = loop {
            let version = buffer.get_i32_volatile(version_field_offset);
            if version != 0 {
                break version;
            }
            if clock.time() > deadline {
                return Err(MarkFileError::VersionNotInitialised { path, timeout_ms });
            }
            thread::sleep(POLL_INTERVAL);
        };
        if !version_check(version) {
            return Err(MarkFileError::IncompatibleVersion { version });
        }

        loop {
            if buffer.get_i64_volatile(timestamp_field_offset) != 0 {
                break;
            }
            if clock.time() > deadline {
                return Err(MarkFileError::NoHeartbeat { path, timeout_ms });
            }
            thread::sleep(POLL_INTERVAL);
        }

        Ok(Self {
            mmap: Some(mmap),
            buffer,
            version_field_offset,
            timestamp_field_offset,
            path,
            closed: false,
        })
    }

    /// Decides whether a mapped mark file represents a live instance.
    ///
    /// Waits (up to `timeout_ms`) for a non-zero version and a first
    /// non-zero timestamp; a file that never produces either is dead. Once
    /// both are observed the file is live exactly when the heartbeat age is
    /// within `timeout_ms`. A version that fails `version_check` is an
    /// error, not a liveness verdict.
    pub fn is_active(
        buffer: &AtomicBuffer,
        clock: &dyn EpochClock,
        timeout_ms: u64,
        version_field_offset: usize,
        timestamp_field_offset: usize,
        version_check: &dyn Fn(i32) -> bool,
        logger: &dyn Fn(&str),
    ) -> Result<bool, MarkFileError> {
        let deadline = clock.time() + timeout_ms as i64;

        let version = loop {
            let version = buffer.get_i32_volatile(version_field_offset);
            if version != 0 {
                break version;
            }
            if clock.time() > deadline {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        };
        if !version_check(version) {
            return Err(MarkFileError::IncompatibleVersion { version });
        }

        let timestamp = loop {
            let timestamp = buffer.get_i64_volatile(timestamp_field_offset);
            if timestamp != 0 {
                break timestamp;
            }
            if clock.time() > deadline {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let age_ms = clock.time() - timestamp;
        logger(&format!("heartbeat is {age_ms} ms old"));
        Ok(age_ms <= timeout_ms as i64)
    }

    fn map_new(path: &Path, layout: MarkFileLayout) -> Result<Self, MarkFileError> {
        let mut mmap = MmapFileMut::create_rw(path, layout.total_file_length as u64)?;
        // SAFETY: the mapping is owned by the MarkFile being constructed
        let buffer = unsafe { AtomicBuffer::from_raw_parts(mmap.as_mut_ptr(), mmap.len()) };

        Ok(Self {
            mmap: Some(mmap),
            buffer,
            version_field_offset: layout.version_field_offset,
            timestamp_field_offset: layout.timestamp_field_offset,
            path: path.to_path_buf(),
            closed: false,
        })
    }

    /// Release-stores the ready signal. Must be called only after every
    /// other field of the file is initialised; a non-zero version is the
    /// one and only "open for business" flag discoverers trust.
    pub fn signal_ready(&self, version: i32) {
        debug_assert!(!self.closed);
        self.buffer.put_i32_ordered(self.version_field_offset, version);
    }

    /// Acquire load of the version field.
    pub fn version_volatile(&self) -> i32 {
        debug_assert!(!self.closed);
        self.buffer.get_i32_volatile(self.version_field_offset)
    }

    /// Release-stores a heartbeat timestamp. The owner calls this
    /// periodically for the life of the instance.
    pub fn timestamp_ordered(&self, timestamp_ms: i64) {
        debug_assert!(!self.closed);
        self.buffer
            .put_i64_ordered(self.timestamp_field_offset, timestamp_ms);
    }

    /// Acquire load of the heartbeat timestamp.
    pub fn timestamp_volatile(&self) -> i64 {
        debug_assert!(!self.closed);
        self.buffer.get_i64_volatile(self.timestamp_field_offset)
    }

    /// View over the whole mapped file, payload included.
    pub fn buffer(&self) -> AtomicBuffer {
        debug_assert!(!self.closed);
        self.buffer
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Unmaps the file. Idempotent; the backing file is left on disk.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.mmap.take();
        }
    }

    /// Closes the mapping and removes the file's directory tree.
    pub fn delete_directory(&mut self) -> Result<(), MarkFileError> {
        self.close();
        if let Some(dir) = self.path.parent() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Drop for MarkFile {
    fn drop(&mut self) {
        self.close();
    }
}
