//! Command-and-control ("mark") file liveness protocol.
//!
//! A mark file is one memory-mapped region per peer instance holding a
//! version field, a heartbeat timestamp field, and an application payload
//! (typically the counters regions). The owner publishes a non-zero version
//! last during creation and keeps the timestamp fresh while alive; any other
//! process decides whether the instance is live by reading those two fields,
//! with no locks or sockets involved.

pub mod layout;
mod mark_file;

pub use mark_file::{MarkFile, MarkFileLayout};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MarkFileError {
    #[error(
        "version field at offset {version_field_offset} must precede timestamp field at offset {timestamp_field_offset}"
    )]
    InvalidLayout {
        version_field_offset: usize,
        timestamp_field_offset: usize,
    },

    #[error(
        "file length {total_file_length} too short for timestamp field at offset {timestamp_field_offset}"
    )]
    FileTooShort {
        total_file_length: usize,
        timestamp_field_offset: usize,
    },

    #[error("active mark file detected at '{path}'")]
    ActiveMarkFile { path: PathBuf },

    #[error("mark file version {version} is not compatible")]
    IncompatibleVersion { version: i32 },

    #[error("expected pre-existing mark file at '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("mark file at '{path}' not created within {timeout_ms} ms")]
    FileNotCreated { path: PathBuf, timeout_ms: u64 },

    #[error("mark file at '{path}' created but not initialised within {timeout_ms} ms")]
    VersionNotInitialised { path: PathBuf, timeout_ms: u64 },

    #[error("no heartbeat observed in mark file at '{path}' within {timeout_ms} ms")]
    NoHeartbeat { path: PathBuf, timeout_ms: u64 },

    #[error("mark file i/o failed")]
    Io(#[from] std::io::Error),
}
