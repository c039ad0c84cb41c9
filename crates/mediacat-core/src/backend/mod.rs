//! Storage backends the crawler can walk.
//!
//! Every backend exposes the same small capability set: list child
//! directories, report whether a directory is hidden, list files (optionally
//! narrowed to one year-month) and stat a single file. Identifiers are plain
//! strings owned by the backend; the crawler never interprets them beyond
//! taking the last path component as a file name.

pub mod device;
pub mod local;
#[cfg(test)]
pub(crate) mod memory;

use std::io::Read;

use chrono::NaiveDateTime;

use crate::date::YearMonth;
use crate::error::BackendError;

pub use device::{DeviceBackend, DeviceTransport, MountedDevice};
pub use local::LocalBackend;

/// How a backend wants to be enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enumeration {
    /// Listing is cheap; hints are ignored and everything is returned.
    FullScan,
    /// Listing is expensive; pass one hint per month of interest.
    Hinted,
}

/// Metadata for one file as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub last_write_time: Option<NaiveDateTime>,
    pub creation_time: Option<NaiveDateTime>,
}

pub type BoxRead<'a> = Box<dyn Read + 'a>;

/// Capability interface over a storage medium.
///
/// Any call may fail with [`BackendError::Unavailable`] when the medium
/// cannot be reached; callers must treat that as fatal. `list_files` must
/// return a correct superset when `hint` is `None`, whatever the backend's
/// [`Enumeration`] mode.
pub trait StorageBackend {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    fn enumeration(&self) -> Enumeration;

    /// Child directories of `path`, hidden ones included.
    fn list_directories(&self, path: &str) -> Result<Vec<String>, BackendError>;

    fn is_hidden(&self, path: &str) -> Result<bool, BackendError>;

    /// Files directly under `path`. With a hint, hinted backends may return
    /// only files whose name starts with the hint's `YYYYMM` prefix.
    fn list_files(&self, path: &str, hint: Option<YearMonth>) -> Result<Vec<String>, BackendError>;

    /// Idempotent; may be answered from data cached by `list_files`.
    fn stat_file(&self, id: &str) -> Result<FileStat, BackendError>;

    /// Stream the file's content.
    fn open(&self, id: &str) -> Result<BoxRead<'_>, BackendError>;
}

/// Last component of an identifier, accepting both separator styles.
pub fn file_name_of(id: &str) -> &str {
    id.rsplit(['/', '\\']).next().unwrap_or(id)
}
