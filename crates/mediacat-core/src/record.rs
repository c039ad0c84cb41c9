use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::backend::FileStat;
use crate::date::{infer_captured_at, split_extension};

/// One discovered candidate media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Backend identifier, unique within a backend
    pub path: String,
    /// Base file name including extension (NFC normalised)
    pub name: String,
    /// Lower-cased extension including the leading dot, empty when absent
    pub extension: String,
    /// File size in bytes
    pub size: u64,
    pub last_write_time: Option<NaiveDateTime>,
    pub creation_time: Option<NaiveDateTime>,
    /// Inferred capture time, fixed at construction
    captured_at: NaiveDateTime,
    /// How many later-discovered records were judged to duplicate this one
    #[serde(default)]
    pub duplicate_count: u32,
    /// SHA-256 hex of the content, only filled when a strategy asks for it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, stat: FileStat) -> Self {
        let name: String = stat.name.nfc().collect();
        let (_, extension) = split_extension(&name);
        let captured_at = infer_captured_at(&name, stat.last_write_time, stat.creation_time);
        Self {
            path: path.into(),
            name,
            extension,
            size: stat.size,
            last_write_time: stat.last_write_time,
            creation_time: stat.creation_time,
            captured_at,
            duplicate_count: 0,
            content_hash: None,
        }
    }

    pub fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }

    /// Zero bytes usually means a copy that never finished.
    pub fn is_zero_length(&self) -> bool {
        self.size == 0
    }
}
