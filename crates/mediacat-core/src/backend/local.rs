use std::fs::{self, File, Metadata};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};

use super::{BoxRead, Enumeration, FileStat, StorageBackend};
use crate::date::YearMonth;
use crate::error::BackendError;

/// Local filesystem backend. Identifiers are full paths.
///
/// Listing a directory is a single cheap call, so month hints are ignored.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Fails with `Unavailable` when `root` is not a reachable directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(BackendError::unavailable(
                "local",
                format!("{} is not a reachable directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// An I/O error while the root itself has vanished means the volume is gone.
    fn io_error(&self, path: &str, source: io::Error) -> BackendError {
        if self.root.is_dir() {
            BackendError::io(path, source)
        } else {
            BackendError::unavailable(
                "local",
                format!("{} disappeared during the crawl", self.root.display()),
            )
        }
    }

    fn read_dir_filtered(
        &self,
        path: &str,
        keep: impl Fn(&fs::FileType) -> bool,
    ) -> Result<Vec<String>, BackendError> {
        let entries = fs::read_dir(path).map_err(|e| self.io_error(path, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(path, e))?;
            let Ok(file_type) = entry.file_type() else { continue };
            if keep(&file_type) {
                out.push(entry.path().to_string_lossy().into_owned());
            }
        }
        Ok(out)
    }
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn enumeration(&self) -> Enumeration {
        Enumeration::FullScan
    }

    fn list_directories(&self, path: &str) -> Result<Vec<String>, BackendError> {
        self.read_dir_filtered(path, |t| t.is_dir())
    }

    fn is_hidden(&self, path: &str) -> Result<bool, BackendError> {
        let dotted = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));

        #[cfg(windows)]
        {
            use std::os::windows::fs::MetadataExt;
            const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
            let meta = fs::metadata(path).map_err(|e| self.io_error(path, e))?;
            return Ok(dotted || meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0);
        }

        #[cfg(not(windows))]
        Ok(dotted)
    }

    fn list_files(&self, path: &str, _hint: Option<YearMonth>) -> Result<Vec<String>, BackendError> {
        self.read_dir_filtered(path, |t| t.is_file())
    }

    fn stat_file(&self, id: &str) -> Result<FileStat, BackendError> {
        let meta = fs::metadata(id).map_err(|e| self.io_error(id, e))?;
        let name = Path::new(id)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(stat_from_metadata(name, &meta))
    }

    fn open(&self, id: &str) -> Result<BoxRead<'_>, BackendError> {
        let file = File::open(id).map_err(|e| self.io_error(id, e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Build a [`FileStat`] from filesystem metadata, in local time.
pub(crate) fn stat_from_metadata(name: String, meta: &Metadata) -> FileStat {
    stat_from_times(name, meta.len(), meta.modified(), meta.created())
}

/// Filesystems without a birth time (NFS, FUSE mounts, older ext) fail
/// `created()`; the modification time stands in for it there.
fn stat_from_times(
    name: String,
    size: u64,
    modified: io::Result<SystemTime>,
    created: io::Result<SystemTime>,
) -> FileStat {
    let created = created.ok().or_else(|| modified.as_ref().ok().copied());
    FileStat {
        name,
        size,
        last_write_time: modified.ok().map(to_local),
        creation_time: created.map(to_local),
    }
}

fn to_local(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}
