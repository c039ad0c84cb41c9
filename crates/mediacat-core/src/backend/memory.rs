//! In-memory backend for exercising the crawler without touching disk.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor};

use chrono::NaiveDateTime;

use super::{BoxRead, Enumeration, FileStat, StorageBackend};
use crate::date::YearMonth;
use crate::error::BackendError;

/// Tree of `/`-separated paths. Files register every ancestor directory.
pub(crate) struct MemoryBackend {
    enumeration: Enumeration,
    dirs: BTreeSet<String>,
    hidden: BTreeSet<String>,
    files: BTreeMap<String, (FileStat, Vec<u8>)>,
    broken: BTreeSet<String>,
    /// Hinted listing ignores the prefix, so every hint returns every file
    overlapping: bool,
    pub unplugged: Cell<bool>,
    pub hints: RefCell<Vec<(String, Option<YearMonth>)>>,
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "/",
    }
}

impl MemoryBackend {
    pub fn new(enumeration: Enumeration) -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Self {
            enumeration,
            dirs,
            hidden: BTreeSet::new(),
            files: BTreeMap::new(),
            broken: BTreeSet::new(),
            overlapping: false,
            unplugged: Cell::new(false),
            hints: RefCell::new(Vec::new()),
        }
    }

    pub fn file(mut self, path: &str, size: u64, time: NaiveDateTime) -> Self {
        self.add_dirs(parent(path));
        let stat = FileStat {
            name: super::file_name_of(path).to_string(),
            size,
            last_write_time: Some(time),
            creation_time: Some(time),
        };
        let content = vec![b'x'; size as usize];
        self.files.insert(path.to_string(), (stat, content));
        self
    }

    pub fn file_with_content(mut self, path: &str, content: &[u8], time: NaiveDateTime) -> Self {
        self = self.file(path, content.len() as u64, time);
        if let Some(entry) = self.files.get_mut(path) {
            entry.1 = content.to_vec();
        }
        self
    }

    pub fn hidden_dir(mut self, path: &str) -> Self {
        self.add_dirs(path);
        self.hidden.insert(path.to_string());
        self
    }

    /// Listed, but stat fails.
    pub fn broken_file(mut self, path: &str) -> Self {
        self = self.file(path, 1, NaiveDateTime::MIN);
        self.broken.insert(path.to_string());
        self
    }

    /// Answer every hint with the full listing, a legal superset.
    pub fn overlapping_hints(mut self) -> Self {
        self.overlapping = true;
        self
    }

    fn add_dirs(&mut self, path: &str) {
        let mut current = path.to_string();
        while current != "/" {
            let next = parent(&current).to_string();
            self.dirs.insert(current);
            current = next;
        }
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.unplugged.get() {
            Err(BackendError::unavailable("memory", "unplugged"))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn enumeration(&self) -> Enumeration {
        self.enumeration
    }

    fn list_directories(&self, path: &str) -> Result<Vec<String>, BackendError> {
        self.check()?;
        Ok(self
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent(d) == path)
            .cloned()
            .collect())
    }

    fn is_hidden(&self, path: &str) -> Result<bool, BackendError> {
        self.check()?;
        Ok(self.hidden.contains(path))
    }

    fn list_files(&self, path: &str, hint: Option<YearMonth>) -> Result<Vec<String>, BackendError> {
        self.check()?;
        self.hints.borrow_mut().push((path.to_string(), hint));
        let prefix = match (self.enumeration, hint) {
            (Enumeration::Hinted, Some(h)) if !self.overlapping => h.prefix(),
            _ => String::new(),
        };
        Ok(self
            .files
            .iter()
            .filter(|(p, (stat, _))| parent(p) == path && stat.name.starts_with(&prefix))
            .map(|(p, _)| p.clone())
            .collect())
    }

    fn stat_file(&self, id: &str) -> Result<FileStat, BackendError> {
        self.check()?;
        if self.broken.contains(id) {
            return Err(BackendError::io(id, io::Error::from(io::ErrorKind::PermissionDenied)));
        }
        self.files
            .get(id)
            .map(|(stat, _)| stat.clone())
            .ok_or_else(|| BackendError::io(id, io::Error::from(io::ErrorKind::NotFound)))
    }

    fn open(&self, id: &str) -> Result<BoxRead<'_>, BackendError> {
        self.check()?;
        self.files
            .get(id)
            .map(|(_, content)| Box::new(Cursor::new(content.as_slice())) as BoxRead<'_>)
            .ok_or_else(|| BackendError::io(id, io::Error::from(io::ErrorKind::NotFound)))
    }
}
