//! Recursive tree walk that turns a backend's directories into a [`Catalog`].
//!
//! Each directory level runs Enter → Filter → Enumerate → Bucket → Recurse →
//! Merge and returns its own catalog, which the parent folds into its own
//! through the active [`MergeStrategy`]. Recursion is sequential: a child's
//! catalog is fully merged before the next sibling is visited, which keeps
//! duplicate counts deterministic.

use std::io;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::backend::{file_name_of, Enumeration, StorageBackend};
use crate::cancel::CancellationToken;
use crate::catalog::Catalog;
use crate::date::{split_extension, DateWindow};
use crate::error::{escalate, CrawlError};
use crate::record::FileRecord;
use crate::strategy::{DuplicateEvent, MergeOutcome, MergeStrategy, NameSizeStrategy};

/// Something an operator may want to audit, emitted while crawling.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    DirectoryEntered { path: String },
    SubtreePruned { path: String },
    DirectoryUnreadable { path: String, reason: String },
    ZeroLengthFile { path: String },
    MetadataUnreadable { path: String, reason: String },
    PossibleDuplicate(DuplicateEvent),
}

/// Type alias for the crawl event observer
pub type EventCallback<'a> = dyn Fn(&CrawlEvent) + Send + Sync + 'a;

/// Path and extension rules applied while crawling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlFilter {
    ignored_names: Vec<String>,
    included_extensions: Vec<String>,
}

impl CrawlFilter {
    /// Substrings are matched case-insensitively. Extensions are compared
    /// lower-cased with a leading dot, which is added when missing.
    pub fn new<I, S, J, T>(ignored_names: I, included_extensions: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        J: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let ignored_names = ignored_names
            .into_iter()
            .map(|s| s.as_ref().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let included_extensions = included_extensions
            .into_iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty() && e != ".")
            .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
            .collect();
        Self {
            ignored_names,
            included_extensions,
        }
    }

    /// True when `path` contains any ignored substring. Used both to prune
    /// whole directories and to drop single files.
    pub fn is_ignored(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.ignored_names.iter().any(|ig| lower.contains(ig.as_str()))
    }

    /// An empty include-list admits everything, files without an extension
    /// included; otherwise the extension must be listed.
    pub fn admits_extension(&self, extension: &str) -> bool {
        if self.included_extensions.is_empty() {
            return true;
        }
        !extension.is_empty() && self.included_extensions.iter().any(|e| e == extension)
    }

    pub fn ignored_names(&self) -> &[String] {
        &self.ignored_names
    }

    pub fn included_extensions(&self) -> &[String] {
        &self.included_extensions
    }
}

/// The crawl engine, bound to one backend for the life of a crawl.
pub struct Crawler<'a, B: StorageBackend + ?Sized> {
    backend: &'a B,
    filter: CrawlFilter,
    strategy: Box<dyn MergeStrategy>,
    cancel_token: Option<CancellationToken>,
    observer: Option<&'a EventCallback<'a>>,
}

impl<'a, B: StorageBackend + ?Sized> Crawler<'a, B> {
    pub fn new(backend: &'a B, filter: CrawlFilter) -> Self {
        Self {
            backend,
            filter,
            strategy: Box::new(NameSizeStrategy),
            cancel_token: None,
            observer: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn MergeStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_observer(mut self, observer: &'a EventCallback<'a>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Crawl the subtree at `root`, keeping files captured in `window`.
    ///
    /// The returned catalog is sorted and ready for consumers.
    pub fn crawl(&self, root: &str, window: DateWindow) -> Result<Catalog, CrawlError> {
        info!(
            backend = self.backend.name(),
            root,
            from = %window.min,
            to = %window.max,
            "starting crawl"
        );
        let mut catalog = self.crawl_directory(root, window)?;
        catalog.sort();
        info!(
            records = catalog.len(),
            dates = catalog.iter().count(),
            duplicates = catalog.duplicate_total(),
            "crawl finished"
        );
        Ok(catalog)
    }

    fn crawl_directory(&self, path: &str, window: DateWindow) -> Result<Catalog, CrawlError> {
        if let Some(token) = &self.cancel_token {
            token.check()?;
        }

        let mut catalog = Catalog::new();

        // ignore whole directories
        if self.filter.is_ignored(path) {
            debug!(directory = path, "pruned by ignore rule");
            self.emit(CrawlEvent::SubtreePruned { path: path.to_string() });
            return Ok(catalog);
        }

        info!(directory = path, "crawling directory");
        self.emit(CrawlEvent::DirectoryEntered { path: path.to_string() });

        let ids = match self.enumerate(path, window) {
            Ok(ids) => ids,
            Err(err) => {
                let err = escalate(err)?;
                self.directory_unreadable(path, &err.to_string());
                return Ok(catalog);
            }
        };

        let total = ids.len();
        for (i, id) in ids.iter().enumerate() {
            debug!("checking file {} of {}: {}", i + 1, total, id);
            if let Some(record) = self.examine(id, window)? {
                let outcome = catalog.insert(record, self.strategy.as_ref());
                if let MergeOutcome::Duplicate(event) = outcome {
                    self.duplicate(event);
                }
            }
        }

        let mut directories = match self.backend.list_directories(path) {
            Ok(dirs) => dirs,
            Err(err) => {
                let err = escalate(err)?;
                self.directory_unreadable(path, &err.to_string());
                return Ok(catalog);
            }
        };
        directories.sort();

        for child in directories {
            match self.backend.is_hidden(&child) {
                Ok(true) => {
                    debug!(directory = %child, "skipping hidden directory");
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    let err = escalate(err)?;
                    self.directory_unreadable(&child, &err.to_string());
                    continue;
                }
            }

            let child_catalog = self.crawl_directory(&child, window)?;
            for event in catalog.merge(child_catalog, self.strategy.as_ref()) {
                self.duplicate(event);
            }
        }

        Ok(catalog)
    }

    /// File identifiers directly under `path`, de-duplicated and sorted.
    fn enumerate(&self, path: &str, window: DateWindow) -> Result<Vec<String>, crate::error::BackendError> {
        let mut ids = match self.backend.enumeration() {
            Enumeration::FullScan => self.backend.list_files(path, None)?,
            Enumeration::Hinted => {
                let mut ids = Vec::new();
                for month in window.months() {
                    ids.extend(self.backend.list_files(path, Some(month))?);
                }
                ids
            }
        };
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Apply the per-file filters and build a record for survivors.
    fn examine(&self, id: &str, window: DateWindow) -> Result<Option<FileRecord>, CrawlError> {
        let (_, extension) = split_extension(file_name_of(id));
        if !self.filter.admits_extension(&extension) {
            return Ok(None);
        }

        // filter stuff we know we don't want
        if self.filter.is_ignored(id) {
            return Ok(None);
        }

        let stat = match self.backend.stat_file(id) {
            Ok(stat) => stat,
            Err(err) => {
                let err = escalate(err)?;
                warn!(file = id, error = %err, "unable to read file metadata, skipping");
                self.emit(CrawlEvent::MetadataUnreadable {
                    path: id.to_string(),
                    reason: err.to_string(),
                });
                return Ok(None);
            }
        };

        let mut record = FileRecord::new(id, stat);
        let date: NaiveDate = record.captured_at().date();
        if !window.contains(date) {
            return Ok(None);
        }

        if record.is_zero_length() {
            warn!(file = id, "zero length file detected, this may indicate a copy error");
            self.emit(CrawlEvent::ZeroLengthFile { path: id.to_string() });
        }

        if self.strategy.needs_content_hash() {
            record.content_hash = self.content_hash(id)?;
        }

        Ok(Some(record))
    }

    fn content_hash(&self, id: &str) -> Result<Option<String>, CrawlError> {
        let mut reader = match self.backend.open(id) {
            Ok(reader) => reader,
            Err(err) => {
                let err = escalate(err)?;
                warn!(file = id, error = %err, "unable to open file for hashing");
                return Ok(None);
            }
        };
        let mut hasher = Sha256::new();
        match io::copy(&mut reader, &mut hasher) {
            Ok(_) => Ok(Some(hex::encode(hasher.finalize()))),
            Err(err) => {
                warn!(file = id, error = %err, "unable to read file for hashing");
                Ok(None)
            }
        }
    }

    fn duplicate(&self, event: DuplicateEvent) {
        info!(kept = %event.kept, candidate = %event.candidate, "found possible duplicate file");
        self.emit(CrawlEvent::PossibleDuplicate(event));
    }

    fn directory_unreadable(&self, path: &str, reason: &str) {
        warn!(directory = path, reason, "unable to read directory, skipping");
        self.emit(CrawlEvent::DirectoryUnreadable {
            path: path.to_string(),
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(observer) = self.observer {
            observer(&event);
        }
    }
}

/// Crawl `root` with the default name-and-size duplicate policy.
pub fn crawl<B: StorageBackend + ?Sized>(
    backend: &B,
    root: &str,
    ignored_names: &[String],
    included_extensions: &[String],
    min_date: NaiveDate,
    max_date: NaiveDate,
) -> Result<Catalog, CrawlError> {
    Crawler::new(backend, CrawlFilter::new(ignored_names, included_extensions))
        .crawl(root, DateWindow::new(min_date, max_date))
}
