pub mod backend;
pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod copier;
pub mod crawler;
pub mod date;
pub mod error;
pub mod probe;
pub mod record;
pub mod report;
pub mod strategy;

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub use backend::{
    DeviceBackend, DeviceTransport, Enumeration, FileStat, LocalBackend, MountedDevice, StorageBackend,
};
pub use cache::ListingCache;
pub use cancel::CancellationToken;
pub use catalog::Catalog;
pub use config::CatalogConfig;
pub use copier::{copy_catalog, latest_captured_date, CopyResult};
pub use crawler::{crawl, CrawlEvent, CrawlFilter, Crawler, EventCallback};
pub use date::{DateWindow, YearMonth};
pub use error::{BackendError, CrawlError};
pub use probe::{DefaultProbe, MediaDetails, MediaProbe};
pub use record::FileRecord;
pub use report::{report_file_name, upload_tags, write_csv_report};
pub use strategy::{MergeStrategy, StrategyKind};

/// Progress callback: (stage, current, total, message)
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter that limits callback frequency to ~5/sec.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(PoisonError::into_inner);
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}
