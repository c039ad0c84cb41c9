use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::date::DateWindow;

/// Current listing cache format version
const CACHE_VERSION: u32 = 1;

/// Suffix appended to the source name to form the cache file name
pub const CACHE_SUFFIX: &str = "_listing.json";

/// A crawl result persisted between runs, so a slow device need not be
/// walked again after an interrupted copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingCache {
    pub version: u32,
    /// Backend or device the listing came from
    pub source: String,
    pub created: DateTime<Utc>,
    pub catalog: Catalog,
}

impl ListingCache {
    pub fn new(source: impl Into<String>, catalog: Catalog) -> Self {
        Self {
            version: CACHE_VERSION,
            source: source.into(),
            created: Utc::now(),
            catalog,
        }
    }

    /// `<dir>/<source>_listing.json`, with unsafe characters in the source
    /// name replaced.
    pub fn path_for(dir: &Path, source: &str) -> PathBuf {
        let safe: String = source
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        dir.join(format!("{}{}", safe, CACHE_SUFFIX))
    }

    /// Load a cache file. Missing files and other format versions yield `None`.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let cache: ListingCache = serde_json::from_reader(reader)?;

        if cache.version != CACHE_VERSION {
            warn!(
                path = %path.display(),
                found = cache.version,
                expected = CACHE_VERSION,
                "ignoring listing cache with another format version"
            );
            return Ok(None);
        }

        info!(path = %path.display(), records = cache.catalog.len(), "loaded listing cache");
        Ok(Some(cache))
    }

    /// Write to a temp file first, then rename for atomicity.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let temp_path = path.with_extension("tmp");

        let file = File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self)?;

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn delete(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Load a cache and keep only the records inside `window`.
    pub fn load_in_range(path: &Path, window: DateWindow) -> anyhow::Result<Option<Catalog>> {
        Ok(Self::load(path)?.map(|cache| cache.into_catalog(window)))
    }

    /// The cached catalog restricted to `window`, re-sorted.
    pub fn into_catalog(self, window: DateWindow) -> Catalog {
        let mut catalog = self.catalog;
        catalog.retain_window(window);
        catalog.sort();
        catalog
    }
}
