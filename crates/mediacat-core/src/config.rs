use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::crawler::CrawlFilter;
use crate::date::DateWindow;
use crate::strategy::StrategyKind;

/// Options for one catalog or copy run, loaded from a JSON file and
/// overridable from the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CatalogConfig {
    /// Inclusive lower bound, `yyyyMMdd`
    #[serde(with = "compact_date")]
    pub start_date: Option<NaiveDate>,
    /// Exclusive upper bound, `yyyyMMdd`
    #[serde(with = "compact_date")]
    pub end_date: Option<NaiveDate>,
    pub search_directory: Option<PathBuf>,
    /// Report file name template with a `{}` placeholder for the date range
    pub output_format: Option<String>,
    pub extensions: Vec<String>,
    pub ignore_names: Vec<String>,
    /// Mount point of an attached device, used instead of `search_directory`
    pub device_mount: Option<PathBuf>,
    /// Label for the device in logs and the listing cache name
    pub device_name: Option<String>,
    pub target_directory: Option<PathBuf>,
    pub strategy: StrategyKind,
}

impl CatalogConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("open config {}", path.display()))?;
        let config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn filter(&self) -> CrawlFilter {
        CrawlFilter::new(&self.ignore_names, &self.extensions)
    }

    /// The configured `[start, end)` range; both ends must be set.
    pub fn window(&self) -> anyhow::Result<DateWindow> {
        let min = self.start_date.context("start date is not set")?;
        let max = self.end_date.context("end date is not set")?;
        anyhow::ensure!(min < max, "start date {} is not before end date {}", min, max);
        Ok(DateWindow::new(min, max))
    }
}

/// `Option<NaiveDate>` as a `yyyyMMdd` string.
mod compact_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::date::{parse_compact_date, COMPACT_DATE_FORMAT};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&d.format(COMPACT_DATE_FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_compact_date(s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date {:?}, expected yyyyMMdd", s))),
        }
    }
}
