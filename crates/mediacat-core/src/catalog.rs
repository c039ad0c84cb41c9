use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date::DateWindow;
use crate::record::FileRecord;
use crate::strategy::{DuplicateEvent, MergeOutcome, MergeStrategy};

/// File records bucketed by capture date.
///
/// Records inside a bucket are kept in discovery order while a crawl
/// accumulates them; call [`Catalog::sort`] before handing the catalog out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    days: BTreeMap<NaiveDate, Vec<FileRecord>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Number of records across all dates.
    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&[FileRecord]> {
        self.days.get(&date).map(Vec::as_slice)
    }

    /// Dates ascending, each with its records.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &[FileRecord])> {
        self.days.iter().map(|(d, r)| (*d, r.as_slice()))
    }

    /// All records, by date then bucket order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.days.values().flatten()
    }

    pub fn insert(&mut self, record: FileRecord, strategy: &dyn MergeStrategy) -> MergeOutcome {
        let bucket = self.days.entry(record.captured_at().date()).or_default();
        strategy.merge(bucket, record)
    }

    /// Fold a subtree's catalog into this one, record by record.
    pub fn merge(&mut self, child: Catalog, strategy: &dyn MergeStrategy) -> Vec<DuplicateEvent> {
        let mut events = Vec::new();
        for (date, records) in child.days {
            let bucket = self.days.entry(date).or_default();
            for record in records {
                if let MergeOutcome::Duplicate(event) = strategy.merge(bucket, record) {
                    events.push(event);
                }
            }
        }
        events
    }

    /// Order every bucket by capture time. Stable, so equal times keep
    /// discovery order.
    pub fn sort(&mut self) {
        for records in self.days.values_mut() {
            records.sort_by_key(FileRecord::captured_at);
        }
    }

    /// Drop records outside `window` and any date left empty.
    pub fn retain_window(&mut self, window: DateWindow) {
        self.days.retain(|date, records| {
            records.retain(|r| window.contains(r.captured_at().date()));
            window.contains(*date) && !records.is_empty()
        });
    }

    pub fn duplicate_total(&self) -> u64 {
        self.records().map(|r| u64::from(r.duplicate_count)).sum()
    }
}
