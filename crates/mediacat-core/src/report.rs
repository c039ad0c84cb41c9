use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Datelike;
use rayon::prelude::*;
use tracing::info;

use crate::catalog::Catalog;
use crate::date::{DateWindow, COMPACT_DATE_FORMAT};
use crate::probe::{probe_or_unknown, MediaDetails, MediaProbe};
use crate::record::FileRecord;
use crate::ThrottledProgress;

pub const CSV_HEADER: &str = "Date,Path,Size,Year,Month,Day,Height,Width,Duration,Duplicates";

const REPORT_DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn csv_row(record: &FileRecord, details: &MediaDetails) -> String {
    let at = record.captured_at();
    let fields = [
        at.format(REPORT_DATE_FORMAT).to_string(),
        record.path.clone(),
        record.size.to_string(),
        at.year().to_string(),
        at.month().to_string(),
        at.day().to_string(),
        details.height.to_string(),
        details.width.to_string(),
        details.duration_secs.to_string(),
        record.duplicate_count.to_string(),
    ];
    fields.iter().map(|f| quote(f)).collect::<Vec<_>>().join(",")
}

/// Write the catalog as CSV, one row per record, dates ascending.
///
/// Records are inspected in parallel; rows still come out in catalog order.
/// Returns the number of rows written.
pub fn write_csv_report<W: Write>(
    catalog: &Catalog,
    probe: &dyn MediaProbe,
    out: &mut W,
    progress: &ThrottledProgress,
) -> anyhow::Result<u64> {
    let records: Vec<&FileRecord> = catalog.records().collect();
    let total = records.len() as u64;
    let counter = AtomicU64::new(0);

    let details: Vec<MediaDetails> = records
        .par_iter()
        .map(|record| {
            let details = probe_or_unknown(probe, Path::new(&record.path));
            let current = counter.fetch_add(1, Ordering::Relaxed);
            progress.report("report", current, total, "Inspecting media");
            details
        })
        .collect();

    writeln!(out, "{}", CSV_HEADER)?;
    for (date, bucket) in catalog.iter() {
        info!(%date, files = bucket.len(), "report date");
    }
    for (record, details) in records.iter().zip(&details) {
        writeln!(out, "{}", csv_row(record, details))?;
    }
    out.flush()?;

    Ok(total)
}

/// Substitute `"<yyyyMMdd> to <yyyyMMdd>"` for the `{}` (or `{0}`) placeholder
/// in `format`. Without a placeholder the range is appended.
pub fn report_file_name(format: &str, window: DateWindow) -> String {
    let range = format!(
        "{} to {}",
        window.min.format(COMPACT_DATE_FORMAT),
        window.max.format(COMPACT_DATE_FORMAT)
    );
    for placeholder in ["{0}", "{}"] {
        if format.contains(placeholder) {
            return format.replacen(placeholder, &range, 1);
        }
    }
    format!("{}{}", format, range)
}

/// Ordered metadata tags describing one record for an archive upload.
///
/// Consumed by uploaders built on this crate; the command line does not
/// upload anything itself.
pub fn upload_tags(record: &FileRecord, details: &MediaDetails) -> Vec<(&'static str, String)> {
    let at = record.captured_at();
    vec![
        ("ActualFileDateTime", at.format(REPORT_DATE_FORMAT).to_string()),
        ("Year", at.year().to_string()),
        ("Month", at.month().to_string()),
        ("Day", at.day().to_string()),
        ("Duration", details.duration_secs.to_string()),
        ("Height", details.height.to_string()),
        ("Width", details.width.to_string()),
        ("OriginalPath", record.path.replace('\\', "/").replace('\'', "")),
        ("Extension", record.extension.clone()),
    ]
}
