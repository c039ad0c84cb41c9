use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use filetime::FileTime;
use tracing::{debug, info, warn};

use crate::backend::{LocalBackend, StorageBackend};
use crate::cancel::CancellationToken;
use crate::catalog::Catalog;
use crate::record::FileRecord;
use crate::ThrottledProgress;

/// Result of a copy run.
#[derive(Debug, Default)]
pub struct CopyResult {
    pub copied: u64,
    /// Targets that already existed
    pub skipped: u64,
    /// One line per file that could not be copied
    pub warnings: Vec<String>,
}

/// `<target>/<MM>/<name>`, month taken from the capture time.
fn destination(target: &Path, record: &FileRecord) -> PathBuf {
    target
        .join(format!("{:02}", record.captured_at().month()))
        .join(&record.name)
}

fn set_capture_mtime(path: &Path, at: NaiveDateTime) {
    if let Some(local) = at.and_local_timezone(chrono::Local).single() {
        let ft = FileTime::from_unix_time(local.timestamp(), 0);
        filetime::set_file_mtime(path, ft).ok();
    }
}

fn copy_one<B: StorageBackend + ?Sized>(backend: &B, record: &FileRecord, dest: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut reader = backend.open(&record.path)?;
    let written = (|| -> io::Result<()> {
        let mut out = BufWriter::new(File::create(dest)?);
        io::copy(&mut reader, &mut out)?;
        out.flush()
    })();
    if let Err(e) = written {
        // never leave a truncated copy behind; it would be skipped next run
        fs::remove_file(dest).ok();
        return Err(e.into());
    }
    set_capture_mtime(dest, record.captured_at());
    Ok(())
}

/// Copy every record of `catalog` from `backend` into `target`.
///
/// Existing targets are skipped. Per-file failures become warnings, except
/// an unavailable backend, which aborts the run.
pub fn copy_catalog<B: StorageBackend + ?Sized>(
    backend: &B,
    catalog: &Catalog,
    target: &Path,
    progress: &ThrottledProgress,
    cancel_token: Option<&CancellationToken>,
) -> anyhow::Result<CopyResult> {
    fs::create_dir_all(target)?;

    let total = catalog.len() as u64;
    let mut result = CopyResult::default();

    for (i, record) in catalog.records().enumerate() {
        if let Some(token) = cancel_token {
            token.check()?;
        }

        let dest = destination(target, record);
        if dest.exists() {
            debug!(path = %dest.display(), "target exists, skipping");
            result.skipped += 1;
        } else {
            match copy_one(backend, record, &dest) {
                Ok(()) => result.copied += 1,
                Err(e) => {
                    if let Some(err) = e.downcast_ref::<crate::error::BackendError>() {
                        if err.is_unavailable() {
                            return Err(e);
                        }
                    }
                    warn!(source = %record.path, error = %e, "copy failed");
                    result.warnings.push(format!("{}: {}", record.path, e));
                }
            }
        }

        progress.report("copy", i as u64, total, "Copying files");
    }

    info!(
        copied = result.copied,
        skipped = result.skipped,
        failed = result.warnings.len(),
        "copy finished"
    );
    Ok(result)
}

/// Latest capture date among the files already under `target`, or `None`
/// when the directory is missing or empty.
pub fn latest_captured_date(target: &Path) -> anyhow::Result<Option<NaiveDate>> {
    if !target.is_dir() {
        return Ok(None);
    }
    let backend = LocalBackend::new(target)?;
    let mut latest: Option<NaiveDate> = None;
    let mut pending = vec![target.to_string_lossy().into_owned()];

    while let Some(dir) = pending.pop() {
        for id in backend.list_files(&dir, None)? {
            let stat = backend.stat_file(&id)?;
            let date = FileRecord::new(id, stat).captured_at().date();
            latest = latest.max(Some(date));
        }
        pending.extend(backend.list_directories(&dir)?);
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{Enumeration, FileStat};
    use crate::crawler::{CrawlFilter, Crawler};
    use crate::date::DateWindow;
    use crate::strategy::NameSizeStrategy;
    use crate::ProgressCallback;
    use tempfile::tempdir;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn noop() -> Box<ProgressCallback<'static>> {
        Box::new(|_, _, _, _| {})
    }

    fn crawl_all(backend: &MemoryBackend) -> Catalog {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2100, 1, 1).unwrap(),
        );
        Crawler::new(backend, CrawlFilter::default()).crawl("/", window).unwrap()
    }

    #[test]
    fn test_copy_into_month_folders() {
        let backend = MemoryBackend::new(Enumeration::FullScan)
            .file_with_content("/DCIM/a.mp4", b"march", at(2020, 3, 5))
            .file_with_content("/DCIM/b.mp4", b"december", at(2020, 12, 24));
        let catalog = crawl_all(&backend);

        let dir = tempdir().unwrap();
        let callback = noop();
        let progress = ThrottledProgress::new(callback.as_ref());
        let result = copy_catalog(&backend, &catalog, dir.path(), &progress, None).unwrap();
        assert_eq!(result.copied, 2);
        assert!(result.warnings.is_empty());

        let march = dir.path().join("03").join("a.mp4");
        assert_eq!(fs::read(&march).unwrap(), b"march");
        assert_eq!(fs::read(dir.path().join("12").join("b.mp4")).unwrap(), b"december");

        let mtime = FileTime::from_last_modification_time(&fs::metadata(&march).unwrap());
        let expected = at(2020, 3, 5).and_local_timezone(chrono::Local).single().unwrap();
        assert_eq!(mtime.unix_seconds(), expected.timestamp());

        // second run finds everything in place
        let again = copy_catalog(&backend, &catalog, dir.path(), &progress, None).unwrap();
        assert_eq!(again.copied, 0);
        assert_eq!(again.skipped, 2);
    }

    #[test]
    fn test_unreadable_source_is_a_warning() {
        let backend = MemoryBackend::new(Enumeration::FullScan)
            .file_with_content("/DCIM/a.mp4", b"ok", at(2020, 3, 5));
        let mut catalog = crawl_all(&backend);
        // listed earlier, deleted from the device since
        let gone = FileRecord::new(
            "/DCIM/gone.mp4",
            FileStat {
                name: "gone.mp4".to_string(),
                size: 10,
                last_write_time: Some(at(2020, 3, 6)),
                creation_time: Some(at(2020, 3, 6)),
            },
        );
        catalog.insert(gone, &NameSizeStrategy);

        let dir = tempdir().unwrap();
        let callback = noop();
        let progress = ThrottledProgress::new(callback.as_ref());
        let result = copy_catalog(&backend, &catalog, dir.path(), &progress, None).unwrap();
        assert_eq!(result.copied, 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(!dir.path().join("03").join("gone.mp4").exists());
    }

    #[test]
    fn test_cancelled_copy_stops() {
        let backend = MemoryBackend::new(Enumeration::FullScan)
            .file_with_content("/DCIM/a.mp4", b"ok", at(2020, 3, 5));
        let catalog = crawl_all(&backend);

        let token = CancellationToken::new();
        token.cancel();
        let dir = tempdir().unwrap();
        let callback = noop();
        let progress = ThrottledProgress::new(callback.as_ref());
        assert!(copy_catalog(&backend, &catalog, dir.path(), &progress, Some(&token)).is_err());
        assert!(!dir.path().join("03").exists());
    }

    #[test]
    fn test_latest_captured_date() {
        let dir = tempdir().unwrap();
        assert_eq!(latest_captured_date(&dir.path().join("missing")).unwrap(), None);
        assert_eq!(latest_captured_date(dir.path()).unwrap(), None);

        fs::create_dir_all(dir.path().join("01")).unwrap();
        fs::create_dir_all(dir.path().join("07")).unwrap();
        fs::write(dir.path().join("01").join("20190105_100000.mp4"), b"x").unwrap();
        fs::write(dir.path().join("07").join("20190714_100000.mp4"), b"x").unwrap();

        let old = FileTime::from_unix_time(946_684_800, 0);
        for (month, name) in [("01", "20190105_100000.mp4"), ("07", "20190714_100000.mp4")] {
            filetime::set_file_mtime(dir.path().join(month).join(name), old).unwrap();
        }

        assert_eq!(
            latest_captured_date(dir.path()).unwrap(),
            NaiveDate::from_ymd_opt(2019, 7, 14)
        );
    }
}
