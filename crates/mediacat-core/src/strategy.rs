use serde::{Deserialize, Serialize};

use crate::record::FileRecord;

/// A candidate that matched a record already in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEvent {
    /// Path of the record that stays in the catalog
    pub kept: String,
    /// Path of the candidate that matched it
    pub candidate: String,
    /// Whether the candidate was still added to the catalog
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Duplicate(DuplicateEvent),
}

/// Policy for inserting a candidate into the records already bucketed under
/// the same capture date.
pub trait MergeStrategy: Send + Sync {
    /// Whether candidates must carry `content_hash` before merging.
    fn needs_content_hash(&self) -> bool {
        false
    }

    fn merge(&self, bucket: &mut Vec<FileRecord>, candidate: FileRecord) -> MergeOutcome;
}

/// Bump the existing record's counter and either drop or keep the candidate.
fn record_duplicate(
    bucket: &mut Vec<FileRecord>,
    index: usize,
    candidate: FileRecord,
    retain: bool,
) -> MergeOutcome {
    let existing = &mut bucket[index];
    existing.duplicate_count += 1;
    if !retain {
        // a discarded candidate hands over the copies it had already absorbed
        existing.duplicate_count += candidate.duplicate_count;
    }
    let event = DuplicateEvent {
        kept: existing.path.clone(),
        candidate: candidate.path.clone(),
        retained: retain,
    };
    if retain {
        bucket.push(candidate);
    }
    MergeOutcome::Duplicate(event)
}

fn same_name_and_size(a: &FileRecord, b: &FileRecord) -> bool {
    a.name == b.name && a.size == b.size
}

/// Same name and same size on the same day means the same file.
///
/// Cheap and knowingly approximate: unrelated files that happen to share a
/// name and byte count on one day are collapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameSizeStrategy;

impl MergeStrategy for NameSizeStrategy {
    fn merge(&self, bucket: &mut Vec<FileRecord>, candidate: FileRecord) -> MergeOutcome {
        match bucket.iter().position(|r| same_name_and_size(r, &candidate)) {
            Some(i) => record_duplicate(bucket, i, candidate, false),
            None => {
                bucket.push(candidate);
                MergeOutcome::Added
            }
        }
    }
}

/// Same matching rule as [`NameSizeStrategy`], but nothing is discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagOnlyStrategy;

impl MergeStrategy for FlagOnlyStrategy {
    fn merge(&self, bucket: &mut Vec<FileRecord>, candidate: FileRecord) -> MergeOutcome {
        match bucket.iter().position(|r| same_name_and_size(r, &candidate)) {
            Some(i) => record_duplicate(bucket, i, candidate, true),
            None => {
                bucket.push(candidate);
                MergeOutcome::Added
            }
        }
    }
}

/// Name, size and SHA-256 of the content must all match. Records without a
/// hash never match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHashStrategy;

impl MergeStrategy for ContentHashStrategy {
    fn needs_content_hash(&self) -> bool {
        true
    }

    fn merge(&self, bucket: &mut Vec<FileRecord>, candidate: FileRecord) -> MergeOutcome {
        let matched = candidate.content_hash.as_ref().and_then(|hash| {
            bucket.iter().position(|r| {
                same_name_and_size(r, &candidate) && r.content_hash.as_ref() == Some(hash)
            })
        });
        match matched {
            Some(i) => record_duplicate(bucket, i, candidate, false),
            None => {
                bucket.push(candidate);
                MergeOutcome::Added
            }
        }
    }
}

/// Selectable strategy, for configuration files and the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    NameSize,
    FlagOnly,
    ContentHash,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn MergeStrategy> {
        match self {
            Self::NameSize => Box::new(NameSizeStrategy),
            Self::FlagOnly => Box::new(FlagOnlyStrategy),
            Self::ContentHash => Box::new(ContentHashStrategy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileStat;

    fn record(path: &str, name: &str, size: u64) -> FileRecord {
        FileRecord::new(
            path,
            FileStat {
                name: name.to_string(),
                size,
                last_write_time: None,
                creation_time: None,
            },
        )
    }

    #[test]
    fn test_name_size_discards_duplicate() {
        let mut bucket = vec![record("/A/x.mp4", "x.mp4", 100)];
        let outcome = NameSizeStrategy.merge(&mut bucket, record("/B/x.mp4", "x.mp4", 100));
        assert_eq!(
            outcome,
            MergeOutcome::Duplicate(DuplicateEvent {
                kept: "/A/x.mp4".to_string(),
                candidate: "/B/x.mp4".to_string(),
                retained: false,
            })
        );
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].duplicate_count, 1);
    }

    #[test]
    fn test_discarded_candidate_hands_over_its_count() {
        let mut bucket = vec![record("/A/x.mp4", "x.mp4", 100)];
        let mut candidate = record("/B/x.mp4", "x.mp4", 100);
        candidate.duplicate_count = 2;
        NameSizeStrategy.merge(&mut bucket, candidate);
        assert_eq!(bucket[0].duplicate_count, 3);
    }

    #[test]
    fn test_name_size_needs_both() {
        let mut bucket = vec![record("/A/x.mp4", "x.mp4", 100)];
        assert_eq!(NameSizeStrategy.merge(&mut bucket, record("/B/x.mp4", "x.mp4", 101)), MergeOutcome::Added);
        assert_eq!(NameSizeStrategy.merge(&mut bucket, record("/B/y.mp4", "y.mp4", 100)), MergeOutcome::Added);
        assert_eq!(bucket.len(), 3);
        assert!(bucket.iter().all(|r| r.duplicate_count == 0));
    }

    #[test]
    fn test_flag_only_keeps_everything() {
        let mut bucket = vec![record("/A/x.mp4", "x.mp4", 100)];
        let outcome = FlagOnlyStrategy.merge(&mut bucket, record("/B/x.mp4", "x.mp4", 100));
        assert!(matches!(outcome, MergeOutcome::Duplicate(DuplicateEvent { retained: true, .. })));
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].duplicate_count, 1);
        assert_eq!(bucket[1].duplicate_count, 0);
    }

    #[test]
    fn test_content_hash_compares_bytes() {
        let mut a = record("/A/x.mp4", "x.mp4", 100);
        a.content_hash = Some("aa".to_string());
        let mut b = record("/B/x.mp4", "x.mp4", 100);
        b.content_hash = Some("bb".to_string());
        let mut c = record("/C/x.mp4", "x.mp4", 100);
        c.content_hash = Some("aa".to_string());

        let mut bucket = vec![a];
        assert_eq!(ContentHashStrategy.merge(&mut bucket, b), MergeOutcome::Added);
        assert!(matches!(ContentHashStrategy.merge(&mut bucket, c), MergeOutcome::Duplicate(_)));
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].duplicate_count, 1);

        let unhashed = record("/D/x.mp4", "x.mp4", 100);
        assert_eq!(ContentHashStrategy.merge(&mut bucket, unhashed), MergeOutcome::Added);
    }
}
