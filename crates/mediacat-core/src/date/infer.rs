use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

/// A timestamp layout recognised at the start of a file stem.
struct StemPattern {
    len: usize,
    regex: &'static LazyLock<Regex>,
    format: &'static str,
}

static RE_15: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8}_\d{6}$").unwrap());
static RE_14: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{14}$").unwrap());
static RE_12: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{12}$").unwrap());

static PATTERN_15: StemPattern = StemPattern { len: 15, regex: &RE_15, format: "%Y%m%d_%H%M%S" };
static PATTERN_14: StemPattern = StemPattern { len: 14, regex: &RE_14, format: "%Y%m%d%H%M%S" };
static PATTERN_12: StemPattern = StemPattern { len: 12, regex: &RE_12, format: "%Y%m%d%H%M" };

/// Split a file name into stem and lower-cased extension (with leading dot).
///
/// Names without a usable extension (`movie`, `.profile`, `clip.`) return an
/// empty extension and the whole name as stem.
pub fn split_extension(name: &str) -> (&str, String) {
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => (&name[..i], name[i..].to_lowercase()),
        _ => (name, String::new()),
    }
}

/// Best guess at when a file was actually captured.
///
/// Starts from the earlier of the two filesystem timestamps (a missing one
/// counts as the oldest possible instant) and lets a timestamp embedded at
/// the start of the file name override it.
pub fn infer_captured_at(
    file_name: &str,
    last_write_time: Option<NaiveDateTime>,
    creation_time: Option<NaiveDateTime>,
) -> NaiveDateTime {
    let baseline = last_write_time
        .unwrap_or(NaiveDateTime::MIN)
        .min(creation_time.unwrap_or(NaiveDateTime::MIN));

    let (stem, _) = split_extension(file_name);
    parse_stem(stem).unwrap_or(baseline)
}

/// Parse the timestamp prefix of a stem. Exactly one pattern is tried,
/// chosen by the stem's length in characters.
fn parse_stem(stem: &str) -> Option<NaiveDateTime> {
    let pattern = match stem.chars().count() {
        n if n >= 15 => &PATTERN_15,
        14 => &PATTERN_14,
        12 => &PATTERN_12,
        _ => return None,
    };

    let end = stem
        .char_indices()
        .nth(pattern.len)
        .map_or(stem.len(), |(i, _)| i);
    let prefix = &stem[..end];

    if !pattern.regex.is_match(prefix) {
        return None;
    }
    NaiveDateTime::parse_from_str(prefix, pattern.format).ok()
}
