use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Command;

use exif::{In, Reader, Tag};
use serde::Deserialize;
use tracing::{debug, warn};

/// Playback and frame information of one media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaDetails {
    /// Seconds; 0 for stills
    pub duration_secs: f64,
    pub width: i32,
    pub height: i32,
}

impl MediaDetails {
    /// Sentinel written when a file could not be inspected.
    pub const UNKNOWN: MediaDetails = MediaDetails {
        duration_secs: -1.0,
        width: -1,
        height: -1,
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no EXIF data in {path}: {reason}")]
    Exif { path: String, reason: String },
    #[error("ffprobe failed on {path}: {reason}")]
    Ffprobe { path: String, reason: String },
    #[error("unsupported media type: {0}")]
    Unsupported(String),
}

/// Inspects a local media file.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaDetails, ProbeError>;
}

/// Probe, replacing any failure with [`MediaDetails::UNKNOWN`].
pub fn probe_or_unknown(probe: &dyn MediaProbe, path: &Path) -> MediaDetails {
    match probe.probe(path) {
        Ok(details) => details,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "media inspection failed");
            MediaDetails::UNKNOWN
        }
    }
}

/// Pixel dimensions of stills from their EXIF block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifProbe;

impl MediaProbe for ExifProbe {
    fn probe(&self, path: &Path) -> Result<MediaDetails, ProbeError> {
        let file = File::open(path).map_err(|source| ProbeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let exif = Reader::new()
            .read_from_container(&mut BufReader::new(file))
            .map_err(|e| ProbeError::Exif {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let dimension = |primary: Tag, fallback: Tag| -> i32 {
            [primary, fallback]
                .iter()
                .find_map(|tag| exif.get_field(*tag, In::PRIMARY))
                .and_then(|field| field.value.get_uint(0))
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(-1)
        };

        Ok(MediaDetails {
            duration_secs: 0.0,
            width: dimension(Tag::PixelXDimension, Tag::ImageWidth),
            height: dimension(Tag::PixelYDimension, Tag::ImageLength),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<i32>,
    height: Option<i32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json` output for the first video stream.
fn parse_ffprobe_json(json: &str) -> Option<MediaDetails> {
    let output: FfprobeOutput = serde_json::from_str(json).ok()?;
    let stream = output.streams.first()?;

    // container duration is more reliable than the stream's
    let duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .unwrap_or(-1.0);

    Some(MediaDetails {
        duration_secs: duration,
        width: stream.width.unwrap_or(-1),
        height: stream.height.unwrap_or(-1),
    })
}

/// Video duration and frame size by shelling out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            program: "ffprobe".to_string(),
        }
    }
}

impl FfprobeProbe {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<MediaDetails, ProbeError> {
        let failed = |reason: String| ProbeError::Ffprobe {
            path: path.display().to_string(),
            reason,
        };

        let out = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .args(["-select_streams", "v:0"])
            .arg(path.as_os_str())
            .output()
            .map_err(|e| failed(e.to_string()))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(failed(format!("{}: {}", out.status, stderr.trim())));
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        debug!(path = %path.display(), bytes = stdout.len(), "ffprobe output");
        parse_ffprobe_json(&stdout).ok_or_else(|| failed("no video stream".to_string()))
    }
}

/// Chooses [`ExifProbe`] or [`FfprobeProbe`] by the file's MIME type.
#[derive(Debug, Clone, Default)]
pub struct DefaultProbe {
    pub image: ExifProbe,
    pub video: FfprobeProbe,
}

fn is_transport_stream(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mts") || e.eq_ignore_ascii_case("m2ts"))
}

impl MediaProbe for DefaultProbe {
    fn probe(&self, path: &Path) -> Result<MediaDetails, ProbeError> {
        if is_transport_stream(path) {
            return self.video.probe(path);
        }
        match mime_guess::from_path(path).first() {
            Some(m) if m.type_() == mime_guess::mime::IMAGE => self.image.probe(path),
            Some(m) if m.type_() == mime_guess::mime::VIDEO => self.video.probe(path),
            Some(m) => Err(ProbeError::Unsupported(m.to_string())),
            None => Err(ProbeError::Unsupported(path.display().to_string())),
        }
    }
}
