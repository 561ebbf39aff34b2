//! Error types for the segmented downloader.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::download::segment::SegmentIndex;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Resolver errors
    #[error("Resolver error: {0}")]
    Resolver(String),

    // HTTP errors
    #[error("{url} request error: {message}")]
    Request { url: String, message: String },

    #[error("{url} request error: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Server ignored range request for {0}")]
    RangeNotSupported(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Segment store / planner errors
    #[error("Segment file {} is broken, delete all part files and re-download", .0.display())]
    CorruptSegment(PathBuf),

    #[error("No segment index fits between {before:?} and {after}")]
    IndexExhausted {
        before: Option<SegmentIndex>,
        after: SegmentIndex,
    },

    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: u64, received: u64 },

    // Aggregated download errors
    #[error("{} segment(s) failed for {}{}", .failures.len(), .path.display(), summarize(.failures))]
    SegmentsFailed {
        path: PathBuf,
        failures: Vec<SegmentFailure>,
    },

    #[error("{} part(s) failed for '{title}'{}", .failures.len(), summarize(.failures))]
    PartsFailed {
        title: String,
        failures: Vec<PartFailure>,
    },

    #[error("{0} item(s) failed")]
    ItemsFailed(u64),

    // Merge errors
    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("FFmpeg not found. Please install ffmpeg and ensure it's in your PATH.")]
    FFmpegNotFound,

    // Delegate errors
    #[error("aria2 RPC error: {0}")]
    Delegate(String),

    // Scheduling errors
    #[error("Another job is already writing {}", .0.display())]
    PathBusy(PathBuf),

    #[error("Download cancelled")]
    Cancelled,

    // File system errors
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    IoAt {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an IO error with the operation and path it came from.
    pub fn io_at(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::IoAt {
            context: context.into(),
            source,
        }
    }

    /// Whether this error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::SegmentsFailed { failures, .. } => {
                !failures.is_empty() && failures.iter().all(|f| f.error.is_cancelled())
            }
            Error::PartsFailed { failures, .. } => {
                !failures.is_empty() && failures.iter().all(|f| f.error.is_cancelled())
            }
            _ => false,
        }
    }
}

/// A segment that exhausted its retry budget.
#[derive(Debug)]
pub struct SegmentFailure {
    pub index: SegmentIndex,
    pub error: Error,
}

impl fmt::Display for SegmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}: {}", self.index, self.error)
    }
}

/// A part of a multi-part stream that failed to download.
#[derive(Debug)]
pub struct PartFailure {
    pub part: usize,
    pub error: Error,
}

impl fmt::Display for PartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part {}: {}", self.part, self.error)
    }
}

fn summarize<T: fmt::Display>(failures: &[T]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n  - {}", failure))
        .collect()
}

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const RESOLVER_ERROR: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const DOWNLOAD_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
    pub const SOME_ITEMS_FAILED: i32 = 6;
    pub const CANCELLED: i32 = 130;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_failed_lists_every_failure() {
        let err = Error::SegmentsFailed {
            path: PathBuf::from("/tmp/video.mp4"),
            failures: vec![
                SegmentFailure {
                    index: SegmentIndex::new(1.0),
                    error: Error::HttpStatus {
                        url: "http://a/b".into(),
                        status: 500,
                    },
                },
                SegmentFailure {
                    index: SegmentIndex::new(3.0),
                    error: Error::Cancelled,
                },
            ],
        };

        let text = err.to_string();
        assert!(text.starts_with("2 segment(s) failed for /tmp/video.mp4"));
        assert!(text.contains("segment 1.000000: http://a/b request error: HTTP 500"));
        assert!(text.contains("segment 3.000000: Download cancelled"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_all_cancelled_parts_count_as_cancelled() {
        let err = Error::PartsFailed {
            title: "clip".into(),
            failures: vec![PartFailure {
                part: 0,
                error: Error::Cancelled,
            }],
        };
        assert!(err.is_cancelled());
    }
}
