use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading inputs, validating configuration and tagging images.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No {kind} file found in {}", dir.display())]
    InputNotFound { kind: &'static str, dir: PathBuf },

    #[error("More than one {kind} file found: {candidates:?}")]
    AmbiguousInput {
        kind: &'static str,
        candidates: Vec<PathBuf>,
    },

    #[error("Unsupported track format: {}", .0.display())]
    UnsupportedTrackFormat(PathBuf),

    #[error("Malformed track record {index}: {reason}")]
    MalformedTrackRecord { index: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write tags to {}: {reason}", path.display())]
    TagWrite { path: PathBuf, reason: String },

    #[error("External tool `{tool}` failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedTrackRecord {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
