//! Error types shared across the pipeline stages

use std::path::PathBuf;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, ClosetError>;

/// Error types for pipeline operations.
///
/// Per-video subtitle failures are not represented here; they are recorded as
/// `subtitles = null` and never abort a run (see [`crate::subtitles::SubtitleError`]).
#[derive(thiserror::Error, Debug)]
pub enum ClosetError {
    /// A required input store is missing. Fatal for the stage that needs it.
    #[error("Required input not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record store could not be parsed. Corruption is never treated as an empty store.
    #[error("Corrupt record store {} at line {line}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record in {}: {reason}", .path.display())]
    InvalidRecord { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External tool error: {0}")]
    Tool(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
