//! Subtitle acquisition
//!
//! Fetches one video's transcript at a time from the upstream through an
//! external download tool, classifies failures, and normalizes the caption
//! file into plain transcript text.

pub mod fetcher;
pub mod vtt;

pub use fetcher::{classify_failure, YtDlpFetcher};
pub use vtt::{clean_transcript, TranscriptCleaner};

use async_trait::async_trait;

use crate::cookies::CookieBundle;

/// Why a single video's subtitles could not be fetched
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtitleError {
    #[error("Rate limit hit for video {video_id}")]
    RateLimited { video_id: String },

    #[error(
        "YouTube anti-bot detection triggered for {video_id}. \
         Your cookies may be stale or invalid. Try refreshing them."
    )]
    BotDetection { video_id: String },

    #[error(
        "Video {video_id} requires authentication. \
         Ensure your cookies file is from a logged-in YouTube session."
    )]
    AuthenticationRequired { video_id: String },

    #[error(
        "Video {video_id} blocked by YouTube. This usually means stale cookies or outdated yt-dlp. \
         Try: 1) Update cookies, 2) Update yt-dlp"
    )]
    Blocked { video_id: String },

    #[error("No subtitle file found for {video_id}")]
    NoSubtitles { video_id: String },

    #[error("Failed to download subtitles for {video_id}: {message}")]
    DownloadFailed { video_id: String, message: String },

    #[error("Error processing video {video_id}: {message}")]
    Unexpected { video_id: String, message: String },
}

impl SubtitleError {
    /// Only rate limiting is worth waiting out; everything else needs a human
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubtitleError::RateLimited { .. })
    }

    /// Whether refreshing the cookie bundle is the likely fix
    pub fn needs_fresh_credentials(&self) -> bool {
        matches!(
            self,
            SubtitleError::BotDetection { .. }
                | SubtitleError::AuthenticationRequired { .. }
                | SubtitleError::Blocked { .. }
        )
    }
}

/// Result of one fetch attempt, as consumed by the batch retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Cleaned transcript text (possibly empty)
    Fetched(String),
    /// Transient failure; try again after backing off
    Retryable(SubtitleError),
    /// Failure that another attempt in this run will not fix
    Permanent(SubtitleError),
}

impl From<Result<String, SubtitleError>> for FetchOutcome {
    fn from(result: Result<String, SubtitleError>) -> Self {
        match result {
            Ok(text) => FetchOutcome::Fetched(text),
            Err(e) if e.is_retryable() => FetchOutcome::Retryable(e),
            Err(e) => FetchOutcome::Permanent(e),
        }
    }
}

/// Source of transcripts for one video at a time
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    async fn fetch(&self, video_id: &str, language: &str, credentials: &CookieBundle) -> FetchOutcome;
}
