//! Criterion Closet data pipeline
//!
//! Mirrors a public video playlist, fetches and cleans each video's subtitles
//! resumably, extracts structured picks with an LLM, and reports on the result.

pub mod analytics;
pub mod batch;
pub mod config;
pub mod cookies;
pub mod diff;
pub mod enrich;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod playlist;
pub mod store;
pub mod subtitles;

// Re-export main types for easy access
pub use crate::batch::{BatchProcessor, BatchResult};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::cookies::CookieBundle;
pub use crate::diff::{compute_work_set, WorkSet};
pub use crate::enrich::{EnrichedRecord, Enricher, StructuredExtractor, VideoInfo};
pub use crate::error::{ClosetError, Result};
pub use crate::llm::{LLMConfig, LLMProvider};
pub use crate::pipeline::Pipeline;
pub use crate::store::{PlaylistEntry, RecordStore, SaveMode, SubtitleRecord};
pub use crate::subtitles::{FetchOutcome, SubtitleError, SubtitleSource, YtDlpFetcher};
