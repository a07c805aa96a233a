//! Structured extraction of guest, year and movie picks from transcripts

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{ClosetError, Result};
use crate::llm::{clean_llm_response, ChatMessage, LLM};
use crate::store::{merge_last_write_wins, Keyed, RecordStore, SubtitleRecord};

/// A movie picked in a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Structured information extracted from one video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub guest: Option<String>,
    #[serde(default, deserialize_with = "year_as_string")]
    pub year: Option<String>,
    #[serde(default)]
    pub movies: Vec<Movie>,
}

/// Models sometimes answer `"year": 2019` instead of a string
fn year_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Subtitle record plus extracted fields.
///
/// The extraction fields are absent for records passed through without
/// subtitles and present (possibly null or empty) once extraction ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitles: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movies: Option<Vec<Movie>>,
}

impl EnrichedRecord {
    /// Copy a subtitle record through without extraction
    pub fn passthrough(record: SubtitleRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            title: record.title,
            subtitles: record.subtitles,
            guest: None,
            year: None,
            movies: None,
        }
    }

    pub fn with_info(record: SubtitleRecord, info: VideoInfo) -> Self {
        Self {
            guest: info.guest,
            year: info.year,
            movies: Some(info.movies),
            ..Self::passthrough(record)
        }
    }

    /// Extraction ran for this record (even if it found nothing)
    pub fn has_structured_data(&self) -> bool {
        self.movies.is_some()
    }

    /// Both guest and movie list are known
    pub fn is_complete(&self) -> bool {
        self.guest.is_some() && self.movies.is_some()
    }

    /// Trimmed, non-empty movie titles
    pub fn movie_titles(&self) -> impl Iterator<Item = &str> {
        self.movies
            .iter()
            .flatten()
            .filter_map(|m| m.title.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl Keyed for EnrichedRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Extracts [`VideoInfo`] from a title and transcript
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, title: &str, subtitles: &str) -> Result<VideoInfo>;
}

/// Extractor backed by a chat LLM answering in JSON
pub struct LlmExtractor {
    llm: Box<dyn LLM>,
}

impl LlmExtractor {
    pub fn new(llm: Box<dyn LLM>) -> Self {
        Self { llm }
    }
}

const EXTRACTION_PROMPT: &str = r#"You extract structured data from transcripts of short videos in which a guest visits the Criterion Collection closet and picks films to take home.

Respond with a single JSON object and nothing else:
{
  "guest": "name of the guest, or null if unknown",
  "year": "year the video was published as a string, or null if unknown",
  "movies": [
    {"title": "title of a movie the guest picked", "description": "one sentence about what the guest says about it"}
  ]
}"#;

fn extraction_messages(title: &str, subtitles: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(EXTRACTION_PROMPT),
        ChatMessage::user(format!(
            "Extract the structured data from the following video transcript.\n\nTitle: {}\n\nTranscript:\n{}",
            title, subtitles
        )),
    ]
}

/// Parse a model reply into [`VideoInfo`], tolerating code fences
pub fn parse_video_info(reply: &str) -> Result<VideoInfo> {
    let cleaned = clean_llm_response(reply);
    serde_json::from_str(cleaned).map_err(|e| ClosetError::Llm(format!("unparseable extraction reply: {}", e)))
}

#[async_trait]
impl StructuredExtractor for LlmExtractor {
    async fn extract(&self, title: &str, subtitles: &str) -> Result<VideoInfo> {
        let response = self.llm.chat(extraction_messages(title, subtitles)).await?;
        if let Some(tokens) = response.tokens_used {
            debug!("Extraction used {} tokens", tokens);
        }
        parse_video_info(&response.content)
    }
}

/// Counts from one enrichment pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub extracted: usize,
    pub extraction_failures: usize,
    pub passed_through: usize,
    pub skipped: usize,
}

impl EnrichmentSummary {
    pub fn new_records(&self) -> usize {
        self.extracted + self.extraction_failures + self.passed_through
    }
}

/// Keep one record per id, preferring complete ones, in first-seen order
pub fn clean_enriched(records: Vec<EnrichedRecord>) -> Vec<EnrichedRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut cleaned: Vec<EnrichedRecord> = Vec::new();

    for record in records {
        match index.get(&record.id) {
            Some(&position) => {
                if record.is_complete() && !cleaned[position].is_complete() {
                    cleaned[position] = record;
                }
            }
            None => {
                index.insert(record.id.clone(), cleaned.len());
                cleaned.push(record);
            }
        }
    }

    cleaned
}

/// Incremental enrichment over the subtitle store
pub struct Enricher<E: StructuredExtractor> {
    store: RecordStore,
    extractor: E,
}

impl<E: StructuredExtractor> Enricher<E> {
    pub fn new(store: RecordStore, extractor: E) -> Self {
        Self { store, extractor }
    }

    /// Enrich every subtitle record not yet in the enriched store.
    ///
    /// A record passed through earlier without subtitles is revisited once
    /// its subtitles have been fetched.
    pub async fn run(&self) -> Result<EnrichmentSummary> {
        let subtitle_records = self.store.load_subtitle_records_required().await?;
        let existing = clean_enriched(self.store.load_enriched_records().await?);

        let mut summary = EnrichmentSummary::default();
        // id -> whether extraction already ran for it
        let enriched: HashMap<&str, bool> = existing
            .iter()
            .map(|r| (r.id.as_str(), r.has_structured_data()))
            .collect();

        let mut new_records = Vec::new();
        for record in subtitle_records {
            let has_text = record.subtitles.as_deref().map_or(false, |s| !s.is_empty());
            match enriched.get(record.id.as_str()) {
                Some(true) => {
                    summary.skipped += 1;
                    continue;
                }
                Some(false) if !has_text => {
                    summary.skipped += 1;
                    continue;
                }
                _ => {}
            }

            if !has_text {
                summary.passed_through += 1;
                new_records.push(EnrichedRecord::passthrough(record));
                continue;
            }
            let subtitles = record.subtitles.as_deref().unwrap_or_default();

            info!("🧠 Enriching {}", record.id);
            let info = match self.extractor.extract(&record.title, subtitles).await {
                Ok(info) => {
                    summary.extracted += 1;
                    info
                }
                Err(e) => {
                    warn!("⚠️  Extraction failed for {}: {}", record.id, e);
                    summary.extraction_failures += 1;
                    VideoInfo::default()
                }
            };
            new_records.push(EnrichedRecord::with_info(record, info));
        }

        if new_records.is_empty() {
            info!("✅ No new records to enrich");
            return Ok(summary);
        }

        let combined = merge_last_write_wins(existing.into_iter().chain(new_records));
        self.store.save_enriched_records(&combined).await?;
        info!("💾 Enriched and saved {} new records", summary.new_records());

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::store::SaveMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedExtractor {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl FixedExtractor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }
    }

    #[async_trait]
    impl StructuredExtractor for FixedExtractor {
        async fn extract(&self, title: &str, _subtitles: &str) -> Result<VideoInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(title) {
                return Err(ClosetError::Llm("model unavailable".into()));
            }
            Ok(VideoInfo {
                guest: Some(format!("Guest of {}", title)),
                year: Some("2020".into()),
                movies: vec![Movie {
                    title: Some("Seven Samurai".into()),
                    description: None,
                }],
            })
        }
    }

    fn record(id: &str, subtitles: Option<&str>) -> SubtitleRecord {
        SubtitleRecord {
            id: id.to_string(),
            url: String::new(),
            title: id.to_string(),
            subtitles: subtitles.map(str::to_string),
        }
    }

    async fn store_with(dir: &TempDir, records: &[SubtitleRecord]) -> RecordStore {
        let store = RecordStore::new(&PathsConfig::under(dir.path().to_path_buf()));
        store.save_subtitle_records(records, SaveMode::Replace).await.unwrap();
        store
    }

    #[test]
    fn test_parse_video_info_from_fenced_reply() {
        let reply = "```json\n{\"guest\": \"Bill Hader\", \"year\": 2019, \"movies\": [{\"title\": \"Harakiri\", \"description\": null}]}\n```";
        let info = parse_video_info(reply).unwrap();

        assert_eq!(info.guest.as_deref(), Some("Bill Hader"));
        assert_eq!(info.year.as_deref(), Some("2019"));
        assert_eq!(info.movies[0].title.as_deref(), Some("Harakiri"));
    }

    #[test]
    fn test_parse_video_info_rejects_prose() {
        assert!(parse_video_info("I could not find any movies.").is_err());
    }

    #[test]
    fn test_passthrough_omits_extraction_fields() {
        let json = serde_json::to_string(&EnrichedRecord::passthrough(record("a", None))).unwrap();
        assert!(!json.contains("guest"));
        assert!(!json.contains("movies"));

        let json = serde_json::to_string(&EnrichedRecord::with_info(record("a", Some("x")), VideoInfo::default())).unwrap();
        assert!(json.contains("\"movies\":[]"));
    }

    #[test]
    fn test_clean_prefers_complete_records() {
        let partial = EnrichedRecord::with_info(record("a", Some("x")), VideoInfo::default());
        let complete = EnrichedRecord::with_info(
            record("a", Some("x")),
            VideoInfo {
                guest: Some("Guest".into()),
                ..VideoInfo::default()
            },
        );

        let cleaned = clean_enriched(vec![partial, complete.clone()]);
        assert_eq!(cleaned, vec![complete]);
    }

    #[tokio::test]
    async fn test_enrich_is_incremental() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[record("a", Some("hello")), record("b", None)]).await;
        let enricher = Enricher::new(store.clone(), FixedExtractor::new());

        let first = enricher.run().await.unwrap();
        assert_eq!(first.extracted, 1);
        assert_eq!(first.passed_through, 1);

        let second = enricher.run().await.unwrap();
        assert_eq!(second.new_records(), 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(enricher.extractor.calls.load(Ordering::SeqCst), 1);

        let enriched = store.load_enriched_records().await.unwrap();
        assert_eq!(enriched.len(), 2);
        assert_eq!(enriched[0].guest.as_deref(), Some("Guest of a"));
        assert!(!enriched[1].has_structured_data());
    }

    #[tokio::test]
    async fn test_late_subtitles_are_enriched() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[record("b", None)]).await;
        Enricher::new(store.clone(), FixedExtractor::new()).run().await.unwrap();

        store
            .save_subtitle_records(&[record("b", Some("now available"))], SaveMode::Append)
            .await
            .unwrap();
        let summary = Enricher::new(store.clone(), FixedExtractor::new()).run().await.unwrap();

        assert_eq!(summary.extracted, 1);
        let enriched = store.load_enriched_records().await.unwrap();
        assert_eq!(enriched.len(), 1);
        assert!(enriched[0].has_structured_data());
    }

    #[tokio::test]
    async fn test_extraction_failure_stores_empty_info() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[record("bad", Some("text"))]).await;
        let extractor = FixedExtractor {
            fail_on: Some("bad"),
            ..FixedExtractor::new()
        };

        let summary = Enricher::new(store.clone(), extractor).run().await.unwrap();

        assert_eq!(summary.extraction_failures, 1);
        let enriched = store.load_enriched_records().await.unwrap();
        assert_eq!(enriched[0].guest, None);
        assert_eq!(enriched[0].movies, Some(vec![]));
    }

    #[tokio::test]
    async fn test_missing_subtitle_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(&PathsConfig::under(dir.path().to_path_buf()));
        let err = Enricher::new(store, FixedExtractor::new()).run().await.unwrap_err();
        assert!(matches!(err, ClosetError::NotFound(_)));
    }
}
