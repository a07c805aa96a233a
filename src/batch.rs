use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::BatchConfig;
use crate::cookies::CookieBundle;
use crate::error::Result;
use crate::store::{merge_last_write_wins, PlaylistEntry, RecordStore, SaveMode, SubtitleRecord};
use crate::subtitles::{FetchOutcome, SubtitleError, SubtitleSource};

/// Outcome of a single video within a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFetchResult {
    pub id: String,
    pub status: FetchStatus,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub processing_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Fetched,
    /// Failed with a condition that retrying within this run will not fix
    Failed,
    /// Still rate limited after the last attempt
    Exhausted,
}

/// Overall batch results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Videos that were pending before the cap was applied
    pub total: usize,
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    /// Pending videos left for a later run by the per-run cap
    pub deferred: usize,
    pub total_time: Duration,
    pub results: Vec<VideoFetchResult>,
}

impl BatchResult {
    fn empty(total_time: Duration) -> Self {
        Self {
            total: 0,
            attempted: 0,
            successful: 0,
            failed: 0,
            deferred: 0,
            total_time,
            results: Vec::new(),
        }
    }
}

/// Sequential subtitle fetch loop with retries, throttling and persistence
pub struct BatchProcessor<S: SubtitleSource> {
    config: BatchConfig,
    language: String,
    store: RecordStore,
    source: S,
}

impl<S: SubtitleSource> BatchProcessor<S> {
    pub fn new(config: BatchConfig, language: impl Into<String>, store: RecordStore, source: S) -> Self {
        Self {
            config,
            language: language.into(),
            store,
            source,
        }
    }

    /// Fetch subtitles for `to_process` and merge them with `existing_done`.
    ///
    /// At most `max_per_run` videos are attempted; the rest stay out of the
    /// store and are picked up by the next run's diff. The store is rewritten
    /// once at the end with the merged collection.
    pub async fn run(
        &self,
        to_process: Vec<PlaylistEntry>,
        existing_done: Vec<SubtitleRecord>,
        credentials: &CookieBundle,
        max_per_run: Option<usize>,
    ) -> Result<BatchResult> {
        let start_time = Instant::now();

        if to_process.is_empty() {
            info!("✅ No new or failed videos to process");
            return Ok(BatchResult::empty(start_time.elapsed()));
        }

        let total = to_process.len();
        let mut batch = to_process;
        if let Some(limit) = max_per_run.filter(|&limit| limit < total) {
            batch.truncate(limit);
            info!(
                "Limiting to {} videos this run ({} remaining for future runs)",
                limit,
                total - limit
            );
        }
        let deferred = total - batch.len();

        info!("🚀 Processing {} videos for subtitles", batch.len());

        let mut fetched: Vec<SubtitleRecord> = Vec::with_capacity(batch.len());
        let mut results = Vec::with_capacity(batch.len());
        let batch_len = batch.len();

        for (index, entry) in batch.into_iter().enumerate() {
            info!("📹 Processing video {}/{}: {}", index + 1, batch_len, entry.id);
            let item_start = Instant::now();

            let (subtitles, status, attempts, error) = self.fetch_with_retry(&entry.id, credentials).await;

            if let Some(e) = &error {
                if e.needs_fresh_credentials() {
                    error!("❌ {}", e);
                } else {
                    warn!("⚠️  {}", e);
                }
            }

            let record = SubtitleRecord::from_entry(entry, subtitles);
            if self.config.persist_mode == SaveMode::Append {
                self.store
                    .save_subtitle_records(std::slice::from_ref(&record), SaveMode::Append)
                    .await?;
            }

            results.push(VideoFetchResult {
                id: record.id.clone(),
                status,
                attempts,
                error_message: error.map(|e| e.to_string()),
                processing_time: item_start.elapsed(),
            });
            fetched.push(record);

            let pause = self.item_delay();
            if !pause.is_zero() {
                debug!("Sleeping {:.1}s before next video", pause.as_secs_f64());
                tokio::time::sleep(pause).await;
            }
        }

        let merged = merge_last_write_wins(existing_done.into_iter().chain(fetched));
        self.store.save_subtitle_records(&merged, SaveMode::Replace).await?;

        let successful = results.iter().filter(|r| r.status == FetchStatus::Fetched).count();
        let attempted = results.len();
        let batch_result = BatchResult {
            total,
            attempted,
            successful,
            failed: attempted - successful,
            deferred,
            total_time: start_time.elapsed(),
            results,
        };

        info!(
            "💾 Saved {} records to {} ({} fetched, {} failed, {} deferred)",
            merged.len(),
            self.store.subtitles_path().display(),
            batch_result.successful,
            batch_result.failed,
            batch_result.deferred
        );

        Ok(batch_result)
    }

    /// Attempt one video up to `max_attempts` times, backing off only on
    /// retryable failures.
    async fn fetch_with_retry(
        &self,
        video_id: &str,
        credentials: &CookieBundle,
    ) -> (Option<String>, FetchStatus, u32, Option<SubtitleError>) {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match self.source.fetch(video_id, &self.language, credentials).await {
                FetchOutcome::Fetched(text) => {
                    info!("✅ Fetched subtitles for {}", video_id);
                    return (Some(text), FetchStatus::Fetched, attempt + 1, None);
                }
                FetchOutcome::Permanent(e) => {
                    return (None, FetchStatus::Failed, attempt + 1, Some(e));
                }
                FetchOutcome::Retryable(e) => {
                    if attempt + 1 < max_attempts {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            "⏳ {} (attempt {}/{}), retrying in {:.2}s",
                            e,
                            attempt + 1,
                            max_attempts,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        (None, FetchStatus::Exhausted, max_attempts, last_error)
    }

    /// `base * 2^attempt + uniform(0, jitter)` for a zero-based attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.config.base_delay().as_secs_f64() * 2f64.powi(attempt as i32);
        let jitter = uniform(0.0, self.config.jitter_secs);
        Duration::from_secs_f64(exponential + jitter)
    }

    fn item_delay(&self) -> Duration {
        Duration::from_secs_f64(uniform(self.config.item_delay_min_secs, self.config.item_delay_max_secs))
    }
}

/// Uniform sample in `[min, max)`, or `min` when the range is empty
fn uniform(min: f64, max: f64) -> f64 {
    let min = min.max(0.0);
    if max.is_nan() || max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replays scripted outcomes per video id; unscripted ids succeed
    #[derive(Default)]
    struct ScriptedSource {
        scripts: Mutex<HashMap<String, VecDeque<FetchOutcome>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn with(self, id: &str, outcomes: Vec<FetchOutcome>) -> Self {
            self.scripts.lock().unwrap().insert(id.to_string(), outcomes.into());
            self
        }

        fn calls_for(&self, id: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| c.as_str() == id).count()
        }
    }

    #[async_trait]
    impl SubtitleSource for ScriptedSource {
        async fn fetch(&self, video_id: &str, _language: &str, _credentials: &CookieBundle) -> FetchOutcome {
            self.calls.lock().unwrap().push(video_id.to_string());
            self.scripts
                .lock()
                .unwrap()
                .get_mut(video_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| FetchOutcome::Fetched(format!("subs for {}", video_id)))
        }
    }

    fn entry(id: &str) -> PlaylistEntry {
        PlaylistEntry {
            id: id.to_string(),
            url: format!("https://www.youtube.com/watch?v={}", id),
            title: format!("Video {}", id),
        }
    }

    fn rate_limited(id: &str) -> FetchOutcome {
        FetchOutcome::Retryable(SubtitleError::RateLimited { video_id: id.into() })
    }

    fn processor(dir: &TempDir, source: ScriptedSource, mode: SaveMode) -> BatchProcessor<ScriptedSource> {
        let mut config = BatchConfig::default().without_delays();
        config.persist_mode = mode;
        let store = RecordStore::new(&PathsConfig::under(dir.path().to_path_buf()));
        BatchProcessor::new(config, "en", store, source)
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::default().with("a", vec![rate_limited("a"), FetchOutcome::Fetched("hello".into())]);
        let batch = processor(&dir, source, SaveMode::Append);

        let result = batch.run(vec![entry("a")], vec![], &CookieBundle::anonymous(), None).await.unwrap();

        assert_eq!(batch.source.calls_for("a"), 2);
        assert_eq!(result.successful, 1);
        assert_eq!(result.results[0].attempts, 2);
        let stored = batch.store.load_subtitle_records().await.unwrap();
        assert_eq!(stored[0].subtitles.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_recorded_as_null() {
        let dir = TempDir::new().unwrap();
        let bot = FetchOutcome::Permanent(SubtitleError::BotDetection { video_id: "b".into() });
        let source = ScriptedSource::default().with("b", vec![bot]);
        let batch = processor(&dir, source, SaveMode::Replace);

        let result = batch.run(vec![entry("b")], vec![], &CookieBundle::anonymous(), None).await.unwrap();

        assert_eq!(batch.source.calls_for("b"), 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.results[0].status, FetchStatus::Failed);
        let stored = batch.store.load_subtitle_records().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].subtitles, None);
    }

    #[tokio::test]
    async fn test_retries_exhausted_after_three_attempts() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::default().with("c", vec![rate_limited("c"), rate_limited("c"), rate_limited("c")]);
        let batch = processor(&dir, source, SaveMode::Append);

        let result = batch.run(vec![entry("c")], vec![], &CookieBundle::anonymous(), None).await.unwrap();

        assert_eq!(batch.source.calls_for("c"), 3);
        assert_eq!(result.results[0].status, FetchStatus::Exhausted);
        assert!(result.results[0].error_message.as_deref().unwrap().contains("Rate limit"));
        let stored = batch.store.load_subtitle_records().await.unwrap();
        assert_eq!(stored[0].subtitles, None);
    }

    #[tokio::test]
    async fn test_cap_defers_remaining_videos() {
        let dir = TempDir::new().unwrap();
        let batch = processor(&dir, ScriptedSource::default(), SaveMode::Append);
        let pending: Vec<_> = ["1", "2", "3", "4", "5"].iter().map(|id| entry(id)).collect();

        let result = batch
            .run(pending.clone(), vec![], &CookieBundle::anonymous(), Some(2))
            .await
            .unwrap();

        assert_eq!(result.total, 5);
        assert_eq!(result.attempted, 2);
        assert_eq!(result.deferred, 3);

        let stored = batch.store.load_subtitle_records().await.unwrap();
        let stored_ids: Vec<_> = stored.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(stored_ids, vec!["1", "2"]);

        let next = crate::diff::compute_work_set(&pending, &stored);
        let next_ids: Vec<_> = next.to_process.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(next_ids, vec!["3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_fetched_record_replaces_earlier_failure() {
        let dir = TempDir::new().unwrap();
        let batch = processor(&dir, ScriptedSource::default(), SaveMode::Replace);
        batch
            .store
            .save_subtitle_records(
                &[SubtitleRecord::from_entry(entry("done"), Some("old".into())), SubtitleRecord::from_entry(entry("x"), None)],
                SaveMode::Replace,
            )
            .await
            .unwrap();
        let existing = batch.store.load_subtitle_records().await.unwrap();
        let work = crate::diff::compute_work_set(&[entry("done"), entry("x")], &existing);

        batch
            .run(work.to_process, work.already_done, &CookieBundle::anonymous(), None)
            .await
            .unwrap();

        let stored = batch.store.load_subtitle_records().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].subtitles.as_deref(), Some("old"));
        assert_eq!(stored[1].subtitles.as_deref(), Some("subs for x"));
        let raw = tokio::fs::read_to_string(batch.store.subtitles_path()).await.unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    /// Records what the subtitle store held when each video was requested
    struct StoreWatchingSource {
        store: RecordStore,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl SubtitleSource for StoreWatchingSource {
        async fn fetch(&self, video_id: &str, _language: &str, _credentials: &CookieBundle) -> FetchOutcome {
            let ids = self
                .store
                .load_subtitle_records()
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();
            self.seen.lock().unwrap().push(ids);
            FetchOutcome::Fetched(format!("subs for {}", video_id))
        }
    }

    fn watching_processor(dir: &TempDir, mode: SaveMode) -> BatchProcessor<StoreWatchingSource> {
        let mut config = BatchConfig::default().without_delays();
        config.persist_mode = mode;
        let store = RecordStore::new(&PathsConfig::under(dir.path().to_path_buf()));
        let source = StoreWatchingSource {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        };
        BatchProcessor::new(config, "en", store, source)
    }

    #[tokio::test]
    async fn test_append_mode_persists_each_record_before_next_fetch() {
        let dir = TempDir::new().unwrap();
        let batch = watching_processor(&dir, SaveMode::Append);

        batch
            .run(vec![entry("a"), entry("b"), entry("c")], vec![], &CookieBundle::anonymous(), None)
            .await
            .unwrap();

        let seen = batch.source.seen.lock().unwrap().clone();
        assert_eq!(seen[0], Vec::<String>::new());
        assert_eq!(seen[1], vec!["a"]);
        assert_eq!(seen[2], vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_replace_mode_writes_only_at_end() {
        let dir = TempDir::new().unwrap();
        let batch = watching_processor(&dir, SaveMode::Replace);

        batch
            .run(vec![entry("a"), entry("b")], vec![], &CookieBundle::anonymous(), None)
            .await
            .unwrap();

        let seen = batch.source.seen.lock().unwrap().clone();
        assert!(seen.iter().all(Vec::is_empty));
        assert_eq!(batch.store.load_subtitle_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_work_set_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let batch = processor(&dir, ScriptedSource::default(), SaveMode::Append);

        let result = batch.run(vec![], vec![], &CookieBundle::anonymous(), None).await.unwrap();

        assert_eq!(result.attempted, 0);
        assert!(!batch.store.subtitles_path().exists());
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let dir = TempDir::new().unwrap();
        let mut config = BatchConfig::default();
        config.jitter_secs = 0.0;
        let store = RecordStore::new(&PathsConfig::under(dir.path().to_path_buf()));
        let batch = BatchProcessor::new(config, "en", store, ScriptedSource::default());

        assert_eq!(batch.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(batch.backoff_delay(1), Duration::from_secs(4));
        assert_eq!(batch.backoff_delay(2), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_jitter_within_bounds() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(&PathsConfig::under(dir.path().to_path_buf()));
        let batch = BatchProcessor::new(BatchConfig::default(), "en", store, ScriptedSource::default());

        for _ in 0..50 {
            let delay = batch.backoff_delay(1).as_secs_f64();
            assert!((4.0..6.0).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_uniform_empty_range() {
        assert_eq!(uniform(0.0, 0.0), 0.0);
        assert_eq!(uniform(3.0, 1.0), 3.0);
        assert_eq!(uniform(0.0, f64::NAN), 0.0);
    }
}
