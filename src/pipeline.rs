use tracing::info;

use crate::analytics::{
    calculate_popularity, calculate_recommendations, generate_report, parse_titles, save_report_to_markdown,
    EnrichmentReport, FilmCount, Recommendation,
};
use crate::batch::{BatchProcessor, BatchResult};
use crate::config::Config;
use crate::cookies::CookieBundle;
use crate::diff::compute_work_set;
use crate::enrich::{Enricher, EnrichmentSummary, LlmExtractor, StructuredExtractor};
use crate::error::Result;
use crate::llm::create_llm;
use crate::playlist::PlaylistFetcher;
use crate::store::RecordStore;
use crate::subtitles::{SubtitleSource, YtDlpFetcher};

/// The pipeline stages, each reading and writing the record store
pub struct Pipeline {
    config: Config,
    store: RecordStore,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let store = RecordStore::new(&config.paths);
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Step 1: replace the stored playlist with a fresh listing
    pub async fn fetch_playlist(&self) -> Result<usize> {
        PlaylistFetcher::new(&self.config.playlist).refresh(&self.store).await
    }

    /// Step 2: fetch subtitles for new and previously failed videos
    pub async fn fetch_subtitles(&self) -> Result<BatchResult> {
        self.fetch_subtitles_with(YtDlpFetcher::new(&self.config.subtitles)).await
    }

    pub async fn fetch_subtitles_with<S: SubtitleSource>(&self, source: S) -> Result<BatchResult> {
        let playlist = self.store.load_playlist().await?;
        let existing = self.store.load_subtitle_records().await?;
        let work = compute_work_set(&playlist, &existing);

        info!(
            "📋 {} playlist videos, {} with subtitles, {} to process",
            playlist.len(),
            work.already_done.len(),
            work.to_process.len()
        );

        let credentials = CookieBundle::resolve(self.config.subtitles.cookies_file.as_deref());
        if !work.is_empty() {
            credentials.log_status(
                self.config.subtitles.cookie_warn_days,
                self.config.subtitles.cookie_stale_days,
            );
        }

        let processor = BatchProcessor::new(
            self.config.batch.clone(),
            self.config.subtitles.language.clone(),
            self.store.clone(),
            source,
        );
        processor
            .run(
                work.to_process,
                work.already_done,
                &credentials,
                self.config.batch.max_videos_per_run,
            )
            .await
    }

    /// Step 3: structured extraction with the configured LLM
    pub async fn enrich(&self) -> Result<EnrichmentSummary> {
        let llm = create_llm(&self.config.llm)?;
        info!("🤖 Enriching with {:?} ({})", llm.provider_type(), self.config.llm.model);
        self.enrich_with(LlmExtractor::new(llm)).await
    }

    pub async fn enrich_with<E: StructuredExtractor>(&self, extractor: E) -> Result<EnrichmentSummary> {
        Enricher::new(self.store.clone(), extractor).run().await
    }

    /// Playlist, subtitles and enrichment in order; the first failure stops the run
    pub async fn run_all(&self) -> Result<()> {
        info!("🚀 Starting the data processing pipeline...");

        info!("Step 1: Fetching new videos...");
        self.fetch_playlist().await?;

        info!("Step 2: Fetching subtitles...");
        self.fetch_subtitles().await?;

        info!("Step 3: Enriching data with structured information...");
        self.enrich().await?;

        info!("🎉 Pipeline finished successfully");
        Ok(())
    }

    pub async fn popularity(&self) -> Result<Vec<FilmCount>> {
        let records = self.store.load_enriched_records_required().await?;
        Ok(calculate_popularity(&records))
    }

    pub async fn recommend(&self, query: &str) -> Result<Vec<Recommendation>> {
        let records = self.store.load_enriched_records_required().await?;
        Ok(calculate_recommendations(&records, &parse_titles(query)))
    }

    /// Compute the completeness report and write it to the configured path
    pub async fn report(&self) -> Result<EnrichmentReport> {
        let records = self.store.load_enriched_records_required().await?;
        let report = generate_report(&records);
        save_report_to_markdown(&report, &self.config.paths.report_file).await?;
        Ok(report)
    }
}
