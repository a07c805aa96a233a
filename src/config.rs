use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClosetError, Result};
use crate::llm::LLMConfig;
use crate::store::SaveMode;

/// Cookie file name looked up inside the data directory by default
const DEFAULT_COOKIES_FILE: &str = "cookies.txt";

/// Upper bound on fetch attempts per video; the backoff doubles each time
const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Configuration for the Criterion Closet pipeline.
///
/// Built once at startup and handed to each stage; nothing reads paths or
/// limits from process-wide state after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Record store locations
    pub paths: PathsConfig,

    /// Playlist listing settings
    pub playlist: PlaylistConfig,

    /// Subtitle download settings
    pub subtitles: SubtitleConfig,

    /// Batch orchestration settings
    pub batch: BatchConfig,

    /// LLM settings for structured enrichment
    pub llm: LLMConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding all record files
    pub data_dir: PathBuf,

    /// Playlist document (JSON array)
    pub playlist_file: PathBuf,

    /// Subtitle records (one JSON object per line)
    pub subtitles_file: PathBuf,

    /// Enriched records (one JSON object per line)
    pub enriched_file: PathBuf,

    /// Markdown completeness report
    pub report_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Public playlist to mirror
    pub url: String,

    /// External listing tool
    pub tool: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    /// External download tool
    pub tool: String,

    /// Subtitle language requested from the upstream
    pub language: String,

    /// Browser-exported cookie bundle (Netscape format)
    pub cookies_file: Option<PathBuf>,

    /// Cookie age (days) above which a refresh is suggested
    pub cookie_warn_days: i64,

    /// Cookie age (days) above which the bundle is considered stale
    pub cookie_stale_days: i64,

    /// User agent passed to the download tool
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum videos processed per run (None = unlimited)
    pub max_videos_per_run: Option<usize>,

    /// Attempts per video, including the first
    pub max_attempts: u32,

    /// Backoff base delay in seconds, doubled per attempt
    pub base_delay_secs: f64,

    /// Upper bound of the random jitter added to each backoff (seconds)
    pub jitter_secs: f64,

    /// Lower bound of the pause between videos (seconds)
    pub item_delay_min_secs: f64,

    /// Upper bound of the pause between videos (seconds)
    pub item_delay_max_secs: f64,

    /// How fetched records are persisted while the run progresses
    pub persist_mode: SaveMode,
}

impl BatchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_secs.max(0.0))
    }

    /// Configuration with every wait removed. Used by tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.base_delay_secs = 0.0;
        self.jitter_secs = 0.0;
        self.item_delay_min_secs = 0.0;
        self.item_delay_max_secs = 0.0;
        self
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// environment overrides. Falls back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::search_default_locations()?.unwrap_or_default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn search_default_locations() -> Result<Option<Self>> {
        let config_paths = ["closet.toml", "config/closet.toml"];

        for path in config_paths {
            let path = Path::new(path);
            if path.exists() {
                return Self::from_file(path).map(Some);
            }
        }

        Ok(None)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&config_str).map_err(|e| {
            ClosetError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Override settings from environment variables.
    ///
    /// `lookup` abstracts `std::env::var` so overrides can be exercised
    /// without touching the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MAX_VIDEOS_PER_RUN") {
            let value = value.trim();
            if value.is_empty() {
                self.batch.max_videos_per_run = None;
            } else {
                match value.parse::<usize>() {
                    Ok(0) => self.batch.max_videos_per_run = None,
                    Ok(limit) => self.batch.max_videos_per_run = Some(limit),
                    Err(e) => tracing::warn!("Ignoring invalid MAX_VIDEOS_PER_RUN={:?}: {}", value, e),
                }
            }
        }

        if let Some(path) = lookup("YOUTUBE_COOKIES_FILE").filter(|p| !p.trim().is_empty()) {
            self.subtitles.cookies_file = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("CLOSET_PLAYLIST_URL").filter(|u| !u.trim().is_empty()) {
            self.playlist.url = url;
        }

        if let Some(api_key) = lookup("CLOSET_LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }

        if let Some(endpoint) = lookup("CLOSET_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        if let Some(model) = lookup("CLOSET_LLM_MODEL") {
            self.llm.model = model;
        }
    }

    /// Point every record file at `data_dir`. A cookies file still at its
    /// default location moves along; an explicitly configured one stays put.
    pub fn relocate_data_dir(&mut self, data_dir: PathBuf) {
        let default_cookies = self.paths.data_dir.join(DEFAULT_COOKIES_FILE);
        if self.subtitles.cookies_file.as_deref() == Some(default_cookies.as_path()) {
            self.subtitles.cookies_file = Some(data_dir.join(DEFAULT_COOKIES_FILE));
        }
        self.paths = PathsConfig::under(data_dir);
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch.max_attempts == 0 {
            return Err(ClosetError::Config("max_attempts must be greater than 0".into()));
        }

        if self.batch.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ClosetError::Config(format!(
                "max_attempts must not exceed {}",
                MAX_ATTEMPTS_LIMIT
            )));
        }

        let delays = [
            ("base_delay_secs", self.batch.base_delay_secs),
            ("jitter_secs", self.batch.jitter_secs),
            ("item_delay_min_secs", self.batch.item_delay_min_secs),
            ("item_delay_max_secs", self.batch.item_delay_max_secs),
        ];
        for (name, value) in delays {
            if !value.is_finite() || value < 0.0 {
                return Err(ClosetError::Config(format!(
                    "{} must be a non-negative number of seconds, got {}",
                    name, value
                )));
            }
        }

        if self.batch.item_delay_min_secs > self.batch.item_delay_max_secs {
            return Err(ClosetError::Config(
                "item_delay_min_secs must not exceed item_delay_max_secs".into(),
            ));
        }

        if self.subtitles.language.trim().is_empty() {
            return Err(ClosetError::Config("subtitle language must be set".into()));
        }

        if self.subtitles.cookie_warn_days > self.subtitles.cookie_stale_days {
            return Err(ClosetError::Config(
                "cookie_warn_days must not exceed cookie_stale_days".into(),
            ));
        }

        if self.playlist.url.trim().is_empty() {
            return Err(ClosetError::Config("playlist url must be set".into()));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Criterion Closet Configuration:\n\
            - Playlist: {}\n\
            - Data Directory: {}\n\
            - Subtitle Language: {}\n\
            - Max Videos Per Run: {}\n\
            - Persist Mode: {:?}\n\
            - LLM Provider: {:?}",
            self.playlist.url,
            self.paths.data_dir.display(),
            self.subtitles.language,
            self.batch
                .max_videos_per_run
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
            self.batch.persist_mode,
            self.llm.provider,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            playlist: PlaylistConfig::default(),
            subtitles: SubtitleConfig::default(),
            batch: BatchConfig::default(),
            llm: LLMConfig::default(),
        }
    }
}

impl PathsConfig {
    /// All record files placed under `data_dir`, report at the working directory
    pub fn under(data_dir: PathBuf) -> Self {
        Self {
            playlist_file: data_dir.join("playlist.json"),
            subtitles_file: data_dir.join("playlist_with_subtitles.json"),
            enriched_file: data_dir.join("enriched_playlist.json"),
            report_file: PathBuf::from("report.md"),
            data_dir,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under(PathBuf::from("data"))
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            url: "https://www.youtube.com/playlist?list=PL7D89754A5DAD1E8E".to_string(),
            tool: "yt-dlp".to_string(),
        }
    }
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            tool: "yt-dlp".to_string(),
            language: "en".to_string(),
            cookies_file: Some(PathBuf::from("data").join(DEFAULT_COOKIES_FILE)),
            cookie_warn_days: 14,
            cookie_stale_days: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_videos_per_run: None,
            max_attempts: 3,
            base_delay_secs: 2.0,
            jitter_secs: 2.0,
            item_delay_min_secs: 2.0,
            item_delay_max_secs: 4.0,
            persist_mode: SaveMode::Append,
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.config.relocate_data_dir(dir);
        self
    }

    pub fn with_max_videos_per_run(mut self, limit: Option<usize>) -> Self {
        self.config.batch.max_videos_per_run = limit;
        self
    }

    pub fn with_cookies_file(mut self, path: Option<PathBuf>) -> Self {
        self.config.subtitles.cookies_file = path;
        self
    }

    pub fn with_persist_mode(mut self, mode: SaveMode) -> Self {
        self.config.batch.persist_mode = mode;
        self
    }

    pub fn without_delays(mut self) -> Self {
        self.config.batch = self.config.batch.without_delays();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
