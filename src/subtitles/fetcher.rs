use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

use super::vtt::TranscriptCleaner;
use super::{FetchOutcome, SubtitleError, SubtitleSource};
use crate::config::SubtitleConfig;
use crate::cookies::CookieBundle;

/// Which caption track to ask the download tool for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptionKind {
    /// Uploaded by the channel
    Manual,
    /// Generated by the upstream's speech recognition
    Automatic,
}

impl CaptionKind {
    fn flag(self) -> &'static str {
        match self {
            CaptionKind::Manual => "--write-sub",
            CaptionKind::Automatic => "--write-auto-sub",
        }
    }
}

/// Downloads subtitles with `yt-dlp`, manual captions first and
/// auto-generated ones as a fallback.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    tool: String,
    user_agent: String,
    cleaner: TranscriptCleaner,
}

impl YtDlpFetcher {
    pub fn new(config: &SubtitleConfig) -> Self {
        Self {
            tool: config.tool.clone(),
            user_agent: config.user_agent.clone(),
            cleaner: TranscriptCleaner::new(),
        }
    }

    /// Fetch and clean one video's transcript.
    ///
    /// Everything is downloaded into a scratch directory owned by this call;
    /// the directory is removed when the `TempDir` guard drops, whichever
    /// way the function returns.
    pub async fn fetch_transcript(
        &self,
        video_id: &str,
        language: &str,
        credentials: &CookieBundle,
    ) -> Result<String, SubtitleError> {
        let scratch = tempfile::Builder::new()
            .prefix("closet-subs-")
            .tempdir()
            .map_err(|e| unexpected(video_id, e))?;

        self.download(video_id, language, scratch.path(), credentials).await?;

        let vtt_path = find_vtt(scratch.path())
            .await
            .map_err(|e| unexpected(video_id, e))?
            .ok_or_else(|| SubtitleError::NoSubtitles {
                video_id: video_id.to_string(),
            })?;

        let raw = tokio::fs::read_to_string(&vtt_path)
            .await
            .map_err(|e| unexpected(video_id, e))?;

        debug!("📝 Read {} bytes of captions for {}", raw.len(), video_id);
        Ok(self.cleaner.clean(&raw))
    }

    async fn download(
        &self,
        video_id: &str,
        language: &str,
        scratch: &Path,
        credentials: &CookieBundle,
    ) -> Result<(), SubtitleError> {
        let manual = self
            .run_tool(video_id, language, scratch, credentials, CaptionKind::Manual)
            .await?;

        if has_vtt(scratch).await {
            return Ok(());
        }

        // A recognised upstream signal (rate limit, bot check, ...) will not
        // go away by asking for a different track.
        if !manual.status.success() {
            let error = classify_failure(video_id, &diagnostics(&manual));
            if !matches!(error, SubtitleError::DownloadFailed { .. }) {
                return Err(error);
            }
        }

        debug!("No manual subtitles for {}, trying auto-generated", video_id);
        let automatic = self
            .run_tool(video_id, language, scratch, credentials, CaptionKind::Automatic)
            .await?;

        if !automatic.status.success() && !has_vtt(scratch).await {
            return Err(classify_failure(video_id, &diagnostics(&automatic)));
        }

        Ok(())
    }

    async fn run_tool(
        &self,
        video_id: &str,
        language: &str,
        scratch: &Path,
        credentials: &CookieBundle,
        kind: CaptionKind,
    ) -> Result<Output, SubtitleError> {
        let args = self.build_args(video_id, language, scratch, credentials, kind);
        debug!("Running {} {:?} subtitles for {}", self.tool, kind, video_id);

        Command::new(&self.tool)
            .args(&args)
            .output()
            .await
            .map_err(|e| unexpected(video_id, format!("failed to run {}: {}", self.tool, e)))
    }

    /// Command line for one download attempt
    fn build_args(
        &self,
        video_id: &str,
        language: &str,
        scratch: &Path,
        credentials: &CookieBundle,
        kind: CaptionKind,
    ) -> Vec<String> {
        let output_template = scratch.join("%(id)s.%(ext)s");
        let mut args: Vec<String> = vec![
            "--skip-download".into(),
            "--sub-format".into(),
            "vtt".into(),
            "-o".into(),
            output_template.to_string_lossy().into_owned(),
            watch_url(video_id),
        ];

        if let Some(cookies) = credentials.path() {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().into_owned());
        }

        // Client selection and pacing that keep the upstream's bot checks quiet
        args.extend(
            [
                "--extractor-args",
                "youtube:player_client=android,web",
                "--extractor-args",
                "youtube:player_skip=webpage,configs",
                "--user-agent",
                self.user_agent.as_str(),
                "--sleep-requests",
                "1",
                "--sleep-subtitles",
                "1",
                "--no-check-certificates",
                "--prefer-free-formats",
            ]
            .map(String::from),
        );

        args.push(kind.flag().into());
        args.push("--sub-lang".into());
        args.push(language.into());
        args
    }
}

#[async_trait]
impl SubtitleSource for YtDlpFetcher {
    async fn fetch(&self, video_id: &str, language: &str, credentials: &CookieBundle) -> FetchOutcome {
        let result = self.fetch_transcript(video_id, language, credentials).await;
        if let Ok(text) = &result {
            info!("📥 Downloaded {} characters of subtitles for {}", text.len(), video_id);
        }
        FetchOutcome::from(result)
    }
}

/// Map the download tool's diagnostic output to a failure kind
pub fn classify_failure(video_id: &str, diagnostics: &str) -> SubtitleError {
    let video_id = video_id.to_string();
    let lowered = diagnostics.to_lowercase();

    if diagnostics.contains("429") {
        SubtitleError::RateLimited { video_id }
    } else if diagnostics.contains("Sign in to confirm") || diagnostics.contains("not a bot") {
        SubtitleError::BotDetection { video_id }
    } else if lowered.contains("not available on this app") {
        SubtitleError::Blocked { video_id }
    } else if lowered.contains("login required") || lowered.contains("members-only") {
        SubtitleError::AuthenticationRequired { video_id }
    } else {
        SubtitleError::DownloadFailed {
            video_id,
            message: diagnostics.trim().to_string(),
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

fn diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr.into_owned()
    }
}

fn unexpected(video_id: &str, error: impl ToString) -> SubtitleError {
    SubtitleError::Unexpected {
        video_id: video_id.to_string(),
        message: error.to_string(),
    }
}

async fn has_vtt(dir: &Path) -> bool {
    matches!(find_vtt(dir).await, Ok(Some(_)))
}

/// First `.vtt` file in `dir`, by file name
async fn find_vtt(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "vtt") {
            found.push(path);
        }
    }

    found.sort();
    Ok(found.into_iter().next())
}
