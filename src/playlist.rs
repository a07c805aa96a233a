use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PlaylistConfig;
use crate::error::{ClosetError, Result};
use crate::store::RecordStore;

/// Lists the upstream playlist with the external listing tool
#[derive(Debug, Clone)]
pub struct PlaylistFetcher {
    tool: String,
    url: String,
}

impl PlaylistFetcher {
    pub fn new(config: &PlaylistConfig) -> Self {
        Self {
            tool: config.tool.clone(),
            url: config.url.clone(),
        }
    }

    /// Raw playlist entries, one JSON object per video, in playlist order
    pub async fn fetch(&self) -> Result<Vec<Value>> {
        info!("🔍 Fetching playlist {}", self.url);

        let output = Command::new(&self.tool)
            .args(["--dump-json", "--flat-playlist", self.url.as_str()])
            .output()
            .await
            .map_err(|e| ClosetError::Tool(format!("failed to run {}: {}", self.tool, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClosetError::Tool(format!(
                "{} exited with {}: {}",
                self.tool,
                output.status,
                stderr.trim()
            )));
        }

        let entries = parse_listing(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Listing returned {} entries", entries.len());
        Ok(entries)
    }

    /// Fetch the playlist and replace the stored copy
    pub async fn refresh(&self, store: &RecordStore) -> Result<usize> {
        let entries = self.fetch().await?;
        store.save_playlist(&entries).await?;
        info!("📋 Playlist data has been fetched ({} videos)", entries.len());
        Ok(entries.len())
    }
}

/// Parse the listing tool's output: one JSON object per non-blank line
pub fn parse_listing(stdout: &str) -> Result<Vec<Value>> {
    stdout
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                ClosetError::Tool(format!("unparseable playlist listing at line {}: {}", index + 1, e))
            })
        })
        .collect()
}
