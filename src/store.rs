//! Flat-file record store.
//!
//! The playlist is a single pretty-printed JSON array. Subtitle and enriched
//! records are newline-delimited JSON so that a run can append one record at a
//! time and lose at most the in-flight record on a crash.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::PathsConfig;
use crate::enrich::EnrichedRecord;
use crate::error::{ClosetError, Result};

/// One video as listed by the upstream playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Persisted outcome of one subtitle fetch attempt.
///
/// `subtitles` is `None` (serialized as `null`) when the attempt failed; such
/// records stay eligible for another attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleRecord {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitles: Option<String>,
}

impl SubtitleRecord {
    pub fn from_entry(entry: PlaylistEntry, subtitles: Option<String>) -> Self {
        Self {
            id: entry.id,
            url: entry.url,
            title: entry.title,
            subtitles,
        }
    }

    pub fn has_subtitles(&self) -> bool {
        self.subtitles.is_some()
    }

    /// Project back to the playlist identity fields
    pub fn to_entry(&self) -> PlaylistEntry {
        PlaylistEntry {
            id: self.id.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
        }
    }
}

/// Anything stored by id in a record file
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for PlaylistEntry {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for SubtitleRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// How a record collection is written back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Rewrite the whole file
    Replace,
    /// Add records to the end of the file
    Append,
}

/// Deduplicate by id keeping the last occurrence, preserving first-seen order.
pub fn merge_last_write_wins<T: Keyed>(records: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<T> = Vec::new();

    for record in records {
        match index.get(record.key()) {
            Some(&position) => merged[position] = record,
            None => {
                index.insert(record.key().to_string(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}

/// Reads and writes the pipeline's record files
#[derive(Debug, Clone)]
pub struct RecordStore {
    playlist_path: PathBuf,
    subtitles_path: PathBuf,
    enriched_path: PathBuf,
}

impl RecordStore {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            playlist_path: paths.playlist_file.clone(),
            subtitles_path: paths.subtitles_file.clone(),
            enriched_path: paths.enriched_file.clone(),
        }
    }

    pub fn playlist_path(&self) -> &Path {
        &self.playlist_path
    }

    pub fn subtitles_path(&self) -> &Path {
        &self.subtitles_path
    }

    pub fn enriched_path(&self) -> &Path {
        &self.enriched_path
    }

    /// Load the playlist. A missing file is fatal: the playlist must be fetched first.
    pub async fn load_playlist(&self) -> Result<Vec<PlaylistEntry>> {
        if !fs::try_exists(&self.playlist_path).await? {
            return Err(ClosetError::NotFound(self.playlist_path.clone()));
        }

        let content = fs::read_to_string(&self.playlist_path).await?;
        let entries: Vec<PlaylistEntry> =
            serde_json::from_str(&content).map_err(|source| ClosetError::Parse {
                path: self.playlist_path.clone(),
                line: source.line(),
                source,
            })?;

        for entry in &entries {
            validate_id(&self.playlist_path, &entry.id)?;
        }

        debug!("📋 Loaded {} playlist entries", entries.len());
        Ok(entries)
    }

    /// Persist the raw playlist document as returned by the listing tool
    pub async fn save_playlist(&self, entries: &[serde_json::Value]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomically(&self.playlist_path, json.as_bytes()).await?;
        info!("💾 Saved {} playlist entries to {}", entries.len(), self.playlist_path.display());
        Ok(())
    }

    /// Load subtitle records; an absent file is the first-run case and yields
    /// an empty collection. Corruption is an error.
    pub async fn load_subtitle_records(&self) -> Result<Vec<SubtitleRecord>> {
        if !fs::try_exists(&self.subtitles_path).await? {
            debug!("No subtitle store at {}, starting fresh", self.subtitles_path.display());
            return Ok(Vec::new());
        }

        let records: Vec<SubtitleRecord> = read_jsonl(&self.subtitles_path).await?;
        for record in &records {
            validate_id(&self.subtitles_path, &record.id)?;
        }

        Ok(merge_last_write_wins(records))
    }

    /// Like [`Self::load_subtitle_records`] but the file must exist
    pub async fn load_subtitle_records_required(&self) -> Result<Vec<SubtitleRecord>> {
        if !fs::try_exists(&self.subtitles_path).await? {
            return Err(ClosetError::NotFound(self.subtitles_path.clone()));
        }
        self.load_subtitle_records().await
    }

    pub async fn save_subtitle_records(&self, records: &[SubtitleRecord], mode: SaveMode) -> Result<()> {
        match mode {
            SaveMode::Replace => {
                let merged = merge_last_write_wins(records.iter().cloned());
                write_jsonl(&self.subtitles_path, &merged).await?;
                debug!("💾 Rewrote {} subtitle records", merged.len());
            }
            SaveMode::Append => {
                append_jsonl(&self.subtitles_path, records).await?;
                debug!("💾 Appended {} subtitle records", records.len());
            }
        }
        Ok(())
    }

    /// Enriched records; empty when the file does not exist yet
    pub async fn load_enriched_records(&self) -> Result<Vec<EnrichedRecord>> {
        if !fs::try_exists(&self.enriched_path).await? {
            return Ok(Vec::new());
        }
        read_jsonl(&self.enriched_path).await
    }

    /// Enriched records for the analytics commands, which cannot run without them
    pub async fn load_enriched_records_required(&self) -> Result<Vec<EnrichedRecord>> {
        if !fs::try_exists(&self.enriched_path).await? {
            return Err(ClosetError::NotFound(self.enriched_path.clone()));
        }
        read_jsonl(&self.enriched_path).await
    }

    pub async fn save_enriched_records(&self, records: &[EnrichedRecord]) -> Result<()> {
        write_jsonl(&self.enriched_path, records).await
    }
}

fn validate_id(path: &Path, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(ClosetError::InvalidRecord {
            path: path.to_path_buf(),
            reason: "record has an empty id".to_string(),
        });
    }
    Ok(())
}

/// Read newline-delimited JSON. Blank lines are skipped; any malformed line
/// fails the whole read with its 1-based line number.
pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path).await?;
    let mut records = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| ClosetError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}

fn encode_jsonl<T: Serialize>(records: &[T]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buffer, record)?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

/// Replace the file's contents with one JSON object per line
pub async fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let buffer = encode_jsonl(records)?;
    write_atomically(path, &buffer).await
}

/// Append records, one per line, and flush them to disk before returning
pub async fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    ensure_parent(path).await?;

    let buffer = encode_jsonl(records)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Write to a sibling temporary file and rename it over the target, so a
/// crash mid-write leaves the previous contents intact.
async fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(path).await?;

    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp_path, path).await?;
    Ok(())
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}
