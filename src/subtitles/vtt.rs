use regex::Regex;
use std::time::Duration;

/// Turns a WebVTT (or SRT) caption file into readable transcript text.
///
/// Output keeps one `[HH:MM:SS]` marker per distinct minute of cue start
/// times, drops headers, cue numbers, timing lines and inline markup, and
/// collapses lines repeated by overlapping auto-generated cues. Marker lines
/// are recognised on input as well, so cleaning already-cleaned text is a
/// no-op.
#[derive(Debug, Clone)]
pub struct TranscriptCleaner {
    tag_re: Regex,
    cue_start_re: Regex,
    marker_re: Regex,
}

impl TranscriptCleaner {
    pub fn new() -> Self {
        Self {
            tag_re: Regex::new(r"<[^>]+>").unwrap(),
            cue_start_re: Regex::new(r"^(?:(\d+):)?(\d{2}):(\d{2})[.,]\d{3}").unwrap(),
            marker_re: Regex::new(r"^\[(\d{2,}):(\d{2}):(\d{2})\]$").unwrap(),
        }
    }

    pub fn clean(&self, raw: &str) -> String {
        let mut cleaned: Vec<String> = Vec::new();
        let mut last_minute: Option<u64> = None;
        // Markers never reset this, so repeats across a minute boundary collapse
        let mut prev_text: Option<String> = None;

        for raw_line in raw.lines() {
            let stripped = self.tag_re.replace_all(raw_line.trim(), "");
            let line = stripped.trim();

            if line.is_empty() || is_header(line) {
                continue;
            }

            let timestamp = if line.contains("-->") {
                match self.cue_start(line) {
                    Some(start) => Some(start),
                    None => continue,
                }
            } else {
                self.marker_time(line)
            };

            if let Some(start) = timestamp {
                let minute = start.as_secs() / 60;
                if last_minute != Some(minute) {
                    cleaned.push(format_marker(start));
                    last_minute = Some(minute);
                }
                continue;
            }

            // Cue index
            if line.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            if prev_text.as_deref() == Some(line) {
                continue;
            }
            prev_text = Some(line.to_string());
            cleaned.push(line.to_string());
        }

        cleaned.join("\n")
    }

    /// Start time of a cue timing line (`00:01:02.000 --> ...` or `01:02.000 --> ...`)
    fn cue_start(&self, line: &str) -> Option<Duration> {
        let caps = self.cue_start_re.captures(line)?;
        let hours = caps.get(1).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let minutes: u64 = caps[2].parse().ok()?;
        let seconds: u64 = caps[3].parse().ok()?;
        Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
    }

    /// Time of a previously emitted `[HH:MM:SS]` marker
    fn marker_time(&self, line: &str) -> Option<Duration> {
        let caps = self.marker_re.captures(line)?;
        let hours: u64 = caps[1].parse().ok()?;
        let minutes: u64 = caps[2].parse().ok()?;
        let seconds: u64 = caps[3].parse().ok()?;
        Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
    }
}

impl Default for TranscriptCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Clean a raw caption file with a fresh [`TranscriptCleaner`]
pub fn clean_transcript(raw: &str) -> String {
    TranscriptCleaner::new().clean(raw)
}

fn is_header(line: &str) -> bool {
    line.starts_with("WEBVTT") || line.starts_with("Kind:") || line.starts_with("Language:")
}

/// Format a cue start as a coarse transcript marker (`[HH:MM:SS]`)
fn format_marker(start: Duration) -> String {
    let total_seconds = start.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("[{:02}:{:02}:{:02}]", hours, minutes, seconds)
}
