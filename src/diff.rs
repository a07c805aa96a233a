//! Work-set reconciliation between the playlist and prior subtitle attempts

use std::collections::HashSet;

use crate::store::{PlaylistEntry, SubtitleRecord};

/// Videos to fetch this run, and the records that are already complete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSet {
    pub to_process: Vec<PlaylistEntry>,
    pub already_done: Vec<SubtitleRecord>,
}

impl WorkSet {
    pub fn is_empty(&self) -> bool {
        self.to_process.is_empty()
    }
}

/// Compute which videos need a (re)fetch.
///
/// `to_process` holds playlist entries never attempted, in playlist order,
/// followed by previously failed records in store order. Ids with a
/// successful record are never included, even if they also appear as failed
/// or new. The first instance of a duplicated id wins.
pub fn compute_work_set(playlist: &[PlaylistEntry], existing: &[SubtitleRecord]) -> WorkSet {
    if existing.is_empty() {
        return WorkSet {
            to_process: dedup_entries(playlist.iter().cloned(), &HashSet::new()),
            already_done: Vec::new(),
        };
    }

    let (already_done, failed): (Vec<SubtitleRecord>, Vec<SubtitleRecord>) = existing
        .iter()
        .cloned()
        .partition(SubtitleRecord::has_subtitles);

    let attempted: HashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    let done_ids: HashSet<&str> = already_done.iter().map(|r| r.id.as_str()).collect();

    let new_videos = playlist
        .iter()
        .filter(|entry| !attempted.contains(entry.id.as_str()))
        .cloned();
    let retries = failed.iter().map(SubtitleRecord::to_entry);

    let to_process = dedup_entries(new_videos.chain(retries), &done_ids);

    WorkSet {
        to_process,
        already_done,
    }
}

fn dedup_entries(
    entries: impl Iterator<Item = PlaylistEntry>,
    excluded: &HashSet<&str>,
) -> Vec<PlaylistEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    entries
        .filter(|entry| !excluded.contains(entry.id.as_str()))
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> PlaylistEntry {
        PlaylistEntry {
            id: id.to_string(),
            url: format!("https://www.youtube.com/watch?v={}", id),
            title: format!("Title {}", id),
        }
    }

    fn record(id: &str, subtitles: Option<&str>) -> SubtitleRecord {
        SubtitleRecord::from_entry(entry(id), subtitles.map(str::to_string))
    }

    fn ids(entries: &[PlaylistEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_first_run_processes_whole_playlist() {
        let playlist = vec![entry("1"), entry("2"), entry("3")];
        let work = compute_work_set(&playlist, &[]);

        assert_eq!(ids(&work.to_process), vec!["1", "2", "3"]);
        assert!(work.already_done.is_empty());
    }

    #[test]
    fn test_new_and_failed_videos_are_reprocessed() {
        let playlist = vec![entry("1"), entry("2"), entry("3"), entry("4")];
        let existing = vec![record("1", Some("hi")), record("3", None)];

        let work = compute_work_set(&playlist, &existing);

        let mut to_process = ids(&work.to_process);
        to_process.sort();
        assert_eq!(to_process, vec!["2", "3", "4"]);
        assert_eq!(work.already_done, vec![record("1", Some("hi"))]);
    }

    #[test]
    fn test_new_videos_come_before_retries() {
        let playlist = vec![entry("a"), entry("b"), entry("c")];
        let existing = vec![record("b", None)];

        let work = compute_work_set(&playlist, &existing);
        assert_eq!(ids(&work.to_process), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_done_ids_never_reprocessed() {
        // A failed record and a success for the same id: success wins
        let playlist = vec![entry("1"), entry("2")];
        let existing = vec![record("1", None), record("1", Some("text"))];

        let work = compute_work_set(&playlist, &existing);
        assert_eq!(ids(&work.to_process), vec!["2"]);
    }

    #[test]
    fn test_failed_orphans_are_still_retried() {
        let playlist = vec![entry("1")];
        let existing = vec![record("1", Some("ok")), record("gone", None)];

        let work = compute_work_set(&playlist, &existing);
        assert_eq!(ids(&work.to_process), vec!["gone"]);
    }

    #[test]
    fn test_duplicate_playlist_ids_collapse() {
        let playlist = vec![entry("1"), entry("1"), entry("2")];
        let work = compute_work_set(&playlist, &[]);
        assert_eq!(ids(&work.to_process), vec!["1", "2"]);
    }

    #[test]
    fn test_diff_is_idempotent() {
        let playlist = vec![entry("1"), entry("2"), entry("3")];
        let existing = vec![record("2", None), record("3", Some("x"))];

        let first = compute_work_set(&playlist, &existing);
        let second = compute_work_set(&playlist, &existing);
        assert_eq!(first, second);
    }

    #[test]
    fn test_to_process_disjoint_from_done() {
        let playlist: Vec<_> = (0..20).map(|i| entry(&i.to_string())).collect();
        let existing: Vec<_> = (0..20)
            .filter(|i| i % 3 != 0)
            .map(|i| record(&i.to_string(), (i % 2 == 0).then_some("subs")))
            .collect();

        let work = compute_work_set(&playlist, &existing);
        let done: HashSet<&str> = existing
            .iter()
            .filter(|r| r.has_subtitles())
            .map(|r| r.id.as_str())
            .collect();

        assert!(work.to_process.iter().all(|e| !done.contains(e.id.as_str())));
        assert_eq!(work.to_process.len() + work.already_done.len(), playlist.len());
    }
}
