use std::collections::HashMap;

use crate::enrich::EnrichedRecord;

/// How many videos picked a film
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmCount {
    pub title: String,
    pub count: usize,
}

/// Count picks per film title, most picked first.
///
/// Titles are compared exactly; ties keep the order in which titles first
/// appear in the store.
pub fn calculate_popularity(records: &[EnrichedRecord]) -> Vec<FilmCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<FilmCount> = Vec::new();

    for title in records.iter().flat_map(EnrichedRecord::movie_titles) {
        match index.get(title) {
            Some(&position) => counts[position].count += 1,
            None => {
                index.insert(title, counts.len());
                counts.push(FilmCount {
                    title: title.to_string(),
                    count: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}
