use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::enrich::EnrichedRecord;

/// Maximum number of rows shown when the top score is not shared widely
const DISPLAY_LIMIT: usize = 10;

/// A film suggested by co-occurrence with the queried titles
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// Lower-cased title
    pub movie: String,
    pub lift_sum: f64,
    pub weighted_average: f64,
    /// Number of queried titles it co-occurs with
    pub frequency: usize,
    pub description: Option<String>,
}

impl Recommendation {
    /// Title with each word capitalized, for display
    pub fn display_title(&self) -> String {
        title_case(&self.movie)
    }
}

/// Split a comma-separated query into trimmed, lower-cased titles
pub fn parse_titles(query: &str) -> Vec<String> {
    query
        .split(',')
        .map(|title| title.trim().to_lowercase())
        .filter(|title| !title.is_empty())
        .collect()
}

/// Records whose fields are all present. Only these take part in co-occurrence.
fn complete_records(records: &[EnrichedRecord]) -> impl Iterator<Item = &EnrichedRecord> {
    records.iter().filter(|r| {
        r.subtitles.is_some() && r.guest.is_some() && r.year.is_some() && r.movies.is_some()
    })
}

/// `(video id, lower-cased title)` for every pick
pub fn movie_pairs(records: &[EnrichedRecord]) -> Vec<(&str, String)> {
    complete_records(records)
        .flat_map(|record| {
            record
                .movies
                .iter()
                .flatten()
                .filter_map(|m| m.title.as_deref())
                .map(move |title| (record.id.as_str(), title.to_lowercase()))
        })
        .collect()
}

/// Rank films by lift against the queried titles.
///
/// For an ordered pair of distinct films picked in the same video,
/// `lift = co_occurrence / (popularity_a * popularity_b)`. Candidates are
/// scored over pairs whose first film is in `titles`, then sorted by
/// `lift_sum`, `weighted_average` and `frequency`, all descending.
pub fn calculate_recommendations(records: &[EnrichedRecord], titles: &[String]) -> Vec<Recommendation> {
    let pairs = movie_pairs(records);

    let mut popularity: HashMap<&str, usize> = HashMap::new();
    let mut by_video: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (id, movie) in &pairs {
        *popularity.entry(movie.as_str()).or_default() += 1;
        by_video.entry(*id).or_default().push(movie.as_str());
    }

    let mut co_occurrence: HashMap<(&str, &str), usize> = HashMap::new();
    for movies in by_video.values() {
        for &a in movies {
            for &b in movies {
                if a != b {
                    *co_occurrence.entry((a, b)).or_default() += 1;
                }
            }
        }
    }

    let query: HashSet<&str> = titles.iter().map(String::as_str).collect();
    let mut scores: HashMap<&str, (f64, f64, usize)> = HashMap::new();
    for (&(a, b), &count) in &co_occurrence {
        if !query.contains(a) {
            continue;
        }
        let pop_b = popularity[b] as f64;
        let lift = count as f64 / (popularity[a] as f64 * pop_b);

        let score = scores.entry(b).or_insert((0.0, 0.0, 0));
        score.0 += lift;
        score.1 += lift / pop_b;
        score.2 += 1;
    }

    let descriptions = descriptions(records);
    let mut recommendations: Vec<Recommendation> = scores
        .into_iter()
        .map(|(movie, (lift_sum, weighted_average, frequency))| Recommendation {
            movie: movie.to_string(),
            lift_sum,
            weighted_average,
            frequency,
            description: descriptions.get(movie).cloned(),
        })
        .collect();

    recommendations.sort_by(compare_scores);
    recommendations
}

fn compare_scores(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.lift_sum
        .total_cmp(&a.lift_sum)
        .then_with(|| b.weighted_average.total_cmp(&a.weighted_average))
        .then_with(|| b.frequency.cmp(&a.frequency))
        .then_with(|| a.movie.cmp(&b.movie))
}

/// First description seen for each lower-cased title
fn descriptions(records: &[EnrichedRecord]) -> HashMap<String, String> {
    let mut found = HashMap::new();
    for movie in complete_records(records).flat_map(|r| r.movies.iter().flatten()) {
        if let (Some(title), Some(description)) = (&movie.title, &movie.description) {
            found.entry(title.to_lowercase()).or_insert_with(|| description.clone());
        }
    }
    found
}

/// Rows worth showing: every film sharing the top score, or the first ten
/// when fewer than ten share it and there are more to show.
pub fn select_for_display(recommendations: &[Recommendation]) -> &[Recommendation] {
    let Some(first) = recommendations.first() else {
        return recommendations;
    };

    let top = recommendations
        .iter()
        .take_while(|r| r.lift_sum == first.lift_sum)
        .count();

    if top < DISPLAY_LIMIT && recommendations.len() > top {
        &recommendations[..DISPLAY_LIMIT.min(recommendations.len())]
    } else {
        &recommendations[..top]
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::sample_records;

    fn rec(movie: &str, lift_sum: f64) -> Recommendation {
        Recommendation {
            movie: movie.to_string(),
            lift_sum,
            weighted_average: 0.0,
            frequency: 1,
            description: None,
        }
    }

    #[test]
    fn test_parse_titles() {
        assert_eq!(parse_titles(" Movie A , movie B,,"), vec!["movie a", "movie b"]);
    }

    #[test]
    fn test_movie_pairs_skip_incomplete_records() {
        let records = sample_records();
        let mut movies: Vec<String> = movie_pairs(&records).into_iter().map(|(_, m)| m).collect();
        movies.sort();
        assert_eq!(movies, vec!["movie a", "movie a", "movie b", "movie c"]);
    }

    #[test]
    fn test_calculate_recommendations() {
        let recommendations = calculate_recommendations(&sample_records(), &parse_titles("Movie A"));

        let mut movies: Vec<&str> = recommendations.iter().map(|r| r.movie.as_str()).collect();
        movies.sort();
        assert_eq!(movies, vec!["movie b", "movie c"]);

        // co_occurrence 1 / (popularity 2 * popularity 1)
        assert!((recommendations[0].lift_sum - 0.5).abs() < f64::EPSILON);
        assert_eq!(recommendations[0].frequency, 1);
        assert_eq!(recommendations[0].description.as_deref(), Some("About Movie B"));
    }

    #[test]
    fn test_unknown_title_has_no_recommendations() {
        assert!(calculate_recommendations(&sample_records(), &parse_titles("Movie Z")).is_empty());
    }

    #[test]
    fn test_sorted_by_lift_then_weighted_average() {
        let mut a = rec("a", 1.0);
        a.weighted_average = 0.2;
        let mut b = rec("b", 1.0);
        b.weighted_average = 0.7;
        let c = rec("c", 2.0);

        let mut recs = vec![a, b, c];
        recs.sort_by(compare_scores);
        let order: Vec<&str> = recs.iter().map(|r| r.movie.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_display_shows_first_ten_when_top_is_narrow() {
        let recs: Vec<_> = (0..15).map(|i| rec(&i.to_string(), 15.0 - i as f64)).collect();
        assert_eq!(select_for_display(&recs).len(), 10);

        let recs = vec![rec("a", 1.0), rec("b", 0.5)];
        assert_eq!(select_for_display(&recs).len(), 2);
    }

    #[test]
    fn test_display_shows_all_tied_at_top() {
        let mut recs: Vec<_> = (0..12).map(|i| rec(&i.to_string(), 3.0)).collect();
        recs.push(rec("low", 1.0));
        assert_eq!(select_for_display(&recs).len(), 12);

        let single = vec![rec("only", 1.0)];
        assert_eq!(select_for_display(&single).len(), 1);
        assert!(select_for_display(&[]).is_empty());
    }

    #[test]
    fn test_display_title() {
        assert_eq!(rec("the seventh seal", 1.0).display_title(), "The Seventh Seal");
    }
}
