//! Read-only analytics over the enriched store

pub mod popularity;
pub mod recommend;
pub mod report;

pub use popularity::{calculate_popularity, FilmCount};
pub use recommend::{calculate_recommendations, parse_titles, select_for_display, Recommendation};
pub use report::{generate_report, save_report_to_markdown, EnrichmentReport};
