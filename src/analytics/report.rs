use chrono::Local;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::enrich::EnrichedRecord;
use crate::error::Result;

/// Completeness statistics over the enriched store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentReport {
    pub total_records: usize,
    pub records_with_subtitles: usize,
    pub records_with_structured_data: usize,
    pub subtitle_percentage: f64,
    pub structured_data_percentage: f64,
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub fn generate_report(records: &[EnrichedRecord]) -> EnrichmentReport {
    let total_records = records.len();
    let records_with_subtitles = records.iter().filter(|r| r.subtitles.is_some()).count();
    let records_with_structured_data = records.iter().filter(|r| r.has_structured_data()).count();

    EnrichmentReport {
        total_records,
        records_with_subtitles,
        records_with_structured_data,
        subtitle_percentage: percentage(records_with_subtitles, total_records),
        structured_data_percentage: percentage(records_with_structured_data, total_records),
    }
}

impl EnrichmentReport {
    pub fn to_markdown(&self) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        format!(
            "# Data Enrichment Report\n\
             \n\
             _Last updated: {timestamp}_\n\
             \n\
             ## Subtitles\n\
             \n\
             - **Total videos:** {total}\n\
             - **Videos with subtitles:** {subtitles}\n\
             - **Enrichment percentage:** {subtitle_pct:.2}%\n\
             \n\
             ## Structured Data\n\
             \n\
             - **Videos with structured data:** {structured}\n\
             - **Enrichment percentage:** {structured_pct:.2}%\n\
             \n\
             ---\n\
             \n\
             _This report is generated automatically by the Criterion Closet data pipeline._\n",
            timestamp = timestamp,
            total = self.total_records,
            subtitles = self.records_with_subtitles,
            subtitle_pct = self.subtitle_percentage,
            structured = self.records_with_structured_data,
            structured_pct = self.structured_data_percentage,
        )
    }

    /// Log the headline numbers
    pub fn log_summary(&self) {
        info!("📊 Data Enrichment Report");
        info!("Total videos: {}", self.total_records);
        info!(
            "Videos with subtitles: {} ({:.2}%)",
            self.records_with_subtitles, self.subtitle_percentage
        );
        info!(
            "Videos with structured data: {} ({:.2}%)",
            self.records_with_structured_data, self.structured_data_percentage
        );
    }
}

pub async fn save_report_to_markdown(report: &EnrichmentReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, report.to_markdown()).await?;
    info!("📝 Report saved to {}", path.display());
    Ok(())
}
