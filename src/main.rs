use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use criterion_closet::analytics::select_for_display;
use criterion_closet::config::Config;
use criterion_closet::store::SaveMode;
use criterion_closet::Pipeline;

/// Number of films listed by `popularity`
const POPULARITY_TOP: usize = 30;

#[derive(Parser)]
#[command(name = "closet")]
#[command(version, about = "Criterion Closet data pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to closet.toml or config/closet.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the record files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the playlist listing
    Playlist,
    /// Fetch subtitles for new and previously failed videos
    Subtitles {
        /// Maximum videos to process this run (0 = unlimited)
        #[arg(long)]
        max_videos: Option<usize>,
        /// Only write the subtitle store once, at the end of the run
        #[arg(long)]
        no_append: bool,
    },
    /// Extract guests and movie picks from fetched subtitles
    Enrich,
    /// Show the most picked films
    Popularity,
    /// Recommend films that are often picked alongside the given titles
    Recommend {
        /// Comma-separated titles, e.g. "Seven Samurai,Harakiri"
        titles: String,
    },
    /// Write the data completeness report
    Report,
    /// Run playlist, subtitles and enrichment in order
    Run,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "criterion_closet=debug,closet=debug,info"
    } else {
        "criterion_closet=info,closet=info,warn"
    };
    let filter = EnvFilter::try_from_env("CLOSET_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(dir) = &cli.data_dir {
        config.relocate_data_dir(dir.clone());
    }
    if let Commands::Subtitles { max_videos, no_append } = &cli.command {
        if let Some(limit) = max_videos {
            config.batch.max_videos_per_run = (*limit > 0).then_some(*limit);
        }
        if *no_append {
            config.batch.persist_mode = SaveMode::Replace;
        }
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    if cli.verbose {
        info!("{}", config.summary());
    }

    let pipeline = Pipeline::new(config);

    match cli.command {
        Commands::Playlist => {
            pipeline.fetch_playlist().await?;
        }
        Commands::Subtitles { .. } => {
            let result = pipeline.fetch_subtitles().await?;
            info!(
                "🎉 Subtitles done in {:.2}s: {} fetched, {} failed, {} deferred",
                result.total_time.as_secs_f64(),
                result.successful,
                result.failed,
                result.deferred
            );
        }
        Commands::Enrich => {
            let summary = pipeline.enrich().await?;
            if summary.extraction_failures > 0 {
                warn!("⚠️  {} records could not be enriched", summary.extraction_failures);
            }
        }
        Commands::Popularity => {
            let counts = pipeline.popularity().await?;
            info!("Most popular films:");
            for film in counts.iter().take(POPULARITY_TOP) {
                info!("- {}: {}", film.title, film.count);
            }
        }
        Commands::Recommend { titles } => {
            let recommendations = pipeline.recommend(&titles).await?;
            info!("Recommendations for {}:", titles);
            for rec in select_for_display(&recommendations) {
                info!(
                    "- {}: {}",
                    rec.display_title(),
                    rec.description.as_deref().unwrap_or("(no description)")
                );
            }
        }
        Commands::Report => {
            pipeline.report().await?.log_summary();
        }
        Commands::Run => {
            pipeline.run_all().await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("❌ An error occurred during the pipeline execution: {:#}", e);
        std::process::exit(1);
    }
}
