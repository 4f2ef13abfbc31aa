mod availability;
mod directory;
mod geo;
mod join;
mod listing;
mod store;

use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::geo::TARGET_AREA;
use crate::store::{AvailabilityResults, MergedRefuge, Refuge};

/// Booking date the final merge projects, overridable with --date.
const DEFAULT_TARGET_DATE: &str = "2025-08-13";

#[derive(Parser)]
#[command(name = "refuge_scraper", about = "FFCAM mountain refuge availability scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the refuge registry with the scraped HTML listing
    Merge,
    /// Fetch booking availability for refuges inside the target area
    Fetch {
        /// Max refuges to fetch (default: all inside the area)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Booking date to request (default: built-in target date)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Join fetched availability back onto the refuge directory
    Join {
        /// Date whose capacity is surfaced as flags (default: built-in target date)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Merge + fetch + join in one pipeline
    Run {
        /// Max refuges to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Booking date to request and project
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show counts for whichever stage outputs exist
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge => {
            let stats = directory::run()?;
            println!(
                "Merged {} refuges ({} listing entries, {} unmatched).",
                stats.matched, stats.parsed, stats.unmatched
            );
            Ok(())
        }
        Commands::Fetch { limit, date } => {
            let stats = availability::run(limit, target_date(date)).await?;
            println!(
                "Fetched {} refuges ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Join { date } => {
            let count = join::run(target_date(date))?;
            println!("Joined {} refuges.", count);
            Ok(())
        }
        Commands::Run { limit, date } => {
            let date = target_date(date);

            let t_merge = Instant::now();
            let merge_stats = directory::run()?;
            println!(
                "Merged {} refuges ({} unmatched) in {:.1}s",
                merge_stats.matched,
                merge_stats.unmatched,
                t_merge.elapsed().as_secs_f64()
            );

            let t_fetch = Instant::now();
            let fetch_stats = availability::run(limit, date).await?;
            println!(
                "Fetched {} refuges ({} ok, {} errors) in {:.1}s",
                fetch_stats.total,
                fetch_stats.ok,
                fetch_stats.errors,
                t_fetch.elapsed().as_secs_f64()
            );

            let joined = join::run(date)?;
            println!("Joined {} refuges.", joined);
            Ok(())
        }
        Commands::Stats => show_stats(),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn target_date(overridden: Option<NaiveDate>) -> NaiveDate {
    overridden.unwrap_or_else(|| {
        DEFAULT_TARGET_DATE
            .parse()
            .expect("built-in target date is a valid ISO date")
    })
}

fn show_stats() -> anyhow::Result<()> {
    if Path::new(store::DIRECTORY_PATH).exists() {
        let refuges: Vec<Refuge> = store::load_json(store::DIRECTORY_PATH)?;
        let in_area = refuges.iter().filter(|r| TARGET_AREA.retains(r)).count();
        println!("Directory:    {} refuges ({} inside target area)", refuges.len(), in_area);
    } else {
        println!("Directory:    not built (run 'merge')");
    }

    if Path::new(store::AVAILABILITY_PATH).exists() {
        let results: AvailabilityResults = store::load_json(store::AVAILABILITY_PATH)?;
        let ok = results.values().filter(|r| r.error.is_none()).count();
        let open_dates: usize = results
            .values()
            .filter_map(|r| r.availability.as_ref())
            .map(|a| a.values().filter(|&&n| n > 0).count())
            .sum();
        println!(
            "Availability: {} records ({} ok, {} errors, {} open dates)",
            results.len(),
            ok,
            results.len() - ok,
            open_dates
        );
    } else {
        println!("Availability: not fetched (run 'fetch')");
    }

    if Path::new(store::JOINED_PATH).exists() {
        let merged: Vec<MergedRefuge> = store::load_json(store::JOINED_PATH)?;
        let available = merged.iter().filter(|m| m.available_on_target_date).count();
        println!(
            "Joined:       {} refuges ({} available on target date)",
            merged.len(),
            available
        );
    } else {
        println!("Joined:       not built (run 'join')");
    }

    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
