use anyhow::{bail, Context, Result};
use clap::Parser;
use sta_hourly::paginate::PageWindow;
use sta_hourly::{Settings, StaHourly, DEFAULT_THINGS_URL};
use std::path::PathBuf;
use time::Date;
use time::macros::format_description;
use tracing::{info, warn};

/// Export hourly bike-share station occupancy from a SensorThings service to CSV.
#[derive(Parser, Debug)]
#[command(name = "sta-hourly", version, about = "Resample SensorThings observations onto an hourly grid and save as CSV")]
struct Args {
    /// Things collection to discover stations from (ownership filter included)
    #[arg(long, default_value = DEFAULT_THINGS_URL)]
    things_url: String,

    /// First day of the window, YYYY-MM-DD
    #[arg(long, default_value = "2022-05-01", value_parser = parse_date)]
    start_date: Date,

    /// Last day of the window (inclusive), YYYY-MM-DD
    #[arg(long, default_value = "2022-09-30", value_parser = parse_date)]
    end_date: Date,

    /// Output directory for event.csv and meta_data.csv
    #[arg(short, long, default_value = "results")]
    out_dir: PathBuf,

    /// Stations processed concurrently (default: available parallelism)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Observations requested per page
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u64).range(1..))]
    page_size: u64,

    /// Give up on a station once paging reaches this offset
    #[arg(long, default_value_t = 10_000_000)]
    max_offset: u64,
}

fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let workers = args.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    let settings = Settings {
        things_url: args.things_url,
        start_date: args.start_date,
        end_date: args.end_date,
        pages: PageWindow {
            page_size: args.page_size,
            max_offset: args.max_offset,
        },
        workers,
    };

    let core = StaHourly::new(args.out_dir, settings).context("setting up export")?;
    let summary = core.run().await.context("export aborted")?;

    info!(successes = summary.succeeded, failures = summary.failed.len(), "done");
    if !summary.failed.is_empty() {
        for (station, err) in &summary.failed {
            warn!(%station, error = %err, "station skipped");
        }
        bail!("{} station(s) failed", summary.failed.len());
    }
    Ok(())
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn defaults_match_the_season_export() {
        let args = Args::parse_from(["sta-hourly"]);
        assert_eq!(args.start_date, date!(2022-05-01));
        assert_eq!(args.end_date, date!(2022-09-30));
        assert_eq!(args.out_dir, PathBuf::from("results"));
        assert_eq!(args.page_size, 5000);
        assert_eq!(args.things_url, DEFAULT_THINGS_URL);
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert!(parse_date("2022-13-01").is_err());
        assert!(parse_date("01.05.2022").is_err());
        assert!(Args::try_parse_from(["sta-hourly", "--page-size", "0"]).is_err());
    }
}
