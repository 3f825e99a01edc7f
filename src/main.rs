use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

mod aggregate;
mod attributes;
mod config;
mod db;
mod donations;
mod error;
mod logging;
mod models;
mod pipeline;
mod report;
mod spatial;
mod stratify;
mod venues;

use aggregate::DonorFilter;
use config::{AppConfig, CliOverrides};
use models::{CellResolution, DonorSegment};
use spatial::SpatialIndexer;
use venues::VenueFilter;

#[derive(Parser)]
#[command(name = "alumni-targeting")]
#[command(about = "Synthetic alumni donor generation and hex-grid event targeting", long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to ./alumni.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Restrict to these zip codes (repeatable)
    #[arg(long = "zip")]
    zips: Vec<String>,
    #[arg(long)]
    min_year: Option<i32>,
    #[arg(long)]
    max_year: Option<i32>,
    #[arg(long)]
    min_donation: Option<f64>,
    #[arg(long)]
    max_donation: Option<f64>,
    /// Restrict to these donor segments (repeatable)
    #[arg(long = "segment", value_enum)]
    segments: Vec<DonorSegment>,
}

impl FilterArgs {
    fn to_filter(&self) -> DonorFilter {
        let graduation_years = match (self.min_year, self.max_year) {
            (None, None) => None,
            (min, max) => Some((min.unwrap_or(i32::MIN), max.unwrap_or(i32::MAX))),
        };
        let donation_range = match (self.min_donation, self.max_donation) {
            (None, None) => None,
            (min, max) => Some((min.unwrap_or(f64::MIN), max.unwrap_or(f64::MAX))),
        };
        DonorFilter {
            zip_codes: self.zips.iter().cloned().collect(),
            graduation_years,
            donation_range,
            segments: self.segments.iter().copied().collect(),
        }
    }

    fn label(&self) -> Option<String> {
        (!self.zips.is_empty()).then(|| format!("zip codes {}", self.zips.join(", ")))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the venue reference set and sample addresses
    Seed,
    /// Import addresses from a CSV file
    ImportAddresses {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate the donor population and replace the donor table
    Generate {
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        target_fraction: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        /// Reference date for tenure and donation dates (YYYY-MM-DD)
        #[arg(long)]
        reference_date: Option<NaiveDate>,
        /// Also write the generated donors to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Aggregate donors by spatial cell, largest cluster first
    Aggregate {
        #[arg(long, value_enum, default_value_t = CellResolution::Medium)]
        resolution: CellResolution,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print aggregates as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate venues by cell and match them to the largest donor cells
    Venues {
        #[arg(long, value_enum, default_value_t = CellResolution::Medium)]
        resolution: CellResolution,
        #[arg(long = "venue-type")]
        venue_types: Vec<String>,
        #[arg(long = "price-range")]
        price_ranges: Vec<String>,
        #[arg(long, default_value_t = 0)]
        min_capacity: i32,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Look up the cell ids for a coordinate
    Cell {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Print only this resolution
        #[arg(long, value_enum)]
        resolution: Option<CellResolution>,
    },
    /// Generate a markdown targeting report
    Report {
        #[arg(long, value_enum, default_value_t = CellResolution::Medium)]
        resolution: CellResolution,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the donor table as CSV
    Export {
        #[arg(long, default_value = "donors.csv")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Commands::Generate {
            count,
            target_fraction,
            seed,
            reference_date,
            ..
        } => CliOverrides {
            record_count: *count,
            target_fraction: *target_fraction,
            seed: *seed,
            reference_date: *reference_date,
        },
        _ => CliOverrides::default(),
    };
    let config = AppConfig::load(cli.config.as_deref(), &overrides)?;
    let indexer = SpatialIndexer::new(config.spatial.grid);

    match cli.command {
        Commands::Cell {
            lat,
            lon,
            resolution,
        } => {
            if let Some(resolution) = resolution {
                println!("{}", indexer.cell_id(Some(lat), Some(lon), resolution)?);
            } else {
                let cells = indexer.index(Some(lat), Some(lon))?;
                for resolution in CellResolution::ALL {
                    println!(
                        "{} (level {}): {}",
                        resolution,
                        resolution.level(),
                        cells.cells.at(resolution)
                    );
                }
                if let Some(reason) = cells.fallback {
                    println!("approximate grid used: {reason}");
                }
            }
        }
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            let (venue_count, address_count) = db::seed(&pool, &indexer).await?;
            println!("Seeded {venue_count} venues and {address_count} sample addresses.");
        }
        Commands::ImportAddresses { csv } => {
            let pool = connect().await?;
            let inserted = db::import_addresses_csv(&pool, &csv).await?;
            println!("Inserted {inserted} addresses from {}.", csv.display());
        }
        Commands::Generate { export, .. } => {
            let pool = connect().await?;
            let addresses = db::fetch_addresses(&pool).await?;
            info!(addresses = addresses.len(), "loaded address source");

            let outcome = pipeline::generate(&addresses, &config, &indexer).map_err(|err| {
                anyhow::anyhow!(
                    "{}: generation failed with {} addresses: {err}",
                    err.code(),
                    addresses.len()
                )
            })?;
            db::replace_donors(&pool, &outcome.donors, outcome.seed).await?;

            println!(
                "Generated {} donors ({} target, {} other) with seed {} as of {}.",
                outcome.donors.len(),
                outcome.target_count,
                outcome.other_count,
                outcome.seed,
                outcome.reference_date
            );
            for warning in &outcome.warnings {
                println!("warning: {warning}");
            }
            if let Some(path) = export {
                let written = report::write_donors_csv(&path, &outcome.donors)?;
                println!("Wrote {written} donors to {}.", path.display());
            }
        }
        Commands::Aggregate {
            resolution,
            filter,
            limit,
            json,
        } => {
            let pool = connect().await?;
            let donors = db::fetch_donors(&pool).await?;
            let aggregation = aggregate::aggregate_donors(&donors, resolution, &filter.to_filter());

            if json {
                let cells: Vec<_> = aggregation.cells.iter().take(limit).collect();
                println!("{}", serde_json::to_string_pretty(&cells)?);
                return Ok(());
            }

            if aggregation.cells.is_empty() {
                println!("No indexed donors match these filters.");
                return Ok(());
            }

            println!(
                "{} cells at {} resolution for {} donors{}:",
                aggregation.cells.len(),
                resolution,
                aggregation.filtered,
                if aggregation.approximate() { " (approximate grid)" } else { "" }
            );
            for cell in aggregation.cells.iter().take(limit) {
                println!(
                    "- {} {} donors, ${:.2} annual (avg ${:.2}), ${:.2} lifetime, center ({:.4}, {:.4})",
                    cell.cell_id,
                    cell.donor_count,
                    cell.total_annual,
                    cell.avg_annual,
                    cell.total_cumulative,
                    cell.center_lat,
                    cell.center_lon
                );
            }
            if aggregation.unindexed > 0 {
                println!("{} donors skipped: no cell id.", aggregation.unindexed);
            }
        }
        Commands::Venues {
            resolution,
            venue_types,
            price_ranges,
            min_capacity,
            limit,
        } => {
            let pool = connect().await?;
            let venue_filter = VenueFilter {
                venue_types: venue_types.into_iter().collect::<BTreeSet<_>>(),
                price_ranges: price_ranges.into_iter().collect::<BTreeSet<_>>(),
                min_capacity,
            };
            let venues = db::fetch_venues(&pool).await?;

            println!("Venue cells at {resolution} resolution:");
            for cell in venues::aggregate_venues(&venues, resolution, &venue_filter) {
                println!(
                    "- {} {} venues, capacity {}, avg rating {:.1}",
                    cell.cell_id, cell.venue_count, cell.total_capacity, cell.avg_rating
                );
            }

            let donors = db::fetch_donors(&pool).await?;
            let aggregation = aggregate::aggregate_donors(&donors, resolution, &DonorFilter::default());
            println!("Largest donor cells and nearby venues:");
            for venue_match in venues::match_venues(&aggregation.cells, &venues, &venue_filter, limit) {
                println!(
                    "- {} ({} donors): in cell [{}], nearest {} ({:.1} km)",
                    venue_match.cell_id,
                    venue_match.donor_count,
                    venue_match.venues_in_cell.join(", "),
                    venue_match.nearest_venue.as_deref().unwrap_or("n/a"),
                    venue_match.nearest_distance_km.unwrap_or_default()
                );
            }
        }
        Commands::Report {
            resolution,
            filter,
            out,
        } => {
            let pool = connect().await?;
            let donors = db::fetch_donors(&pool).await?;
            let venues = db::fetch_venues(&pool).await?;
            let donor_filter = filter.to_filter();

            let scoped: Vec<_> = donor_filter.apply(&donors).collect();
            let aggregation = aggregate::aggregate_donors(&donors, resolution, &donor_filter);
            let matches = venues::match_venues(&aggregation.cells, &venues, &VenueFilter::default(), 5);
            let report = report::build_report(
                filter.label().as_deref(),
                Utc::now().date_naive(),
                &scoped,
                &aggregation,
                &matches,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let pool = connect().await?;
            let donors = db::fetch_donors(&pool).await?;
            let written = report::write_donors_csv(&out, &donors)?;
            println!("Wrote {written} donors to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cell_lookup_accepts_negative_longitude() {
        let cli = Cli::try_parse_from([
            "alumni-targeting",
            "cell",
            "--lat",
            "34.8526",
            "--lon",
            "-82.3940",
            "--resolution",
            "fine",
        ])
        .unwrap();
        match cli.command {
            Commands::Cell {
                lat,
                lon,
                resolution,
            } => {
                assert_eq!((lat, lon), (34.8526, -82.3940));
                assert_eq!(resolution, Some(CellResolution::Fine));
            }
            _ => panic!("expected cell command"),
        }
    }

    #[test]
    fn filter_flags_build_open_ended_ranges() {
        let cli = Cli::try_parse_from([
            "alumni-targeting",
            "aggregate",
            "--zip",
            "29680",
            "--min-year",
            "2000",
            "--segment",
            "major",
        ])
        .unwrap();
        let Commands::Aggregate { filter, .. } = cli.command else {
            panic!("expected aggregate command");
        };
        let filter = filter.to_filter();
        assert_eq!(filter.graduation_years, Some((2000, i32::MAX)));
        assert_eq!(filter.donation_range, None);
        assert!(filter.segments.contains(&DonorSegment::Major));
    }
}
