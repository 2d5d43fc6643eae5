//! airwatch: air-quality and forecast snapshot service.
//!
//! Subcommands:
//! - `snapshot` fetches both domains once and prints them as JSON.
//! - `watch` keeps the cache warm in the background and prints a summary
//!   on an interval.
//! - `verify` probes each provider once without touching the cache.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use airwatch_service::cache::{SnapshotStore, StoreOptions, refresher};
use airwatch_service::config::AppConfig;
use airwatch_service::dev_mode::{FixtureFile, FixtureProvider};
use airwatch_service::ingest::cwa::CwaForecast;
use airwatch_service::ingest::moenv::MoenvAirQuality;
use airwatch_service::ingest::{self, Provider};
use airwatch_service::logging::{self, Source};
use airwatch_service::model::{Domain, Snapshot, SnapshotStatus};
use airwatch_service::{registry, verify};

/// Township air-quality and forecast snapshot service
#[derive(Parser)]
#[command(name = "airwatch", version, about = "Freshness-gated air quality and forecast snapshots")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve canned payloads from this JSON file instead of the live APIs.
    /// Pass `builtin` for the bundled sample data.
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch both domains once and print the snapshots as JSON.
    Snapshot,

    /// Refresh in the background and print a summary periodically.
    Watch {
        /// Seconds between summaries.
        #[arg(long, default_value_t = 60)]
        interval: u64,

        /// Stop after this many summaries (runs until killed otherwise).
        #[arg(long)]
        iterations: Option<u64>,
    },

    /// Probe each provider once and print a verification report.
    Verify {
        /// Print the report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("airwatch: {}", e);
            return ExitCode::from(2);
        }
    };

    logging::init_logger(config.log_level(), config.log.file.as_deref(), config.log.timestamps);

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(Source::System, None, &e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let (air_quality, forecast) = build_providers(config, cli.fixtures.as_ref())?;

    match &cli.command {
        Command::Snapshot => {
            let store = SnapshotStore::bootstrap(StoreOptions::from_config(config), air_quality, forecast);
            let out = json!({
                "air_quality": &*store.peek(Domain::AirQuality),
                "forecast": &*store.peek(Domain::Forecast),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Command::Watch { interval, iterations } => {
            let (store, handle) = refresher::bootstrap_and_spawn(
                StoreOptions::from_config(config),
                air_quality,
                forecast,
                config.ttl(),
            )?;

            let mut printed = 0u64;
            loop {
                std::thread::sleep(Duration::from_secs((*interval).max(1)));
                for domain in Domain::ALL {
                    print_summary(&store.get_snapshot(domain));
                }
                printed += 1;
                if iterations.is_some_and(|n| printed >= n) {
                    break;
                }
            }
            handle.stop();
        }

        Command::Verify { json } => {
            let providers: [&dyn Provider; 2] = [air_quality.as_ref(), forecast.as_ref()];
            let report = verify::run_verification(&providers, config.fetch_timeout(), config.tz());
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                verify::print_summary(&report);
            }
            if report.summary.working == 0 {
                return Err("no provider is working".into());
            }
        }
    }

    Ok(())
}

/// Live HTTP providers, or fixture providers when `--fixtures` is given.
fn build_providers(
    config: &AppConfig,
    fixtures: Option<&PathBuf>,
) -> Result<(Box<dyn Provider>, Box<dyn Provider>), Box<dyn Error>> {
    if let Some(path) = fixtures {
        logging::info(Source::System, None, &format!("offline mode: fixtures from {}", path.display()));
        if path.as_os_str() == "builtin" {
            return Ok((
                Box::new(FixtureProvider::sample(Domain::AirQuality)),
                Box::new(FixtureProvider::sample(Domain::Forecast)),
            ));
        }
        let (aq, fc) = FixtureFile::load(path)?.into_providers();
        return Ok((Box::new(aq), Box::new(fc)));
    }

    if config.air_quality.api_key.is_empty() {
        logging::warn(Source::AirQuality, None, "no MOENV API key configured");
    }
    if config.forecast.api_key.is_empty() {
        logging::warn(Source::Forecast, None, "no CWA API key configured");
    }

    let client = ingest::build_http_client(config.fetch_timeout())?;

    let mut air_quality = MoenvAirQuality::new(
        client.clone(),
        &config.air_quality.api_key,
        &config.air_quality.site_name,
    );
    if let Some(url) = &config.air_quality.base_url {
        air_quality = air_quality.with_base_url(url);
    }

    let mut forecast = CwaForecast::new(
        client,
        &config.forecast.api_key,
        &config.forecast.dataset,
        &config.forecast.location,
    );
    if let Some(url) = &config.forecast.base_url {
        forecast = forecast.with_base_url(url);
    }

    Ok((Box::new(air_quality), Box::new(forecast)))
}

fn print_summary(snapshot: &Snapshot) {
    let status = match snapshot.status() {
        SnapshotStatus::Fresh => "fresh",
        SnapshotStatus::Stale => "STALE",
        SnapshotStatus::NeverFetched => "no data",
    };
    println!(
        "[{}] {} ({}, published {})",
        snapshot.domain,
        snapshot.site_label,
        status,
        snapshot.source_timestamp.as_deref().unwrap_or("N/A"),
    );
    for metric in registry::metrics_for(snapshot.domain) {
        let Some(reading) = snapshot.reading(metric.name) else {
            continue;
        };
        let trend = reading.trend.map(|t| format!("  ({})", t)).unwrap_or_default();
        println!(
            "    {:<14} {:>7} {:<6} {}{}",
            metric.display_name, reading.value, metric.unit, reading.label, trend
        );
    }
}
