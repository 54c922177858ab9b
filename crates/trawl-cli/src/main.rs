mod extract;
mod sites;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trawl_client::{ReqwestFetcher, RobotsTxtPolicy};
use trawl_core::capability::{CapabilityProbe, EnvProbe};
use trawl_core::models::{Record, RunOutcome};
use trawl_core::persist::{self, RecordWriter};
use trawl_core::{ScrapeConfig, ScrapeOrchestrator};

use crate::extract::JsonLdExtractor;

#[derive(Parser)]
#[command(name = "trawl", version, about = "Capability-aware product catalog scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one site's catalog into CSV
    Run(RunArgs),

    /// List built-in site profiles
    Sites,

    /// Show what this environment can run
    Env {
        /// Environment variable to report as a secret (repeatable)
        #[arg(long = "secret", default_values = ["HTTPS_PROXY", "TRAWL_PROXY_URL"])]
        secrets: Vec<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Built-in site key (see `trawl sites`)
    #[arg(short, long, required_unless_present = "profile")]
    site: Option<String>,

    /// JSON profile file, used instead of a built-in site
    #[arg(short, long, conflicts_with = "site")]
    profile: Option<PathBuf>,

    /// Concurrent product fetches for plain HTTP
    #[arg(short, long, env = "TRAWL_WORKERS")]
    workers: Option<usize>,

    /// Upper bound on product pages per run
    #[arg(short, long, env = "TRAWL_MAX_PRODUCTS")]
    max_products: Option<usize>,

    /// Write a checkpoint every N successful products
    #[arg(long, env = "TRAWL_CHECKPOINT_INTERVAL")]
    checkpoint_interval: Option<usize>,

    /// Re-scrape products already present in the output file
    #[arg(long, default_value_t = false)]
    no_skip_existing: bool,

    /// Do not consult robots.txt
    #[arg(long, default_value_t = false)]
    ignore_robots: bool,

    /// Track page checksums between runs and report changed pages
    #[arg(long, default_value_t = false)]
    track_changes: bool,

    /// Directory for the output CSV (defaults to the working directory)
    #[arg(short, long, env = "TRAWL_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Print run statistics as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Sites => {
            cmd_sites();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Env { secrets } => {
            cmd_env(&secrets).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(feature = "browser")]
fn browser_driver() -> trawl_client::ChromiumDriver {
    trawl_client::ChromiumDriver::new()
}

#[cfg(not(feature = "browser"))]
fn browser_driver() -> trawl_core::NoBrowser {
    trawl_core::NoBrowser
}

fn scrape_config(args: &RunArgs) -> Result<ScrapeConfig> {
    let mut config = ScrapeConfig::from_env().context("Invalid scrape configuration")?;
    if let Some(n) = args.workers {
        config = config.with_workers(n);
    }
    if let Some(n) = args.max_products {
        config = config.with_max_products(n);
    }
    if let Some(n) = args.checkpoint_interval {
        config = config.with_checkpoint_interval(n);
    }
    Ok(config
        .with_skip_existing(!args.no_skip_existing)
        .with_change_tracking(args.track_changes))
}

async fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let mut spec = match (&args.profile, &args.site) {
        (Some(path), _) => sites::load_profile(path)?,
        (None, Some(key)) => sites::find(key)
            .with_context(|| format!("Unknown site '{key}'. Run `trawl sites` to list them."))?,
        (None, None) => anyhow::bail!("Either --site or --profile is required"),
    };
    if let Some(dir) = &args.output_dir {
        spec.site.output_path = Some(relocate(&spec.site.output_path(), dir));
    }
    let config = scrape_config(&args)?;

    let output = spec.site.output_path();
    let checkpoint = spec.site.checkpoint_path();
    tracing::info!(
        site = %spec.site.key,
        strategies = ?spec.strategy_names(),
        output = %output.display(),
        "Starting run"
    );

    let fetcher = ReqwestFetcher::new().context("Failed to create HTTP client")?;
    let driver = browser_driver();
    let probe = EnvProbe::new(driver.clone());
    let base_url = spec.site.base_url.clone();
    let profile = spec.build(fetcher.clone(), driver);

    let mut orchestrator =
        ScrapeOrchestrator::new(profile, probe, JsonLdExtractor).with_config(config.clone());
    if !args.ignore_robots {
        let robots = RobotsTxtPolicy::load(&fetcher, &base_url, fetcher.user_agent()).await;
        orchestrator = orchestrator.with_robots(robots);
    }

    let outcome = orchestrator.run().await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(outcome.stats())?);
    }

    match outcome {
        RunOutcome::Completed { records, stats } => {
            let rows = if config.skip_existing {
                carry_forward(persist::load_records(&output), records)
            } else {
                records
            };
            RecordWriter::new(&output)
                .write(&rows)
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("Failed to write {}", output.display()))?;

            if checkpoint.exists()
                && let Err(e) = std::fs::remove_file(&checkpoint)
            {
                tracing::warn!(
                    path = %checkpoint.display(),
                    error = %e,
                    "Could not remove checkpoint"
                );
            }

            if !args.json {
                println!("{stats}");
            }
            println!("\nWrote {} rows to {}", rows.len(), output.display());
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::NoResults { stats, reason } => {
            if !args.json {
                eprintln!("{stats}");
            }
            eprintln!("\n{reason}");
            eprintln!("\nRun `trawl env` to see environment capabilities.");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Put the output file name under `dir`.
fn relocate(output: &Path, dir: &Path) -> PathBuf {
    match output.file_name() {
        Some(name) => dir.join(name),
        None => dir.join(output),
    }
}

/// Prior rows followed by the new ones. Products are never scraped twice
/// in a skip-existing run, so no de-duplication is needed.
fn carry_forward(mut prior: Vec<Record>, records: Vec<Record>) -> Vec<Record> {
    if !prior.is_empty() {
        tracing::info!(prior = prior.len(), new = records.len(), "Appending to existing output");
    }
    prior.extend(records);
    prior
}

fn cmd_sites() {
    println!("Built-in sites:\n");
    for spec in sites::builtin_sites() {
        println!(
            "  {:<16} {:<18} {}",
            spec.site.key,
            spec.site.name,
            spec.strategy_names().join(" -> ")
        );
    }
    println!("\nUse `trawl run --profile <file.json>` for other sites.");
}

async fn cmd_env(secrets: &[String]) {
    let probe = EnvProbe::new(browser_driver());
    let report = probe.report().await;

    println!("{report}");
    match report.blocking_reason() {
        Some(reason) => println!("\nBrowser strategies: unavailable ({reason})"),
        None => println!("\nBrowser strategies: available"),
    }

    if !secrets.is_empty() {
        println!("\nSecrets:");
        for name in secrets {
            let state = if probe.has_secret(name) { "set" } else { "missing" };
            println!("  {name}: {state}");
        }
    }
}
