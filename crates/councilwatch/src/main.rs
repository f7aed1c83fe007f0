use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use councilwatch_core::config::{WatchConfig, load_config, resolve_config_path};
use councilwatch_core::fetch::{FetcherConfig, HttpFetcher};
use councilwatch_core::pipeline::{RunOptions, RunReport, run};
use councilwatch_core::store::Store;

#[derive(Debug, Parser)]
#[command(
    name = "councilwatch",
    version,
    about = "Tracks current WA local government officeholders from WAEC election results"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    db_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Run(RunArgs),
    Stats,
    Holders(HoldersArgs),
}

#[derive(Debug, Args, Default)]
struct RunArgs {
    #[arg(long, help = "Refetch and reparse everything, bypassing caches")]
    full: bool,
    #[arg(
        long,
        value_name = "YYYY-MM-DD",
        help = "Date used for term expiry filtering (defaults to the local date)"
    )]
    today: Option<NaiveDate>,
}

#[derive(Debug, Args)]
struct HoldersArgs {
    #[arg(short = 'c', long, value_name = "NAME", help = "Filter by council")]
    council: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(&resolve_config_path(cli.config.as_deref()))?;
    let db_path = cli.db_path.clone().unwrap_or_else(|| config.db_path());

    match cli.command {
        Some(Commands::Run(args)) => run_batch(&config, &db_path, args),
        Some(Commands::Stats) => run_stats(&db_path),
        Some(Commands::Holders(args)) => run_holders(&db_path, args),
        None => run_batch(&config, &db_path, RunArgs::default()),
    }
}

fn run_batch(config: &WatchConfig, db_path: &Path, args: RunArgs) -> Result<()> {
    let store = Store::open(db_path)?;
    let mut fetcher = HttpFetcher::new(FetcherConfig::from_config(config))?;
    let options = RunOptions {
        full: args.full,
        today: args.today.unwrap_or_else(|| Local::now().date_naive()),
    };

    let report = run(&store, &mut fetcher, config, &options)?;
    print_run_report(&report);
    Ok(())
}

fn run_stats(db_path: &Path) -> Result<()> {
    let store = Store::open(db_path)?;
    let stats = store.stats()?;

    println!("db_path: {}", stats.db_path);
    println!("cached_pages: {}", stats.cached_pages);
    println!("cached_elections: {}", stats.cached_elections);
    println!("officeholders: {}", stats.officeholders);
    Ok(())
}

fn run_holders(db_path: &Path, args: HoldersArgs) -> Result<()> {
    let store = Store::open(db_path)?;
    let holders = store.officeholders(args.council.as_deref())?;

    for holder in &holders {
        println!(
            "{} | {} | {} | {}",
            holder.council, holder.ward, holder.name, holder.expiry
        );
    }
    println!("total: {}", holders.len());
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!("councils: {}", report.councils);
    println!("councils_skipped: {}", report.councils_skipped);
    println!("elections: {}", report.elections);
    println!("elections_parsed: {}", report.elections_parsed);
    println!("elections_cached: {}", report.elections_cached);
    println!("elections_skipped: {}", report.elections_skipped);
    println!("pages_fetched: {}", report.pages_fetched);
    println!("pages_cached: {}", report.pages_cached);
    println!("wards: {}", report.wards);
    println!("inserted: {}", report.inserted);
    println!("updated: {}", report.updated);
    println!("unchanged: {}", report.unchanged);
    println!("candidates_skipped: {}", report.candidates_skipped);
    println!("request_count: {}", report.request_count);
    if !report.errors.is_empty() {
        println!("diagnostics:");
        for error in &report.errors {
            println!("  - {error}");
        }
    }
    println!("success: {}", report.success);
}
