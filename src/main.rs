//! Listing-Crawler main entry point
//!
//! This is the command-line interface for the listing crawl-and-ingest pipeline.

use anyhow::Context;
use clap::Parser;
use listing_crawler::catalog::{import_catalog, load_work_units};
use listing_crawler::checkpoint::{open_checkpoint_store, CheckpointStore};
use listing_crawler::config::{load_config_with_hash, Config};
use listing_crawler::crawler::{run_crawl, CrawlOptions};
use listing_crawler::storage::{SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Listing-Crawler: a resumable crawl-and-ingest pipeline
///
/// Walks the neighborhood catalog, pages through the listing search API for
/// each neighborhood, and upserts every listing into SQLite. Finished
/// neighborhoods are checkpointed so an interrupted crawl picks up where it
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "listing-crawler")]
#[command(version)]
#[command(about = "A resumable listing crawl-and-ingest pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Forget finished neighborhoods and crawl everything again
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "import_neighborhoods"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "import_neighborhoods"])]
    stats: bool,

    /// Load the neighborhood catalog from an area dump and exit
    #[arg(long, value_name = "FILE")]
    import_neighborhoods: Option<PathBuf>,

    /// Pages to fetch per neighborhood (0 = until results run out)
    #[arg(long)]
    pages: Option<u32>,

    /// Page to start the first unfinished neighborhood at
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    start_page: Option<u32>,

    /// Base delay between requests in seconds
    #[arg(long, value_name = "SECS")]
    delay: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Hierarchy level to crawl (default: leaf neighborhoods)
    #[arg(long)]
    level: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli)?;

    // Setup logging based on verbosity; the guard flushes the file log on exit
    let _guard = setup_logging(cli.verbose, cli.quiet, config.logging.directory.as_deref())?;
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    // Handle different modes
    if let Some(dump) = &cli.import_neighborhoods {
        handle_import(&config, dump)?;
    } else if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(&config, &config_hash, &cli).await?;
    }

    Ok(())
}

/// Applies command-line overrides on top of the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(pages) = cli.pages {
        config.crawl.max_pages = pages;
    }
    if let Some(delay) = cli.delay {
        anyhow::ensure!(
            delay.is_finite() && delay >= 0.0,
            "--delay must be a non-negative number of seconds"
        );
        config.crawl.request_delay_ms = (delay * 1000.0).round() as u64;
    }
    if let Some(timeout) = cli.timeout {
        config.transport.request_timeout_secs = timeout;
    }
    if let Some(level) = cli.level {
        config.crawl.level = Some(level);
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// When a log directory is configured, a second plain-text layer writes
/// `crawl.log` there.
fn setup_logging(
    verbose: u8,
    quiet: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_crawler=info,warn"),
            1 => EnvFilter::new("listing_crawler=debug,info"),
            2 => EnvFilter::new("listing_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::never(dir, "crawl.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.storage.database_path);
    let storage = SqliteStorage::new(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(storage.with_price_history(config.storage.price_history))
}

/// Handles --import-neighborhoods: loads the catalog into the database
fn handle_import(config: &Config, dump: &Path) -> anyhow::Result<()> {
    let mut storage = open_storage(config)?;
    let written = import_catalog(&mut storage, dump)
        .with_context(|| format!("Failed to import neighborhoods from {}", dump.display()))?;

    println!("✓ Imported {} neighborhoods from {}", written, dump.display());
    println!(
        "  Catalog now holds {} neighborhoods",
        storage.count_neighborhoods()?
    );
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Listing-Crawler Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  API base: {}", config.site.api_base);
    println!("  Listing path: {}", config.site.listing_path);
    println!("  Source tag: {}", config.site.source);

    println!("\nTransport:");
    println!(
        "  User agent: {}",
        config.transport.user_agent.as_deref().unwrap_or("(random from pool)")
    );
    println!("  Rotate per request: {}", config.transport.rotate_user_agent);
    println!("  Timeout: {}s", config.transport.request_timeout_secs);
    println!(
        "  Backoff: {}ms base, {} retries",
        config.transport.backoff_base_ms, config.transport.max_retries
    );
    println!(
        "  Proxy: {}",
        if config.transport.proxy.is_some() { "rotating" } else { "none" }
    );

    println!("\nCrawl:");
    println!("  Pacing delay: {}ms", config.crawl.request_delay_ms);
    match config.crawl.max_pages {
        0 => println!("  Pages per neighborhood: until results run out"),
        n => println!("  Pages per neighborhood: {}", n),
    }
    println!("  API page cap: {}", config.crawl.max_api_pages);
    println!("  Beds filter: {:?}", config.crawl.beds);
    println!("  Max price filter: {:?}", config.crawl.max_price);

    println!("\nOutput:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Price history: {:?}", config.storage.price_history);
    println!(
        "  Checkpoints: {:?} ({})",
        config.checkpoint.backend, config.checkpoint.path
    );

    println!("\n✓ Configuration is valid");

    let storage = open_storage(config)?;
    match load_work_units(&storage, config.crawl.level) {
        Ok(units) => {
            let checkpoints = open_checkpoint_store(config)?;
            let mut pending = 0;
            for unit in &units {
                if !checkpoints.is_complete(&unit.slug)? {
                    pending += 1;
                }
            }
            println!(
                "✓ Would crawl {} neighborhoods ({} already done)",
                pending,
                units.len() - pending
            );
            for unit in units.iter().take(20) {
                println!("  - {} ({})", unit.name, unit.slug);
            }
            if units.len() > 20 {
                println!("  ... and {} more", units.len() - 20);
            }
        }
        Err(e) => println!("✗ {}", e),
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(config)?;
    let checkpoints = open_checkpoint_store(config)?;

    println!("Listings:       {}", storage.count_listings()?);
    println!("Price history:  {}", storage.count_price_history()?);
    println!("Neighborhoods:  {}", storage.count_neighborhoods()?);
    println!("Checkpointed:   {}", checkpoints.completed_count()?);

    let recent = storage.read_listings(5)?;
    if !recent.is_empty() {
        println!("\nMost recently seen:");
        for row in recent {
            println!(
                "  {} {} | {} | {} | ${}",
                row.source,
                row.external_id,
                row.address.as_deref().unwrap_or("-"),
                row.area_name.as_deref().unwrap_or("-"),
                row.price.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
            );
        }
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, cli: &Cli) -> anyhow::Result<()> {
    let mut options = CrawlOptions::from_config(&config.crawl);
    if let Some(start_page) = cli.start_page {
        options.start_page = start_page;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping before the next request");
            on_interrupt.cancel();
        }
    });

    if cli.fresh {
        tracing::info!("Starting fresh crawl (ignoring checkpoints)");
    }

    let summary = run_crawl(config, config_hash, options, cli.fresh, cancel)
        .await
        .context("Crawl setup failed")?;

    if let Some(halt) = &summary.halted_at {
        tracing::error!(
            "Stopped at {} page {}; fix the cause and rerun with --start-page {}",
            halt.unit,
            halt.page,
            halt.page
        );
    }

    Ok(())
}
