//! Issuer-Harvest main entry point
//!
//! This is the command-line interface for the Issuer-Harvest prefix harvester.

use clap::Parser;
use issuer_harvest::config::{load_config_with_hash, Config};
use issuer_harvest::harvest::{run_harvest, Enumerator, HarvestOutcome};
use issuer_harvest::output::{load_statistics, print_statistics, write_documents};
use issuer_harvest::storage::{open_storage, ProgressStore};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Issuer-Harvest: a resumable prefix-enumeration harvester
///
/// Issuer-Harvest walks short query prefixes against a search endpoint,
/// collects the unique records it returns, survives session loss with a
/// cooldown, and resumes where it left off after an interruption.
#[derive(Parser, Debug)]
#[command(name = "issuer-harvest")]
#[command(version)]
#[command(about = "A resumable prefix-enumeration harvester", long_about = None)]
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

    /// Resume from the stored checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Discard stored progress and start over
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show the first-level queries without harvesting
    #[arg(long, conflicts_with_all = ["status", "export", "clear_checkpoint"])]
    dry_run: bool,

    /// Show stored progress and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "clear_checkpoint"])]
    status: bool,

    /// Write the catalog from stored entries and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status", "clear_checkpoint"])]
    export: bool,

    /// Clear stored progress and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status", "export"])]
    clear_checkpoint: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.status {
        handle_status(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else if cli.clear_checkpoint {
        handle_clear(&config)?;
    } else {
        handle_harvest(&config, &config_hash, !cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("issuer_harvest=info,warn"),
            1 => EnvFilter::new("issuer_harvest=debug,info"),
            2 => EnvFilter::new("issuer_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the configuration and the first queries
fn handle_dry_run(config: &Config) {
    let harvester = &config.harvester;
    let endpoint = &config.endpoint;

    println!("=== Issuer-Harvest Dry Run ===\n");

    println!("Harvester Configuration:");
    println!("  Alphabet: {} ({} characters)", harvester.alphabet, harvester.alphabet.chars().count());
    println!("  Max depth: {}", harvester.max_depth);
    println!(
        "  Delay window: {}-{}ms",
        harvester.min_delay_ms, harvester.max_delay_ms
    );
    println!("  Attempts per query: {}", harvester.max_retries);
    println!("  Final pass attempts: {}", harvester.final_pass_attempts);
    println!("  Cooldown: {}ms", harvester.cooldown_ms);
    println!("  Resume delay: {}ms", harvester.resume_delay_ms);

    println!("\nEndpoint:");
    println!("  Source: {}", endpoint.source);
    println!("  URL: {} ({:?})", endpoint.url, endpoint.method);
    println!("  Query parameter: {}", endpoint.query_param);
    if let Some(session_url) = &endpoint.session_url {
        println!("  Session URL: {}", session_url);
    }
    println!("  Record convention: {:?}", endpoint.records);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Catalog: {}", config.output.catalog_path);
    println!("  Failures: {}", config.output.failed_path);

    let enumerator = Enumerator::new(harvester.alphabet_chars(), harvester.max_depth);
    let first_level: Vec<String> = enumerator
        .first_level()
        .iter()
        .map(|q| q.to_string())
        .collect();

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start with {} first-level queries: {}",
        first_level.len(),
        first_level.join(" ")
    );
}

/// Handles the --status mode: shows stored progress
fn handle_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes documents from stored entries
fn handle_export(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Exporting Catalog ===\n");
    println!("Database: {}", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let entries = storage.load_entries()?;
    let failed: BTreeSet<_> = storage.load_failed()?.into_iter().collect();

    let written = write_documents(&config.output, &config.endpoint.source, &entries, &failed)?;

    println!("✓ {} entries exported to: {}", entries.len(), written.catalog.display());
    if let Some(path) = written.failures {
        println!("✓ {} failed queries exported to: {}", failed.len(), path.display());
    }

    Ok(())
}

/// Handles the --clear-checkpoint mode: discards stored progress
fn handle_clear(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    storage.clear()?;
    println!("✓ Stored progress cleared: {}", config.output.database_path);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: &Config,
    config_hash: &str,
    resume: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if resume {
        tracing::info!("Starting harvest (will resume from checkpoint if one exists)");
    } else {
        tracing::info!("Starting fresh harvest (discarding stored progress)");
    }

    match run_harvest(config, config_hash, resume).await {
        Ok(HarvestOutcome::Completed(report)) => {
            write_documents(
                &config.output,
                &config.endpoint.source,
                &report.entries,
                &report.failed_queries,
            )?;
            tracing::info!(
                "Harvest completed: {} entries from {} queries",
                report.entries.len(),
                report.queries_attempted
            );
            Ok(())
        }
        Ok(HarvestOutcome::Stopped { checkpoint }) => {
            tracing::info!(
                "Harvest stopped; run again to resume at {}",
                checkpoint.map_or_else(|| "the beginning".to_string(), |q| q.to_string())
            );
            Ok(())
        }
        Ok(HarvestOutcome::AlreadyRunning) => {
            tracing::warn!("A harvest is already running");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
