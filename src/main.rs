//! Lex-Harvest main entry point
//!
//! This is the command-line interface for inspecting a harvester's
//! configuration and ledgers.

use anyhow::Context;
use clap::{Parser, Subcommand};
use lex_harvest::config::{load_config_with_hash, Config, ConfigOverrides};
use lex_harvest::ledger::{load_statistics, print_statistics, SkipLedger, TrackingStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lex-Harvest: an unattended legal-document harvester
///
/// Crawling itself is driven by an embedding program that supplies a browser
/// page; this binary checks configurations and maintains the ledgers.
#[derive(Parser, Debug)]
#[command(name = "lex-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An unattended legal-document harvester", long_about = None)]
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

    /// Run the browser headless (overrides the config file)
    #[arg(long, env = "HARVEST_HEADLESS", value_name = "BOOL")]
    headless: Option<bool>,

    /// Shortest cooldown in minutes
    #[arg(long, env = "HARVEST_COOLDOWN_MIN", value_name = "MINUTES")]
    cooldown_min: Option<u32>,

    /// Longest cooldown in minutes
    #[arg(long, env = "HARVEST_COOLDOWN_MAX", value_name = "MINUTES")]
    cooldown_max: Option<u32>,

    /// Solve attempts per challenge episode
    #[arg(long, env = "HARVEST_MAX_ATTEMPTS", value_name = "N")]
    max_attempts: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print the effective values
    CheckConfig,

    /// Show statistics from the ledgers
    Stats,

    /// List documents skipped as not in force
    Skipped,

    /// Rewrite the completion ledger in the current format
    MigrateLedger,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            headless: self.headless,
            cooldown_min_minutes: self.cooldown_min,
            cooldown_max_minutes: self.cooldown_max,
            max_challenge_attempts: self.max_attempts,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let overrides = cli.overrides();
    if !overrides.is_empty() {
        tracing::debug!("Command-line overrides: {:?}", overrides);
    }
    let (config, hash) = load_config_with_hash(&cli.config, &overrides)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    match cli.command {
        Command::CheckConfig => handle_check_config(&config, &hash),
        Command::Stats => handle_stats(&config),
        Command::Skipped => handle_skipped(&config),
        Command::MigrateLedger => handle_migrate(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lex_harvest=info,warn"),
            1 => EnvFilter::new("lex_harvest=debug,info"),
            2 => EnvFilter::new("lex_harvest=trace,debug"),
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

fn handle_check_config(config: &Config, hash: &str) -> anyhow::Result<()> {
    println!("=== Lex-Harvest Configuration ===\n");

    println!("Portal:");
    println!("  Base URL: {}", config.portal.base_url);
    println!("  Anchor page: {}", config.portal.anchor_url);
    println!("  Section: {}", config.portal.section_title);
    if let Some(title) = &config.portal.decision_section_title {
        println!("  Decision section: {}", title);
    }
    match &config.portal.ready_selector {
        Some(selector) => println!("  Ready selector: {}", selector),
        None => println!("  Ready selector: (none, recovery is optimistic)"),
    }

    println!("\nBrowser:");
    println!("  Headless: {}", config.browser.headless);
    println!("  Navigation timeout: {}s", config.browser.navigation_timeout_secs);
    println!("  Widget timeout: {}s", config.browser.widget_timeout_secs);

    println!("\nRecovery:");
    println!("  Attempts per challenge: {}", config.recovery.max_challenge_attempts);
    println!(
        "  Consecutive timeout limit: {}",
        config.recovery.consecutive_timeout_limit
    );
    println!(
        "  Cooldown: {}-{} minutes, at most {} per episode",
        config.recovery.cooldown_min_minutes,
        config.recovery.cooldown_max_minutes,
        config.recovery.max_cooldowns
    );
    println!("  Manual poll: every {}s", config.recovery.manual_poll_seconds);

    println!("\nInference:");
    println!("  Vision: {} ({})", config.inference.vision_endpoint, config.inference.vision_model);
    println!("  Speech: {} ({})", config.inference.speech_endpoint, config.inference.speech_model);
    println!(
        "  API key: {}",
        if config.inference.api_key.is_some() { "set" } else { "not set" }
    );

    println!("\nLedgers:");
    println!("  Tracking: {}", config.ledger.tracking_path);
    println!("  Skipped: {}", config.ledger.skipped_path);

    println!("\nOutput:");
    println!("  Work dir: {}", config.output.work_dir);
    println!("  Artifacts: {}", config.output.artifact_dir);
    println!("  Delay between documents: {}ms", config.output.document_delay_ms);

    println!("\n✓ Configuration is valid (hash: {})", hash);
    Ok(())
}

fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let tracking = TrackingStore::load(&config.ledger.tracking_path)
        .with_context(|| format!("failed to load {}", config.ledger.tracking_path))?;
    let skipped = SkipLedger::load(&config.ledger.skipped_path)
        .with_context(|| format!("failed to load {}", config.ledger.skipped_path))?;

    println!("Tracking ledger: {}", config.ledger.tracking_path);
    println!("Skip ledger: {}\n", config.ledger.skipped_path);

    let stats = load_statistics(&tracking, &skipped);
    print_statistics(&stats);
    Ok(())
}

fn handle_skipped(config: &Config) -> anyhow::Result<()> {
    let skipped = SkipLedger::load(&config.ledger.skipped_path)
        .with_context(|| format!("failed to load {}", config.ledger.skipped_path))?;

    println!("=== Skipped Documents ({}) ===\n", skipped.len());
    for entry in skipped.entries() {
        println!("- {} ({})", entry.title, entry.url);
        println!("    {}", entry.reason.trim());
    }
    Ok(())
}

fn handle_migrate(config: &Config) -> anyhow::Result<()> {
    let tracking = TrackingStore::load(&config.ledger.tracking_path)
        .with_context(|| format!("failed to load {}", config.ledger.tracking_path))?;

    if tracking.migrated_count() == 0 {
        println!("✓ {} is already in the current format", config.ledger.tracking_path);
        return Ok(());
    }

    tracking
        .persist()
        .with_context(|| format!("failed to write {}", config.ledger.tracking_path))?;
    println!(
        "✓ Upgraded {} legacy entries in {}",
        tracking.migrated_count(),
        config.ledger.tracking_path
    );
    Ok(())
}
