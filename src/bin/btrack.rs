//! # btrack CLI - Change and bit-rot tracking for file trees
//!
//! ## Usage
//! ```bash
//! # Start tracking the current directory
//! btrack init
//!
//! # Record the first baseline
//! btrack commit
//!
//! # Later: see what changed, without writing anything
//! btrack scan
//!
//! # Machine-readable report
//! btrack scan --json
//! ```
//!
//! Exit status is 0 on success, 1 on error and 2 when `scan` or `commit`
//! found deteriorated files (content changed, modification time did not).

use btrack::utils::format_bytes;
use btrack::{ApplyStats, Delta, ProgressInfo, Result, Tracker, TrackerBuilder};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit status when deteriorated files were found
const EXIT_DETERIORATED: i32 = 2;

/// btrack - Detect changes and silent corruption in a directory tree
#[derive(Parser)]
#[command(name = "btrack")]
#[command(version)]
#[command(about = "Track file changes and detect bit rot")]
#[command(long_about = None)]
struct Cli {
    /// Directory to track (defaults to current)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Snapshot database (defaults to <path>/.btrack.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a directory
    Init {
        /// Ignore patterns (gitignore syntax)
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Replace an existing snapshot
        #[arg(long)]
        force: bool,
    },

    /// Compare the tree against the snapshot without writing
    Scan {
        /// Print the delta as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan and record the changes in the snapshot
    #[command(alias = "ci")]
    Commit {
        /// Print the delta and applied counts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Accept the current content of deteriorated files
    Rebaseline,

    /// Show snapshot information
    Status,
}

#[derive(Serialize)]
struct CommitReport<'a> {
    delta: &'a Delta,
    applied: ApplyStats,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => std::process::exit(EXIT_DETERIORATED),
        Ok(false) => {}
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }
}

/// Run a command; `Ok(true)` means deterioration was found
fn run(cli: Cli) -> Result<bool> {
    let root_path = cli.path.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Init { ignore, force } => cmd_init(root_path, cli.db, ignore, force),
        Commands::Scan { json } => cmd_scan(root_path, cli.db, json),
        Commands::Commit { json } => cmd_commit(root_path, cli.db, json),
        Commands::Rebaseline => cmd_rebaseline(root_path, cli.db),
        Commands::Status => cmd_status(root_path, cli.db),
    }
}

fn cmd_init(
    root_path: PathBuf,
    db: Option<PathBuf>,
    ignore: Vec<String>,
    force: bool,
) -> Result<bool> {
    let mut builder = TrackerBuilder::new().ignore_patterns(ignore).force(force);
    if let Some(db) = db {
        builder = builder.db_path(db);
    }
    let tracker = builder.init(root_path)?;

    println!("{} Initialized btrack snapshot", "✓".green().bold());
    println!("  Root: {}", tracker.root_path().display().to_string().cyan());
    println!("  Database: {}", tracker.config().db_path.display().to_string().cyan());
    println!("\nNext steps:");
    println!("  - Record the baseline: {}", "btrack commit".yellow());
    println!("  - Check for changes later: {}", "btrack scan".yellow());

    Ok(false)
}

fn cmd_scan(root_path: PathBuf, db: Option<PathBuf>, json: bool) -> Result<bool> {
    let tracker = open_tracker(root_path, db)?;
    let start = Instant::now();
    let delta = scan(&tracker, !json)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&delta)?);
    } else {
        print_delta(&delta);
        println!(
            "\n  Time: {}",
            format_duration(round_millis(start.elapsed())).to_string().cyan()
        );
    }

    Ok(delta.has_deterioration())
}

fn cmd_commit(root_path: PathBuf, db: Option<PathBuf>, json: bool) -> Result<bool> {
    let mut tracker = open_tracker(root_path, db)?;
    let start = Instant::now();
    let delta = scan(&tracker, !json)?;
    let applied = tracker.commit(&delta)?;

    if json {
        let report = CommitReport {
            delta: &delta,
            applied,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_delta(&delta);
        println!(
            "\n{} Committed {} snapshot rows in {}",
            "✓".green().bold(),
            applied.total_rows().to_string().cyan(),
            format_duration(round_millis(start.elapsed())).to_string().cyan()
        );
        if delta.has_deterioration() {
            println!(
                "  {} deteriorated files keep their old records. Run {} to accept them.",
                delta.deteriorated.len().to_string().red().bold(),
                "btrack rebaseline".yellow()
            );
        }
    }

    Ok(delta.has_deterioration())
}

fn cmd_rebaseline(root_path: PathBuf, db: Option<PathBuf>) -> Result<bool> {
    let mut tracker = open_tracker(root_path, db)?;
    let delta = scan(&tracker, true)?;

    if !delta.has_deterioration() {
        println!("{}", "No deteriorated files.".green());
        return Ok(false);
    }

    for file in &delta.deteriorated {
        println!("  {} {}", "!".red().bold(), file.path);
    }
    let stats = tracker.rebaseline_deteriorated(&delta)?;
    println!(
        "{} Accepted current content of {} files",
        "✓".green().bold(),
        stats.rehashed.to_string().yellow()
    );

    Ok(false)
}

fn cmd_status(root_path: PathBuf, db: Option<PathBuf>) -> Result<bool> {
    let tracker = open_tracker(root_path, db)?;
    let config = tracker.config();

    println!("{}", "btrack Status:".blue().bold());
    println!();
    println!("  Root: {}", config.root_path.display());
    println!("  Database: {}", config.db_path.display());
    if let Ok(meta) = std::fs::metadata(&config.db_path) {
        println!("  Database size: {}", format_bytes(meta.len()));
    }
    if let Some(created) = tracker.store().meta_value("created_at")? {
        println!("  Created: {}", created);
    }
    println!("  Files tracked: {}", tracker.record_count()?.to_string().cyan());

    println!("\n{}", "Configuration:".bold());
    if config.ignore_patterns.is_empty() {
        println!("  Ignore patterns: none");
    } else {
        println!("  Ignore patterns: {}", config.ignore_patterns.join(", "));
    }
    if config.max_file_size > 0 {
        println!("  Max file size: {}", format_bytes(config.max_file_size));
    }
    println!("  Follow symlinks: {}", config.follow_symlinks);
    println!("  Workers: {}", config.parallel_workers);

    Ok(false)
}

fn open_tracker(root_path: PathBuf, db: Option<PathBuf>) -> Result<Tracker> {
    let mut builder = TrackerBuilder::new();
    if let Some(db) = db {
        builder = builder.db_path(db);
    }
    builder.open(root_path)
}

/// Scan with a spinner on stderr
fn scan(tracker: &Tracker, show_progress: bool) -> Result<Delta> {
    if !show_progress {
        return tracker.scan();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Scanning files...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let spinner = pb.clone();
    let result = tracker.scan_with_progress(Some(move |info: ProgressInfo| {
        spinner.set_message(format!(
            "Hashing {}/{} ({})",
            info.processed,
            info.total.unwrap_or(info.processed),
            format_bytes(info.bytes_processed)
        ));
    }));

    pb.finish_and_clear();
    result
}

fn print_delta(delta: &Delta) {
    let summary = delta.summary();

    if delta.is_empty() && delta.skipped.is_empty() {
        println!("{}", "No changes.".green());
        return;
    }

    for file in &delta.deteriorated {
        println!("  {} {}", "deteriorated".red().bold(), file.path);
    }
    for file in &delta.modified {
        println!("  {}     {}", "modified".yellow(), file.path);
    }
    for file in &delta.created {
        println!("  {}      {}", "created".green(), file.path);
    }
    for file in &delta.deleted {
        println!("  {}      {}", "deleted".red(), file);
    }
    for movement in &delta.moved {
        println!(
            "  {}        {} -> {}",
            "moved".cyan(),
            movement.old_path,
            movement.new_path
        );
    }
    for file in &delta.touched {
        println!("  {}      {}", "touched".dimmed(), file.path);
    }
    for file in &delta.skipped {
        println!("  {}      {} ({})", "skipped".magenta(), file.path, file.reason);
    }

    println!("\n{}", "Summary:".bold());
    println!("  Created: {}", summary.created.to_string().green());
    println!("  Modified: {}", summary.modified.to_string().yellow());
    println!("  Deleted: {}", summary.deleted.to_string().red());
    println!("  Moved: {}", summary.moved.to_string().cyan());
    println!("  Touched: {}", summary.touched);
    if summary.skipped > 0 {
        println!("  Skipped: {}", summary.skipped.to_string().magenta());
    }
    if summary.deteriorated > 0 {
        println!(
            "  {} {}",
            "Deteriorated:".red().bold(),
            summary.deteriorated.to_string().red().bold()
        );
    }
}

fn round_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
