mod progress;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use photoquery::{
    ControllerError, DirectoryEnumerator, EngineConfig, FsDecoder, ImageRecord, RankOutcome,
    ScanController, ScanOutcome, SignatureKind, SkippedRecord,
};
use progress::CliReporter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(
    name = "photoquery",
    version,
    about = "Filter photo folders and find near-duplicate images"
)]
struct Cli {
    /// JSON file with engine settings
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(long, global = true)]
    recursive: bool,

    /// Include hidden files and directories
    #[arg(long, global = true)]
    hidden: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List images matching a query, e.g. `holiday >2w <1y / <10kb`
    Filter {
        /// Directory to list
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Filter query
        #[arg(short, long)]
        query: String,
        /// Print matching records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Duplicate workflows
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// Find and list near-duplicate groups
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Maximum signature distance still counted as a duplicate
        #[arg(long)]
        threshold: Option<u32>,
        #[arg(long, value_enum)]
        signature: Option<SignatureKind>,
        #[arg(long)]
        json: bool,
    },

    /// List images ordered so that similar ones are adjacent
    Similar {
        /// Directory to sort
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct ClusterReport<'a> {
    keep: &'a Path,
    duplicates: Vec<&'a Path>,
}

#[derive(Serialize)]
struct ScanReport<'a> {
    scanned: usize,
    duplicates: usize,
    partial: bool,
    clusters: Vec<ClusterReport<'a>>,
    skipped: &'a [SkippedRecord],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.include_subdirectories |= cli.recursive;
    config.show_hidden |= cli.hidden;

    match cli.command {
        Commands::Filter { path, query, json } => {
            let records = enumerate(&config, &path)?;
            let controller = ScanController::new(config);
            let kept = controller
                .run_filter(&query, &records, Utc::now())
                .with_context(|| format!("Invalid query {:?}", query))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&kept)?);
            } else {
                for record in &kept {
                    println!("   ▶ {}", record.path.display());
                }
                println!("{} of {} images match", kept.len(), records.len());
            }
        }

        Commands::Duplicates { command } => match command {
            Dups::Scan {
                path,
                threshold,
                signature,
                json,
            } => {
                if let Some(threshold) = threshold {
                    config.threshold = threshold;
                }
                if let Some(signature) = signature {
                    config.signature = signature;
                }
                if !json {
                    println!("▶ Scanning for duplicates in: {}", path.display());
                }

                let records = Arc::new(enumerate(&config, &path)?);
                let controller = Arc::new(ScanController::new(config));
                cancel_on_interrupt(&controller)?;
                let outcome = benchmark("duplicate scan", || -> Result<ScanOutcome, ControllerError> {
                    controller
                        .run_duplicate_scan(
                            Arc::clone(&records),
                            Arc::new(FsDecoder),
                            Arc::new(CliReporter::new()),
                        )?
                        .join()
                })
                .context("Duplicate scan failed")?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&scan_report(&records, &outcome))?);
                } else {
                    print_clusters(&records, &outcome);
                }
            }

            Dups::Similar { path, json } => {
                if !json {
                    println!("▶ Sorting by similarity in: {}", path.display());
                }

                let records = Arc::new(enumerate(&config, &path)?);
                let controller = Arc::new(ScanController::new(config));
                cancel_on_interrupt(&controller)?;
                let outcome = benchmark("similarity sort", || -> Result<RankOutcome, ControllerError> {
                    controller
                        .run_similarity_sort(
                            Arc::clone(&records),
                            Arc::new(FsDecoder),
                            Arc::new(CliReporter::new()),
                        )?
                        .join()
                })
                .context("Similarity sort failed")?;

                let ordered: Vec<&Path> = outcome
                    .order
                    .iter()
                    .map(|&i| records[i].path.as_path())
                    .collect();
                if json {
                    println!("{}", serde_json::to_string_pretty(&ordered)?);
                } else {
                    for path in ordered {
                        println!("   ▶ {}", path.display());
                    }
                    for skipped in &outcome.skipped {
                        eprintln!("⚠️  Could not read {}: {}", skipped.path.display(), skipped.reason);
                    }
                    if outcome.partial {
                        println!("⚠️  Sort did not finish; the order is incomplete.");
                    }
                }
            }
        },
    }

    Ok(())
}

/// List the candidate images of `dir` behind a spinner.
fn enumerate(config: &EngineConfig, dir: &Path) -> Result<Vec<ImageRecord>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let records = DirectoryEnumerator::new(config)
        .enumerate(dir)
        .with_context(|| format!("Failed to list images in {}", dir.display()))?;

    spinner.finish_with_message(format!("Found {} images", records.len()));
    Ok(records)
}

fn scan_report<'a>(records: &'a [ImageRecord], outcome: &'a ScanOutcome) -> ScanReport<'a> {
    let (duplicates, scanned) = outcome.summary();
    ScanReport {
        scanned,
        duplicates,
        partial: outcome.partial,
        clusters: outcome
            .duplicate_clusters()
            .map(|cluster| ClusterReport {
                keep: &records[cluster.representative].path,
                duplicates: cluster
                    .duplicates
                    .iter()
                    .map(|&i| records[i].path.as_path())
                    .collect(),
            })
            .collect(),
        skipped: &outcome.skipped,
    }
}

fn print_clusters(records: &[ImageRecord], outcome: &ScanOutcome) {
    let groups: Vec<_> = outcome.duplicate_clusters().collect();
    if groups.is_empty() {
        println!("No duplicates found.");
    } else {
        println!("Found {} duplicate group(s):", groups.len());
        for (i, cluster) in groups.iter().enumerate() {
            println!("\n✨ Group {}:", i + 1);
            println!("   🏆 Keeping → {}", records[cluster.representative].path.display());
            for &dup in &cluster.duplicates {
                println!("   ▶ {}", records[dup].path.display());
            }
        }
    }

    for skipped in &outcome.skipped {
        eprintln!("⚠️  Could not read {}: {}", skipped.path.display(), skipped.reason);
    }

    let (duplicates, scanned) = outcome.summary();
    println!("\nFound {} duplicates among {} files", duplicates, scanned);
    if outcome.partial {
        println!("⚠️  Scan did not finish; results are incomplete.");
    }
}

/// Route Ctrl+C to the running job so it stops with a partial result.
/// With no job running the process exits as usual.
fn cancel_on_interrupt(controller: &Arc<ScanController>) -> Result<()> {
    let controller = Arc::clone(controller);
    ctrlc::set_handler(move || {
        if controller.cancel() {
            eprintln!("\n⏹  Stopping after the current file…");
        } else {
            std::process::exit(130);
        }
    })
    .context("Failed to set Ctrl+C handler")
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    eprintln!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
