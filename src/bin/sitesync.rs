//! Sitesync CLI - manifest-guided incremental directory synchronization.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sitesync::{SyncBuilder, SyncStats};

/// Incremental directory synchronization guided by a deployment manifest.
#[derive(Parser)]
#[command(name = "sitesync")]
#[command(version)]
#[command(about = "Incrementally sync a source tree onto a destination, manifest-guided")]
struct Cli {
    /// Source directory to sync
    #[arg(short = 'f', long, value_name = "DIR")]
    from_dir: PathBuf,

    /// Destination directory to sync
    #[arg(short = 't', long, value_name = "DIR")]
    to_dir: PathBuf,

    /// Sub-folder under the destination to confine writes to
    #[arg(long, value_name = "DIR")]
    target_sub_folder: Option<PathBuf>,

    /// Next manifest file path, written on success
    #[arg(short = 'n', long, value_name = "FILE")]
    next_manifest: PathBuf,

    /// Previous manifest file path; missing file means "no previous run"
    #[arg(short = 'p', long, value_name = "FILE")]
    previous_manifest: Option<PathBuf>,

    /// List of files/directories to ignore and not sync, delimited by ;
    #[arg(short = 'i', long, value_name = "PATTERNS")]
    ignore: Option<String>,

    /// Delete destination-only entries regardless of the manifest
    #[arg(long)]
    ignore_manifest: bool,

    /// Legacy policy: with no previous manifest, clean the destination
    #[arg(long)]
    first_run_cleans_destination: bool,

    /// Only log without actual copy/remove of files
    #[arg(short = 'w', long)]
    what_if: bool,

    /// No logging
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print out the time it took to complete the operation
    #[arg(long)]
    perf: bool,
}

fn init_logging(quiet: bool, verbose: bool) {
    let default_filter = if quiet {
        "sitesync=error"
    } else if verbose {
        "sitesync=debug"
    } else {
        "sitesync=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let quiet = cli.quiet;
    let perf = cli.perf;
    let dry_run = cli.what_if;
    let start = Instant::now();

    match run(cli).await {
        Ok(stats) => {
            if !quiet {
                println!("{}", summary(&stats, dry_run));
            }
            if perf {
                println!("Operation took {:.3} seconds", start.elapsed().as_secs_f64());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> sitesync::Result<SyncStats> {
    let mut builder = SyncBuilder::new()
        .ignore_manifest(cli.ignore_manifest)
        .first_run_cleans_destination(cli.first_run_cleans_destination)
        .dry_run(cli.what_if);

    if let Some(spec) = &cli.ignore {
        builder = builder.ignore_patterns(spec)?;
    }

    builder
        .build()
        .sync(
            &cli.from_dir,
            &cli.to_dir,
            cli.target_sub_folder.as_deref(),
            &cli.next_manifest,
            cli.previous_manifest.as_deref(),
        )
        .await
}

fn summary(stats: &SyncStats, dry_run: bool) -> String {
    let prefix = if dry_run { "Would sync" } else { "Synced" };
    format!(
        "{prefix}: {} copied, {} up to date, {} files deleted, {} directories deleted, {} ignored",
        stats.files_copied,
        stats.files_up_to_date,
        stats.files_deleted,
        stats.directories_deleted,
        stats.entries_ignored,
    )
}
