//! fsum - parallel file checksum generator and verifier.
//!
//! Usage:
//!   fsum [OPTIONS] PATH...        Hash files, write a manifest
//!   fsum -r DIR...                Hash directory trees
//!   fsum -v MANIFEST              Verify a manifest ("-" for stdin)
//!   fsum --list-hashes            Show supported algorithms

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;

use clap::Parser;
use color_eyre::eyre::{Context, Result, bail};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fsum_core::{DEFAULT_PARALLELISM, FailureSet, PipelineConfig};
use fsum_digest::{Algorithm, Generator, HashReport, Verifier, VerifyReport};
use fsum_scan::PipelineProgress;

#[derive(Parser)]
#[command(
    name = "fsum",
    version,
    about = "Generate and verify strong checksums for many files in parallel",
    long_about = "fsum hashes files concurrently and writes a manifest of \
                  digest|size|path lines. Every file is hashed once, no matter \
                  how many hardlinks or symlinks lead to it.\n\n\
                  Verify a manifest later with `fsum -v MANIFEST`."
)]
struct Cli {
    /// Files (or, with -r, directories) to hash
    #[arg(conflicts_with_all = ["verify_from", "list_hashes"])]
    paths: Vec<PathBuf>,

    /// Recurse into directories
    #[arg(short, long)]
    recurse: bool,

    /// Don't cross filesystem boundaries while recursing
    #[arg(short = 'x', long)]
    one_filesystem: bool,

    /// Follow symlinks
    #[arg(short = 'L', long = "follow")]
    follow_symlinks: bool,

    /// Hash algorithm
    #[arg(short = 'H', long = "hash", default_value = "sha256")]
    hash: String,

    /// List supported hash algorithms
    #[arg(long)]
    list_hashes: bool,

    /// Verify the hashes in manifest F ("-" for stdin)
    #[arg(short = 'v', long, value_name = "F")]
    verify_from: Option<String>,

    /// Write the manifest to F instead of stdout
    #[arg(short, long, value_name = "F")]
    output: Option<PathBuf>,

    /// Overwrite the output file if it exists
    #[arg(short, long)]
    force: bool,

    /// Exclude names matching this glob while recursing (repeatable)
    #[arg(short, long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Worker threads (default: CPUs times the parallelism factor)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Workers per CPU
    #[arg(short, long, default_value_t = DEFAULT_PARALLELISM)]
    parallelism: usize,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    if cli.list_hashes {
        print_hashes();
        return Ok(());
    }

    let config = PipelineConfig::builder()
        .follow_symlinks(cli.follow_symlinks)
        .recurse(cli.recurse)
        .one_filesystem(cli.one_filesystem)
        .excludes(cli.exclude.clone())
        .parallelism(cli.parallelism)
        .threads(cli.threads)
        .build()
        .context("Invalid options")?;

    let code = match &cli.verify_from {
        Some(source) => run_verify(source, config, &cli)?,
        None => run_hash(config, &cli)?,
    };

    std::process::exit(code);
}

/// Hash the inputs into a manifest.
fn run_hash(config: PipelineConfig, cli: &Cli) -> Result<i32> {
    let algorithm = Algorithm::from_name(&cli.hash)
        .context("Try 'fsum --list-hashes'")?;

    let generator = Generator::new(config, algorithm);
    let progress = cli.verbose.then(|| log_progress(generator.subscribe()));

    let report = match &cli.output {
        Some(output) => {
            let (report, tmp) = {
                let tmp = create_output(output, cli.force)?;
                generator.run(&cli.paths, tmp).context("Hashing failed")?
            };
            persist_output(tmp, output, cli.force)?;
            report
        }
        None => generator.run(&cli.paths, io::stdout()).context("Hashing failed")?.0,
    };

    drop(generator);
    if let Some(handle) = progress {
        let _ = handle.join();
    }

    print_failures(report.failure_set());
    print_hash_summary(&report, cli.json)?;
    Ok(report.exit_code())
}

/// Verify a manifest from a file or stdin.
fn run_verify(source: &str, config: PipelineConfig, cli: &Cli) -> Result<i32> {
    let (name, reader): (&str, Box<dyn BufRead + Send>) = if source.is_empty() || source == "-" {
        ("(stdin)", Box::new(BufReader::new(io::stdin())))
    } else {
        let file = File::open(source).with_context(|| format!("can't open '{source}'"))?;
        (source, Box::new(BufReader::new(file)))
    };

    let verifier = Verifier::new(config);
    let progress = cli.verbose.then(|| log_progress(verifier.subscribe()));

    let report = verifier.verify(name, reader).context("Verification failed")?;

    drop(verifier);
    if let Some(handle) = progress {
        let _ = handle.join();
    }

    print_failures(report.failure_set());
    print_verify_summary(&report, cli.json)?;
    Ok(report.exit_code())
}

/// Temporary file next to `output`, persisted over it once hashing succeeds.
fn create_output(output: &Path, force: bool) -> Result<tempfile::NamedTempFile> {
    if output.exists() && !force {
        bail!("{} exists; use --force to overwrite", output.display());
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("can't create temporary file in {}", dir.display()))
}

/// Move the finished manifest into place. Without `force` a file that
/// appeared at `output` during the run is left alone.
fn persist_output(tmp: tempfile::NamedTempFile, output: &Path, force: bool) -> Result<()> {
    let persisted = if force {
        tmp.persist(output)
    } else {
        tmp.persist_noclobber(output)
    };
    persisted.with_context(|| format!("can't write {}", output.display()))?;
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("fsum=debug,warn")
    } else {
        EnvFilter::new("fsum=info,warn")
    };

    // stdout may carry the manifest
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// Log progress snapshots until the run's sender goes away.
fn log_progress(mut rx: broadcast::Receiver<PipelineProgress>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match rx.blocking_recv() {
                Ok(progress) => debug!(
                    state = ?progress.state,
                    processed = progress.files_processed,
                    failures = progress.failures,
                    bytes = %format_size(progress.bytes_processed),
                    rate = %format!("{:.0} files/s", progress.files_per_second()),
                    "progress"
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_hashes() {
    println!("fsum: Available hash algorithms:");
    for algorithm in Algorithm::all() {
        let marker = if algorithm == Algorithm::default() {
            " [default]"
        } else {
            ""
        };
        println!("   {:<12} {:>4} bits{marker}", algorithm.name(), algorithm.output_len() * 8);
    }
}

fn print_failures(failures: Option<FailureSet>) {
    if let Some(set) = failures {
        eprintln!("fsum: {} error(s):\n{set}", set.len());
    }
}

fn print_hash_summary(report: &HashReport, json: bool) -> Result<()> {
    if json {
        eprintln!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    eprintln!(
        "fsum: {} files hashed ({}) with {}, {} error(s)",
        report.files,
        format_size(report.bytes),
        report.algorithm,
        report.failures.len()
    );
    Ok(())
}

fn print_verify_summary(report: &VerifyReport, json: bool) -> Result<()> {
    if json {
        eprintln!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    eprintln!(
        "fsum: {}: {} ok ({}), {} failed",
        report.manifest,
        report.verified,
        format_size(report.bytes),
        report.failures.len()
    );
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
