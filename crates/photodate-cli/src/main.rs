use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use photodate_core::date::TimeBasis;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "photodate",
    version,
    about = "Fix timestamps of exported photos and republish them into \"Photos from YYYY\" folders"
)]
struct Cli {
    /// Path searched for "Photos from" directories
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Output directory for the renamed copies
    #[arg(short, long)]
    output: PathBuf,

    /// Number of files processed in parallel
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Skip re-reading the copies' timestamps
    #[arg(long)]
    no_verify: bool,

    /// Read EXIF camera and GPS details (shown in logs, never used for dating)
    #[arg(long)]
    exif: bool,

    /// Interpret filename dates as UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log every step (same as RUST_LOG=debug)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Progress callback driving `bar`. Owns its handle so it can be passed as
/// a `'static` callback while the caller keeps `bar` for cleanup.
fn progress_reporter(bar: ProgressBar) -> impl Fn(&str, u64, u64, &str) + Send + Sync + 'static {
    move |stage: &str, current: u64, total: u64, message: &str| {
        if total > 0 {
            bar.set_length(total);
            bar.set_position(current + 1);
        }
        bar.set_message(format!("[{}] {}", stage, message));
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);
    let t_total = std::time::Instant::now();

    let options = photodate_core::PublishOptions {
        search_path: cli.path,
        output: cli.output,
        jobs: cli.jobs.max(1),
        verify: !cli.no_verify,
        exif: cli.exif,
        time_basis: if cli.utc { TimeBasis::Utc } else { TimeBasis::Local },
    };

    let token = photodate_core::CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nStopping after the files in progress...");
            token.cancel();
        })
        .context("cannot install Ctrl-C handler")?;
    }
    let control = photodate_core::ProcessControl::new().with_cancel_token(token);

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    if cli.quiet {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let report = progress_reporter(bar.clone());
    let result = photodate_core::process_with_control(&options, &control, &report)?;
    bar.finish_and_clear();

    if !result.year_folders.is_empty() {
        eprintln!("Year folders:");
        for folder in &result.year_folders {
            eprintln!("  - {}", folder);
        }
    }
    for failure in &result.failures {
        eprintln!("Failed: {} ({})", failure.path.display(), failure.message);
    }
    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }

    if let Some(path) = &cli.report {
        let file = std::fs::File::create(path)
            .with_context(|| format!("cannot create report {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &result)?;
    }

    eprintln!(
        "{} Published {}/{} files, {} sources corrected, {} failed, {} timestamp problems ({:.2}s)",
        if result.cancelled { "Cancelled!" } else { "Done!" },
        result.files_published,
        result.total_media,
        result.sources_corrected,
        result.files_failed,
        result.timestamp_problems,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
