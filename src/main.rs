//! FastConvert CLI - Concurrent Batch Image Converter
//!
//! Thin front end over the conversion pipeline: merges flags with the
//! settings file, draws a progress bar and prints the run report.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fastconvert::{
    cancel_on_interrupt, init_logging, ConvertError, ImageFormat, Pipeline, ProgressUpdate,
    RunReport, Settings, SourceFormat,
};

/// FastConvert - Concurrent Batch Image Converter
#[derive(Parser)]
#[command(
    name = "fastconvert",
    version,
    about = "Batch image format converter with a bounded worker pool",
    long_about = "FastConvert converts every image in a directory into another format, \
                  optionally shrinking it to fit a bounding box. Work is spread over a fixed \
                  number of workers; transient failures are retried and Ctrl-C stops the run \
                  cleanly."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (.toml or .yaml)
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = "FASTCONVERT_CONFIG",
        default_value = "fastconvert.toml"
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert images from one format to another
    Convert {
        /// Source format tag, or "auto" to sniff each file
        #[arg(long, value_name = "FORMAT", default_value = "auto", value_parser = parse_source)]
        from: SourceFormat,

        /// Target format tag (jpg, png, gif, bmp)
        #[arg(long, value_name = "FORMAT", value_parser = parse_target)]
        to: ImageFormat,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Re-encode images of any detected format into one target format
    Compress {
        /// Target format tag (jpg, png, gif, bmp)
        #[arg(long, value_name = "FORMAT", value_parser = parse_target)]
        to: ImageFormat,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Inspect or create the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Write a settings file with default values
    Init {
        /// Output file path (.toml or .yaml)
        #[arg(short, long, default_value = "fastconvert.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Flags shared by the conversion commands; unset ones fall back to settings
#[derive(Args)]
struct RunArgs {
    /// Source directory
    #[arg(short, long, value_name = "DIR")]
    source: Option<PathBuf>,

    /// Target directory
    #[arg(short, long, value_name = "DIR")]
    target: Option<PathBuf>,

    /// Maximum width in pixels (0 = unbounded)
    #[arg(short, long, value_name = "PIXELS")]
    width: Option<i32>,

    /// Maximum height in pixels (0 = unbounded)
    #[arg(short = 'H', long, value_name = "PIXELS")]
    height: Option<i32>,

    /// Number of workers
    #[arg(short = 'j', long, value_name = "COUNT")]
    workers: Option<usize>,

    /// Output quality for lossy formats (1-100)
    #[arg(short, long, value_name = "QUALITY")]
    quality: Option<i32>,

    /// Skip files whose output already exists
    #[arg(long)]
    skip_existing: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_source(s: &str) -> Result<SourceFormat, String> {
    s.parse().map_err(|e: ConvertError| e.to_string())
}

fn parse_target(s: &str) -> Result<ImageFormat, String> {
    s.parse().map_err(|e: ConvertError| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}: {:#}", style("Error").red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    if cli.quiet {
        settings.logging.level = "error".to_string();
    } else if cli.verbose {
        settings.logging.level = "debug".to_string();
    }
    init_logging(&settings.logging);

    match cli.command {
        Commands::Convert { from, to, run } => run_conversion(settings, from, to, run).await,
        Commands::Compress { to, run } => run_conversion(settings, SourceFormat::Auto, to, run).await,
        Commands::Config { action } => handle_config(action, &settings),
    }
}

async fn run_conversion(
    mut settings: Settings,
    from: SourceFormat,
    to: ImageFormat,
    args: RunArgs,
) -> anyhow::Result<()> {
    if let Some(source) = args.source {
        settings.source_dir = source;
    }
    if let Some(target) = args.target {
        settings.target_dir = target;
    }
    if let Some(width) = args.width {
        settings.width = width;
    }
    if let Some(height) = args.height {
        settings.height = height;
    }
    if let Some(quality) = args.quality {
        settings.quality = quality;
    }
    settings.skip_existing |= args.skip_existing;

    let mut options = settings.to_options(from, to);
    if let Some(workers) = args.workers {
        options = options.workers(workers);
    }

    let bar = if args.json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        bar
    };

    let failed_bar = bar.clone();
    let options = options.on_error(move |path, error| {
        failed_bar.println(format!("{} {}: {}", style("✗").red(), path.display(), error));
    });

    let pipeline = Pipeline::new();
    let bar_task = tokio::spawn(follow_progress(pipeline.progress().subscribe(), bar.clone()));

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());

    info!("Starting conversion to {}", to);
    let result = pipeline.run(options, cancel).await;

    interrupt.abort();
    bar_task.abort();
    bar.finish_and_clear();

    match result {
        Ok(report) => print_report(&report, args.json),
        Err(e) => {
            if let Some(report) = e.report() {
                print_report(report, args.json)?;
            }
            Err(e).context("Conversion failed")
        }
    }
}

/// Mirror progress updates onto the bar until the run finishes
async fn follow_progress(mut updates: broadcast::Receiver<ProgressUpdate>, bar: ProgressBar) {
    loop {
        match updates.recv().await {
            Ok(ProgressUpdate::Started { total }) => bar.set_length(total),
            Ok(ProgressUpdate::JobFinished { source, .. }) => {
                if let Some(name) = source.file_name() {
                    bar.set_message(name.to_string_lossy().into_owned());
                }
                bar.inc(1);
            }
            Ok(ProgressUpdate::Finished { .. }) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(missed)) => {
                debug!("Progress bar skipped {} updates", missed);
                bar.inc(missed);
            }
        }
    }
}

fn handle_config(action: ConfigAction, settings: &Settings) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered =
                toml::to_string_pretty(settings).context("Failed to render settings")?;
            print!("{}", rendered);
        }
        ConfigAction::Init { output, force } => {
            write_default_settings(&output, force)?;
            println!(
                "{}: Wrote default settings to {}",
                style("Success").green().bold(),
                output.display()
            );
        }
    }
    Ok(())
}

fn write_default_settings(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }
    Settings::default()
        .to_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))
}

/// Print the run report
fn print_report(report: &RunReport, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let seconds = report.elapsed.as_secs_f64();

    println!();
    println!("{}", style("Conversion Summary:").bold());
    println!("  {}: {}", style("Files").bold(), report.total_files);
    println!("  {}: {}", style("Converted").green(), report.converted);
    if report.skipped > 0 {
        println!("  {}: {}", style("Skipped").yellow(), report.skipped);
    }
    if report.failed_count > 0 {
        println!("  {}: {}", style("Failed").red(), report.failed_count);
    }
    if report.was_cancelled() {
        println!(
            "  {}: {} not processed",
            style("Cancelled").magenta(),
            report.total_files.saturating_sub(report.processed())
        );
    }
    if report.crashed_workers > 0 {
        println!(
            "  {}: {} worker(s) crashed, {} file(s) not processed",
            style("Crashed").red().bold(),
            report.crashed_workers,
            report.total_files.saturating_sub(report.processed())
        );
    }
    println!("  {}: {:.2}s", style("Duration").blue(), seconds);

    if report.converted > 0 && seconds > 0.0 {
        println!(
            "  {}: {:.1} files/sec",
            style("Speed").cyan(),
            report.converted as f64 / seconds
        );
    }

    Ok(())
}
