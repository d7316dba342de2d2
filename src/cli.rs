//! Command-line interface components.

use crate::config::{OutputFormat, QcConfig};
use crate::events::TracingSink;
use crate::models::FluxTable;
use crate::processor::loader::load_csv;
use crate::processor::summary::QcSummary;
use crate::processor::writer::TableWriter;
use crate::processor::{FilterProcessor, QcOutcome};
use crate::registry::FilterRegistry;
use crate::timeline::{RegularizationReport, Regularizer};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Export format selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Parquet,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Parquet => OutputFormat::Parquet,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "flux_qc")]
#[command(about = "Quality control for half-hourly eddy-covariance flux time series")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Delimited text file with a timestamp column and measurement columns
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// TOML configuration with input, regularization, filter and output settings
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Output file (defaults to <INPUT stem>_qc.<format> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format, overriding the configuration
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Regularize the timeline and export without filtering
    #[arg(long)]
    pub regularize_only: bool,

    /// Also export `<variable>_filtered` columns with rejected values removed
    #[arg(long)]
    pub keep_masked: bool,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors and skip the summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Apply command-line overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut QcConfig) {
        if let Some(format) = self.format {
            config.output.format = format.into();
        }
        if self.keep_masked {
            config.output.include_masked = true;
        }
    }

    /// Output path, defaulting to `<input stem>_qc.<ext>` beside the input
    pub fn get_output_path(&self, format: OutputFormat) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => {
                let stem = self
                    .input
                    .file_stem()
                    .unwrap_or_default()
                    .to_string_lossy();
                let extension = match format {
                    OutputFormat::Parquet => "parquet",
                    OutputFormat::Csv => "csv",
                };
                self.input
                    .with_file_name(format!("{}_qc.{}", stem, extension))
            }
        }
    }
}

/// Set up structured logging
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("flux_qc={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}

/// Load, regularize, filter and export one input file
pub fn run(args: Args) -> Result<()> {
    setup_logging(&args);
    let start_time = Instant::now();

    let mut config = match &args.config {
        Some(path) => QcConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => QcConfig::default(),
    };
    args.apply_overrides(&mut config);

    let raw = load_csv(&args.input, &config.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let (table, report) = Regularizer::new(config.regularization.clone())
        .regularize(raw)
        .context("Failed to regularize timestamps")?;
    info!("{}", report.summary());

    let outcome = if args.regularize_only {
        QcOutcome {
            table,
            registry: FilterRegistry::new(),
            outcomes: Vec::new(),
        }
    } else {
        run_filters(&config, table, args.quiet)?
    };

    let output_path = args.get_output_path(config.output.format);
    let writer = TableWriter::new(output_path, config.output.clone());
    writer
        .write(&outcome.table, &outcome.registry)
        .with_context(|| format!("Failed to write {}", writer.output_path().display()))?;

    if !args.quiet {
        print_summary(
            &report,
            &outcome.summary(),
            writer.output_path(),
            start_time.elapsed(),
        );
    }
    Ok(())
}

fn run_filters(config: &QcConfig, table: FluxTable, quiet: bool) -> Result<QcOutcome> {
    let processor = FilterProcessor::new(config.filters.clone());
    let stages = processor.stages_enabled();
    if stages.is_empty() {
        info!("No filter groups configured; exporting the regularized table");
    }

    let progress_bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(stages.len() as u64)
    };
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut sink = TracingSink;
    let outcome = processor
        .run_with_progress(table, &mut sink, |stage| {
            progress_bar.set_message(stage.stage.to_string());
            progress_bar.inc(1);
        })
        .context("Filter pipeline failed")?;
    progress_bar.finish_and_clear();
    Ok(outcome)
}

fn print_summary(
    report: &RegularizationReport,
    summary: &QcSummary,
    output_path: &Path,
    elapsed: Duration,
) {
    println!("\n{}", "Flux quality control complete".green().bold());
    println!("{}", "━".repeat(41));
    println!("{}", "Timeline:".bold());
    println!("   • Rows: {} in, {} out", report.input_rows, report.output_rows);
    if let Some(frequency) = report.frequency {
        println!("   • Frequency: {} min", frequency.num_minutes());
    }
    println!(
        "   • Dropped: {} unparseable, {} duplicate, {} off-grid",
        report.unparseable_rows.len(),
        report.duplicate_rows.len(),
        report.off_grid_rows.len()
    );
    println!("   • Gap rows inserted: {}", report.gap_rows);

    if !summary.variables.is_empty() {
        println!("{}", "Variables:".bold());
        for variable in &summary.variables {
            let percent = variable.valid_percent();
            let shown = format!("{:.1}%", percent);
            let shown = if percent >= 80.0 {
                shown.green()
            } else if percent >= 50.0 {
                shown.yellow()
            } else {
                shown.red()
            };
            println!(
                "   • {}: {}/{} valid ({}), {} filters",
                variable.variable.cyan(),
                variable.valid,
                variable.present,
                shown,
                variable.filters.len()
            );
        }
    }

    let failed = summary.total_failed();
    if failed > 0 {
        println!(
            "{}",
            format!("⚠️  {} filter invocations failed, see log", failed).yellow()
        );
    }
    println!("📁 Output: {}", output_path.display());
    println!("⏱  Time: {:.2?}", elapsed);
    println!();
}
