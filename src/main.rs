//! lyricount - parallel word and artist frequency counter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use lyricount::config::{CliArgs, RunConfig};
use lyricount::coordinator::{Aggregator, Outcome, RunReport, WORD_LABEL};
use std::process::ExitCode;
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    let config = RunConfig::from_args(&args).context("Invalid configuration")?;

    println!("=== Parallel Corpus Analysis ===");
    println!("Input:   {}", config.input.display());
    println!("Output:  {}", config.output_dir.display());
    println!("Workers: {}", config.workers);

    println!("\n[1/3] Counting partitions and merging on worker 0...");
    let t0 = Instant::now();
    let outcome = Aggregator::new(config.clone())
        .with_preview(args.preview)
        .run()
        .with_context(|| format!("Aggregation of {} failed", config.input.display()))?;

    let report = match outcome {
        Outcome::Completed(report) => report,
        Outcome::NoData {
            file_size,
            header_len,
        } => {
            warn!(file_size, header_len, "No records after the header; wrote empty reports");
            println!("No data: {file_size} bytes, header is {header_len} bytes. Empty reports written.");
            return Ok(());
        }
    };
    println!("  done in {:.2?}", t0.elapsed());

    println!("\n[2/3] Reports");
    println!(
        "  {} ({} rows)",
        config.word_report_path().display(),
        report.word_rows
    );
    println!(
        "  {} ({} rows)",
        config.category_report_path().display(),
        report.category_rows
    );
    println!("  {}", config.metrics_path().display());

    println!("\n[3/3] Summary");
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    println!(
        "  records={} tokens={} skipped={} distinct_words={} distinct_{}s={}",
        s.total_records,
        s.total_tokens,
        s.skipped_records,
        s.distinct_tokens,
        report.category_label,
        s.distinct_categories
    );
    println!(
        "  compute avg={:.3}s min={:.3}s max={:.3}s | total avg={:.3}s min={:.3}s max={:.3}s",
        s.compute_time.avg_seconds,
        s.compute_time.min_seconds,
        s.compute_time.max_seconds,
        s.total_time.avg_seconds,
        s.total_time.min_seconds,
        s.total_time.max_seconds
    );
    if let Some(sentiment) = &s.sentiment {
        println!(
            "  sentiment positive={} neutral={} negative={}{}",
            sentiment.positive,
            sentiment.neutral,
            sentiment.negative,
            if sentiment.complete { "" } else { " (incomplete)" }
        );
    }

    print_top(WORD_LABEL, &report.top_tokens);
    print_top(&report.category_label, &report.top_categories);
}

fn print_top(label: &str, entries: &[(String, i64)]) {
    if entries.is_empty() {
        return;
    }
    println!("\nTop {} by {label}:", entries.len());
    for (i, (key, count)) in entries.iter().enumerate() {
        println!("  {:>3}. {:<30} {}", i + 1, key, count);
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("lyricount=debug,warn")
        } else {
            EnvFilter::new("lyricount=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}
