//! Verify the reports in an output directory
//!
//! Re-reads both ranked reports with the same CSV reader the counter uses
//! and checks header shape, ordering, key uniqueness and row limits, then
//! cross-checks the row counts against the metrics summary.
//!
//! Usage:
//!   cargo run --release --bin check_reports -- [DIR] [--word-limit N] [--artist-limit N]

use anyhow::{bail, Context, Result};
use clap::Parser;
use lyricount::config::{CATEGORY_REPORT, METRICS_REPORT, WORD_REPORT};
use lyricount::csv_record::{Parsed, RecordReader};
use lyricount::metrics::MetricsSummary;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "check_reports", about = "Validate lyricount reports")]
struct Args {
    /// Directory written by lyricount
    #[arg(value_name = "DIR", default_value = "output")]
    dir: PathBuf,

    /// Expected word report row limit (0 = unlimited)
    #[arg(long, value_name = "NUM")]
    word_limit: Option<usize>,

    /// Expected artist report row limit (0 = unlimited)
    #[arg(long, value_name = "NUM")]
    artist_limit: Option<usize>,

    /// Rows to print from each report
    #[arg(long, default_value = "5", value_name = "NUM")]
    preview: usize,
}

struct Report {
    label: String,
    rows: Vec<(String, i64)>,
}

fn read_report(path: &Path) -> Result<Report> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = RecordReader::new(BufReader::with_capacity(1 << 20, file), 2);

    let label = match reader.next_record()? {
        Some(Parsed::Record(fields)) if fields[1] == "count" => fields[0].clone(),
        Some(other) => bail!("{}: bad header {:?}", path.display(), other),
        None => bail!("{}: empty file", path.display()),
    };

    let mut rows = Vec::new();
    while let Some(parsed) = reader.next_record()? {
        let fields = match parsed {
            Parsed::Record(fields) => fields,
            Parsed::Malformed(reason) => bail!(
                "{}: malformed row at byte {}: {:?}",
                path.display(),
                reader.record_start(),
                reason
            ),
        };
        let count: i64 = fields[1]
            .parse()
            .with_context(|| format!("{}: bad count {:?}", path.display(), fields[1]))?;
        rows.push((fields[0].clone(), count));
    }
    Ok(Report { label, rows })
}

fn check(path: &Path, report: &Report, limit: Option<usize>) -> Result<()> {
    let mut seen = HashSet::with_capacity(report.rows.len());
    for (i, (key, count)) in report.rows.iter().enumerate() {
        if *count <= 0 {
            bail!("{}: row {} has non-positive count {count}", path.display(), i + 1);
        }
        if !seen.insert(key.as_str()) {
            bail!("{}: duplicate key {key:?}", path.display());
        }
        if i > 0 {
            let (prev_key, prev_count) = &report.rows[i - 1];
            let ordered = prev_count > count || (prev_count == count && prev_key < key);
            if !ordered {
                bail!(
                    "{}: row {} ({key},{count}) out of order after ({prev_key},{prev_count})",
                    path.display(),
                    i + 1
                );
            }
        }
    }
    if let Some(limit) = limit.filter(|&l| l > 0) {
        if report.rows.len() > limit {
            bail!(
                "{}: {} rows exceed limit {limit}",
                path.display(),
                report.rows.len()
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let word_path = args.dir.join(WORD_REPORT);
    let category_path = args.dir.join(CATEGORY_REPORT);
    let metrics_path = args.dir.join(METRICS_REPORT);

    let words = read_report(&word_path)?;
    let categories = read_report(&category_path)?;
    check(&word_path, &words, args.word_limit)?;
    check(&category_path, &categories, args.artist_limit)?;

    println!("{}: {} rows ({})", word_path.display(), words.rows.len(), words.label);
    println!(
        "{}: {} rows ({})",
        category_path.display(),
        categories.rows.len(),
        categories.label
    );

    if metrics_path.exists() {
        let summary: MetricsSummary = serde_json::from_reader(BufReader::new(
            File::open(&metrics_path).with_context(|| format!("open {}", metrics_path.display()))?,
        ))
        .with_context(|| format!("parse {}", metrics_path.display()))?;

        if words.rows.len() > summary.distinct_tokens {
            bail!(
                "{} rows but only {} distinct tokens in metrics",
                words.rows.len(),
                summary.distinct_tokens
            );
        }
        if categories.rows.len() > summary.distinct_categories {
            bail!(
                "{} rows but only {} distinct categories in metrics",
                categories.rows.len(),
                summary.distinct_categories
            );
        }
        let counted: i64 = words.rows.iter().map(|(_, c)| c).sum();
        if counted as u64 > summary.total_tokens {
            bail!("word counts sum to {counted}, more than {} tokens", summary.total_tokens);
        }
        println!(
            "{}: {} workers, {} records, {} tokens",
            metrics_path.display(),
            summary.workers,
            summary.total_records,
            summary.total_tokens
        );
    }

    for report in [&words, &categories] {
        println!("\n{}:", report.label);
        for (key, count) in report.rows.iter().take(args.preview) {
            println!("  {key:<30} {count}");
        }
    }

    println!("\nOK: reports are ranked, unique and within limits.");
    Ok(())
}
