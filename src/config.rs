//! Configuration types for lyricount
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Output file naming

use crate::csv_record::DEFAULT_FIELDS;
use crate::error::ConfigError;
use crate::tokenize::{Charset, TokenPolicy};
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

pub const WORD_REPORT: &str = "word_counts.csv";
pub const CATEGORY_REPORT: &str = "top_artists.csv";
pub const METRICS_REPORT: &str = "performance_metrics.json";

/// Distributed word and artist frequency counter for CSV lyric corpora
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lyricount",
    version,
    about = "Count word and artist frequencies in a CSV lyrics corpus",
    long_about = "Splits the corpus into byte ranges, counts each range on its own worker thread,\n\
                  and merges the partial tables on worker 0, which writes the ranked reports.",
    after_help = "EXAMPLES:\n    \
        lyricount songs.csv\n    \
        lyricount songs.csv -w 8 -o out --word-limit 0\n    \
        lyricount songs.csv --unicode --keep-apostrophes --sentiment"
)]
pub struct CliArgs {
    /// CSV corpus with a header row
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory that receives the reports
    #[arg(short, long, default_value = "output", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Number of participants (worker 0 also coordinates)
    #[arg(short = 'w', long, default_value_t = default_workers(), value_name = "NUM")]
    pub workers: usize,

    /// Rows in word_counts.csv (0 = all)
    #[arg(long, default_value = "100", value_name = "NUM")]
    pub word_limit: usize,

    /// Rows in top_artists.csv (0 = all)
    #[arg(long, default_value = "50", value_name = "NUM")]
    pub artist_limit: usize,

    /// Drop tokens shorter than this many characters
    #[arg(long, default_value = "1", value_name = "NUM")]
    pub min_token_len: usize,

    /// Keep apostrophes inside tokens ("don't" stays one word)
    #[arg(long)]
    pub keep_apostrophes: bool,

    /// Treat non-ASCII letters as word characters (NFC-normalized)
    #[arg(long)]
    pub unicode: bool,

    /// Count artists case-insensitively
    #[arg(long)]
    pub fold_category_case: bool,

    /// Zero-based column holding the artist
    #[arg(long, default_value = "0", value_name = "COL")]
    pub category_column: usize,

    /// Zero-based column holding the lyrics
    #[arg(long, default_value = "3", value_name = "COL")]
    pub text_column: usize,

    /// Fields per well-formed record
    #[arg(long, default_value_t = DEFAULT_FIELDS, value_name = "NUM")]
    pub fields: usize,

    /// Classify lyric sentiment with the built-in lexicon
    #[arg(long)]
    pub sentiment: bool,

    /// Texts per classifier call
    #[arg(long, default_value = "256", value_name = "NUM")]
    pub sentiment_batch: usize,

    /// Ranked rows echoed to the terminal per report
    #[arg(long, default_value = "10", value_name = "NUM")]
    pub preview: usize,

    /// Verbose output (per-record diagnostics)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub workers: usize,
    pub word_limit: usize,
    pub category_limit: usize,
    pub token_policy: TokenPolicy,
    pub fold_category_case: bool,
    pub category_column: usize,
    pub text_column: usize,
    pub fields: usize,
    pub sentiment: bool,
    pub sentiment_batch: usize,
}

impl RunConfig {
    /// Defaults for `input`: one worker, reports in `./output`
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: PathBuf::from("output"),
            workers: 1,
            word_limit: 100,
            category_limit: 50,
            token_policy: TokenPolicy::default(),
            fold_category_case: false,
            category_column: 0,
            text_column: 3,
            fields: DEFAULT_FIELDS,
            sentiment: false,
            sentiment_batch: 256,
        }
    }

    /// Build configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let config = Self {
            input: args.input.clone(),
            output_dir: args.output_dir.clone(),
            workers: args.workers,
            word_limit: args.word_limit,
            category_limit: args.artist_limit,
            token_policy: TokenPolicy {
                min_len: args.min_token_len,
                keep_apostrophes: args.keep_apostrophes,
                charset: if args.unicode {
                    Charset::Unicode
                } else {
                    Charset::Ascii
                },
            },
            fold_category_case: args.fold_category_case,
            category_column: args.category_column,
            text_column: args.text_column,
            fields: args.fields,
            sentiment: args.sentiment,
            sentiment_batch: args.sentiment_batch,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                count: self.workers,
                max: MAX_WORKERS,
            });
        }
        for column in [self.category_column, self.text_column] {
            if column >= self.fields {
                return Err(ConfigError::ColumnOutOfRange {
                    column,
                    fields: self.fields,
                });
            }
        }
        if self.category_column == self.text_column {
            return Err(ConfigError::SameColumn(self.text_column));
        }
        if self.sentiment && self.sentiment_batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        Ok(())
    }

    pub fn word_report_path(&self) -> PathBuf {
        self.output_dir.join(WORD_REPORT)
    }

    pub fn category_report_path(&self) -> PathBuf {
        self.output_dir.join(CATEGORY_REPORT)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.output_dir.join(METRICS_REPORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("lyricount").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_from_cli() {
        let args = parse(&["songs.csv", "-w", "4"]);
        let config = RunConfig::from_args(&args).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.word_limit, 100);
        assert_eq!(config.category_limit, 50);
        assert_eq!(config.token_policy, TokenPolicy::default());
        assert_eq!(config.word_report_path(), PathBuf::from("output/word_counts.csv"));
        assert_eq!(config.metrics_path(), PathBuf::from("output/performance_metrics.json"));
    }

    #[test]
    fn token_flags_map_to_policy() {
        let args = parse(&["x.csv", "--unicode", "--keep-apostrophes", "--min-token-len", "2"]);
        let policy = RunConfig::from_args(&args).unwrap().token_policy;
        assert_eq!(policy.charset, Charset::Unicode);
        assert!(policy.keep_apostrophes);
        assert_eq!(policy.min_len, 2);
    }

    #[test]
    fn rejects_bad_worker_counts() {
        let args = parse(&["x.csv", "-w", "0"]);
        assert_eq!(RunConfig::from_args(&args).unwrap_err(), ConfigError::NoWorkers);

        let args = parse(&["x.csv", "-w", "10000"]);
        assert!(matches!(
            RunConfig::from_args(&args),
            Err(ConfigError::TooManyWorkers { count: 10000, .. })
        ));
    }

    #[test]
    fn rejects_bad_columns() {
        let mut config = RunConfig::new("x.csv");
        config.text_column = 4;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::ColumnOutOfRange { column: 4, fields: 4 }
        );
        config.text_column = 0;
        assert_eq!(config.validate().unwrap_err(), ConfigError::SameColumn(0));
    }

    #[test]
    fn zero_batch_only_matters_with_sentiment() {
        let mut config = RunConfig::new("x.csv");
        config.sentiment_batch = 0;
        assert!(config.validate().is_ok());
        config.sentiment = true;
        assert_eq!(config.validate().unwrap_err(), ConfigError::ZeroBatch);
    }
}
