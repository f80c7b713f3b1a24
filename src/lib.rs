//! lyricount: parallel word and artist frequency counting over CSV lyric corpora
//!
//! The corpus is split into byte ranges, one per participant. Each
//! participant counts the records it owns into two [`CountTable`]s; the
//! contributors ship their tables to worker 0, which merges them, writes
//! the ranked reports and reduces the timing metrics.

pub mod config;
pub mod coordinator;
pub mod count_table;
pub mod csv_record;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod rank;
pub mod sentiment;
pub mod tokenize;
pub mod wire;
pub mod worker;

pub use config::{CliArgs, RunConfig};
pub use coordinator::{run, Aggregator, Outcome, RunReport};
pub use count_table::CountTable;
pub use csv_record::{Parsed, RecordReader};
pub use error::{AggregateError, ConfigError, Result, WireError};
pub use metrics::MetricsSummary;
pub use sentiment::{ClassifierFactory, SentimentClassifier, SentimentCounts};
pub use tokenize::{Charset, TokenPolicy, Tokenizer};
