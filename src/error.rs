//! Error types for lyricount
//!
//! Two classes of failure exist in a run:
//! - Fatal: the run stops and every participant observes the abort
//! - Recoverable: a malformed record is dropped and counting continues
//!
//! Only fatal failures are represented here. Malformed records never
//! surface as errors; see [`crate::csv_record::Malformed`].
//!
//! Messages never repeat their cause. The cause is reachable through
//! `source()`, so `anyhow`'s `{:#}` prints the whole chain exactly once.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Worker identifier. Worker 0 is always the coordinator.
pub type WorkerId = usize;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, AggregateError>;

/// Operation a participant was performing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ProbeCorpus,
    OpenCorpus,
    MapCorpus,
    ReadRecords,
    SendPartial,
    ReceivePartial,
    DecodePartial,
    AwaitRelease,
    ReleaseContributors,
    WriteReport,
    WriteMetrics,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ProbeCorpus => "probe corpus",
            Operation::OpenCorpus => "open corpus",
            Operation::MapCorpus => "map corpus",
            Operation::ReadRecords => "read records",
            Operation::SendPartial => "send partial",
            Operation::ReceivePartial => "receive partial",
            Operation::DecodePartial => "decode partial",
            Operation::AwaitRelease => "await release",
            Operation::ReleaseContributors => "release contributors",
            Operation::WriteReport => "write report",
            Operation::WriteMetrics => "write metrics",
        };
        f.write_str(name)
    }
}

/// Top-level error type for a run
#[derive(Error, Debug)]
pub enum AggregateError {
    /// Configuration rejected before the run started
    #[error("Configuration error")]
    Config(#[from] ConfigError),

    /// Corpus size or header could not be determined
    #[error("Failed to obtain corpus metadata for '{path}'")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A participant failed while performing `op`
    #[error("worker {worker} failed to {op}")]
    Worker {
        worker: WorkerId,
        op: Operation,
        #[source]
        source: Box<AggregateError>,
    },

    /// A contributor sent something other than what the protocol expects next
    #[error("protocol violation from worker {worker}: expected {expected}, found {found}")]
    Protocol {
        worker: WorkerId,
        expected: &'static str,
        found: &'static str,
    },

    /// Another participant aborted the run; this participant stopped in response
    #[error("worker {worker} stopped because another participant aborted")]
    PeerAborted { worker: WorkerId },

    /// Participant thread panicked
    #[error("worker {worker} panicked")]
    Panicked { worker: WorkerId },

    /// Participant thread could not be started
    #[error("failed to spawn worker {worker}: {reason}")]
    Spawn { worker: WorkerId, reason: String },

    /// Partial-table payload could not be decoded
    #[error("Wire error")]
    Wire(#[from] WireError),

    /// I/O errors (report files, corpus reads)
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl AggregateError {
    /// Wrap `source` as a failure of `worker` during `op`
    pub fn worker(worker: WorkerId, op: Operation, source: impl Into<AggregateError>) -> Self {
        AggregateError::Worker {
            worker,
            op,
            source: Box::new(source.into()),
        }
    }

    /// True when this error only reports that some other participant failed first
    pub fn is_secondary(&self) -> bool {
        match self {
            AggregateError::PeerAborted { .. } => true,
            AggregateError::Worker { source, .. } => source.is_secondary(),
            _ => false,
        }
    }
}

/// Errors decoding a serialized counting table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("bad magic 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("unsupported version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("payload truncated at byte {offset} (needed {needed} more)")]
    Truncated { offset: usize, needed: usize },

    #[error("{count} trailing bytes after last entry")]
    TrailingBytes { count: usize },

    #[error("key at byte {offset} is not valid UTF-8")]
    InvalidKey { offset: usize },
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Worker count {count} exceeds maximum of {max}")]
    TooManyWorkers { count: usize, max: usize },

    #[error("Column {column} is out of range for records with {fields} fields")]
    ColumnOutOfRange { column: usize, fields: usize },

    #[error("Category and text columns must differ (both are {0})")]
    SameColumn(usize),

    #[error("Sentiment batch size must be at least 1")]
    ZeroBatch,
}
