//! Timing reduction and the run summary
//!
//! Every participant reports two samples: compute time (corpus read and
//! counting) and total time (including the partial-result exchange). The
//! coordinator reduces each to sum/min/max and derives the average.

use crate::sentiment::SentimentSummary;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Elapsed-time samples from one participant
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingSample {
    pub compute: Duration,
    pub total: Duration,
}

/// Counters every participant contributes alongside its tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunTotals {
    /// Well-formed records counted
    pub records: u64,
    /// Tokens counted across all text fields
    pub tokens: u64,
    /// Malformed records dropped
    pub skipped: u64,
}

impl RunTotals {
    pub fn add(&mut self, other: &RunTotals) {
        self.records += other.records;
        self.tokens += other.tokens;
        self.skipped += other.skipped;
    }
}

/// Running sum/min/max over duration samples, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStats {
    sum: f64,
    min: f64,
    max: f64,
    samples: usize,
}

impl Default for TimingStats {
    fn default() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: 0.0,
            samples: 0,
        }
    }
}

impl TimingStats {
    pub fn observe(&mut self, sample: Duration) {
        let secs = sample.as_secs_f64();
        self.sum += secs;
        self.min = self.min.min(secs);
        self.max = self.max.max(secs);
        self.samples += 1;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn summary(&self) -> TimeSummary {
        if self.samples == 0 {
            return TimeSummary::default();
        }
        TimeSummary {
            avg_seconds: self.sum / self.samples as f64,
            min_seconds: self.min,
            max_seconds: self.max,
        }
    }
}

/// Reduced timing for one kind of sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSummary {
    pub avg_seconds: f64,
    pub min_seconds: f64,
    pub max_seconds: f64,
}

/// Reduces compute and total time across participants
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector {
    compute: TimingStats,
    total: TimingStats,
}

impl MetricsCollector {
    pub fn observe(&mut self, sample: TimingSample) {
        self.compute.observe(sample.compute);
        self.total.observe(sample.total);
    }

    pub fn participants(&self) -> usize {
        self.compute.samples()
    }

    pub fn compute_time(&self) -> TimeSummary {
        self.compute.summary()
    }

    pub fn total_time(&self) -> TimeSummary {
        self.total.summary()
    }
}

/// Contents of `performance_metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub workers: usize,
    pub total_records: u64,
    pub total_tokens: u64,
    pub skipped_records: u64,
    pub distinct_tokens: usize,
    pub distinct_categories: usize,
    pub compute_time: TimeSummary,
    pub total_time: TimeSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentSummary>,
}

/// Write `summary` as pretty JSON to `path`
pub fn write_metrics(path: &Path, summary: &MetricsSummary) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, summary)?;
    writeln!(out)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn reduces_min_max_avg() {
        let mut m = MetricsCollector::default();
        for (c, t) in [(1.0, 2.0), (3.0, 4.0), (2.0, 6.0)] {
            m.observe(TimingSample {
                compute: secs(c),
                total: secs(t),
            });
        }
        assert_eq!(m.participants(), 3);
        let compute = m.compute_time();
        assert!((compute.avg_seconds - 2.0).abs() < 1e-9);
        assert!((compute.min_seconds - 1.0).abs() < 1e-9);
        assert!((compute.max_seconds - 3.0).abs() < 1e-9);
        assert!((m.total_time().avg_seconds - 4.0).abs() < 1e-9);
    }

    #[test]
    fn no_samples_reduce_to_zero() {
        assert_eq!(MetricsCollector::default().compute_time(), TimeSummary::default());
    }

    #[test]
    fn summary_json_omits_disabled_sentiment() {
        let summary = MetricsSummary {
            workers: 2,
            total_records: 3,
            total_tokens: 5,
            skipped_records: 0,
            distinct_tokens: 3,
            distinct_categories: 2,
            compute_time: TimeSummary::default(),
            total_time: TimeSummary::default(),
            sentiment: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["workers"], 2);
        assert_eq!(json["compute_time"]["avg_seconds"], 0.0);
        assert!(json.get("sentiment").is_none());
    }
}
