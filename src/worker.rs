//! Per-participant scan of one byte range
//!
//! Each participant maps the corpus read-only, snaps its raw range start to
//! a record boundary and reads records until the next one would start at
//! or past its raw range end. Every well-formed record contributes its
//! category to one table and its text tokens to another.

use crate::config::RunConfig;
use crate::count_table::CountTable;
use crate::csv_record::{Parsed, RecordReader};
use crate::error::{AggregateError, Operation, Result, WorkerId};
use crate::metrics::RunTotals;
use crate::partition::{align_to_record, CorpusLayout, Partition};
use crate::sentiment::{ClassifierFactory, SentimentBatcher, SentimentPartial};
use crate::tokenize::Tokenizer;
use memmap2::Mmap;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Everything one participant contributes to the merge
#[derive(Debug)]
pub struct LocalCounts {
    pub tokens: CountTable,
    pub categories: CountTable,
    pub totals: RunTotals,
    pub sentiment: Option<SentimentPartial>,
}

/// Accumulates counts for the records one participant owns
pub struct LocalCounter {
    worker: WorkerId,
    tokenizer: Tokenizer,
    category_column: usize,
    text_column: usize,
    fold_category_case: bool,
    tokens: CountTable,
    categories: CountTable,
    totals: RunTotals,
    sentiment: Option<SentimentBatcher>,
}

impl LocalCounter {
    pub fn new(worker: WorkerId, config: &RunConfig, classifier: Option<&ClassifierFactory>) -> Self {
        let sentiment = classifier
            .filter(|_| config.sentiment)
            .map(|factory| SentimentBatcher::new(worker, factory(), config.sentiment_batch));
        Self {
            worker,
            tokenizer: Tokenizer::new(config.token_policy),
            category_column: config.category_column,
            text_column: config.text_column,
            fold_category_case: config.fold_category_case,
            tokens: CountTable::new(),
            categories: CountTable::new(),
            totals: RunTotals::default(),
            sentiment,
        }
    }

    /// Count one parsed record; malformed ones are tallied and dropped
    pub fn observe(&mut self, parsed: Parsed, offset: u64) {
        let mut fields = match parsed {
            Parsed::Record(fields) => fields,
            Parsed::Malformed(reason) => {
                debug!(worker = self.worker, offset, ?reason, "Skipping malformed record");
                self.totals.skipped += 1;
                return;
            }
        };
        if fields.len() <= self.category_column.max(self.text_column) {
            debug!(worker = self.worker, offset, found = fields.len(), "Skipping short record");
            self.totals.skipped += 1;
            return;
        }

        let category = std::mem::take(&mut fields[self.category_column]);
        if !category.is_empty() {
            if self.fold_category_case {
                self.categories.increment_owned(category.to_lowercase(), 1);
            } else {
                self.categories.increment_owned(category, 1);
            }
        }

        let text = std::mem::take(&mut fields[self.text_column]);
        let tokens = &mut self.tokens;
        self.totals.tokens += self
            .tokenizer
            .for_each_token(&text, |token| tokens.increment(token, 1));
        self.totals.records += 1;

        if let Some(batcher) = self.sentiment.as_mut() {
            batcher.push(text);
        }
    }

    pub fn finish(self) -> LocalCounts {
        LocalCounts {
            tokens: self.tokens,
            categories: self.categories,
            totals: self.totals,
            sentiment: self.sentiment.map(SentimentBatcher::finish),
        }
    }
}

/// Read the records owned by `part` out of the whole-corpus bytes `data`
pub fn count_range(
    data: &[u8],
    part: Partition,
    header_len: u64,
    fields: usize,
    counter: &mut LocalCounter,
    abort: &AtomicBool,
) -> Result<()> {
    let worker = counter.worker;
    let range = part.range;
    let start = align_to_record(
        data,
        range.start as usize,
        header_len as usize,
        part.entry_in_quotes,
    );
    debug!(
        worker,
        start = range.start,
        end = range.end,
        aligned = start,
        "Partition assigned"
    );

    let mut reader = RecordReader::at_offset(&data[start..], start as u64, fields);
    loop {
        if abort.load(Ordering::Relaxed) {
            return Err(AggregateError::worker(
                worker,
                Operation::ReadRecords,
                AggregateError::PeerAborted { worker },
            ));
        }
        let parsed = match reader
            .next_record()
            .map_err(|e| AggregateError::worker(worker, Operation::ReadRecords, e))?
        {
            Some(parsed) => parsed,
            None => break,
        };
        if reader.record_start() >= range.end {
            break;
        }
        counter.observe(parsed, reader.record_start());
    }
    Ok(())
}

/// Map the corpus and count the partition of `worker`
pub fn scan_partition(
    worker: WorkerId,
    config: &RunConfig,
    layout: &CorpusLayout,
    abort: &AtomicBool,
    classifier: Option<&ClassifierFactory>,
) -> Result<LocalCounts> {
    let file = File::open(&config.input)
        .map_err(|e| AggregateError::worker(worker, Operation::OpenCorpus, e))?;
    // Read-only mapping; the corpus is not modified while a run is in progress
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|e| AggregateError::worker(worker, Operation::MapCorpus, e))?;

    let part = layout.partition(worker);
    let data = &mmap[..mmap.len().min(layout.file_size as usize)];

    let mut counter = LocalCounter::new(worker, config, classifier);
    count_range(data, part, layout.header_len, config.fields, &mut counter, abort)?;
    let counts = counter.finish();

    info!(
        worker,
        bytes = part.range.len(),
        records = counts.totals.records,
        tokens = counts.totals.tokens,
        skipped = counts.totals.skipped,
        "Local count finished"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{plan_partitions, ByteRange};
    use crate::sentiment::lexicon_factory;

    const CORPUS: &str = "artist,song,link,text\n\
        A,s1,x,hello world\n\
        B,s2,x,\"hello,\nthere\"\n\
        broken,row\n\
        A,s3,x,world\n";

    fn config(workers: usize) -> RunConfig {
        let mut config = RunConfig::new("unused.csv");
        config.workers = workers;
        config
    }

    fn count_all(workers: usize) -> (CountTable, CountTable, RunTotals) {
        let data = CORPUS.as_bytes();
        let config = config(workers);
        let abort = AtomicBool::new(false);
        let mut tokens = CountTable::new();
        let mut categories = CountTable::new();
        let mut totals = RunTotals::default();
        let plan = plan_partitions(&data[22..], data.len() as u64, 22, workers).unwrap();
        for (id, part) in plan.into_iter().enumerate() {
            let mut counter = LocalCounter::new(id, &config, None);
            count_range(data, part, 22, 4, &mut counter, &abort).unwrap();
            let local = counter.finish();
            tokens.merge(&local.tokens);
            categories.merge(&local.categories);
            totals.add(&local.totals);
        }
        (tokens, categories, totals)
    }

    #[test]
    fn single_range_counts_everything() {
        let (tokens, categories, totals) = count_all(1);
        assert_eq!(tokens.get("hello"), Some(2));
        assert_eq!(tokens.get("world"), Some(2));
        assert_eq!(tokens.get("there"), Some(1));
        assert_eq!(categories.get("A"), Some(2));
        assert_eq!(categories.get("B"), Some(1));
        assert_eq!(
            totals,
            RunTotals {
                records: 3,
                tokens: 5,
                skipped: 1
            }
        );
    }

    #[test]
    fn any_split_counts_each_record_once() {
        let expected = count_all(1);
        for workers in 2..=12 {
            assert_eq!(count_all(workers), expected, "workers = {workers}");
        }
    }

    #[test]
    fn folds_category_case_and_skips_empty() {
        let data = b"a,b,c,d\nABBA,s,l,t\nabba,s,l,t\n,s,l,t\n";
        let mut config = config(1);
        config.fold_category_case = true;
        let mut counter = LocalCounter::new(0, &config, None);
        let part = Partition {
            range: ByteRange { start: 8, end: data.len() as u64 },
            entry_in_quotes: false,
        };
        count_range(data, part, 8, 4, &mut counter, &AtomicBool::new(false)).unwrap();
        let local = counter.finish();
        assert_eq!(local.categories.get("abba"), Some(2));
        assert_eq!(local.categories.len(), 1);
        assert_eq!(local.totals.records, 3);
    }

    #[test]
    fn abort_flag_stops_the_scan() {
        let data = CORPUS.as_bytes();
        let mut counter = LocalCounter::new(2, &config(1), None);
        let part = Partition {
            range: ByteRange { start: 22, end: data.len() as u64 },
            entry_in_quotes: false,
        };
        let err = count_range(data, part, 22, 4, &mut counter, &AtomicBool::new(true)).unwrap_err();
        assert!(err.is_secondary());
    }

    #[test]
    fn sentiment_only_when_enabled() {
        let factory = lexicon_factory();
        let counter = LocalCounter::new(0, &config(1), Some(&factory));
        assert!(counter.finish().sentiment.is_none());

        let mut config = config(1);
        config.sentiment = true;
        let mut counter = LocalCounter::new(0, &config, Some(&factory));
        counter.observe(
            Parsed::Record(vec!["A".into(), "s".into(), "l".into(), "so happy".into()]),
            0,
        );
        let partial = counter.finish().sentiment.unwrap();
        assert!(partial.complete);
        assert_eq!(partial.counts.positive, 1);
    }
}
