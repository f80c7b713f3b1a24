//! Run driver and the coordinator/contributor protocol
//!
//! Every participant is a named thread that counts its own byte range.
//! Worker 0 is the coordinator; all others are contributors. The driver is
//! responsible for:
//! - Probing the corpus and handling the empty-data case
//! - Wiring one rendezvous channel per contributor, plus a release channel
//! - Opening the start gate once every participant is running
//! - Joining every participant and reporting the root-cause failure
//!
//! Coordinator states: AWAIT_PARTIALS, MERGE, release, RANK_AND_EXPORT,
//! METRICS_REDUCE. Contributor states: PARTITION_READ, LOCAL_COUNT, SEND,
//! await release, send timing.

use crate::config::RunConfig;
use crate::count_table::CountTable;
use crate::error::{AggregateError, Operation, Result, WorkerId};
use crate::metrics::{write_metrics, MetricsCollector, MetricsSummary, RunTotals, TimingSample};
use crate::partition::CorpusLayout;
use crate::rank::{top_entries, write_report_file};
use crate::sentiment::{lexicon_factory, ClassifierFactory, SentimentPartial, SentimentSummary};
use crate::wire::{encode_table, merge_encoded};
use crate::worker::scan_partition;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Worker id of the coordinator
pub const COORDINATOR: WorkerId = 0;

/// Label of the token report's key column
pub const WORD_LABEL: &str = "word";

/// Label of the category report when the corpus header has none
pub const DEFAULT_CATEGORY_LABEL: &str = "category";

/// What a participant does after counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Contributor,
}

impl Role {
    pub fn of(worker: WorkerId) -> Self {
        if worker == COORDINATOR {
            Role::Coordinator
        } else {
            Role::Contributor
        }
    }
}

/// Which local table a partial carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Tokens,
    Categories,
}

/// Contributor-to-coordinator message
#[derive(Debug)]
pub enum Message {
    Partial { kind: TableKind, payload: Vec<u8> },
    Totals {
        totals: RunTotals,
        sentiment: Option<SentimentPartial>,
    },
    Timing(TimingSample),
}

impl Message {
    fn name(&self) -> &'static str {
        match self {
            Message::Partial {
                kind: TableKind::Tokens,
                ..
            } => "token partial",
            Message::Partial {
                kind: TableKind::Categories,
                ..
            } => "category partial",
            Message::Totals { .. } => "totals",
            Message::Timing(_) => "timing",
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: MetricsSummary,
    /// Header label used for the category report
    pub category_label: String,
    /// Rows written to each report
    pub word_rows: usize,
    pub category_rows: usize,
    /// Leading ranked entries for the console preview
    pub top_tokens: Vec<(String, i64)>,
    pub top_categories: Vec<(String, i64)>,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed(RunReport),
    /// Nothing after the header; header-only reports were written
    NoData { file_size: u64, header_len: u64 },
}

/// Runs one aggregation over a corpus
pub struct Aggregator {
    config: RunConfig,
    classifier: Option<ClassifierFactory>,
    preview: usize,
}

impl Aggregator {
    /// Aggregator using the built-in lexicon classifier when sentiment is enabled
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            classifier: Some(lexicon_factory()),
            preview: 10,
        }
    }

    /// Replace the sentiment classifier (only used when sentiment is enabled)
    pub fn with_classifier(mut self, factory: ClassifierFactory) -> Self {
        self.classifier = Some(factory);
        self
    }

    /// Number of ranked entries kept for the console preview
    pub fn with_preview(mut self, preview: usize) -> Self {
        self.preview = preview;
        self
    }

    pub fn run(&self) -> Result<Outcome> {
        let config = &self.config;
        config.validate()?;

        let layout = CorpusLayout::probe(&config.input, config.workers).map_err(|source| {
            AggregateError::worker(
                COORDINATOR,
                Operation::ProbeCorpus,
                AggregateError::Metadata {
                    path: config.input.clone(),
                    source,
                },
            )
        })?;
        fs::create_dir_all(&config.output_dir)
            .map_err(|e| AggregateError::worker(COORDINATOR, Operation::WriteReport, e))?;

        let category_label = layout
            .column_label(config.category_column)
            .unwrap_or_else(|| DEFAULT_CATEGORY_LABEL.to_string());

        if !layout.has_data() {
            write_reports(config, &category_label, &CountTable::new(), &CountTable::new())?;
            warn!(
                file_size = layout.file_size,
                header_len = layout.header_len,
                "Corpus has no records after the header"
            );
            return Ok(Outcome::NoData {
                file_size: layout.file_size,
                header_len: layout.header_len,
            });
        }

        info!(
            input = %config.input.display(),
            workers = config.workers,
            file_size = layout.file_size,
            header_len = layout.header_len,
            "Starting aggregation"
        );

        let abort = AtomicBool::new(false);
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let ctx = Context {
            config,
            layout: &layout,
            abort: &abort,
            gate: gate_rx,
            classifier: self.classifier.as_ref(),
            category_label: &category_label,
            preview: self.preview,
        };

        thread::scope(|scope| {
            let mut spawn_error = None;
            let mut coordinator = None;
            let mut contributors = Vec::with_capacity(config.workers.saturating_sub(1));

            for (worker, endpoint) in endpoints(config.workers).into_iter().enumerate() {
                let ctx = &ctx;
                let builder = thread::Builder::new().name(format!("lyricount-worker-{worker}"));
                let spawned = match endpoint {
                    Endpoint::Coordinator { partials, releases } => builder
                        .spawn_scoped(scope, move || {
                            ctx.participate(COORDINATOR, |ctx| ctx.coordinate(partials, releases))
                        })
                        .map(|handle| coordinator = Some(handle)),
                    Endpoint::Contributor { outbox, release } => builder
                        .spawn_scoped(scope, move || {
                            ctx.participate(worker, |ctx| ctx.contribute(worker, outbox, release))
                        })
                        .map(|handle| contributors.push((worker, handle))),
                };
                if let Err(e) = spawned {
                    abort.store(true, Ordering::SeqCst);
                    spawn_error = Some(AggregateError::Spawn {
                        worker,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
            drop(gate_tx);

            let mut errors: Vec<AggregateError> = spawn_error.into_iter().collect();
            let mut report = None;
            if let Some(handle) = coordinator {
                match handle.join() {
                    Ok(Ok(r)) => report = Some(r),
                    Ok(Err(e)) => errors.push(e),
                    Err(_) => errors.push(AggregateError::Panicked { worker: COORDINATOR }),
                }
            }
            for (worker, handle) in contributors {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => errors.push(e),
                    Err(_) => errors.push(AggregateError::Panicked { worker }),
                }
            }

            if let Some(root) = root_cause(errors) {
                return Err(root);
            }
            report
                .map(Outcome::Completed)
                .ok_or_else(|| AggregateError::Spawn {
                    worker: COORDINATOR,
                    reason: "coordinator did not start".to_string(),
                })
        })
    }
}

/// Run an aggregation with the default classifier
pub fn run(config: &RunConfig) -> Result<Outcome> {
    Aggregator::new(config.clone()).run()
}

/// First failure that is not a reaction to another participant's failure
fn root_cause(errors: Vec<AggregateError>) -> Option<AggregateError> {
    let mut secondary = None;
    for e in errors {
        if !e.is_secondary() {
            return Some(e);
        }
        secondary.get_or_insert(e);
    }
    secondary
}

/// Channel ends owned by one participant
enum Endpoint {
    Coordinator {
        partials: Vec<(WorkerId, Receiver<Message>)>,
        releases: Vec<Sender<()>>,
    },
    Contributor {
        outbox: Sender<Message>,
        release: Receiver<()>,
    },
}

fn endpoints(workers: usize) -> Vec<Endpoint> {
    let mut partials = Vec::with_capacity(workers.saturating_sub(1));
    let mut releases = Vec::with_capacity(workers.saturating_sub(1));
    let mut contributors = Vec::with_capacity(workers.saturating_sub(1));
    for worker in 1..workers {
        debug_assert_eq!(Role::of(worker), Role::Contributor);
        let (outbox, inbox) = bounded(0);
        let (release_tx, release_rx) = bounded(1);
        partials.push((worker, inbox));
        releases.push(release_tx);
        contributors.push(Endpoint::Contributor {
            outbox,
            release: release_rx,
        });
    }
    let mut all = Vec::with_capacity(workers);
    all.push(Endpoint::Coordinator { partials, releases });
    all.extend(contributors);
    all
}

/// State shared by every participant of one run
struct Context<'a> {
    config: &'a RunConfig,
    layout: &'a CorpusLayout,
    abort: &'a AtomicBool,
    gate: Receiver<()>,
    classifier: Option<&'a ClassifierFactory>,
    category_label: &'a str,
    preview: usize,
}

impl Context<'_> {
    /// Wait at the start gate, run `body`, and raise the abort flag on failure
    fn participate<T>(&self, worker: WorkerId, body: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        // Err means the driver dropped the sender: the gate is open
        let _ = self.gate.recv();
        if self.abort.load(Ordering::SeqCst) {
            return Err(AggregateError::PeerAborted { worker });
        }

        let result = body(self);
        if let Err(e) = &result {
            self.abort.store(true, Ordering::SeqCst);
            debug!(
                worker,
                secondary = e.is_secondary(),
                error = e as &(dyn std::error::Error + 'static),
                "Participant stopped"
            );
        }
        result
    }

    fn contribute(
        &self,
        worker: WorkerId,
        outbox: Sender<Message>,
        release: Receiver<()>,
    ) -> Result<()> {
        let started = Instant::now();
        let local = scan_partition(worker, self.config, self.layout, self.abort, self.classifier)?;
        let compute = started.elapsed();

        let send = |message: Message| {
            outbox.send(message).map_err(|_| {
                AggregateError::worker(worker, Operation::SendPartial, AggregateError::PeerAborted { worker })
            })
        };
        send(Message::Partial {
            kind: TableKind::Tokens,
            payload: encode_table(&local.tokens),
        })?;
        send(Message::Partial {
            kind: TableKind::Categories,
            payload: encode_table(&local.categories),
        })?;
        send(Message::Totals {
            totals: local.totals,
            sentiment: local.sentiment,
        })?;

        release.recv().map_err(|_| {
            AggregateError::worker(worker, Operation::AwaitRelease, AggregateError::PeerAborted { worker })
        })?;
        let total = started.elapsed();
        send(Message::Timing(TimingSample { compute, total }))?;

        debug!(worker, compute_secs = compute.as_secs_f64(), "Contributor done");
        Ok(())
    }

    fn coordinate(
        &self,
        partials: Vec<(WorkerId, Receiver<Message>)>,
        releases: Vec<Sender<()>>,
    ) -> Result<RunReport> {
        let config = self.config;
        let started = Instant::now();
        let local = scan_partition(COORDINATOR, config, self.layout, self.abort, self.classifier)?;
        let compute = started.elapsed();

        let mut tokens = local.tokens;
        let mut categories = local.categories;
        let mut totals = local.totals;
        let mut sentiment = config.sentiment.then(SentimentSummary::new);
        fold_sentiment(&mut sentiment, local.sentiment);

        // AWAIT_PARTIALS and MERGE, contributors in ascending id
        for (worker, inbox) in &partials {
            for (kind, dest) in [
                (TableKind::Tokens, &mut tokens),
                (TableKind::Categories, &mut categories),
            ] {
                let payload = match receive(*worker, inbox)? {
                    Message::Partial { kind: k, payload } if k == kind => payload,
                    other => {
                        return Err(protocol(*worker, expected_partial(kind), other.name()));
                    }
                };
                let entries = merge_encoded(dest, &payload)
                    .map_err(|e| AggregateError::worker(COORDINATOR, Operation::DecodePartial, e))?;
                debug!(worker, ?kind, entries, bytes = payload.len(), "Merged partial");
            }
            match receive(*worker, inbox)? {
                Message::Totals {
                    totals: t,
                    sentiment: s,
                } => {
                    totals.add(&t);
                    fold_sentiment(&mut sentiment, s);
                }
                other => return Err(protocol(*worker, "totals", other.name())),
            }
        }

        for release in &releases {
            release.send(()).map_err(|_| {
                AggregateError::worker(
                    COORDINATOR,
                    Operation::ReleaseContributors,
                    AggregateError::PeerAborted { worker: COORDINATOR },
                )
            })?;
        }
        let total = started.elapsed();

        info!(
            records = totals.records,
            tokens = totals.tokens,
            skipped = totals.skipped,
            distinct_tokens = tokens.len(),
            distinct_categories = categories.len(),
            "Partials merged"
        );

        // RANK_AND_EXPORT
        let (word_rows, category_rows) =
            write_reports(config, self.category_label, &tokens, &categories)?;

        // METRICS_REDUCE
        let mut collector = MetricsCollector::default();
        collector.observe(TimingSample { compute, total });
        for (worker, inbox) in &partials {
            match receive(*worker, inbox)? {
                Message::Timing(sample) => collector.observe(sample),
                other => return Err(protocol(*worker, "timing", other.name())),
            }
        }

        let summary = MetricsSummary {
            workers: collector.participants(),
            total_records: totals.records,
            total_tokens: totals.tokens,
            skipped_records: totals.skipped,
            distinct_tokens: tokens.len(),
            distinct_categories: categories.len(),
            compute_time: collector.compute_time(),
            total_time: collector.total_time(),
            sentiment,
        };
        write_metrics(&config.metrics_path(), &summary)
            .map_err(|e| AggregateError::worker(COORDINATOR, Operation::WriteMetrics, e))?;

        Ok(RunReport {
            summary,
            category_label: self.category_label.to_string(),
            word_rows,
            category_rows,
            top_tokens: top_entries(&tokens, self.preview),
            top_categories: top_entries(&categories, self.preview),
        })
    }
}

fn receive(worker: WorkerId, inbox: &Receiver<Message>) -> Result<Message> {
    inbox.recv().map_err(|_| {
        AggregateError::worker(
            COORDINATOR,
            Operation::ReceivePartial,
            AggregateError::PeerAborted { worker },
        )
    })
}

fn protocol(worker: WorkerId, expected: &'static str, found: &'static str) -> AggregateError {
    AggregateError::worker(
        COORDINATOR,
        Operation::ReceivePartial,
        AggregateError::Protocol {
            worker,
            expected,
            found,
        },
    )
}

fn expected_partial(kind: TableKind) -> &'static str {
    match kind {
        TableKind::Tokens => "token partial",
        TableKind::Categories => "category partial",
    }
}

fn fold_sentiment(summary: &mut Option<SentimentSummary>, partial: Option<SentimentPartial>) {
    if let Some(summary) = summary.as_mut() {
        match partial {
            Some(p) => summary.add(&p),
            None => summary.complete = false,
        }
    }
}

/// Write both ranked reports. Returns rows written to each.
fn write_reports(
    config: &RunConfig,
    category_label: &str,
    tokens: &CountTable,
    categories: &CountTable,
) -> Result<(usize, usize)> {
    let write = |path: std::path::PathBuf, label: &str, table: &CountTable, limit: usize| {
        write_report_file(&path, label, table, limit)
            .map_err(|e| AggregateError::worker(COORDINATOR, Operation::WriteReport, e))
    };
    let words = write(config.word_report_path(), WORD_LABEL, tokens, config.word_limit)?;
    let cats = write(
        config.category_report_path(),
        category_label,
        categories,
        config.category_limit,
    )?;
    Ok((words, cats))
}
