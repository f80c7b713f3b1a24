//! Sentiment side channel
//!
//! A classifier receives batches of text fields and returns how many were
//! positive, neutral and negative. Classification is optional: when a
//! classifier fails, or returns counts that do not add up to the batch
//! size, the worker stops classifying, logs a warning and marks its result
//! incomplete. Counting is never affected.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Per-class counts for a batch or a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl SentimentCounts {
    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }

    pub fn add(&mut self, other: &SentimentCounts) {
        self.positive += other.positive;
        self.neutral += other.neutral;
        self.negative += other.negative;
    }
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("classifier returned {got} labels for a batch of {expected}")]
    CountMismatch { expected: u64, got: u64 },
}

/// External classification collaborator
pub trait SentimentClassifier: Send {
    fn classify(&mut self, batch: &[String]) -> Result<SentimentCounts, ClassifierError>;
}

/// Builds one classifier per worker
pub type ClassifierFactory = Arc<dyn Fn() -> Box<dyn SentimentClassifier> + Send + Sync>;

/// Factory for the built-in [`LexiconClassifier`]
pub fn lexicon_factory() -> ClassifierFactory {
    Arc::new(|| Box::new(LexiconClassifier::default()))
}

const POSITIVE_WORDS: &[&str] = &[
    "amor", "feliz", "alegria", "bom", "boa", "fantástico", "incrível", "lindo", "maravilhoso",
    "sucesso", "peace", "love", "happy", "joy", "smile", "sunshine",
];

const NEGATIVE_WORDS: &[&str] = &[
    "triste", "odio", "ódio", "dor", "choro", "medo", "raiva", "solidão", "broken", "cry", "sad",
    "pain", "hurt", "dark", "lonely",
];

/// Rule-based classifier: more positive than negative lexicon hits is
/// positive, the reverse is negative, anything else is neutral.
pub struct LexiconClassifier {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().copied().collect(),
            negative: NEGATIVE_WORDS.iter().copied().collect(),
        }
    }
}

impl LexiconClassifier {
    fn label(&self, text: &str) -> Label {
        let lower = text.to_lowercase();
        let mut pos = 0usize;
        let mut neg = 0usize;
        for word in lower
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
            .filter(|w| !w.is_empty())
        {
            if self.positive.contains(word) {
                pos += 1;
            } else if self.negative.contains(word) {
                neg += 1;
            }
        }
        match pos.cmp(&neg) {
            std::cmp::Ordering::Greater => Label::Positive,
            std::cmp::Ordering::Less => Label::Negative,
            std::cmp::Ordering::Equal => Label::Neutral,
        }
    }
}

enum Label {
    Positive,
    Neutral,
    Negative,
}

impl SentimentClassifier for LexiconClassifier {
    fn classify(&mut self, batch: &[String]) -> Result<SentimentCounts, ClassifierError> {
        let mut counts = SentimentCounts::default();
        for text in batch {
            match self.label(text) {
                Label::Positive => counts.positive += 1,
                Label::Neutral => counts.neutral += 1,
                Label::Negative => counts.negative += 1,
            }
        }
        Ok(counts)
    }
}

/// Run-level sentiment result written to the metrics summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
    /// False when any worker had to stop classifying
    pub complete: bool,
}

/// One worker's share of the sentiment side channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SentimentPartial {
    pub counts: SentimentCounts,
    pub complete: bool,
}

impl SentimentSummary {
    pub fn new() -> Self {
        Self {
            complete: true,
            ..Self::default()
        }
    }

    pub fn add(&mut self, partial: &SentimentPartial) {
        self.positive += partial.counts.positive;
        self.neutral += partial.counts.neutral;
        self.negative += partial.counts.negative;
        self.complete &= partial.complete;
    }
}

/// Batches text for a classifier and degrades instead of failing
pub struct SentimentBatcher {
    worker: usize,
    classifier: Option<Box<dyn SentimentClassifier>>,
    batch: Vec<String>,
    batch_size: usize,
    counts: SentimentCounts,
}

impl SentimentBatcher {
    pub fn new(worker: usize, classifier: Box<dyn SentimentClassifier>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            worker,
            classifier: Some(classifier),
            batch: Vec::with_capacity(batch_size),
            batch_size,
            counts: SentimentCounts::default(),
        }
    }

    pub fn push(&mut self, text: String) {
        if self.classifier.is_none() {
            return;
        }
        self.batch.push(text);
        if self.batch.len() >= self.batch_size {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let Some(classifier) = self.classifier.as_mut() else {
            self.batch.clear();
            return;
        };
        let expected = self.batch.len() as u64;
        let result = classifier.classify(&self.batch).and_then(|c| {
            if c.total() == expected {
                Ok(c)
            } else {
                Err(ClassifierError::CountMismatch {
                    expected,
                    got: c.total(),
                })
            }
        });
        match result {
            Ok(c) => self.counts.add(&c),
            Err(e) => {
                warn!(worker = self.worker, error = %e, "Sentiment classification disabled");
                self.classifier = None;
            }
        }
        self.batch.clear();
    }

    /// Classify whatever is left and return this worker's share
    pub fn finish(mut self) -> SentimentPartial {
        self.flush();
        SentimentPartial {
            counts: self.counts,
            complete: self.classifier.is_some(),
        }
    }
}
