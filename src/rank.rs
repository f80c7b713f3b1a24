//! Ranking and CSV export of counting tables
//!
//! Canonical order: count descending, ties broken by key ascending (byte-wise).
//! Keys are unique within a table, so this is a total order and the ranked
//! output depends only on table contents, never on insertion or merge order.

use crate::count_table::CountTable;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// A (key, count) pair in rank order
pub type RankedEntry<'a> = (&'a str, i64);

/// Compare two entries in canonical rank order
#[inline]
pub fn rank_order(a: &RankedEntry<'_>, b: &RankedEntry<'_>) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

/// Finite, restartable sequence of table entries in canonical order.
///
/// Entries borrow keys from the table; sorting happens once, on
/// construction, and every call to [`iter`](Self::iter) walks from the top.
pub struct RankedSeq<'a> {
    entries: Vec<RankedEntry<'a>>,
}

impl<'a> RankedSeq<'a> {
    pub fn from_table(table: &'a CountTable) -> Self {
        let mut entries: Vec<RankedEntry<'a>> = table.iter().collect();
        entries.sort_unstable_by(rank_order);
        Self { entries }
    }

    /// Only the first `limit` entries (0 = all), selecting before sorting
    pub fn top(table: &'a CountTable, limit: usize) -> Self {
        let mut entries: Vec<RankedEntry<'a>> = table.iter().collect();
        if limit > 0 && limit < entries.len() {
            entries.select_nth_unstable_by(limit - 1, rank_order);
            entries.truncate(limit);
        }
        entries.sort_unstable_by(rank_order);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RankedEntry<'a>> + '_ {
        self.entries.iter().copied()
    }

    /// First `limit` entries, or all when `limit == 0`
    pub fn limited(&self, limit: usize) -> &[RankedEntry<'a>] {
        if limit == 0 || limit >= self.entries.len() {
            &self.entries
        } else {
            &self.entries[..limit]
        }
    }
}

impl<'s, 'a> IntoIterator for &'s RankedSeq<'a> {
    type Item = &'s RankedEntry<'a>;
    type IntoIter = std::slice::Iter<'s, RankedEntry<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Top `limit` entries of `table` as owned pairs (0 = unlimited)
pub fn top_entries(table: &CountTable, limit: usize) -> Vec<(String, i64)> {
    RankedSeq::top(table, limit)
        .iter()
        .map(|(k, c)| (k.to_owned(), c))
        .collect()
}

/// Quote a field when it holds a delimiter, quote, line break, or edge whitespace
pub fn csv_field(value: &str) -> Cow<'_, str> {
    let needs_quotes = value
        .bytes()
        .any(|b| matches!(b, b',' | b'"' | b'\n' | b'\r'))
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if !needs_quotes {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    Cow::Owned(out)
}

/// Write `<label>,count` followed by up to `limit` ranked rows. Returns rows written.
pub fn write_report<W: Write>(
    out: &mut W,
    label: &str,
    table: &CountTable,
    limit: usize,
) -> io::Result<usize> {
    writeln!(out, "{},count", csv_field(label))?;
    let ranked = RankedSeq::top(table, limit);
    for (key, count) in ranked.iter() {
        writeln!(out, "{},{}", csv_field(key), count)?;
    }
    Ok(ranked.len())
}

/// [`write_report`] into a new file at `path`
pub fn write_report_file(
    path: &Path,
    label: &str,
    table: &CountTable,
    limit: usize,
) -> io::Result<usize> {
    let mut file = BufWriter::new(File::create(path)?);
    let rows = write_report(&mut file, label, table, limit)?;
    file.flush()?;
    Ok(rows)
}
