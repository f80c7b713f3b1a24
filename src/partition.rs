//! Byte-range partitioning of the corpus
//!
//! The data region `[H, F)` is split into `N` contiguous ranges. Range `i`
//! starts at `H + i*base + min(i, rem)`; the last range always ends at `F`.
//! A worker owns every record whose first byte lies in its raw range: it
//! snaps its start forward with [`align_to_record`] and keeps reading until
//! the next record would start at or past its raw end.
//!
//! Snapping needs the quote state at the range start. [`CorpusLayout::probe`]
//! records it for every range in one sequential pass, so no worker reads
//! bytes before its own range.

use crate::csv_record::{Parsed, RecordReader};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Half-open byte range `[start, end)` into the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Raw range of worker `index` out of `workers`
pub fn range_for(file_size: u64, header_len: u64, workers: usize, index: usize) -> ByteRange {
    debug_assert!(workers > 0 && index < workers);
    let data = file_size.saturating_sub(header_len);
    let n = workers as u64;
    let i = index as u64;
    let base = data / n;
    let rem = data % n;

    let start = header_len + i * base + i.min(rem);
    let end = if index + 1 == workers {
        file_size.max(header_len)
    } else {
        header_len + (i + 1) * base + (i + 1).min(rem)
    };
    ByteRange { start, end }
}

/// Raw ranges for all workers, in worker order
pub fn partition(file_size: u64, header_len: u64, workers: usize) -> Vec<ByteRange> {
    (0..workers)
        .map(|i| range_for(file_size, header_len, workers, i))
        .collect()
}

/// One worker's raw range plus the quote state needed to align it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub range: ByteRange,
    /// Quote state after the bytes `[header_len, range.start - 1)`
    pub entry_in_quotes: bool,
}

/// Plan all partitions from the bytes that follow the header.
///
/// `rest` must start at `header_len`. It is read once, front to back,
/// toggling quote state the same way [`RecordReader`] does.
pub fn plan_partitions<R: BufRead>(
    mut rest: R,
    file_size: u64,
    header_len: u64,
    workers: usize,
) -> io::Result<Vec<Partition>> {
    let mut plan = Vec::with_capacity(workers);
    let mut pos = header_len;
    let mut in_quotes = false;
    for range in partition(file_size, header_len, workers) {
        let stop = range.start.saturating_sub(1).max(header_len);
        while pos < stop {
            let buf = rest.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let take = buf.len().min((stop - pos) as usize);
            in_quotes ^= quote_parity(&buf[..take]);
            rest.consume(take);
            pos += take as u64;
        }
        plan.push(Partition {
            range,
            entry_in_quotes: in_quotes,
        });
    }
    Ok(plan)
}

/// Snap `offset` forward to the start of the next record.
///
/// A record starts at the header end or right after a line feed that sits
/// outside quotes. `in_quotes` is the quote state after the bytes
/// `[header_len, offset - 1)`, as recorded in [`Partition::entry_in_quotes`].
/// With it every worker agrees with a single sequential reader on where
/// records begin.
pub fn align_to_record(data: &[u8], offset: usize, header_len: usize, in_quotes: bool) -> usize {
    let header_len = header_len.min(data.len());
    if offset <= header_len {
        return header_len;
    }
    if offset >= data.len() {
        return data.len();
    }
    let mut in_quotes = in_quotes;
    for (i, &b) in data[offset - 1..].iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => return offset + i,
            _ => {}
        }
    }
    data.len()
}

/// True when `bytes` holds an odd number of quote characters
fn quote_parity(bytes: &[u8]) -> bool {
    let quotes = bytes.iter().filter(|&&b| b == b'"').count();
    quotes % 2 == 1
}

/// Size, header and partition plan of a corpus file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusLayout {
    pub file_size: u64,
    pub header_len: u64,
    pub header: Vec<String>,
    partitions: Vec<Partition>,
}

impl CorpusLayout {
    /// Stat the file, read its header record and plan `workers` partitions
    pub fn probe(path: &Path, workers: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = RecordReader::new(BufReader::new(file), 0);
        let header = match reader.next_record()? {
            Some(Parsed::Record(fields)) => fields,
            _ => Vec::new(),
        };
        let header_len = reader.position();
        let partitions = plan_partitions(reader.into_inner(), file_size, header_len, workers)?;
        Ok(Self {
            file_size,
            header_len,
            header,
            partitions,
        })
    }

    /// Number of planned partitions
    pub fn workers(&self) -> usize {
        self.partitions.len()
    }

    /// Partition of `worker`; panics if `worker >= self.workers()`
    pub fn partition(&self, worker: usize) -> Partition {
        self.partitions[worker]
    }

    /// False when there is nothing after the header
    pub fn has_data(&self) -> bool {
        self.file_size > self.header_len
    }

    /// Header name of `column`, lowercased, if present and non-empty
    pub fn column_label(&self, column: usize) -> Option<String> {
        self.header
            .get(column)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_worker_gets_whole_data_region() {
        assert_eq!(partition(100, 10, 1), vec![ByteRange { start: 10, end: 100 }]);
    }

    #[test]
    fn remainder_goes_to_leading_ranges() {
        // 10 data bytes over 3 workers: 4, 3, 3
        let ranges = partition(20, 10, 3);
        assert_eq!(
            ranges,
            vec![
                ByteRange { start: 10, end: 14 },
                ByteRange { start: 14, end: 17 },
                ByteRange { start: 17, end: 20 },
            ]
        );
    }

    #[test]
    fn more_workers_than_bytes() {
        let ranges = partition(12, 10, 4);
        let lens: Vec<u64> = ranges.iter().map(|r| r.len()).collect();
        assert_eq!(lens, vec![1, 1, 0, 0]);
        assert_eq!(ranges.last().unwrap().end, 12);
    }

    fn align(data: &[u8], offset: usize, header_len: usize) -> usize {
        let in_quotes = offset > header_len + 1 && quote_parity(&data[header_len..offset - 1]);
        align_to_record(data, offset, header_len, in_quotes)
    }

    #[test]
    fn align_keeps_line_starts_and_skips_partials() {
        let data = b"h,h\nab,c\nde,f\n";
        assert_eq!(align(data, 4, 4), 4);
        assert_eq!(align(data, 5, 4), 9);
        assert_eq!(align(data, 9, 4), 9);
        assert_eq!(align(data, 10, 4), 14);
        assert_eq!(align(data, 14, 4), 14);
    }

    #[test]
    fn align_skips_newlines_inside_quotes() {
        let data = b"h\na,\"x\ny\nz\"\nb,c\n";
        // offsets inside the quoted field all snap to the start of "b,c"
        for offset in 3..12 {
            assert_eq!(align(data, offset, 2), 12, "offset {offset}");
        }
        assert_eq!(align(data, 2, 2), 2);
        assert_eq!(align(data, 13, 2), 16);
    }

    #[test]
    fn plan_records_quote_state_at_each_start() {
        let data = b"h\na,\"x\ny\nz\"\nb,c\n";
        let plan = plan_partitions(&data[2..], data.len() as u64, 2, 4).unwrap();
        let ranges: Vec<ByteRange> = plan.iter().map(|p| p.range).collect();
        assert_eq!(ranges, partition(data.len() as u64, 2, 4));
        for p in &plan {
            let start = p.range.start as usize;
            let expected = start > 3 && quote_parity(&data[2..start - 1]);
            assert_eq!(p.entry_in_quotes, expected, "{p:?}");
        }
        // the second range starts inside the quoted field
        assert!(plan[1].entry_in_quotes);
    }

    #[test]
    fn plan_matches_prefix_scan_across_chunk_boundaries() {
        let mut data = b"artist,song,link,text\n".to_vec();
        let header_len = data.len();
        for i in 0..300 {
            data.extend_from_slice(format!("a{i},s,l,\"line\n\"\"q\"\" {i}\"\n").as_bytes());
        }
        let file_size = data.len() as u64;
        for workers in [1, 2, 7, 33] {
            // tiny buffer so every range boundary crosses a refill
            let rest = BufReader::with_capacity(5, &data[header_len..]);
            let plan = plan_partitions(rest, file_size, header_len as u64, workers).unwrap();
            for p in plan {
                let start = p.range.start as usize;
                let expected = start > header_len + 1 && quote_parity(&data[header_len..start - 1]);
                assert_eq!(p.entry_in_quotes, expected, "workers={workers} {p:?}");
            }
        }
    }

    #[test]
    fn probe_reads_quoted_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.csv");
        std::fs::write(&path, "Artist,song,\"li\nnk\",text\nA,b,c,d\n").unwrap();
        let layout = CorpusLayout::probe(&path, 3).unwrap();
        assert_eq!(layout.header_len, 25);
        assert_eq!(layout.workers(), 3);
        assert_eq!(layout.partition(0).range, ByteRange { start: 25, end: 28 });
        assert_eq!(layout.file_size, 33);
        assert_eq!(layout.column_label(0).as_deref(), Some("artist"));
        assert!(layout.has_data());
    }

    #[test]
    fn probe_empty_file_has_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.csv");
        std::fs::write(&path, "").unwrap();
        let layout = CorpusLayout::probe(&path, 2).unwrap();
        assert_eq!((layout.file_size, layout.header_len), (0, 0));
        assert!(!layout.has_data());
    }
}
