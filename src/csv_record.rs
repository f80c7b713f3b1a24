//! Quote-aware CSV record reader
//!
//! A record ends at a line feed seen outside quotes, or at end of stream if
//! any content was read. Quoted fields may contain commas, line breaks and
//! doubled quotes (`""` is a literal `"`). CRLF is normalized to LF.
//!
//! Rows with the wrong number of fields, or a quote still open at end of
//! stream, are reported as [`Parsed::Malformed`] so callers can skip them.

use std::io::{self, BufRead};

/// Field count of the lyrics corpus: artist, song, link, text
pub const DEFAULT_FIELDS: usize = 4;

/// Why a record was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    FieldCount { found: usize, expected: usize },
    UnterminatedQuote,
}

/// Outcome of reading one logical record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Record(Vec<String>),
    Malformed(Malformed),
}

/// Reads one logical record at a time from a byte stream
pub struct RecordReader<R> {
    inner: R,
    position: u64,
    record_start: u64,
    raw: Vec<u8>,
    expected_fields: usize,
}

impl<R: BufRead> RecordReader<R> {
    /// Reader positioned at byte 0. `expected_fields == 0` accepts any arity.
    pub fn new(inner: R, expected_fields: usize) -> Self {
        Self::at_offset(inner, 0, expected_fields)
    }

    /// Reader whose first byte sits at absolute `offset` in the underlying file
    pub fn at_offset(inner: R, offset: u64, expected_fields: usize) -> Self {
        Self {
            inner,
            position: offset,
            record_start: offset,
            raw: Vec::with_capacity(4096),
            expected_fields,
        }
    }

    /// Hand back the underlying stream, positioned at [`position`](Self::position)
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Absolute offset of the next unread byte
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Absolute offset of the first byte of the record last returned
    pub fn record_start(&self) -> u64 {
        self.record_start
    }

    /// Read the next record. `Ok(None)` at end of stream.
    pub fn next_record(&mut self) -> io::Result<Option<Parsed>> {
        let terminated = match self.next_raw()? {
            None => return Ok(None),
            Some(terminated) => terminated,
        };
        if !terminated {
            return Ok(Some(Parsed::Malformed(Malformed::UnterminatedQuote)));
        }
        let fields = split_fields(&self.raw);
        if self.expected_fields != 0 && fields.len() != self.expected_fields {
            return Ok(Some(Parsed::Malformed(Malformed::FieldCount {
                found: fields.len(),
                expected: self.expected_fields,
            })));
        }
        Ok(Some(Parsed::Record(fields)))
    }

    // Fill `self.raw` with the next non-blank record, terminator stripped.
    // Returns Some(false) when the stream ended inside an open quote.
    fn next_raw(&mut self) -> io::Result<Option<bool>> {
        loop {
            self.raw.clear();
            self.record_start = self.position;
            let mut in_quotes = false;
            let mut saw_terminator = false;

            loop {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    break;
                }
                let mut end = None;
                for (i, &b) in buf.iter().enumerate() {
                    if b == b'"' {
                        in_quotes = !in_quotes;
                    } else if b == b'\n' && !in_quotes {
                        end = Some(i);
                        break;
                    }
                }
                match end {
                    Some(i) => {
                        self.raw.extend_from_slice(&buf[..i]);
                        self.inner.consume(i + 1);
                        self.position += (i + 1) as u64;
                        saw_terminator = true;
                        break;
                    }
                    None => {
                        let len = buf.len();
                        self.raw.extend_from_slice(buf);
                        self.inner.consume(len);
                        self.position += len as u64;
                    }
                }
            }

            if self.raw.last() == Some(&b'\r') {
                self.raw.pop();
            }
            if self.raw.is_empty() {
                if saw_terminator {
                    continue;
                }
                return Ok(None);
            }
            return Ok(Some(!in_quotes));
        }
    }
}

/// Split one record (without terminator) into unescaped fields.
///
/// Whitespace outside quotes at either end of a field is trimmed; quoted
/// content is kept verbatim, including CRLF line breaks. Only the record
/// terminator is normalized.
pub fn split_fields(raw: &[u8]) -> Vec<String> {
    let mut fields = Vec::with_capacity(DEFAULT_FIELDS);
    let mut field: Vec<u8> = Vec::new();
    let mut keep = 0usize;
    let mut in_quotes = false;
    let mut i = 0;

    while i < raw.len() {
        let b = raw[i];
        match b {
            b'"' if in_quotes && raw.get(i + 1) == Some(&b'"') => {
                field.push(b'"');
                keep = field.len();
                i += 1;
            }
            b'"' => {
                in_quotes = !in_quotes;
                keep = field.len();
            }
            b',' if !in_quotes => {
                field.truncate(keep);
                fields.push(into_string(std::mem::take(&mut field)));
                keep = 0;
            }
            b' ' | b'\t' if !in_quotes => {
                if !field.is_empty() {
                    field.push(b);
                }
            }
            _ => {
                field.push(b);
                keep = field.len();
            }
        }
        i += 1;
    }

    field.truncate(keep);
    fields.push(into_string(field));
    fields
}

fn into_string(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str, fields: usize) -> Vec<Parsed> {
        let mut reader = RecordReader::new(input.as_bytes(), fields);
        let mut out = Vec::new();
        while let Some(p) = reader.next_record().unwrap() {
            out.push(p);
        }
        out
    }

    fn record(fields: &[&str]) -> Parsed {
        Parsed::Record(fields.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn plain_rows() {
        let got = read_all("a,b,c,d\ne,f,g,h\n", 4);
        assert_eq!(got, vec![record(&["a", "b", "c", "d"]), record(&["e", "f", "g", "h"])]);
    }

    #[test]
    fn quoted_field_with_newline_comma_and_quote() {
        let input = "ABBA,Song,/x,\"line one,\nsaid \"\"hi\"\"\r\nend\"\r\nB,s,l,t\n";
        let got = read_all(input, 4);
        assert_eq!(
            got,
            vec![
                record(&["ABBA", "Song", "/x", "line one,\nsaid \"hi\"\r\nend"]),
                record(&["B", "s", "l", "t"]),
            ]
        );
    }

    #[test]
    fn last_record_without_terminator() {
        let got = read_all("a,b,c,d\ne,f,g,h", 4);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1], record(&["e", "f", "g", "h"]));
    }

    #[test]
    fn wrong_field_count_is_malformed_not_fatal() {
        let got = read_all("a,b,c\na,b,c,d\na,b,c,d,e\n", 4);
        assert_eq!(
            got,
            vec![
                Parsed::Malformed(Malformed::FieldCount { found: 3, expected: 4 }),
                record(&["a", "b", "c", "d"]),
                Parsed::Malformed(Malformed::FieldCount { found: 5, expected: 4 }),
            ]
        );
    }

    #[test]
    fn unterminated_quote_at_eof() {
        let got = read_all("a,b,c,d\nx,y,z,\"never closed\n", 4);
        assert_eq!(got[1], Parsed::Malformed(Malformed::UnterminatedQuote));
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn blank_lines_are_not_records() {
        let got = read_all("\r\na,b,c,d\n\n\n", 4);
        assert_eq!(got, vec![record(&["a", "b", "c", "d"])]);
    }

    #[test]
    fn record_start_skips_blank_lines() {
        let mut reader = RecordReader::new("\n\nx,y\n".as_bytes(), 2);
        reader.next_record().unwrap();
        assert_eq!(reader.record_start(), 2);
    }

    #[test]
    fn position_tracks_consumed_bytes() {
        let input = "h1,h2\n\"a\nb\",c\nd,e";
        let mut reader = RecordReader::at_offset(input.as_bytes(), 100, 2);
        reader.next_record().unwrap();
        assert_eq!(reader.position(), 106);
        assert_eq!(reader.record_start(), 100);
        reader.next_record().unwrap();
        assert_eq!(reader.position(), 114);
        reader.next_record().unwrap();
        assert_eq!(reader.position(), 117);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn trims_unquoted_whitespace_only() {
        assert_eq!(split_fields(b"  a b ,\" c \""), vec!["a b", " c "]);
        assert_eq!(split_fields(b""), vec![""]);
        assert_eq!(split_fields(b",,"), vec!["", "", ""]);
    }

    #[test]
    fn small_buffer_reads_match() {
        use std::io::BufReader;
        let input = "a,\"multi\nline, text\",c,d\ne,f,g,\"h\"\"h\"\n";
        let mut reader = RecordReader::new(BufReader::with_capacity(3, input.as_bytes()), 4);
        let first = reader.next_record().unwrap().unwrap();
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(first, record(&["a", "multi\nline, text", "c", "d"]));
        assert_eq!(second, record(&["e", "f", "g", "h\"h"]));
    }
}
