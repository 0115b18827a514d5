//! Line reassembly over decoded chunks and per-line JSON decoding.

use crate::error::{ArchiveError, ParseError};
use crate::record::Record;
use crate::zstd_jsonl::DecodedChunk;
use serde_json::Value;

/// Decode one line (without its terminator) into a `Record`.
/// `Ok(None)` means the line was blank and is not a record at all.
pub fn decode_line(line: &[u8], line_no: u64) -> Result<Option<Record>, ParseError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let err = |message: String| ParseError { line: line_no, message };

    let raw = std::str::from_utf8(line).map_err(|e| err(format!("invalid UTF-8: {e}")))?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => Ok(Some(Record::new(raw.to_string(), fields))),
        Ok(other) => Err(err(format!("expected a JSON object, found {}", json_kind(&other)))),
        Err(e) => Err(err(e.to_string())),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Turns a chunk stream into a record stream.
///
/// Lines that straddle chunks are stitched through a carry buffer; a final line without
/// a newline is terminated by end-of-stream. Malformed lines are counted and skipped.
/// An upstream error is passed through once and ends the stream.
pub struct LineRecordParser<I> {
    chunks: I,
    buf: Vec<u8>,
    pos: usize,
    carry: Vec<u8>,
    lines: u64,
    records: u64,
    parse_errors: u64,
    first_error: Option<ParseError>,
    finished: bool,
}

impl<I> LineRecordParser<I>
where
    I: Iterator<Item = Result<DecodedChunk, ArchiveError>>,
{
    pub fn new(chunks: I) -> Self {
        Self {
            chunks,
            buf: Vec::new(),
            pos: 0,
            carry: Vec::new(),
            lines: 0,
            records: 0,
            parse_errors: 0,
            first_error: None,
            finished: false,
        }
    }

    /// Lines seen so far, blank ones included.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Lines successfully decoded into records.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    pub fn first_error(&self) -> Option<&ParseError> {
        self.first_error.as_ref()
    }

    pub fn inner(&self) -> &I {
        &self.chunks
    }

    fn decode(&mut self, from_carry: bool, start: usize, end: usize) -> Option<Record> {
        self.lines += 1;
        let line_no = self.lines;
        let res = if from_carry {
            decode_line(&self.carry, line_no)
        } else {
            decode_line(&self.buf[start..end], line_no)
        };
        match res {
            Ok(Some(rec)) => {
                self.records += 1;
                Some(rec)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(line = e.line, error = %e.message, "skipping malformed line");
                self.parse_errors += 1;
                if self.first_error.is_none() {
                    self.first_error = Some(e);
                }
                None
            }
        }
    }
}

impl<I> Iterator for LineRecordParser<I>
where
    I: Iterator<Item = Result<DecodedChunk, ArchiveError>>,
{
    type Item = Result<Record, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(nl) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
                let start = self.pos;
                let end = start + nl;
                self.pos = end + 1;
                let rec = if self.carry.is_empty() {
                    self.decode(false, start, end)
                } else {
                    self.carry.extend_from_slice(&self.buf[start..end]);
                    let rec = self.decode(true, 0, 0);
                    self.carry.clear();
                    rec
                };
                if let Some(rec) = rec {
                    return Some(Ok(rec));
                }
                continue;
            }

            // No newline left in this chunk: keep the tail and pull the next one.
            self.carry.extend_from_slice(&self.buf[self.pos..]);
            self.pos = 0;
            self.buf.clear();
            match self.chunks.next() {
                Some(Ok(chunk)) => self.buf = chunk.bytes,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.at_line(self.lines)));
                }
                None => {
                    self.finished = true;
                    if self.carry.is_empty() {
                        return None;
                    }
                    let rec = self.decode(true, 0, 0);
                    self.carry = Vec::new();
                    return rec.map(Ok);
                }
            }
        }
    }
}
