//! Resumable CSV tokenizer.
//!
//! All parser state lives in [`TokenizerState`], a plain value the caller
//! threads from one chunk to the next:
//!
//! ```
//! use csv_survey::{tokenizer, CsvFormat};
//!
//! let format = CsvFormat::default();
//! let mut records = tokenizer::tokenize(&format, Default::default(), b"x,y\na,\"b\nc");
//! assert_eq!(vec!["x", "y"], records.next().unwrap().to_strings());
//! assert!(records.next().is_none());
//!
//! // The open quoted field is carried over in the state.
//! let state = records.into_state();
//! let mut records = tokenizer::tokenize(&format, state, b"\",d\n");
//! assert_eq!(vec!["a", "b\nc", "d"], records.next().unwrap().to_strings());
//! ```
//!
//! Empty lines are not records. A field is only ever emitted once the byte
//! following it (delimiter or terminator) has been seen, or on
//! [`TokenizerState::finish`] at end of input.
use std::mem;

use memchr::{memchr, memchr3, memchr_iter};

use crate::format::{CsvFormat, LineTerminator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Nothing of the current record has been seen yet.
    StartRecord,
    StartField,
    Unquoted,
    Quoted,
    /// Saw a quote inside a quoted field, either closing or the first half of
    /// an escaped quote.
    QuoteInQuoted,
    /// After the closing quote, before the next delimiter or terminator.
    AfterQuoted,
}

/// Carry-over state between chunks.
#[derive(Debug, Clone)]
pub struct TokenizerState {
    position: Position,
    /// Last terminator byte was `\r`; a directly following `\n` belongs to it.
    pending_cr: bool,
    /// Decoded bytes of the partial record.
    data: Vec<u8>,
    /// End offsets into `data` of completed fields in the partial record.
    ends: Vec<usize>,
    field_start: usize,
    /// Trailing trim never removes bytes below this offset (quoted content).
    trim_floor: usize,
    /// Current physical line, 1-based.
    line: u64,
    record_line: u64,
    records: u64,
    terminators: u64,
    first_terminator: Option<LineTerminator>,
}

impl Default for TokenizerState {
    fn default() -> Self {
        TokenizerState {
            position: Position::StartRecord,
            pending_cr: false,
            data: Vec::new(),
            ends: Vec::new(),
            field_start: 0,
            trim_floor: 0,
            line: 1,
            record_line: 1,
            records: 0,
            terminators: 0,
            first_terminator: None,
        }
    }
}

impl TokenizerState {
    /// Number of complete records produced so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// First row terminator seen outside a quoted field.
    pub fn first_terminator(&self) -> Option<LineTerminator> {
        self.first_terminator
    }

    /// If a record is partially decoded.
    pub fn has_partial(&self) -> bool {
        self.position != Position::StartRecord
    }

    /// Bytes currently held for the partial record.
    pub fn partial_len(&self) -> usize {
        self.data.len()
    }

    /// Decode bytes from `input` until one record completes or the input is
    /// exhausted.
    ///
    /// Returns the number of bytes consumed. A `None` record means the whole
    /// input was consumed.
    pub(crate) fn step(&mut self, format: &CsvFormat, input: &[u8]) -> (usize, Option<Record>) {
        let mut pos = 0;

        while pos < input.len() {
            let b = input[pos];

            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    if self.terminators == 1 && self.first_terminator == Some(LineTerminator::Cr) {
                        self.first_terminator = Some(LineTerminator::CrLf);
                    }
                    pos += 1;
                    continue;
                }
            }

            match self.position {
                Position::StartRecord => {
                    if is_terminator(b) {
                        // Blank line.
                        self.end_line(b);
                        pos += 1;
                        continue;
                    }
                    self.record_line = self.line;
                    self.position = Position::StartField;
                }
                Position::StartField => {
                    if b == format.quote {
                        self.position = Position::Quoted;
                        pos += 1;
                    } else if b == format.delimiter {
                        self.end_field(format);
                        pos += 1;
                    } else if is_terminator(b) {
                        self.end_field(format);
                        self.end_line(b);
                        return (pos + 1, Some(self.take_record()));
                    } else if format.trim.contains(&b) {
                        pos += 1;
                    } else {
                        self.position = Position::Unquoted;
                    }
                }
                Position::Unquoted => {
                    let rest = &input[pos..];
                    match memchr3(format.delimiter, b'\n', b'\r', rest) {
                        Some(idx) => {
                            self.data.extend_from_slice(&rest[..idx]);
                            pos += idx + 1;
                            self.end_field(format);
                            let b = rest[idx];
                            if b == format.delimiter {
                                self.position = Position::StartField;
                            } else {
                                self.end_line(b);
                                return (pos, Some(self.take_record()));
                            }
                        }
                        None => {
                            self.data.extend_from_slice(rest);
                            pos = input.len();
                        }
                    }
                }
                Position::Quoted => {
                    let rest = &input[pos..];
                    match memchr(format.quote, rest) {
                        Some(idx) => {
                            self.push_quoted(&rest[..idx]);
                            pos += idx + 1;
                            self.position = Position::QuoteInQuoted;
                        }
                        None => {
                            self.push_quoted(rest);
                            pos = input.len();
                        }
                    }
                }
                Position::QuoteInQuoted => {
                    if b == format.quote {
                        self.data.push(b);
                        self.position = Position::Quoted;
                        pos += 1;
                    } else {
                        self.trim_floor = self.data.len();
                        self.position = Position::AfterQuoted;
                    }
                }
                Position::AfterQuoted => {
                    if b == format.delimiter {
                        self.end_field(format);
                        self.position = Position::StartField;
                        pos += 1;
                    } else if is_terminator(b) {
                        self.end_field(format);
                        self.end_line(b);
                        return (pos + 1, Some(self.take_record()));
                    } else if format.trim.contains(&b) {
                        pos += 1;
                    } else {
                        // Content after a closing quote is kept as-is.
                        self.position = Position::Unquoted;
                    }
                }
            }
        }

        (pos, None)
    }

    /// Flush the partial record at end of input.
    ///
    /// An unterminated quoted field is emitted with whatever it contains.
    pub fn finish(&mut self, format: &CsvFormat) -> Option<Record> {
        self.pending_cr = false;
        match self.position {
            Position::StartRecord => None,
            _ => {
                self.end_field(format);
                Some(self.take_record())
            }
        }
    }

    fn push_quoted(&mut self, bytes: &[u8]) {
        self.line += memchr_iter(b'\n', bytes).count() as u64;
        self.data.extend_from_slice(bytes);
    }

    fn end_field(&mut self, format: &CsvFormat) {
        if !format.trim.is_empty() {
            let floor = self.trim_floor.max(self.field_start);
            while self.data.len() > floor
                && self
                    .data
                    .last()
                    .is_some_and(|b| format.trim.contains(b))
            {
                self.data.pop();
            }
        }
        self.ends.push(self.data.len());
        self.field_start = self.data.len();
        self.trim_floor = self.data.len();
        self.position = Position::StartField;
    }

    fn end_line(&mut self, b: u8) {
        self.line += 1;
        self.terminators += 1;
        if b == b'\r' {
            self.pending_cr = true;
        }
        if self.first_terminator.is_none() {
            self.first_terminator = Some(if b == b'\r' {
                LineTerminator::Cr
            } else {
                LineTerminator::Lf
            });
        }
    }

    fn take_record(&mut self) -> Record {
        self.position = Position::StartRecord;
        self.field_start = 0;
        self.trim_floor = 0;
        self.records += 1;
        Record {
            line: self.record_line,
            data: mem::take(&mut self.data),
            ends: mem::take(&mut self.ends),
        }
    }
}

fn is_terminator(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// A completed record: decoded field bytes and the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    line: u64,
    data: Vec<u8>,
    ends: Vec<usize>,
}

impl Record {
    /// Physical line (1-based) the record starts on.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        let end = *self.ends.get(idx)?;
        let start = if idx == 0 { 0 } else { self.ends[idx - 1] };
        Some(&self.data[start..end])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.ends.len()).filter_map(|idx| self.get(idx))
    }

    /// Every field is empty.
    pub fn is_blank(&self) -> bool {
        self.data.is_empty()
    }

    /// Fields as strings, replacing invalid UTF-8 sequences.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect()
    }
}

/// Lazily tokenizes one chunk. Get the carry-over state back with
/// [`Records::into_state`] once the iterator is exhausted.
#[derive(Debug)]
pub struct Records<'a> {
    format: &'a CsvFormat,
    state: TokenizerState,
    input: &'a [u8],
}

impl Records<'_> {
    pub fn into_state(self) -> TokenizerState {
        self.state
    }
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.input.is_empty() {
            return None;
        }
        let (consumed, record) = self.state.step(self.format, self.input);
        self.input = &self.input[consumed..];
        record
    }
}

/// Tokenize `chunk` starting from `state`.
pub fn tokenize<'a>(format: &'a CsvFormat, state: TokenizerState, chunk: &'a [u8]) -> Records<'a> {
    Records {
        format,
        state,
        input: chunk,
    }
}

/// Tokenize a complete in-memory input, including a final unterminated record.
pub fn tokenize_all(format: &CsvFormat, input: &[u8]) -> (Vec<Record>, TokenizerState) {
    let mut records = tokenize(format, TokenizerState::default(), input);
    let mut out: Vec<Record> = records.by_ref().collect();
    let mut state = records.into_state();
    out.extend(state.finish(format));
    (out, state)
}
