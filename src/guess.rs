//! Dialect guessing.
//!
//! Each candidate delimiter is tried against a bounded sample using the regular
//! tokenizer. A candidate scores by how consistently it splits rows:
//!
//! - consistency: fraction of sample rows with the modal field count
//! - penalty: fraction of rows whose fields are all empty
//!
//! The score is `consistency - penalty`, or zero for a delimiter whose modal
//! row has a single field. The number of fields beyond that does not count,
//! so a consistent split beats a wider ragged one. The highest score wins,
//! ties go to the earlier candidate. Header detection
//! then looks at the first row with the modal field count: all non-numeric
//! fields above rows with numbers in the same positions make it a header.
use std::collections::BTreeMap;

use tracing::debug;

use crate::format::CsvFormat;
use crate::stats::type_name;
use crate::tokenizer::{self, Record, TokenizerState};

/// Tunables for [`DialectGuesser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessOptions {
    /// Candidate delimiters, most preferred first.
    pub delimiters: Vec<u8>,
    /// Upper bound on bytes inspected.
    pub sample_bytes: usize,
    /// Upper bound on rows inspected.
    pub sample_rows: usize,
    /// Rows that must agree on the modal field count for a candidate to be
    /// trusted.
    pub min_consistent_rows: usize,
}

impl Default for GuessOptions {
    fn default() -> Self {
        GuessOptions {
            delimiters: vec![b',', b';', b'\t', b'|'],
            sample_bytes: 500_000,
            sample_rows: 100,
            min_consistent_rows: 2,
        }
    }
}

/// A delimiter tried during guessing.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub delimiter: u8,
    pub score: f64,
    /// Most common field count in the sample.
    pub modal_fields: usize,
    /// Rows with the modal field count.
    pub consistent_rows: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DialectGuesser {
    options: GuessOptions,
}

impl DialectGuesser {
    pub fn new(options: GuessOptions) -> Self {
        DialectGuesser { options }
    }

    pub fn options(&self) -> &GuessOptions {
        &self.options
    }

    /// Propose a format for `sample`, keeping everything in `base` that
    /// guessing does not decide (quote, trim, ragged row policy, names).
    ///
    /// `complete` marks the sample as the entire input, in which case a final
    /// unterminated row is part of it.
    pub fn guess(&self, base: &CsvFormat, sample: &[u8], complete: bool) -> CsvFormat {
        let complete = complete && sample.len() <= self.options.sample_bytes;
        let sample = &sample[..sample.len().min(self.options.sample_bytes)];

        let mut best: Option<(Candidate, Vec<Record>, TokenizerState)> = None;
        for &delimiter in &self.options.delimiters {
            let trial = base.clone().delimiter(delimiter).header_row(None);
            if trial.validate().is_err() {
                continue;
            }

            let (records, state) = self.sample_records(&trial, sample, complete);
            let candidate = score(delimiter, &records);
            debug!(
                delimiter = ?(delimiter as char),
                score = candidate.score,
                modal_fields = candidate.modal_fields,
                consistent_rows = candidate.consistent_rows,
                rows = candidate.rows,
                "scored dialect candidate"
            );

            let better = match &best {
                Some((b, _, _)) => candidate.score > b.score,
                None => true,
            };
            if better {
                best = Some((candidate, records, state));
            }
        }

        let fallback = || CsvFormat {
            guess: false,
            ..base.clone().delimiter(b',').header_row(Some(0))
        };

        let Some((candidate, records, state)) = best else {
            debug!("no usable delimiter candidates, using default format");
            return fallback();
        };
        if candidate.modal_fields < 2
            || candidate.consistent_rows < self.options.min_consistent_rows
        {
            debug!(
                consistent_rows = candidate.consistent_rows,
                "sample too ambiguous, using default format"
            );
            return fallback();
        }

        let header = detect_header(&records, candidate.modal_fields);
        let mut format = base
            .clone()
            .delimiter(candidate.delimiter)
            .header_row(header);
        format.guess = false;
        if let Some(terminator) = state.first_terminator() {
            format.terminator = terminator;
        }

        debug!(?format, "guessed dialect");
        format
    }

    fn sample_records(
        &self,
        format: &CsvFormat,
        sample: &[u8],
        complete: bool,
    ) -> (Vec<Record>, TokenizerState) {
        let mut records = tokenizer::tokenize(format, TokenizerState::default(), sample);
        let mut out: Vec<Record> = records.by_ref().take(self.options.sample_rows).collect();
        let mut state = records.into_state();
        if complete && out.len() < self.options.sample_rows {
            out.extend(state.finish(format));
        }
        (out, state)
    }
}

/// Guess the format of `sample` trying `delimiters` in order of preference.
///
/// Never fails: an ambiguous sample yields the default comma format.
pub fn guess_format(sample: &[u8], delimiters: &[u8]) -> CsvFormat {
    let guesser = DialectGuesser::new(GuessOptions {
        delimiters: delimiters.to_vec(),
        ..GuessOptions::default()
    });
    guesser.guess(&CsvFormat::guess(), sample, true)
}

fn score(delimiter: u8, records: &[Record]) -> Candidate {
    let rows = records.len();
    if rows == 0 {
        return Candidate {
            delimiter,
            score: 0.0,
            modal_fields: 0,
            consistent_rows: 0,
            rows,
        };
    }

    let mut tally: BTreeMap<usize, usize> = BTreeMap::new();
    for record in records {
        *tally.entry(record.len()).or_default() += 1;
    }
    // Ties between field counts go to the wider one.
    let (modal_fields, consistent_rows) = tally
        .iter()
        .map(|(fields, count)| (*fields, *count))
        .max_by_key(|(fields, count)| (*count, *fields))
        .unwrap_or((0, 0));

    let blank = records.iter().filter(|r| r.is_blank()).count();

    let consistency = consistent_rows as f64 / rows as f64;
    let penalty = blank as f64 / rows as f64;
    let score = if modal_fields > 1 {
        consistency - penalty
    } else {
        0.0
    };

    Candidate {
        delimiter,
        score,
        modal_fields,
        consistent_rows,
        rows,
    }
}

/// Index of the header row, if the sample appears to have one.
fn detect_header(records: &[Record], modal_fields: usize) -> Option<usize> {
    let (first_idx, first) = records
        .iter()
        .enumerate()
        .find(|(_, r)| r.len() == modal_fields)?;

    let is_numeric =
        |field: &[u8]| std::str::from_utf8(field).is_ok_and(|s| type_name(s).is_numeric());

    if first.iter().any(is_numeric) {
        return None;
    }

    let body = records[first_idx + 1..]
        .iter()
        .filter(|r| r.len() == modal_fields);
    let numbers_below = body
        .flat_map(|r| r.iter())
        .any(is_numeric);

    numbers_below.then_some(first_idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LineTerminator;

    fn guess(input: &str) -> CsvFormat {
        guess_format(input.as_bytes(), &GuessOptions::default().delimiters)
    }

    #[test]
    fn comma_with_header() {
        let format = guess("a,b,c\n1,2,3\n4,5,\"x,y\"\n");
        assert_eq!(b',', format.delimiter);
        assert_eq!(Some(0), format.header);
        assert!(!format.guess);
    }

    #[test]
    fn semicolon_tab_and_pipe() {
        let input = "name;score;rank\nann;1;2\nbob;3;4\ncid;5;6\ndan;7;8\neve;9;10\n";
        assert_eq!(b';', guess(input).delimiter);
        assert_eq!(b'\t', guess(&input.replace(';', "\t")).delimiter);
        assert_eq!(b'|', guess(&input.replace(';', "|")).delimiter);
    }

    #[test]
    fn commas_inside_text_do_not_win() {
        let input = "id|note\n1|a, b\n2|c, d, e\n3|f\n4|g, h\n5|i\n";
        assert_eq!(b'|', guess(input).delimiter);
    }

    #[test]
    fn deterministic() {
        let input = "x\ty\tz\n1\t2\t3\n4\t5\t6\n7\t8\t9\n10\t11\t12\n";
        let first = guess(input);
        for _ in 0..10 {
            assert_eq!(first, guess(input));
        }
    }

    #[test]
    fn ties_prefer_earlier_candidates() {
        // Splits identically on ';' and '|'.
        let input = "a;b|c\nd;e|f\ng;h|i\n";
        let format = guess_format(input.as_bytes(), b"|;");
        assert_eq!(b'|', format.delimiter);
        let format = guess_format(input.as_bytes(), b";|");
        assert_eq!(b';', format.delimiter);
    }

    #[test]
    fn no_header_when_first_row_is_numeric() {
        let format = guess("1,2,3\n4,5,6\n7,8,9\n");
        assert_eq!(b',', format.delimiter);
        assert_eq!(None, format.header);
    }

    #[test]
    fn no_header_when_everything_is_text() {
        let format = guess("a,b\nc,d\ne,f\n");
        assert_eq!(None, format.header);
    }

    #[test]
    fn header_after_preamble() {
        let input = "exported by tool\nid,value\n1,10\n2,20\n3,30\n";
        let format = guess(input);
        assert_eq!(b',', format.delimiter);
        assert_eq!(Some(1), format.header);
    }

    #[test]
    fn ambiguous_sample_falls_back_to_default() {
        let format = guess("just one line of words\n");
        assert_eq!(b',', format.delimiter);
        assert_eq!(Some(0), format.header);
        assert!(!format.guess);

        let format = guess("");
        assert_eq!(b',', format.delimiter);
    }

    #[test]
    fn detects_crlf() {
        let format = guess("a,b\r\n1,2\r\n3,4\r\n");
        assert_eq!(LineTerminator::CrLf, format.terminator);
    }

    #[test]
    fn keeps_base_settings() {
        let guesser = DialectGuesser::default();
        let base = CsvFormat::guess().strict(true).trim(b" ");
        let format = guesser.guess(&base, b"a ; b\n1 ; 2\n3 ; 4\n", true);
        assert_eq!(b';', format.delimiter);
        assert!(format.is_strict());
        assert_eq!(b" ".to_vec(), format.trim);
    }

    #[test]
    fn partial_sample_ignores_cut_row() {
        let guesser = DialectGuesser::default();
        let sample = b"a,b,c\n1,2,3\n4,5,6\n7,8";
        let format = guesser.guess(&CsvFormat::guess(), sample, false);
        assert_eq!(b',', format.delimiter);
        assert_eq!(Some(0), format.header);
    }

    #[test]
    fn scoring_prefers_consistent_split() {
        let format = CsvFormat::default();
        let (records, _) = tokenizer::tokenize_all(&format, b"a,b\nc,d\ne\n");
        let candidate = score(b',', &records);
        assert_eq!(2, candidate.modal_fields);
        assert_eq!(2, candidate.consistent_rows);
        assert!((candidate.score - 2.0 / 3.0).abs() < 1e-12);

        let (records, _) = tokenizer::tokenize_all(&format, b"a\nb\nc\n");
        assert_eq!(0.0, score(b',', &records).score);
    }

    #[test]
    fn consistent_split_beats_wider_ragged_one() {
        // Decimal commas: ',' splits wider but not every row the same way.
        let input = "lo;hi\n1,5;2,5\n3,5;4,5\n5,5;6,5\n7,5;8,5\n9,5;10,5\n";
        let format = guess(input);
        assert_eq!(b';', format.delimiter);
        // "1,5" is text, so nothing marks the first row as a header.
        assert_eq!(None, format.header);

        let rows = crate::parse(input, CsvFormat::guess()).unwrap();
        assert_eq!(6, rows.len());
        assert_eq!(vec!["lo", "hi"], rows[0].fields());
        assert_eq!(vec!["9,5", "10,5"], rows[5].fields());

        let input = "id;price\n1;2,5\n2;3,5\n3;4,5\n4;5,5\n5;6,75\n";
        let format = guess(input);
        assert_eq!(b';', format.delimiter);
        assert_eq!(Some(0), format.header);
        let rows = crate::parse(input, CsvFormat::guess()).unwrap();
        assert_eq!(Some("6,75"), rows[4].get_by_name("price").unwrap());
    }
}
