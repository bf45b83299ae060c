use std::fmt;

use crate::{CsvError, CsvResult};

/// Row terminator observed in (or written to) a CSV source.
///
/// The tokenizer accepts all three on input regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
    Cr,
}

impl LineTerminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::Lf => "\n",
            LineTerminator::CrLf => "\r\n",
            LineTerminator::Cr => "\r",
        }
    }
}

/// What to do with a row whose field count differs from the header's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RaggedRows {
    /// Emit the row as-is, short or long.
    #[default]
    Keep,
    /// Drop the row without surfacing it.
    Skip,
    /// Surface a [`CsvError::MalformedRow`] for the row.
    Reject,
}

/// How to parse a CSV source.
///
/// Use one of the presets ([`CsvFormat::default`], [`CsvFormat::rfc4180_strict`],
/// [`CsvFormat::guess`]) and adjust it with the chained setters.
#[derive(Clone, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub quote: u8,
    /// Index of the header row, `None` when the source has no header.
    pub header: Option<usize>,
    pub ragged_rows: RaggedRows,
    /// Defer delimiter/header selection to the dialect guesser.
    pub guess: bool,
    /// Caller-supplied names. Overrides header or synthesized names when non-empty.
    pub column_names: Vec<String>,
    /// Bytes stripped from both ends of unquoted fields and around quoted ones.
    pub trim: Vec<u8>,
    /// Strip a leading UTF-8 byte order mark.
    pub detect_bom: bool,
    pub terminator: LineTerminator,
}

impl Default for CsvFormat {
    fn default() -> Self {
        CsvFormat {
            delimiter: b',',
            quote: b'"',
            header: Some(0),
            ragged_rows: RaggedRows::Keep,
            guess: false,
            column_names: Vec::new(),
            trim: Vec::new(),
            detect_bom: true,
            terminator: LineTerminator::Lf,
        }
    }
}

impl fmt::Debug for CsvFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvFormat")
            .field("delimiter", &(self.delimiter as char))
            .field("quote", &(self.quote as char))
            .field("header", &self.header)
            .field("ragged_rows", &self.ragged_rows)
            .field("guess", &self.guess)
            .field("column_names", &self.column_names)
            .field(
                "trim",
                &self.trim.iter().map(|b| *b as char).collect::<Vec<_>>(),
            )
            .field("detect_bom", &self.detect_bom)
            .field("terminator", &self.terminator)
            .finish()
    }
}

impl CsvFormat {
    /// Comma separated, double quoted, header on the first row, ragged rows rejected.
    pub fn rfc4180_strict() -> Self {
        CsvFormat::default().strict(true)
    }

    /// Sentinel format: the reader guesses delimiter and header from a sample.
    pub fn guess() -> Self {
        CsvFormat {
            guess: true,
            ..CsvFormat::default()
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn header_row(mut self, header: Option<usize>) -> Self {
        self.header = header;
        self
    }

    pub fn no_header(self) -> Self {
        self.header_row(None)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.ragged_rows = if strict {
            RaggedRows::Reject
        } else {
            RaggedRows::Keep
        };
        self
    }

    pub fn ragged_rows(mut self, policy: RaggedRows) -> Self {
        self.ragged_rows = policy;
        self
    }

    pub fn column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn trim(mut self, chars: &[u8]) -> Self {
        self.trim = chars.to_vec();
        self
    }

    pub fn detect_bom(mut self, detect: bool) -> Self {
        self.detect_bom = detect;
        self
    }

    pub fn terminator(mut self, terminator: LineTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.ragged_rows == RaggedRows::Reject
    }

    /// Check the format for contradictions that would make tokenizing ambiguous.
    pub fn validate(&self) -> CsvResult<()> {
        if self.delimiter == self.quote {
            return Err(CsvError::Format(format!(
                "delimiter and quote character are both {:?}",
                self.delimiter as char
            )));
        }
        for (what, b) in [("delimiter", self.delimiter), ("quote", self.quote)] {
            // Fields are written as UTF-8, where a byte above 0x7f is not a character.
            if !b.is_ascii() {
                return Err(CsvError::Format(format!(
                    "{what} byte 0x{b:02x} is not ASCII"
                )));
            }
            if b == b'\n' || b == b'\r' {
                return Err(CsvError::Format(format!(
                    "{what} cannot be a line terminator"
                )));
            }
            if self.trim.contains(&b) {
                return Err(CsvError::Format(format!(
                    "{what} {:?} is also a trim character",
                    b as char
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let default = CsvFormat::default();
        assert_eq!(b',', default.delimiter);
        assert_eq!(Some(0), default.header);
        assert!(!default.is_strict());
        assert!(!default.guess);

        assert!(CsvFormat::rfc4180_strict().is_strict());
        assert!(CsvFormat::guess().guess);
    }

    #[test]
    fn delimiter_equal_to_quote_is_invalid() {
        let err = CsvFormat::default().delimiter(b'"').validate().unwrap_err();
        assert!(matches!(err, CsvError::Format(_)));
    }

    #[test]
    fn newline_delimiter_is_invalid() {
        assert!(CsvFormat::default().delimiter(b'\n').validate().is_err());
    }

    #[test]
    fn non_ascii_delimiter_or_quote_is_invalid() {
        let err = CsvFormat::default().delimiter(0xa7).validate().unwrap_err();
        assert!(matches!(err, CsvError::Format(_)));
        assert!(CsvFormat::default().quote(0x80).validate().is_err());
        assert!(CsvFormat::default().delimiter(0x7f).validate().is_ok());
    }

    #[test]
    fn trim_overlapping_delimiter_is_invalid() {
        assert!(CsvFormat::default().trim(b" ,").validate().is_err());
        assert!(CsvFormat::default().trim(b" \t").validate().is_ok());
    }

    #[test]
    fn strict_toggles_policy() {
        let format = CsvFormat::default().strict(true).strict(false);
        assert_eq!(RaggedRows::Keep, format.ragged_rows);
    }
}
