use memchr::memchr3;

use crate::format::CsvFormat;

/// Serialize one row with the delimiter and quote of `format`, without a
/// line terminator.
///
/// Fields containing the delimiter, the quote character or a line break are
/// quoted and embedded quotes doubled, so tokenizing the output with the same
/// format gives back the fields. `format` is expected to pass
/// [`CsvFormat::validate`].
pub fn format_row<S: AsRef<str>>(fields: &[S], format: &CsvFormat) -> String {
    let mut out = String::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            out.push(format.delimiter as char);
        }
        let field = field.as_ref();
        // A lone empty field would otherwise serialize to a blank line.
        let lone_empty = fields.len() == 1 && field.is_empty();
        if lone_empty || needs_quotes(field.as_bytes(), format) {
            push_quoted(&mut out, field, format.quote as char);
        } else {
            out.push_str(field);
        }
    }
    out
}

/// [`format_row`] followed by the format's line terminator.
pub fn format_line<S: AsRef<str>>(fields: &[S], format: &CsvFormat) -> String {
    let mut line = format_row(fields, format);
    line.push_str(format.terminator.as_str());
    line
}

fn needs_quotes(field: &[u8], format: &CsvFormat) -> bool {
    if memchr3(format.delimiter, format.quote, b'\n', field).is_some() || field.contains(&b'\r') {
        return true;
    }
    // Trimmed bytes at either end only survive inside quotes.
    match (field.first(), field.last()) {
        (Some(first), Some(last)) => format.trim.contains(first) || format.trim.contains(last),
        _ => false,
    }
}

fn push_quoted(out: &mut String, field: &str, quote: char) {
    out.push(quote);
    for c in field.chars() {
        if c == quote {
            out.push(quote);
        }
        out.push(c);
    }
    out.push(quote);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LineTerminator;
    use crate::tokenizer::tokenize_all;

    fn round_trip(fields: &[&str], format: &CsvFormat) {
        let text = format_row(fields, format);
        let (records, _) = tokenize_all(format, text.as_bytes());
        assert_eq!(1, records.len(), "text: {text:?}");
        assert_eq!(fields.to_vec(), records[0].to_strings(), "text: {text:?}");
    }

    #[test]
    fn quotes_only_when_needed() {
        let format = CsvFormat::default();
        assert_eq!("a,b", format_row(&["a", "b"], &format));
        assert_eq!("\"x,y\",\"say \"\"hi\"\"\"", format_row(&["x,y", "say \"hi\""], &format));
        assert_eq!("\"l1\nl2\",", format_row(&["l1\nl2", ""], &format));
    }

    #[test]
    fn round_trips() {
        let format = CsvFormat::default();
        round_trip(&["plain", "with,comma", "with \"quote\"", "multi\r\nline", ""], &format);
        round_trip(&[""], &format);
        round_trip(&["\"leading quote"], &format);

        let pipes = CsvFormat::default().delimiter(b'|').quote(b'\'');
        round_trip(&["a|b", "it's", "c,d"], &pipes);

        let trimmed = CsvFormat::default().trim(b" ");
        round_trip(&[" padded ", "x"], &trimmed);
    }

    #[test]
    fn round_trips_every_valid_ascii_delimiter() {
        for delimiter in (0u8..0x80).filter(|b| !b.is_ascii_alphanumeric()) {
            let format = CsvFormat::default().delimiter(delimiter);
            if format.validate().is_err() {
                continue;
            }
            round_trip(&["a b", "c", "d\"e"], &format);
        }
        assert!(CsvFormat::default().delimiter(0xa7).validate().is_err());
    }

    #[test]
    fn line_uses_terminator() {
        let format = CsvFormat::default().terminator(LineTerminator::CrLf);
        assert_eq!("a,b\r\n", format_line(&["a", "b"], &format));
    }
}
