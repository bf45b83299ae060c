//! Streaming CSV reading with dialect guessing and per-column statistics.
//!
//! - Reader: [`CsvReader`] pulls bounded chunks from any `AsyncRead` and
//!   yields [`Row`]s; local files may be gzip/zstd compressed or use a
//!   non-UTF-8 charset.
//! - Guessing: [`CsvFormat::guess`] defers delimiter and header detection to
//!   [`DialectGuesser`], run once on the first chunk.
//! - Statistics: [`CsvStat`] folds rows into per-column type tallies,
//!   min/max/mean/variance and value frequencies in a single pass.
//!
//! Data shape:
//! - Rows: [`Row`] (`get(idx) -> Option<&str>`, `get_by_name(name)`, typed
//!   `value(idx) -> Option<FieldValue>`, `to_json(subset)`)
//! - File info: [`CsvFileInfo`], `row_count` is `None` until the source was
//!   read to the end
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
pub mod columns;
pub mod format;
pub mod guess;
pub mod io;
pub mod reader;
pub mod stats;
pub mod tokenizer;
pub mod writer;

pub use crate::columns::{ColumnNames, Row};
pub use crate::format::{CsvFormat, LineTerminator, RaggedRows};
pub use crate::guess::{guess_format, DialectGuesser, GuessOptions};
pub use crate::io::{build_source, source_from_path, SourceMeta};
pub use crate::reader::{CsvFileInfo, CsvReader, ReaderOptions};
pub use crate::stats::{
    parse_field, type_name, ColumnSummary, CsvStat, DataType, FieldValue, StatSummary,
};
pub use crate::writer::{format_line, format_row};

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Error type returned by this crate.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid format: {0}")]
    Format(String),
    #[error("line {line}: expected {expected} fields, found {observed}")]
    MalformedRow {
        line: u64,
        expected: usize,
        observed: usize,
    },
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("statistics already finalized")]
    StatsFinalized,
}

pub type CsvResult<T> = std::result::Result<T, CsvError>;

/// Parse in-memory text into rows.
///
/// Same as opening a [`CsvReader`] over `text` and reading it to the end, so
/// the first malformed row of a strict format is returned as the error.
pub fn parse(text: &str, format: CsvFormat) -> CsvResult<Vec<Row>> {
    futures::executor::block_on(async {
        let mut reader = CsvReader::open(text.as_bytes(), format).await?;
        reader.read_all().await
    })
}

/// [`parse`] with the default dialect, treating every row as data.
pub fn parse_no_header(text: &str) -> CsvResult<Vec<Row>> {
    parse(text, CsvFormat::default().no_header())
}

/// Read a whole file with a guessed format and report what was found.
pub async fn get_file_info(path: impl AsRef<Path>) -> CsvResult<CsvFileInfo> {
    let mut reader =
        CsvReader::open_path(path, CsvFormat::guess(), ReaderOptions::default()).await?;
    while reader.next_row().await?.is_some() {}
    Ok(reader.file_info())
}

/// Position of column `name` in the file at `path`.
pub async fn get_col_pos(
    path: impl AsRef<Path>,
    name: &str,
    format: CsvFormat,
) -> CsvResult<usize> {
    let reader = CsvReader::open_path(path, format, ReaderOptions::default()).await?;
    reader.col_pos(name)
}

/// Storage type of every column of the file at `path`, keyed by name.
pub async fn csv_data_types(path: impl AsRef<Path>) -> CsvResult<HashMap<String, DataType>> {
    let mut reader =
        CsvReader::open_path(path, CsvFormat::guess(), ReaderOptions::default()).await?;
    let mut stat = CsvStat::from_reader(&mut reader).await?;
    let summary = stat.finalize();
    Ok(summary
        .columns
        .iter()
        .map(|column| (column.name.clone(), column.storage_type()))
        .collect())
}
