use std::path::Path;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::columns::{ColumnNames, Row};
use crate::format::{CsvFormat, RaggedRows};
use crate::guess::{DialectGuesser, GuessOptions};
use crate::io::{source_from_path, SourceMeta, SOURCE_BUFFER_SIZE};
use crate::tokenizer::{Record, TokenizerState};
use crate::writer::format_row;
use crate::{CsvError, CsvResult};

/// Longest byte order mark `encoding_rs` recognizes (UTF-8).
const MAX_BOM_LEN: usize = 3;

/// Reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Bytes requested from the source per pull.
    pub chunk_size: usize,
    pub guess: GuessOptions,
    pub meta: SourceMeta,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            chunk_size: SOURCE_BUFFER_SIZE,
            guess: GuessOptions::default(),
            meta: SourceMeta::default(),
        }
    }
}

impl ReaderOptions {
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn guess(mut self, guess: GuessOptions) -> Self {
        self.guess = guess;
        self
    }

    pub fn meta(mut self, meta: SourceMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Snapshot of what is known about an opened source.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvFileInfo {
    /// Identifier of the source, usually the file name.
    pub source: String,
    /// Encoding label of the source bytes.
    pub encoding: String,
    /// A UTF-8 byte order mark was stripped.
    pub bom: bool,
    /// Data rows delivered. `None` until the source has been read to the end.
    pub row_count: Option<u64>,
    pub column_count: usize,
    pub col_names: Vec<String>,
    /// Ragged rows dropped under [`RaggedRows::Skip`].
    pub skipped_rows: u64,
    /// Ragged rows reported under [`RaggedRows::Reject`].
    pub malformed_rows: u64,
    /// Format in effect after guessing.
    pub format: CsvFormat,
}

pub type BoxedSource = Box<dyn AsyncRead + Unpin + Send>;

/// Streaming CSV reader.
///
/// Pulls at most `chunk_size` bytes at a time from the source; apart from
/// that chunk only the partially decoded row is held in memory. Rows are
/// produced forward-only; reopen the source to read again.
#[derive(Debug)]
pub struct CsvReader<R> {
    source: R,
    options: ReaderOptions,
    format: CsvFormat,
    columns: Arc<ColumnNames>,
    /// Unconsumed bytes of the current chunk.
    buf: BytesMut,
    state: TokenizerState,
    /// First data record, held back while synthesizing column names.
    peeked: Option<Record>,
    eof: bool,
    encoding: &'static str,
    bom: bool,
    rows: u64,
    skipped: u64,
    malformed: u64,
    row_count: Option<u64>,
}

impl<R> CsvReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Open `source` with default options.
    pub async fn open(source: R, format: CsvFormat) -> CsvResult<Self> {
        Self::with_options(source, format, ReaderOptions::default()).await
    }

    /// Open `source`, reading the first chunk to guess the dialect (if asked
    /// to) and to resolve column names.
    pub async fn with_options(
        source: R,
        format: CsvFormat,
        options: ReaderOptions,
    ) -> CsvResult<Self> {
        if !format.guess {
            format.validate()?;
        }
        if options.chunk_size == 0 {
            return Err(CsvError::Format("chunk size must be positive".to_string()));
        }

        let mut reader = CsvReader {
            source,
            encoding: options.meta.charset.name(),
            buf: BytesMut::with_capacity(options.chunk_size),
            options,
            format,
            columns: Arc::new(ColumnNames::default()),
            state: TokenizerState::default(),
            peeked: None,
            eof: false,
            bom: false,
            rows: 0,
            skipped: 0,
            malformed: 0,
            row_count: None,
        };

        reader.fill().await?;
        // A byte order mark may straddle chunks smaller than itself.
        while reader.buf.len() < MAX_BOM_LEN && !reader.eof {
            reader.fill().await?;
        }
        reader.detect_bom();

        if reader.format.guess {
            let guesser = DialectGuesser::new(reader.options.guess.clone());
            reader.format = guesser.guess(&reader.format, &reader.buf, reader.eof);
            reader.format.validate()?;
        }

        reader.read_header().await?;

        debug!(
            source = %reader.options.meta.name_hint,
            format = ?reader.format,
            columns = reader.columns.len(),
            "opened csv reader"
        );
        Ok(reader)
    }

    pub fn format(&self) -> &CsvFormat {
        &self.format
    }

    pub fn col_names(&self) -> &[String] {
        self.columns.names()
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    /// Position of the column `name`. Later duplicates win.
    pub fn col_pos(&self, name: &str) -> CsvResult<usize> {
        self.columns.position(name)
    }

    /// Rows delivered so far.
    pub fn rows_read(&self) -> u64 {
        self.rows
    }

    pub fn file_info(&self) -> CsvFileInfo {
        CsvFileInfo {
            source: self.options.meta.name_hint.clone(),
            encoding: self.encoding.to_string(),
            bom: self.bom,
            row_count: self.row_count,
            column_count: self.columns.len(),
            col_names: self.columns.names().to_vec(),
            skipped_rows: self.skipped,
            malformed_rows: self.malformed,
            format: self.format.clone(),
        }
    }

    /// Next data row, or `None` at end of input.
    ///
    /// A [`CsvError::MalformedRow`] only concerns that row; reading may
    /// continue with the next call.
    pub async fn next_row(&mut self) -> CsvResult<Option<Row>> {
        loop {
            let Some(record) = self.next_record().await? else {
                if self.row_count.is_none() {
                    debug!(
                        rows = self.rows,
                        skipped = self.skipped,
                        malformed = self.malformed,
                        "reached end of csv input"
                    );
                    self.row_count = Some(self.rows);
                }
                return Ok(None);
            };

            let expected = self.columns.len();
            let observed = record.len();
            if observed != expected {
                match self.format.ragged_rows {
                    RaggedRows::Keep => {}
                    RaggedRows::Skip => {
                        self.skipped += 1;
                        debug!(
                            line = record.line(),
                            expected,
                            observed,
                            row = %format_row(&record.to_strings(), &self.format),
                            "skipping ragged row"
                        );
                        continue;
                    }
                    RaggedRows::Reject => {
                        self.malformed += 1;
                        return Err(CsvError::MalformedRow {
                            line: record.line(),
                            expected,
                            observed,
                        });
                    }
                }
            }

            self.rows += 1;
            return Ok(Some(Row::new(
                record.to_strings(),
                self.columns.clone(),
                record.line(),
            )));
        }
    }

    /// Read every remaining row. Stops at the first error.
    pub async fn read_all(&mut self) -> CsvResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Rows as a stream. Malformed rows are yielded as errors and reading
    /// continues; any other error ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = CsvResult<Row>> {
        futures::stream::unfold(Some(self), |reader| async move {
            let mut reader = reader?;
            match reader.next_row().await {
                Ok(Some(row)) => Some((Ok(row), Some(reader))),
                Ok(None) => None,
                Err(err @ CsvError::MalformedRow { .. }) => Some((Err(err), Some(reader))),
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    async fn read_header(&mut self) -> CsvResult<()> {
        let header = match self.format.header {
            Some(idx) => {
                let mut header = None;
                for skipped in 0..=idx {
                    match self.next_record().await? {
                        Some(record) if skipped == idx => header = Some(record.to_strings()),
                        Some(_) => {}
                        None if skipped == 0 => break,
                        None => {
                            return Err(CsvError::Format(format!(
                                "header row {idx} is past the end of input ({skipped} rows)"
                            )))
                        }
                    }
                }
                header
            }
            None => None,
        };

        let columns = if !self.format.column_names.is_empty() {
            ColumnNames::new(self.format.column_names.clone())
        } else if let Some(names) = header {
            ColumnNames::new(names)
        } else {
            self.peeked = self.next_record().await?;
            ColumnNames::synthesize(self.peeked.as_ref().map_or(0, Record::len))
        };
        self.columns = Arc::new(columns);
        Ok(())
    }

    async fn next_record(&mut self) -> CsvResult<Option<Record>> {
        if let Some(record) = self.peeked.take() {
            return Ok(Some(record));
        }

        loop {
            if !self.buf.is_empty() {
                let (consumed, record) = self.state.step(&self.format, &self.buf);
                self.buf.advance(consumed);
                if record.is_some() {
                    return Ok(record);
                }
                continue;
            }
            if self.eof {
                return Ok(self.state.finish(&self.format));
            }
            self.fill().await?;
        }
    }

    /// Pull up to `chunk_size` more bytes from the source.
    async fn fill(&mut self) -> CsvResult<()> {
        let chunk_size = self.options.chunk_size;
        let want = self.buf.len() + chunk_size;
        self.buf.reserve(chunk_size);

        let mut limited = (&mut self.source).take(chunk_size as u64);
        while self.buf.len() < want {
            let n = limited.read_buf(&mut self.buf).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
        }

        trace!(
            bytes = self.buf.len(),
            eof = self.eof,
            partial_row_bytes = self.state.partial_len(),
            "pulled chunk"
        );
        Ok(())
    }

    fn detect_bom(&mut self) {
        match encoding_rs::Encoding::for_bom(&self.buf) {
            Some((encoding, len)) if encoding == encoding_rs::UTF_8 => {
                if self.format.detect_bom {
                    self.buf.advance(len);
                    self.bom = true;
                }
            }
            Some((encoding, _)) => {
                warn!(
                    encoding = encoding.name(),
                    "source starts with a byte order mark for an encoding that is not transcoded"
                );
                self.encoding = encoding.name();
            }
            None => {}
        }
    }
}

impl CsvReader<BoxedSource> {
    /// Open a local file, decompressing `.gz`/`.zst` by extension and
    /// transcoding from `options.meta.charset`.
    pub async fn open_path(
        path: impl AsRef<Path>,
        format: CsvFormat,
        options: ReaderOptions,
    ) -> CsvResult<Self> {
        let (source, meta) = source_from_path(path.as_ref(), options.meta.charset).await?;
        Self::with_options(Box::new(source), format, options.meta(meta)).await
    }
}
