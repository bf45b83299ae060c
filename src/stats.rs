//! Single-pass per-column statistics.
//!
//! Rows are folded one at a time in the order they are read. Running means and
//! variances use Welford's update, so repeated runs over the same input fold
//! values in the same order and produce bit-identical aggregates.
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::columns::{synthetic_name, Row};
use crate::reader::CsvReader;
use crate::{CsvError, CsvResult};

/// Distinct values tracked unconditionally before the frequency table is capped.
const FREQ_WARMUP_ROWS: u64 = 1000;
/// Once warm, new distinct values are only recorded while the table is this small.
const FREQ_MAX_DISTINCT: usize = 500;

/// Type inferred for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    String,
    Empty,
}

impl DataType {
    /// Tie-break order for the dominant type.
    const PRECEDENCE: [DataType; 4] = [
        DataType::Integer,
        DataType::Float,
        DataType::Boolean,
        DataType::String,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::String => "string",
            DataType::Empty => "empty",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A field after type inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(&'a str),
    Empty,
}

impl FieldValue<'_> {
    pub fn data_type(&self) -> DataType {
        match self {
            FieldValue::Integer(_) => DataType::Integer,
            FieldValue::Float(_) => DataType::Float,
            FieldValue::Boolean(_) => DataType::Boolean,
            FieldValue::String(_) => DataType::String,
            FieldValue::Empty => DataType::Empty,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Classify a field: integer, then float, then boolean, then empty, else
/// string. The first match wins.
///
/// Surrounding whitespace is ignored. Integers that overflow `i64` classify
/// as floats. Spellings without digits (`inf`, `NaN`) are strings.
pub fn parse_field(field: &str) -> FieldValue<'_> {
    let trimmed = field.trim();

    if let Ok(v) = trimmed.parse::<i64>() {
        return FieldValue::Integer(v);
    }
    if trimmed.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(v) = trimmed.parse::<f64>() {
            if v.is_finite() {
                return FieldValue::Float(v);
            }
        }
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return FieldValue::Boolean(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return FieldValue::Boolean(false);
    }
    if trimmed.is_empty() {
        return FieldValue::Empty;
    }
    FieldValue::String(field)
}

/// Inferred type of `field`. See [`parse_field`].
pub fn type_name(field: &str) -> DataType {
    parse_field(field).data_type()
}

/// Running aggregate for one column.
#[derive(Debug, Clone, Default)]
struct ColumnAccumulator {
    count: u64,
    tally: [u64; 5],
    /// Numeric values folded so far.
    n: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean.
    m2: f64,
    min: Option<f64>,
    max: Option<f64>,
    freqs: BTreeMap<String, u64>,
}

impl ColumnAccumulator {
    fn fold(&mut self, field: &str) {
        let value = parse_field(field);

        self.count_value(field);
        self.count += 1;
        self.tally[value.data_type().slot()] += 1;

        if let Some(x) = value.as_f64() {
            self.n += 1;
            let delta = x - self.mean;
            self.mean += delta / self.n as f64;
            self.m2 += delta * (x - self.mean);

            self.min = Some(self.min.map_or(x, |m| m.min(x)));
            self.max = Some(self.max.map_or(x, |m| m.max(x)));
        }
    }

    fn count_value(&mut self, field: &str) {
        if let Some(c) = self.freqs.get_mut(field) {
            *c += 1;
        } else if self.count < FREQ_WARMUP_ROWS || self.freqs.len() <= FREQ_MAX_DISTINCT {
            self.freqs.insert(field.to_string(), 1);
        }
    }

    fn summarize(&self, name: String) -> ColumnSummary {
        let dominant = DataType::PRECEDENCE
            .iter()
            .copied()
            .fold(None, |best: Option<DataType>, ty| {
                let count = self.tally[ty.slot()];
                match best {
                    _ if count == 0 => best,
                    Some(b) if self.tally[b.slot()] >= count => best,
                    _ => Some(ty),
                }
            })
            .unwrap_or(DataType::Empty);

        let types = [
            DataType::Integer,
            DataType::Float,
            DataType::Boolean,
            DataType::String,
            DataType::Empty,
        ]
        .into_iter()
        .filter(|ty| self.tally[ty.slot()] > 0)
        .map(|ty| (ty, self.tally[ty.slot()]))
        .collect();

        let numeric = dominant.is_numeric() && self.n > 0;
        ColumnSummary {
            name,
            count: self.count,
            null_count: self.tally[DataType::Empty.slot()],
            types,
            dominant_type: dominant,
            min: self.min.filter(|_| numeric),
            max: self.max.filter(|_| numeric),
            mean: numeric.then_some(self.mean),
            variance: (numeric && self.n > 1).then(|| self.m2 / (self.n - 1) as f64),
            frequencies: self.freqs.clone(),
        }
    }
}

/// Frozen statistics for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    /// Fields seen, including empty ones.
    pub count: u64,
    pub null_count: u64,
    /// How many fields classified as each type.
    pub types: BTreeMap<DataType, u64>,
    pub dominant_type: DataType,
    /// Numeric aggregates over every integer and float in the column. `None`
    /// when the dominant type is not numeric.
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Sample variance, `None` with fewer than two numeric values.
    pub variance: Option<f64>,
    /// Raw value frequencies, capped to bound memory on high-cardinality columns.
    pub frequencies: BTreeMap<String, u64>,
}

impl ColumnSummary {
    /// Narrowest type every value in the column converts to without loss.
    pub fn storage_type(&self) -> DataType {
        let has = |ty: DataType| self.types.get(&ty).is_some_and(|c| *c > 0);
        let numeric = has(DataType::Integer) || has(DataType::Float);

        if has(DataType::String) || (has(DataType::Boolean) && numeric) {
            DataType::String
        } else if has(DataType::Float) {
            DataType::Float
        } else if has(DataType::Integer) {
            DataType::Integer
        } else if has(DataType::Boolean) {
            DataType::Boolean
        } else {
            DataType::Empty
        }
    }
}

/// Frozen statistics for a whole source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatSummary {
    pub rows: u64,
    pub columns: Vec<ColumnSummary>,
}

impl StatSummary {
    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns.iter().rev().find(|c| c.name == name)
    }
}

/// Streaming statistics engine.
#[derive(Debug, Clone, Default)]
pub struct CsvStat {
    names: Vec<String>,
    columns: Vec<ColumnAccumulator>,
    rows: u64,
    summary: Option<StatSummary>,
}

impl CsvStat {
    pub fn new(names: Vec<String>) -> Self {
        let columns = vec![ColumnAccumulator::default(); names.len()];
        CsvStat {
            names,
            columns,
            rows: 0,
            summary: None,
        }
    }

    /// Read every remaining row of `reader` and finalize.
    ///
    /// A malformed row (strict formats) aborts the calculation.
    pub async fn from_reader<R>(reader: &mut CsvReader<R>) -> CsvResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut stat = CsvStat::new(reader.col_names().to_vec());
        while let Some(row) = reader.next_row().await? {
            stat.fold(&row)?;
        }
        stat.finalize();
        Ok(stat)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    pub fn fold(&mut self, row: &Row) -> CsvResult<()> {
        self.fold_fields(row.fields())
    }

    /// Fold one row of fields. Positions past the known columns get their own
    /// aggregates.
    pub fn fold_fields<S: AsRef<str>>(&mut self, fields: &[S]) -> CsvResult<()> {
        if self.summary.is_some() {
            warn!(rows = self.rows, "row folded after statistics were finalized");
            return Err(CsvError::StatsFinalized);
        }
        if fields.len() > self.columns.len() {
            self.columns
                .resize_with(fields.len(), ColumnAccumulator::default);
        }
        for (acc, field) in self.columns.iter_mut().zip(fields) {
            acc.fold(field.as_ref());
        }
        self.rows += 1;
        Ok(())
    }

    /// Freeze the aggregates. Calling it again returns the same summary.
    pub fn finalize(&mut self) -> &StatSummary {
        let names = &self.names;
        let accumulators = &self.columns;
        let rows = self.rows;

        self.summary.get_or_insert_with(|| {
            let columns = accumulators
                .iter()
                .enumerate()
                .map(|(idx, acc)| {
                    let name = names.get(idx).cloned().unwrap_or_else(|| synthetic_name(idx));
                    acc.summarize(name)
                })
                .collect();
            debug!(rows, columns = accumulators.len(), "finalized statistics");
            StatSummary { rows, columns }
        })
    }

    pub fn summary(&self) -> Option<&StatSummary> {
        self.summary.as_ref()
    }
}
