use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use serde_json::{Map, Number, Value};

use crate::stats::{parse_field, FieldValue};
use crate::{CsvError, CsvResult};

/// Column names and the name to position lookup, built once per source.
///
/// When the header repeats a name the later position wins for lookups by
/// name; every position stays reachable by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnNames {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnNames {
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        ColumnNames { names, positions }
    }

    /// "Column 0", "Column 1", ... for sources without a header.
    pub fn synthesize(count: usize) -> Self {
        Self::new((0..count).map(synthetic_name).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn position(&self, name: &str) -> CsvResult<usize> {
        self.index_of(name)
            .ok_or_else(|| CsvError::ColumnNotFound(name.to_string()))
    }

    /// Name for a position, synthesizing one past the end of the header.
    pub fn name_at(&self, idx: usize) -> String {
        self.names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| synthetic_name(idx))
    }
}

pub(crate) fn synthetic_name(idx: usize) -> String {
    format!("Column {idx}")
}

/// One parsed row. Fields are in column order.
#[derive(Debug, Clone)]
pub struct Row {
    fields: Vec<String>,
    columns: Arc<ColumnNames>,
    line: u64,
}

impl Row {
    pub fn new(fields: Vec<String>, columns: Arc<ColumnNames>, line: u64) -> Self {
        Row {
            fields,
            columns,
            line,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).map(String::as_str)
    }

    /// Field under the column `name`.
    ///
    /// Errors when the column does not exist. A short row yields `Ok(None)`.
    pub fn get_by_name(&self, name: &str) -> CsvResult<Option<&str>> {
        let idx = self.columns.position(name)?;
        Ok(self.get(idx))
    }

    /// Field `idx` with its inferred type.
    pub fn value(&self, idx: usize) -> Option<FieldValue<'_>> {
        self.get(idx).map(parse_field)
    }

    pub fn value_by_name(&self, name: &str) -> CsvResult<Option<FieldValue<'_>>> {
        Ok(self.get_by_name(name)?.map(parse_field))
    }

    /// The row as a JSON object keyed by column name.
    ///
    /// Integers and floats are written as JSON numbers, every other field as
    /// a string. An empty `subset` selects all fields; otherwise only the named
    /// columns are written, and an unknown name is an error. Fields missing
    /// from a short row are left out.
    pub fn to_json(&self, subset: &[&str]) -> CsvResult<Value> {
        let mut object = Map::new();
        if subset.is_empty() {
            for (idx, field) in self.fields.iter().enumerate() {
                object.insert(self.columns.name_at(idx), json_value(field));
            }
        } else {
            for name in subset {
                if let Some(field) = self.get_by_name(name)? {
                    object.insert(name.to_string(), json_value(field));
                }
            }
        }
        Ok(Value::Object(object))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    /// Physical line (1-based) the row starts on.
    pub fn line(&self) -> u64 {
        self.line
    }
}

fn json_value(field: &str) -> Value {
    match parse_field(field) {
        FieldValue::Integer(v) => Value::from(v),
        FieldValue::Float(v) => {
            Number::from_f64(v).map_or_else(|| Value::from(field), Value::Number)
        }
        _ => Value::from(field),
    }
}

impl Index<usize> for Row {
    type Output = str;

    fn index(&self, idx: usize) -> &str {
        &self.fields[idx]
    }
}
