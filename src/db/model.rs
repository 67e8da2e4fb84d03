//! Row models returned by the SQLite record source.
//!
//! Rows are kept as ordered column/value pairs so mapping code can address
//! columns by name without knowing the table schema up front.

use std::fmt;

/// A single decoded SQLite value, by storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => Ok(()),
            ColumnValue::Integer(v) => write!(f, "{}", v),
            ColumnValue::Real(v) => write!(f, "{}", v),
            ColumnValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Integer(v)
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Real(v)
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::Text(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::Text(v.to_string())
    }
}

/// One row of a table, columns in `SELECT` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordRow {
    columns: Vec<(String, ColumnValue)>,
}

impl RecordRow {
    pub fn push(&mut self, name: impl Into<String>, value: ColumnValue) {
        self.columns.push((name.into(), value));
    }

    /// Value of the first column with this name. Missing columns are `None`,
    /// SQL NULL is `Some(ColumnValue::Null)`.
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl<K: Into<String>> FromIterator<(K, ColumnValue)> for RecordRow {
    fn from_iter<I: IntoIterator<Item = (K, ColumnValue)>>(iter: I) -> Self {
        let mut row = RecordRow::default();
        for (k, v) in iter {
            row.push(k, v);
        }
        row
    }
}
