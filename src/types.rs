use crate::constants::*;
use crate::error::{EtlError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// A single cell. `Null` is the explicit missing marker.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or text that is empty once trimmed.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Date value, or ISO `YYYY-MM-DD` text as stored by SQLite.
    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    /// String form used for display and address composition. `None` for `Null`.
    pub fn to_display(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => number_bits(*a) == number_bits(*b),
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Text(s) => s.hash(state),
            Value::Number(n) => number_bits(*n).hash(state),
            Value::Date(d) => d.hash(state),
        }
    }
}

// -0.0 and 0.0 must land in the same duplicate bucket
fn number_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// In-memory table: ordered column names plus rows of equal width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut dataset = Self::new(columns);
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::structure(
                "dataset",
                format!(
                    "row has {} values but the dataset has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Rewrites every value of `name`. Returns false when the column is absent.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(&Value) -> Value,
    {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        true
    }

    pub fn rename_columns<F>(&mut self, f: F)
    where
        F: Fn(&str) -> String,
    {
        for column in &mut self.columns {
            *column = f(column);
        }
    }

    /// Projects onto `picks` (source index, output name) in the given order.
    pub fn project(self, picks: &[(usize, String)]) -> Dataset {
        let columns = picks.iter().map(|(_, name)| name.clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| picks.iter().map(|(idx, _)| row[*idx].clone()).collect())
            .collect();
        Dataset { columns, rows }
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.contains(&c.as_str()))
            .collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EtlError::structure(
                "dataset",
                format!(
                    "column {name} has {} values for {} rows",
                    values.len(),
                    self.rows.len()
                ),
            ));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }

    /// Typed view over the canonical columns. Absent columns read as `None`.
    pub fn records(&self) -> Vec<CleanRecord> {
        let idx = |name: &str| self.column_index(name);
        let price = idx(PRICE);
        let date = idx(DATE);
        let postcode = idx(POSTCODE);
        let property_type = idx(PROPERTY_TYPE);
        let new_build = idx(NEW_BUILD);
        let estate_type = idx(ESTATE_TYPE);
        let address = idx(ADDRESS);
        let borough = idx(BOROUGH);
        let category = idx(TRANSACTION_CATEGORY);

        let text = |row: &[Value], i: Option<usize>| i.and_then(|i| row[i].to_display());

        self.rows
            .iter()
            .map(|row| CleanRecord {
                price: price.and_then(|i| row[i].as_number()),
                date: date.and_then(|i| row[i].to_date()),
                postcode: text(row, postcode),
                property_type: text(row, property_type),
                new_build: text(row, new_build),
                estate_type: text(row, estate_type),
                address: text(row, address),
                borough: text(row, borough),
                transaction_category: text(row, category),
            })
            .collect()
    }
}

/// One cleaned transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanRecord {
    pub price: Option<f64>,
    pub date: Option<NaiveDate>,
    pub postcode: Option<String>,
    pub property_type: Option<String>,
    pub new_build: Option<String>,
    pub estate_type: Option<String>,
    pub address: Option<String>,
    pub borough: Option<String>,
    pub transaction_category: Option<String>,
}
