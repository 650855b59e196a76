//! Values exchanged between readers, processors and algorithms

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{NexusError, NexusResult};

/// Keyword arguments passed to an algorithm body
pub type RunInputs = BTreeMap<String, AlgorithmData>;

/// What an algorithm hands back to the orchestrator
pub type AlgorithmResult = AlgorithmData;

/// Column-oriented table of JSON values
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from records; columns appear in first-seen order and
    /// missing cells become `null`.
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|column| record.remove(column).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> NexusResult<()> {
        if row.len() != self.columns.len() {
            return Err(NexusError::fatal(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }

    /// Rows as JSON objects keyed by column name
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, Value>>()
            })
            .collect()
    }

    /// Append the rows of `other`, which must have the same columns
    pub fn extend(&mut self, other: DataTable) -> NexusResult<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.columns != self.columns {
            return Err(NexusError::fatal(format!(
                "cannot append table with columns [{}] to table with columns [{}]",
                other.columns.join(", "),
                self.columns.join(", ")
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableRepr {
    Columnar { columns: Vec<String>, rows: Vec<Vec<Value>> },
    Records(Vec<Map<String, Value>>),
}

impl<'de> Deserialize<'de> for DataTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match TableRepr::deserialize(deserializer)? {
            TableRepr::Columnar { columns, rows } => {
                if let Some(bad) = rows.iter().find(|row| row.len() != columns.len()) {
                    return Err(serde::de::Error::custom(format!(
                        "row has {} cells, table has {} columns",
                        bad.len(),
                        columns.len()
                    )));
                }
                Ok(DataTable { columns, rows })
            }
            TableRepr::Records(records) => Ok(DataTable::from_records(records)),
        }
    }
}

/// Kind of an [`AlgorithmData`] value, used to pick a serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Table,
    Document,
    Bundle,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Table => "TABLE",
            DataKind::Document => "DOCUMENT",
            DataKind::Bundle => "BUNDLE",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AlgorithmData {
    Table(DataTable),
    Document(Value),
    Bundle(BTreeMap<String, AlgorithmData>),
}

impl AlgorithmData {
    pub fn kind(&self) -> DataKind {
        match self {
            AlgorithmData::Table(_) => DataKind::Table,
            AlgorithmData::Document(_) => DataKind::Document,
            AlgorithmData::Bundle(_) => DataKind::Bundle,
        }
    }

    pub fn as_table(&self) -> Option<&DataTable> {
        match self {
            AlgorithmData::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Value> {
        match self {
            AlgorithmData::Document(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bundle(&self) -> Option<&BTreeMap<String, AlgorithmData>> {
        match self {
            AlgorithmData::Bundle(values) => Some(values),
            _ => None,
        }
    }

    /// Turn this value into keyword arguments: a bundle becomes its entries,
    /// anything else a single entry under `key`.
    pub fn into_inputs(self, key: &str) -> RunInputs {
        match self {
            AlgorithmData::Bundle(values) => values,
            other => BTreeMap::from([(key.to_string(), other)]),
        }
    }
}

impl From<DataTable> for AlgorithmData {
    fn from(table: DataTable) -> Self {
        AlgorithmData::Table(table)
    }
}

impl From<Value> for AlgorithmData {
    fn from(value: Value) -> Self {
        AlgorithmData::Document(value)
    }
}

impl From<RunInputs> for AlgorithmData {
    fn from(values: RunInputs) -> Self {
        AlgorithmData::Bundle(values)
    }
}

/// Fetch a required table argument from run inputs
pub fn require_table<'a>(inputs: &'a RunInputs, key: &str) -> NexusResult<&'a DataTable> {
    inputs
        .get(key)
        .and_then(AlgorithmData::as_table)
        .ok_or_else(|| NexusError::fatal(format!("input '{key}' is missing or is not a table")))
}
