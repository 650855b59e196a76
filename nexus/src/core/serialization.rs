//! Blob serialization of algorithm data
//!
//! The format is chosen per data kind. Defaults are JSON lines for tables
//! and JSON for documents and bundles; either can be overridden from the
//! environment.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::core::data::{AlgorithmData, DataKind};
use crate::error::{NexusError, NexusResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationFormat {
    Json,
    JsonLines,
}

impl SerializationFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "json",
            SerializationFormat::JsonLines => "jsonl",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "application/json",
            SerializationFormat::JsonLines => "application/x-ndjson",
        }
    }

    pub fn serialize(&self, data: &AlgorithmData) -> NexusResult<Vec<u8>> {
        match self {
            SerializationFormat::Json => Ok(serde_json::to_vec(data).map_err(json_error)?),
            SerializationFormat::JsonLines => {
                let lines: Vec<serde_json::Value> = match data {
                    AlgorithmData::Table(table) => table.records().into_iter().map(serde_json::Value::Object).collect(),
                    AlgorithmData::Document(serde_json::Value::Array(items)) => items.clone(),
                    AlgorithmData::Document(value) => vec![value.clone()],
                    AlgorithmData::Bundle(_) => {
                        return Err(NexusError::fatal("a bundle cannot be written as JSON lines"));
                    }
                };

                let mut buffer = Vec::new();
                for line in lines {
                    serde_json::to_writer(&mut buffer, &line).map_err(json_error)?;
                    buffer.push(b'\n');
                }
                Ok(buffer)
            }
        }
    }
}

fn json_error(error: serde_json::Error) -> NexusError {
    NexusError::Collaborator(error.into())
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for SerializationFormat {
    type Err = NexusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SerializationFormat::Json),
            "jsonl" | "ndjson" | "jsonlines" => Ok(SerializationFormat::JsonLines),
            other => Err(NexusError::UnknownRegistration {
                registry: "serialization format".to_string(),
                key: other.to_string(),
            }),
        }
    }
}

/// Format per data kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serializer {
    formats: HashMap<DataKind, SerializationFormat>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self {
            formats: HashMap::from([
                (DataKind::Table, SerializationFormat::JsonLines),
                (DataKind::Document, SerializationFormat::Json),
                (DataKind::Bundle, SerializationFormat::Json),
            ]),
        }
    }
}

impl Serializer {
    /// Replace the format used for `kind`
    pub fn with_format(mut self, kind: DataKind, format: SerializationFormat) -> Self {
        self.formats.insert(kind, format);
        self
    }

    pub fn format_for(&self, data: &AlgorithmData) -> SerializationFormat {
        self.formats
            .get(&data.kind())
            .copied()
            .unwrap_or(SerializationFormat::Json)
    }

    pub fn serialize(&self, data: &AlgorithmData) -> NexusResult<Vec<u8>> {
        self.format_for(data).serialize(data)
    }

    /// Read `{prefix}_{KIND}` overrides through `lookup`
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> NexusResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut serializer = Self::default();
        for kind in [DataKind::Table, DataKind::Document, DataKind::Bundle] {
            if let Some(value) = lookup(&format!("{prefix}_{kind}")) {
                serializer = serializer.with_format(kind, value.parse()?);
            }
        }
        Ok(serializer)
    }
}
