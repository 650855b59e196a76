//! Data sockets: named pointers to input and output data
//!
//! A socket travels between processes as `alias|data_path|data_format`;
//! several sockets are joined with commas.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{SharedError, SharedResult};

/// Delimiter between socket fields
pub const SOCKET_FIELD_DELIMITER: char = '|';

/// Delimiter between sockets in a serialized list
pub const SOCKET_LIST_DELIMITER: char = ',';

/// Input/output data map entry
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobSocket {
    /// Mapping key used by a consumer
    pub alias: String,
    /// Fully qualified path to the data, i.e. file:///..., https://...
    pub data_path: String,
    /// Data format, i.e. json, jsonl, csv
    pub data_format: String,
}

impl JobSocket {
    pub fn new(alias: impl Into<String>, data_path: impl Into<String>, data_format: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            data_path: data_path.into(),
            data_format: data_format.into(),
        }
    }

    pub fn serialize(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.alias,
            self.data_path,
            self.data_format,
            d = SOCKET_FIELD_DELIMITER
        )
    }

    pub fn deserialize(input: &str) -> SharedResult<Self> {
        let fields: Vec<&str> = input.split(SOCKET_FIELD_DELIMITER).collect();
        match fields.as_slice() {
            [alias, data_path, data_format] => Ok(Self::new(*alias, *data_path, *data_format)),
            _ => Err(SharedError::InvalidSocket {
                input: input.to_string(),
            }),
        }
    }

    /// Parse a comma separated list of serialized sockets
    pub fn deserialize_list(input: &str) -> SharedResult<Vec<Self>> {
        input
            .split(SOCKET_LIST_DELIMITER)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::deserialize)
            .collect()
    }

    /// Find the single socket with `alias`; missing and duplicated aliases are errors
    pub fn from_list<'a>(sockets: &'a [JobSocket], alias: &str) -> SharedResult<&'a JobSocket> {
        let matching: Vec<&JobSocket> = sockets.iter().filter(|s| s.alias == alias).collect();
        match matching.as_slice() {
            [socket] => Ok(socket),
            [] => Err(SharedError::SocketNotFound {
                alias: alias.to_string(),
            }),
            many => Err(SharedError::AmbiguousSocket {
                alias: alias.to_string(),
                count: many.len(),
            }),
        }
    }

    pub fn parse_data_path(&self) -> SharedResult<DataPath> {
        DataPath::parse(&self.data_path)
    }
}

impl fmt::Display for JobSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Parsed storage location
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataPath {
    /// Scheme of the location, `file` for bare paths
    pub protocol: String,
    /// Location without the scheme prefix
    pub path: String,
}

impl DataPath {
    pub fn parse(input: &str) -> SharedResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SharedError::InvalidDataPath {
                input: input.to_string(),
            });
        }

        match trimmed.split_once("://") {
            Some((protocol, path)) if !protocol.is_empty() && !path.is_empty() => Ok(Self {
                protocol: protocol.to_lowercase(),
                path: path.to_string(),
            }),
            Some(_) => Err(SharedError::InvalidDataPath {
                input: input.to_string(),
            }),
            None => Ok(Self {
                protocol: "file".to_string(),
                path: trimmed.to_string(),
            }),
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            protocol: "file".to_string(),
            path: path.into(),
        }
    }

    /// Append path segments, keeping a single separator between them
    pub fn join(&self, segment: &str) -> Self {
        let base = self.path.trim_end_matches('/');
        let segment = segment.trim_start_matches('/');
        Self {
            protocol: self.protocol.clone(),
            path: format!("{base}/{segment}"),
        }
    }

    pub fn to_uri(&self) -> String {
        format!("{}://{}", self.protocol, self.path)
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}
