//! Query store that serves tables from JSON and JSON-lines files

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::{process_debug, DataPath, JobSocket, ProcessId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::data::DataTable;
use crate::error::{CollaboratorError, NexusError, NexusResult};
use crate::traits::QueryStore;

#[derive(Debug, Default)]
pub struct FileQueryStore {
    root: Option<PathBuf>,
    closed: AtomicBool,
}

impl FileQueryStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            closed: AtomicBool::new(false),
        }
    }

    /// Build from a connection string: a directory, optionally as a `file://` URI
    pub fn from_connection_string(connection: &str) -> NexusResult<Self> {
        let location = DataPath::parse(connection)?;
        if location.protocol != "file" {
            return Err(NexusError::ServiceStartup {
                service: "query store".to_string(),
                message: format!("unsupported connection string {connection}"),
            });
        }
        Ok(Self::new(Some(PathBuf::from(location.path))))
    }

    fn resolve(&self, socket: &JobSocket) -> NexusResult<PathBuf> {
        let location = socket.parse_data_path()?;
        if location.protocol != "file" {
            return Err(NexusError::fatal(format!(
                "query store cannot read {} for '{}'",
                location.to_uri(),
                socket.alias
            )));
        }

        let path = PathBuf::from(&location.path);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        })
    }

    fn parse(bytes: &[u8], format: &str) -> NexusResult<DataTable> {
        match format.to_ascii_lowercase().as_str() {
            "json" => Ok(serde_json::from_slice(bytes).map_err(CollaboratorError::from)?),
            "jsonl" | "ndjson" => {
                let mut records = Vec::new();
                for line in bytes.split(|b| *b == b'\n') {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let record: Map<String, Value> = serde_json::from_slice(line).map_err(CollaboratorError::from)?;
                    records.push(record);
                }
                Ok(DataTable::from_records(records))
            }
            other => Err(NexusError::UnknownRegistration {
                registry: "data format".to_string(),
                key: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl QueryStore for FileQueryStore {
    async fn read_table(&self, socket: &JobSocket) -> NexusResult<DataTable> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NexusError::fatal("query store is closed"));
        }

        let path = self.resolve(socket)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CollaboratorError::TableNotFound {
                    table: path.display().to_string(),
                }
                .into());
            }
            Err(e) => return Err(CollaboratorError::from(e).into()),
        };

        let table = Self::parse(&bytes, &socket.data_format)?;
        process_debug!(
            ProcessId::current(),
            "Read {} rows for '{}' from {}",
            table.len(),
            socket.alias,
            path.display()
        );
        Ok(table)
    }

    async fn close(&self) -> NexusResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
