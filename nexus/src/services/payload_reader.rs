//! Payload retrieval over HTTP, or from disk for local runs

use async_trait::async_trait;
use shared::{process_debug, DataPath, ProcessId};

use crate::error::{CollaboratorError, NexusResult};
use crate::traits::PayloadReader;

#[derive(Debug, Clone, Default)]
pub struct HttpPayloadReader {
    client: reqwest::Client,
}

impl HttpPayloadReader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_bytes(&self, uri: &str) -> NexusResult<Vec<u8>> {
        let location = DataPath::parse(uri)?;
        if location.protocol == "file" {
            return Ok(tokio::fs::read(&location.path).await.map_err(CollaboratorError::from)?);
        }

        let response = self.client.get(uri).send().await.map_err(CollaboratorError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(status, body).into());
        }

        Ok(response.bytes().await.map_err(CollaboratorError::from)?.to_vec())
    }
}

#[async_trait]
impl PayloadReader for HttpPayloadReader {
    async fn fetch(&self, uri: &str) -> NexusResult<serde_json::Value> {
        let bytes = self.fetch_bytes(uri).await?;
        process_debug!(ProcessId::current(), "Fetched payload of {} bytes", bytes.len());
        Ok(serde_json::from_slice(&bytes).map_err(CollaboratorError::from)?)
    }
}
