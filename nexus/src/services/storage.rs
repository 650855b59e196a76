//! Blob storage clients
//!
//! `local` writes under the local file system with tokio::fs, `http` PUTs
//! blobs to an HTTP object store and hands out URIs with an optional
//! shared-access token appended.

use async_trait::async_trait;
use shared::{process_debug, DataPath, ProcessId};
use std::path::PathBuf;
use tokio::fs;

use crate::core::data::AlgorithmData;
use crate::core::serialization::SerializationFormat;
use crate::error::{CollaboratorError, NexusError, NexusResult};
use crate::traits::StorageClient;

/// Storage on the local file system
#[derive(Debug, Clone, Default)]
pub struct LocalStorageClient {
    /// Prefix for relative paths
    root: Option<PathBuf>,
}

impl LocalStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn local_path(&self, path: &DataPath) -> NexusResult<PathBuf> {
        if path.protocol != "file" {
            return Err(NexusError::fatal(format!(
                "local storage cannot write to {}",
                path.to_uri()
            )));
        }

        let local = PathBuf::from(&path.path);
        Ok(match &self.root {
            Some(root) if local.is_relative() => root.join(local),
            _ => local,
        })
    }
}

#[async_trait]
impl StorageClient for LocalStorageClient {
    async fn save_blob(
        &self,
        data: &AlgorithmData,
        path: &DataPath,
        format: SerializationFormat,
        overwrite: bool,
    ) -> NexusResult<()> {
        let target = self.local_path(path)?;
        let bytes = format.serialize(data)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(CollaboratorError::from)?;
        }

        if !overwrite && fs::try_exists(&target).await.map_err(CollaboratorError::from)? {
            return Err(NexusError::fatal(format!("blob {} already exists", target.display())));
        }

        fs::write(&target, &bytes).await.map_err(CollaboratorError::from)?;

        process_debug!(
            ProcessId::current(),
            "Saved {} bytes as {} to {}",
            bytes.len(),
            format,
            target.display()
        );
        Ok(())
    }

    async fn get_blob_uri(&self, path: &DataPath) -> NexusResult<String> {
        let target = self.local_path(path)?;
        Ok(format!("file://{}", target.display()))
    }
}

/// Storage behind an HTTP object store that accepts PUT uploads
#[derive(Debug, Clone)]
pub struct HttpStorageClient {
    client: reqwest::Client,
    /// Query string appended to blob URIs and uploads, without the leading `?`
    access_token: Option<String>,
}

impl HttpStorageClient {
    pub fn new(client: reqwest::Client, access_token: Option<String>) -> Self {
        Self {
            client,
            access_token: access_token.map(|t| t.trim_start_matches('?').to_string()),
        }
    }

    fn url(&self, path: &DataPath) -> NexusResult<String> {
        if path.protocol != "http" && path.protocol != "https" {
            return Err(NexusError::fatal(format!(
                "http storage cannot write to {}",
                path.to_uri()
            )));
        }

        Ok(match &self.access_token {
            Some(token) => format!("{}?{}", path.to_uri(), token),
            None => path.to_uri(),
        })
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn save_blob(
        &self,
        data: &AlgorithmData,
        path: &DataPath,
        format: SerializationFormat,
        overwrite: bool,
    ) -> NexusResult<()> {
        let url = self.url(path)?;
        let bytes = format.serialize(data)?;
        let size = bytes.len();

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, format.content_type())
            .header("x-ms-blob-type", "BlockBlob")
            .body(bytes);
        if !overwrite {
            request = request.header(reqwest::header::IF_NONE_MATCH, "*");
        }

        let response = request.send().await.map_err(CollaboratorError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(status, body).into());
        }

        process_debug!(ProcessId::current(), "Uploaded {} bytes to {}", size, path.to_uri());
        Ok(())
    }

    async fn get_blob_uri(&self, path: &DataPath) -> NexusResult<String> {
        self.url(path)
    }
}
