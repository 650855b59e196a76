//! Crystal job-control API client (API version 1.2)

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shared::messages::CreateRunResponse;
use shared::{process_debug, process_info, AlgorithmRequest, AlgorithmRunResult, ProcessId, RequestResult};
use std::collections::BTreeMap;

use crate::error::{CollaboratorError, NexusError, NexusResult};
use crate::traits::JobControlApi;

const API_VERSION: &str = "v1.2";

#[derive(Debug, Clone)]
pub struct CrystalClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl CrystalClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> NexusResult<Self> {
        url::Url::parse(base_url).map_err(|e| NexusError::ServiceStartup {
            service: "job-control client".to_string(),
            message: format!("invalid base url {base_url}: {e}"),
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    /// Authenticate every call with HTTP basic auth
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/algorithm/{}/{}", self.base_url, API_VERSION, path)
    }

    fn submission_url(&self, algorithm: &str, run_id: &str) -> String {
        self.endpoint(&format!("complete/{algorithm}/requests/{run_id}"))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> NexusResult<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(CollaboratorError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CollaboratorError::from_status(status, body).into())
    }

    async fn json<T: DeserializeOwned>(response: reqwest::Response) -> NexusResult<T> {
        let bytes = response.bytes().await.map_err(CollaboratorError::from)?;
        serde_json::from_slice(&bytes).map_err(|e| CollaboratorError::from(e).into())
    }
}

#[async_trait]
impl JobControlApi for CrystalClient {
    async fn submit_result(
        &self,
        run_id: &str,
        algorithm: &str,
        result: AlgorithmRunResult,
        debug: bool,
    ) -> NexusResult<()> {
        let url = self.submission_url(algorithm, run_id);

        if debug {
            let body = serde_json::to_string(&result).map_err(CollaboratorError::from)?;
            process_info!(
                ProcessId::current(),
                "Debug run, not submitting result to {}, payload {}",
                url,
                body
            );
            return Ok(());
        }

        self.send(self.client.post(&url).json(&result)).await?;
        process_debug!(ProcessId::current(), "Submitted result of {} to {}", run_id, url);
        Ok(())
    }

    async fn create_run(
        &self,
        algorithm: &str,
        payload: BTreeMap<String, serde_json::Value>,
        tag: Option<String>,
    ) -> NexusResult<String> {
        let request = AlgorithmRequest {
            algorithm_name: algorithm.to_string(),
            algorithm_parameters: payload,
            custom_configuration: None,
            tag,
        };

        let url = self.endpoint(&format!("run/{algorithm}"));
        let response = self.send(self.client.post(&url).json(&request)).await?;
        let created: CreateRunResponse = Self::json(response).await?;

        process_debug!(
            ProcessId::current(),
            "Run initiated for algorithm {}: {}",
            algorithm,
            created.request_id
        );
        Ok(created.request_id)
    }

    async fn retrieve_run(&self, run_id: &str, algorithm: &str) -> NexusResult<RequestResult> {
        let url = self.endpoint(&format!("results/{algorithm}/requests/{run_id}"));
        let response = self.send(self.client.get(&url)).await?;
        Self::json(response).await
    }
}
