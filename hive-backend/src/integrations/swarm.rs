//! Swarm service clients: Jarvis (knowledge graph) and stakgraph (ingestion)

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::http_retry::{send_with_retry, RetryPolicy};
use super::{read_json, IntegrationError};

pub const DEFAULT_JARVIS_ENDPOINT: &str = "graph/search/latest?limit=1000&top_node_count=500";

/// `scheme://host:port` of a service running on the swarm host
pub fn derive_service_url(swarm_url: &str, port: u16) -> Result<String, IntegrationError> {
    let parsed = Url::parse(swarm_url.trim())
        .map_err(|_| IntegrationError::InvalidInput(format!("Invalid swarm URL: {}", swarm_url)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(IntegrationError::InvalidInput(format!(
            "Swarm URL must use http or https: {}",
            swarm_url
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| IntegrationError::InvalidInput(format!("Swarm URL has no host: {}", swarm_url)))?;

    Ok(format!("{}://{}:{}", parsed.scheme(), host, port))
}

/// Accept only relative endpoints so a caller cannot redirect the proxied request
pub fn validate_jarvis_endpoint(endpoint: &str) -> Result<String, IntegrationError> {
    let endpoint = endpoint.trim();
    let invalid = |reason: &str| IntegrationError::InvalidInput(format!("Invalid endpoint: {}", reason));

    if endpoint.is_empty() {
        return Err(invalid("empty"));
    }
    if endpoint.starts_with("//") || endpoint.contains("://") {
        return Err(invalid("must be relative"));
    }
    let path = endpoint.split('?').next().unwrap_or("");
    if path.split('/').any(|segment| segment == "..") || endpoint.contains('\\') {
        return Err(invalid("path traversal"));
    }

    Ok(endpoint.trim_start_matches('/').to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestAsyncRequest {
    pub repo_url: String,
    pub username: String,
    pub pat: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestAsyncResponse {
    pub request_id: String,
}

#[derive(Clone)]
pub struct SwarmClient {
    client: Client,
    retry: RetryPolicy,
}

impl SwarmClient {
    pub fn new() -> Result<Self, IntegrationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| IntegrationError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// GET `{jarvis_url}/{endpoint}` and return the JSON body
    pub async fn jarvis_get(
        &self,
        jarvis_url: &str,
        endpoint: &str,
        api_key: &str,
    ) -> Result<(u16, Value), IntegrationError> {
        let url = format!("{}/{}", jarvis_url.trim_end_matches('/'), endpoint);
        log::info!("[SWARM] Jarvis GET {}", url);

        let response = send_with_retry("jarvis", self.retry, || {
            self.client.get(&url).header("x-api-token", api_key)
        })
        .await?;
        let status = response.status().as_u16();
        let body: Value = read_json(response).await?;
        Ok((status, body))
    }

    /// Start an asynchronous ingest on stakgraph. Not retried: a retry could start
    /// a second job.
    pub async fn ingest_async(
        &self,
        stakgraph_url: &str,
        api_key: &str,
        request: &IngestAsyncRequest,
    ) -> Result<IngestAsyncResponse, IntegrationError> {
        let url = format!("{}/ingest_async", stakgraph_url.trim_end_matches('/'));
        log::info!("[SWARM] Starting ingest for {} via {}", request.repo_url, url);

        let response = self
            .client
            .post(&url)
            .header("x-api-token", api_key)
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }
}
