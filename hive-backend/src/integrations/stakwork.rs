//! Stakwork workflow dispatch

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{read_json, IntegrationError};

#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub name: String,
    pub webhook_url: String,
    /// Variables handed to the workflow
    pub vars: Value,
    /// Workspace-level key that overrides the service key
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDispatch {
    pub project_id: i64,
}

#[async_trait]
pub trait WorkflowProvider: Send + Sync {
    async fn dispatch(&self, request: WorkflowRequest) -> Result<WorkflowDispatch, IntegrationError>;
}

#[derive(Debug, Deserialize)]
struct StakworkResponse {
    #[serde(default)]
    success: bool,
    data: Option<StakworkProjectData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StakworkProjectData {
    project_id: i64,
}

pub struct StakworkClient {
    client: Client,
    base_url: String,
    api_key: String,
    workflow_id: String,
}

impl StakworkClient {
    pub fn new(base_url: &str, api_key: &str, workflow_id: &str) -> Result<Self, IntegrationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IntegrationError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            workflow_id: workflow_id.to_string(),
        })
    }

    fn build_payload(&self, request: &WorkflowRequest) -> Value {
        json!({
            "name": request.name,
            "workflow_id": self.workflow_id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(self.workflow_id.clone())),
            "webhook_url": request.webhook_url,
            "workflow_params": {
                "set_var": {
                    "attributes": {
                        "vars": request.vars
                    }
                }
            }
        })
    }
}

#[async_trait]
impl WorkflowProvider for StakworkClient {
    async fn dispatch(&self, request: WorkflowRequest) -> Result<WorkflowDispatch, IntegrationError> {
        let url = format!("{}/projects", self.base_url);
        log::info!("[WORKFLOW] Dispatching '{}' to Stakwork", request.name);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Token token={}", request.api_key.as_deref().unwrap_or(&self.api_key)))
            .json(&self.build_payload(&request))
            .send()
            .await?;

        let body: StakworkResponse = read_json(response).await?;
        match body.data {
            Some(data) if body.success || body.error.is_none() => Ok(WorkflowDispatch {
                project_id: data.project_id,
            }),
            _ => Err(IntegrationError::Upstream {
                status: 502,
                body: body.error.unwrap_or_else(|| "Stakwork response has no project id".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let client = StakworkClient::new("https://api.stakwork.com/api/v1/", "key", "123").unwrap();
        let payload = client.build_payload(&WorkflowRequest {
            name: "hive_task_t1".to_string(),
            webhook_url: "http://localhost:8080/api/stakwork/webhook?task_id=t1".to_string(),
            vars: json!({"taskId": "t1", "message": "hello"}),
            api_key: None,
        });

        assert_eq!(payload["workflow_id"], 123);
        assert_eq!(payload["workflow_params"]["set_var"]["attributes"]["vars"]["message"], "hello");
        assert_eq!(client.base_url, "https://api.stakwork.com/api/v1");
    }

    #[test]
    fn test_response_parsing() {
        let body: StakworkResponse =
            serde_json::from_str(r#"{"success": true, "data": {"project_id": 991}}"#).unwrap();
        assert_eq!(body.data.unwrap().project_id, 991);

        let body: StakworkResponse = serde_json::from_str(r#"{"success": false, "error": "bad"}"#).unwrap();
        assert!(body.data.is_none());
        assert_eq!(body.error.as_deref(), Some("bad"));
    }
}
