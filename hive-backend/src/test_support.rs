//! Shared fixtures for controller tests

use actix_web::web;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::ai::{AgentMessage, AgentProvider};
use crate::config::{Config, EncryptionKeys, S3Config};
use crate::crypto::EncryptionService;
use crate::db::Database;
use crate::integrations::github::GitHubClient;
use crate::integrations::s3::S3Presigner;
use crate::integrations::stakwork::{WorkflowDispatch, WorkflowProvider, WorkflowRequest};
use crate::integrations::swarm::SwarmClient;
use crate::integrations::IntegrationError;
use crate::models::{User, Workspace};
use crate::AppState;

pub const TEST_KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";
pub const TEST_API_TOKEN: &str = "test-api-token";

pub fn test_config() -> Config {
    Config {
        port: 0,
        database_url: ":memory:".to_string(),
        public_url: "http://hive.test".to_string(),
        session_ttl_hours: 24,
        mock_auth_enabled: true,
        encryption: EncryptionKeys {
            active_key_id: "k1".to_string(),
            active_key_hex: TEST_KEY.to_string(),
            previous: Vec::new(),
        },
        api_token: Some(TEST_API_TOKEN.to_string()),
        // Unroutable, so nothing leaves the machine
        github_api_url: "http://127.0.0.1:9".to_string(),
        stakwork_base_url: "http://127.0.0.1:9".to_string(),
        stakwork_api_key: None,
        stakwork_workflow_id: None,
        agent_endpoint: None,
        agent_api_key: None,
        agent_model: None,
        s3: Some(S3Config {
            bucket: "hive-uploads".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "AKIDTEST".to_string(),
            secret_access_key: "secret".to_string(),
        }),
        jarvis_port: 8444,
        stakgraph_port: 7799,
    }
}

/// Workflow provider that records requests and returns a fixed project id
#[derive(Default)]
pub struct FakeWorkflow {
    pub fail: bool,
    pub requests: Mutex<Vec<WorkflowRequest>>,
}

#[async_trait]
impl WorkflowProvider for FakeWorkflow {
    async fn dispatch(&self, request: WorkflowRequest) -> Result<WorkflowDispatch, IntegrationError> {
        self.requests.lock().push(request);
        if self.fail {
            Err(IntegrationError::Upstream {
                status: 500,
                body: "workflow unavailable".to_string(),
            })
        } else {
            Ok(WorkflowDispatch { project_id: 4242 })
        }
    }
}

/// Agent that echoes a fixed reply, or fails when `reply` is `None`
pub struct FakeAgent {
    pub reply: Option<String>,
    pub seen: Mutex<Vec<Vec<AgentMessage>>>,
}

impl FakeAgent {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentProvider for FakeAgent {
    async fn complete(&self, messages: Vec<AgentMessage>) -> Result<String, IntegrationError> {
        self.seen.lock().push(messages);
        self.reply.clone().ok_or(IntegrationError::Upstream {
            status: 500,
            body: "model error".to_string(),
        })
    }
}

pub struct TestStateBuilder {
    config: Config,
    workflow: Option<Arc<dyn WorkflowProvider>>,
    agent: Option<Arc<dyn AgentProvider>>,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            workflow: None,
            agent: None,
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn workflow(mut self, workflow: Arc<dyn WorkflowProvider>) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn agent(mut self, agent: Arc<dyn AgentProvider>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn build(self) -> web::Data<AppState> {
        let crypto = EncryptionService::from_config(&self.config.encryption).unwrap();
        web::Data::new(AppState {
            db: Arc::new(Database::new(":memory:").unwrap()),
            crypto: Arc::new(crypto),
            github: GitHubClient::new(&self.config.github_api_url).unwrap(),
            swarm: SwarmClient::new().unwrap(),
            workflow: self.workflow,
            agent: self.agent,
            s3: self.config.s3.as_ref().map(|c| S3Presigner::new(c).unwrap()),
            config: self.config,
        })
    }
}

pub fn test_state() -> web::Data<AppState> {
    TestStateBuilder::new().build()
}

/// Create a mock user with a session; returns the user and a bearer header value
pub fn login(state: &AppState, username: &str) -> (User, String) {
    let user = state.db.upsert_mock_user(username).unwrap();
    let session = state.db.create_session(&user.id, 1).unwrap();
    (user, format!("Bearer {}", session.token))
}

pub fn create_workspace(state: &AppState, owner: &User, slug: &str) -> Workspace {
    state.db.create_workspace(slug, slug, None, &owner.id).unwrap()
}

/// Build the full application for `actix_web::test`
#[macro_export]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($state.clone())
                .configure($crate::controllers::configure),
        )
        .await
    };
}

/// A request captured by [`StubUpstream`]
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path_and_query: String,
    pub api_token: Option<String>,
    pub authorization: Option<String>,
}

/// Local HTTP server on an ephemeral port that answers every request with one canned response
pub struct StubUpstream {
    pub base_url: String,
    pub port: u16,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl StubUpstream {
    pub fn hits(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Start a [`StubUpstream`]. Must be called from inside an actix runtime.
pub fn stub_upstream(status: u16, body: serde_json::Value) -> StubUpstream {
    use actix_web::{http::StatusCode, App, HttpRequest, HttpResponse, HttpServer};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen: Arc<Mutex<Vec<SeenRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    let server = HttpServer::new(move || {
        let recorder = Arc::clone(&recorder);
        let body = body.clone();
        App::new().default_service(web::to(move |req: HttpRequest| {
            let recorder = Arc::clone(&recorder);
            let body = body.clone();
            async move {
                let header = |name: &str| {
                    req.headers()
                        .get(name)
                        .and_then(|h| h.to_str().ok())
                        .map(str::to_string)
                };
                recorder.lock().push(SeenRequest {
                    path_and_query: req.uri().to_string(),
                    api_token: header("x-api-token"),
                    authorization: header("authorization"),
                });
                HttpResponse::build(StatusCode::from_u16(status).unwrap()).json(body)
            }
        }))
    })
    .workers(1)
    .disable_signals()
    .listen(listener)
    .unwrap()
    .run();
    actix_web::rt::spawn(server);

    StubUpstream {
        base_url: format!("http://127.0.0.1:{}", port),
        port,
        seen,
    }
}
