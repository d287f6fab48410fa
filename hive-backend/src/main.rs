use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod config;
mod controllers;
mod crypto;
mod db;
mod integrations;
mod middleware;
mod models;
mod services;
#[cfg(test)]
mod test_support;

use ai::{AgentProvider, OpenAICompatibleClient};
use config::Config;
use crypto::EncryptionService;
use db::Database;
use integrations::github::GitHubClient;
use integrations::s3::S3Presigner;
use integrations::stakwork::{StakworkClient, WorkflowProvider};
use integrations::swarm::SwarmClient;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub crypto: Arc<EncryptionService>,
    pub github: GitHubClient,
    pub swarm: SwarmClient,
    pub workflow: Option<Arc<dyn WorkflowProvider>>,
    pub agent: Option<Arc<dyn AgentProvider>>,
    pub s3: Option<S3Presigner>,
}

fn build_workflow_provider(config: &Config) -> Option<Arc<dyn WorkflowProvider>> {
    let (Some(api_key), Some(workflow_id)) = (&config.stakwork_api_key, &config.stakwork_workflow_id) else {
        log::warn!("[WORKFLOW] STAKWORK_API_KEY or STAKWORK_WORKFLOW_ID not set - workflow dispatch disabled");
        return None;
    };
    match StakworkClient::new(&config.stakwork_base_url, api_key, workflow_id) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            log::error!("[WORKFLOW] Failed to create Stakwork client: {}", e);
            None
        }
    }
}

fn build_agent_provider(config: &Config) -> Option<Arc<dyn AgentProvider>> {
    let Some(endpoint) = &config.agent_endpoint else {
        log::warn!("[AGENT] AGENT_ENDPOINT not set - /api/agent disabled");
        return None;
    };
    match OpenAICompatibleClient::new(endpoint, config.agent_api_key.as_deref(), config.agent_model.as_deref()) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            log::error!("[AGENT] Failed to create agent client: {}", e);
            None
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let port = config.port;

    let crypto = EncryptionService::from_config(&config.encryption).map_err(|e| {
        log::error!("[CRYPTO] Failed to load encryption keys: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let crypto = Arc::new(crypto);

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).map_err(|e| {
        log::error!("Failed to initialize database: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;
    let db = Arc::new(db);

    match db.rotate_encrypted_secrets(&crypto) {
        Ok(0) => {}
        Ok(n) => log::info!("[CRYPTO] Re-encrypted {} stored secrets with key '{}'", n, crypto.active_key_id()),
        Err(e) => log::error!("[CRYPTO] Secret rotation failed: {}", e),
    }
    match db.purge_expired_sessions() {
        Ok(n) if n > 0 => log::info!("Purged {} expired sessions", n),
        Ok(_) => {}
        Err(e) => log::warn!("Failed to purge expired sessions: {}", e),
    }

    let github = GitHubClient::new(&config.github_api_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let swarm = SwarmClient::new().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let workflow = build_workflow_provider(&config);
    let agent = build_agent_provider(&config);
    let s3 = config
        .s3
        .as_ref()
        .map(S3Presigner::new)
        .transpose()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    if s3.is_none() {
        log::warn!("[UPLOAD] S3 not configured - upload URLs disabled");
    }
    if config.mock_auth_enabled {
        log::warn!("Mock authentication is ENABLED - do not use in production");
    }

    log::info!("Starting Hive backend on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                crypto: Arc::clone(&crypto),
                github: github.clone(),
                swarm: swarm.clone(),
                workflow: workflow.clone(),
                agent: agent.clone(),
                s3: s3.clone(),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
