//! GitHub REST client used for login verification and repository lookups

use std::time::Duration;

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use super::http_retry::{send_with_retry, RetryPolicy};
use super::{read_json, IntegrationError};

const USER_AGENT: &str = "hive-backend";
const ACCEPT: &str = "application/vnd.github+json";

/// Authenticated GitHub user as returned by `GET /user`
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepoPayload {
    id: i64,
    name: String,
    full_name: String,
    description: Option<String>,
    private: bool,
    html_url: String,
    default_branch: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    forks_count: i64,
    updated_at: Option<String>,
}

/// Repository shape returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositorySummary {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    pub url: String,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    pub stargazers_count: i64,
    pub forks_count: i64,
    pub updated_at: Option<String>,
}

impl From<GitHubRepoPayload> for RepositorySummary {
    fn from(repo: GitHubRepoPayload) -> Self {
        Self {
            id: repo.id,
            name: repo.name,
            full_name: repo.full_name,
            description: repo.description,
            private: repo.private,
            url: repo.html_url,
            default_branch: repo.default_branch,
            language: repo.language,
            stargazers_count: repo.stargazers_count,
            forks_count: repo.forks_count,
            updated_at: repo.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubBranchPayload {
    name: String,
    commit: GitHubCommitRef,
    #[serde(default)]
    protected: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitRef {
    sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSummary {
    pub name: String,
    pub sha: String,
    pub protected: bool,
}

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(base_url: &str) -> Result<Self, IntegrationError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IntegrationError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
    ) -> Result<T, IntegrationError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("[GITHUB] GET {}", path);
        let response = send_with_retry("github", self.retry, || {
            self.client
                .get(&url)
                .header(header::AUTHORIZATION, format!("token {}", token))
        })
        .await?;
        read_json(response).await
    }

    pub async fn get_user(&self, token: &str) -> Result<GitHubUser, IntegrationError> {
        self.get_json(token, "/user").await
    }

    pub async fn list_repositories(&self, token: &str) -> Result<Vec<RepositorySummary>, IntegrationError> {
        let repos: Vec<GitHubRepoPayload> = self
            .get_json(token, "/user/repos?sort=updated&per_page=100")
            .await?;
        Ok(repos.into_iter().map(RepositorySummary::from).collect())
    }

    pub async fn get_repository(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<RepositorySummary, IntegrationError> {
        let payload: GitHubRepoPayload = self
            .get_json(token, &format!("/repos/{}/{}", owner, repo))
            .await?;
        Ok(payload.into())
    }

    pub async fn list_branches(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<BranchSummary>, IntegrationError> {
        let branches: Vec<GitHubBranchPayload> = self
            .get_json(token, &format!("/repos/{}/{}/branches?per_page=100", owner, repo))
            .await?;
        Ok(branches
            .into_iter()
            .map(|b| BranchSummary {
                name: b.name,
                sha: b.commit.sha,
                protected: b.protected,
            })
            .collect())
    }
}

fn is_name_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Extract `(owner, repo)` from the GitHub URL forms users paste:
/// `https://github.com/o/r`, `http://github.com/o/r.git`, `git@github.com:o/r.git`
/// and `github.com/o/r`.
pub fn parse_repository_url(url: &str) -> Result<(String, String), IntegrationError> {
    let invalid = || IntegrationError::InvalidInput(format!("Invalid GitHub repository URL: {}", url));
    let trimmed = url.trim();

    let path = if let Some(rest) = trimmed.strip_prefix("git@github.com:") {
        rest
    } else {
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
        without_www.strip_prefix("github.com/").ok_or_else(invalid)?
    };

    let path = path.split(['?', '#']).next().unwrap_or("").trim_end_matches('/');
    let mut parts = path.split('/');
    let owner = parts.next().ok_or_else(invalid)?;
    let repo = parts.next().ok_or_else(invalid)?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    if parts.next().is_some() || !is_name_segment(owner) || !is_name_segment(repo) {
        return Err(invalid());
    }

    Ok((owner.to_string(), repo.to_string()))
}
