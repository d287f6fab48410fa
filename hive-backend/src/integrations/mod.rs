//! Outbound HTTP integrations: GitHub, swarm services, Stakwork and S3

pub mod github;
pub mod http_retry;
pub mod s3;
pub mod stakwork;
pub mod swarm;

use actix_web::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    InvalidInput(String),
}

impl IntegrationError {
    /// Classify a non-success upstream response
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            _ => Self::Upstream { status, body },
        }
    }

    /// HTTP status to answer with when proxying this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Transport(_) | Self::Decode(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Turn a response into `T`, classifying non-success statuses
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, IntegrationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IntegrationError::from_status(status.as_u16(), body));
    }
    let text = response
        .text()
        .await
        .map_err(|e| IntegrationError::Transport(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| IntegrationError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(IntegrationError::from_status(401, String::new()), IntegrationError::Unauthorized));
        assert!(matches!(IntegrationError::from_status(404, String::new()), IntegrationError::NotFound));
        assert!(matches!(
            IntegrationError::from_status(500, "boom".to_string()),
            IntegrationError::Upstream { status: 500, .. }
        ));
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(IntegrationError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            IntegrationError::NotConfigured("S3".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            IntegrationError::Upstream { status: 503, body: String::new() }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            IntegrationError::Upstream { status: 302, body: String::new() }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(IntegrationError::Transport("x".to_string()).status_code(), StatusCode::BAD_GATEWAY);
    }
}
