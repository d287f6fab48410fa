use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Encryption key material for stored secrets
#[derive(Clone)]
pub struct EncryptionKeys {
    pub active_key_id: String,
    pub active_key_hex: String,
    pub previous: Vec<(String, String)>,
}

/// Optional S3 settings; uploads are disabled when absent
#[derive(Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub public_url: String,
    pub session_ttl_hours: i64,
    pub mock_auth_enabled: bool,
    pub encryption: EncryptionKeys,
    pub api_token: Option<String>,
    pub github_api_url: String,
    pub stakwork_base_url: String,
    pub stakwork_api_key: Option<String>,
    pub stakwork_workflow_id: Option<String>,
    pub agent_endpoint: Option<String>,
    pub agent_api_key: Option<String>,
    pub agent_model: Option<String>,
    pub s3: Option<S3Config>,
    pub jarvis_port: u16,
    pub stakgraph_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let active_key_hex = non_empty("TOKEN_ENCRYPTION_KEY")
            .ok_or(ConfigError::Missing("TOKEN_ENCRYPTION_KEY"))?;
        let previous = match non_empty("TOKEN_ENCRYPTION_PREVIOUS_KEYS") {
            Some(raw) => parse_previous_keys(&raw)?,
            None => Vec::new(),
        };

        let s3 = match (
            non_empty("S3_BUCKET"),
            non_empty("AWS_ACCESS_KEY_ID"),
            non_empty("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(bucket), Some(access_key_id), Some(secret_access_key)) => Some(S3Config {
                bucket,
                region: non_empty("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id,
                secret_access_key,
            }),
            _ => None,
        };

        Ok(Self {
            port: parse_number("PORT", 8080)?,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "./.db/hive.db".to_string()),
            public_url: non_empty("PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            session_ttl_hours: parse_number("SESSION_TTL_HOURS", 720)?,
            mock_auth_enabled: parse_bool("MOCK_AUTH_ENABLED"),
            encryption: EncryptionKeys {
                active_key_id: non_empty("TOKEN_ENCRYPTION_KEY_ID").unwrap_or_else(|| "k1".to_string()),
                active_key_hex,
                previous,
            },
            api_token: non_empty("API_TOKEN"),
            github_api_url: non_empty("GITHUB_API_URL")
                .unwrap_or_else(|| "https://api.github.com".to_string()),
            stakwork_base_url: non_empty("STAKWORK_BASE_URL")
                .unwrap_or_else(|| "https://api.stakwork.com/api/v1".to_string()),
            stakwork_api_key: non_empty("STAKWORK_API_KEY"),
            stakwork_workflow_id: non_empty("STAKWORK_WORKFLOW_ID"),
            agent_endpoint: non_empty("AGENT_ENDPOINT"),
            agent_api_key: non_empty("AGENT_API_KEY"),
            agent_model: non_empty("AGENT_MODEL"),
            s3,
            jarvis_port: parse_number("JARVIS_PORT", 8444)?,
            stakgraph_port: parse_number("STAKGRAPH_PORT", 7799)?,
        })
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(name: &str) -> bool {
    env::var(name)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("'{}' is not a valid number", raw),
        }),
        None => Ok(default),
    }
}

/// Parse `id:hex,id:hex` into key pairs
pub fn parse_previous_keys(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, key) = entry.split_once(':').ok_or_else(|| ConfigError::Invalid {
                name: "TOKEN_ENCRYPTION_PREVIOUS_KEYS",
                reason: format!("entry '{}' is missing ':'", id_preview(entry)),
            })?;
            let id = id.trim();
            if id.is_empty() {
                return Err(ConfigError::Invalid {
                    name: "TOKEN_ENCRYPTION_PREVIOUS_KEYS",
                    reason: "key id cannot be empty".to_string(),
                });
            }
            Ok((id.to_string(), key.trim().to_string()))
        })
        .collect()
}

// Only show what could be an id, never key material
fn id_preview(entry: &str) -> String {
    entry.chars().take(8).collect::<String>() + "..."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_previous_keys() {
        let keys = parse_previous_keys("old:aa11, older : bb22,").unwrap();
        assert_eq!(
            keys,
            vec![
                ("old".to_string(), "aa11".to_string()),
                ("older".to_string(), "bb22".to_string())
            ]
        );
        assert!(parse_previous_keys("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_previous_keys_rejects_malformed() {
        assert!(parse_previous_keys("no-separator").is_err());
        assert!(parse_previous_keys(":abcd").is_err());
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("true"));
        assert!(!is_truthy("yes"));
        assert!(!is_truthy("0"));
    }
}
