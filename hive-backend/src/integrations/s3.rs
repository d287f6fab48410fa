//! S3 presigned URLs

use std::time::Duration;

use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;

use super::IntegrationError;
use crate::config::S3Config;

pub const UPLOAD_URL_TTL_SECS: u64 = 300;
pub const DOWNLOAD_URL_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignMethod {
    Get,
    Put,
}

impl PresignMethod {
    fn http_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Put => Method::PUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Presigner {
    store: AmazonS3,
    host: String,
}

/// Virtual-hosted-style endpoint host for a bucket
pub fn bucket_host(bucket: &str, region: &str) -> String {
    if region == "us-east-1" {
        format!("{}.s3.amazonaws.com", bucket)
    } else {
        format!("{}.s3.{}.amazonaws.com", bucket, region)
    }
}

impl S3Presigner {
    pub fn new(config: &S3Config) -> Result<Self, IntegrationError> {
        let host = bucket_host(&config.bucket, &config.region);
        let store = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_endpoint(format!("https://{}", host))
            .with_virtual_hosted_style_request(true)
            .build()
            .map_err(|e| IntegrationError::NotConfigured(format!("S3 ({})", e)))?;
        Ok(Self { store, host })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Presign `method` on `key`, valid for `expires_secs` from now
    pub async fn presign(&self, method: PresignMethod, key: &str, expires_secs: u64) -> Result<String, IntegrationError> {
        let path = Path::parse(key).map_err(|e| IntegrationError::InvalidInput(format!("Invalid object key: {}", e)))?;
        let url = self
            .store
            .signed_url(method.http_method(), &path, Duration::from_secs(expires_secs))
            .await
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;
        Ok(url.to_string())
    }
}
