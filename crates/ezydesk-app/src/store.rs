//! Object-store upload client.
//!
//! A thin PUT client for an OSS-style bucket endpoint. The window content
//! supplies short-lived STS credentials over the channel; each upload
//! carries the security token and targets
//! `http://{bucket}.{region}.aliyuncs.com{path}`. Anything richer
//! (multipart, signing schemes, lifecycle) is out of scope for the shell.

use async_trait::async_trait;

use ezydesk_channel::{ObjectStore, OssCredentials, StoreError};

/// HTTP PUT object-store client.
pub struct OssHttpStore {
    client: reqwest::Client,
    /// Endpoint override for tests and self-hosted gateways; the default
    /// derives the endpoint from the credentials.
    endpoint_base: Option<String>,
}

impl OssHttpStore {
    /// Creates the upload client.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Ezydesk/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint_base: None,
        })
    }

    /// Uses a fixed endpoint base instead of deriving one per credentials.
    pub fn with_endpoint_base(mut self, base: impl Into<String>) -> Self {
        self.endpoint_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    /// Upload URL for an object path.
    pub fn object_url(&self, credentials: &OssCredentials, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        match &self.endpoint_base {
            Some(base) => format!("{}{}", base, path),
            None => format!(
                "http://{}.{}.aliyuncs.com{}",
                credentials.bucket, credentials.region, path
            ),
        }
    }
}

#[async_trait]
impl ObjectStore for OssHttpStore {
    async fn put(
        &self,
        credentials: &OssCredentials,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let url = self.object_url(credentials, path);
        tracing::debug!(%url, size = bytes.len(), "uploading object");

        self.client
            .put(&url)
            .header("x-oss-security-token", &credentials.security_token)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| StoreError::Upload(err.to_string()))?;

        Ok(())
    }
}
