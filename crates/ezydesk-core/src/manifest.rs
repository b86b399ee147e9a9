//! Remote version manifest.
//!
//! The file host publishes a small JSON document next to the installer
//! artifacts describing the latest build. The fetch contract is strict: an
//! HTTP 200 with an `application/json` content type, or the check fails.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the manifest under the manifest base URL.
pub const MANIFEST_FILE: &str = "version.json";

/// Default request timeout for manifest fetches.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Errors that can occur while fetching the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed with status {0}")]
    Status(reqwest::StatusCode),

    #[error("expected application/json but received {0:?}")]
    ContentType(Option<String>),

    #[error("malformed manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// The latest-build descriptor published by the file host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Dotted-numeric build version, e.g. `"1.4.2"`.
    pub version: String,
    /// Product name, also the stem of the installer artifact file name.
    pub product_name: String,
    /// Optional hex SHA-256 of the installer artifact for this platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Fetches and deserializes the remote version manifest.
#[derive(Debug, Clone)]
pub struct ManifestClient {
    base_url: String,
    client: reqwest::Client,
}

impl ManifestClient {
    /// Creates a client for the given manifest base URL.
    ///
    /// The underlying HTTP client carries an explicit request timeout; an
    /// unresponsive file host fails the check instead of stalling it.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ManifestError> {
        Self::with_timeout(base_url, std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ManifestError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Ezydesk/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Returns the manifest base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches `version.json` from the file host.
    ///
    /// The URL carries a millisecond timestamp query parameter so that
    /// intermediate caches never serve a stale manifest. Resolves only on
    /// HTTP 200 with an `application/json` content type; every other
    /// outcome is an error. Rejection paths that already hold a response
    /// drain its body so the connection can be reused.
    pub async fn fetch(&self) -> Result<VersionInfo, ManifestError> {
        let url = format!(
            "{}/{}?timestamp={}",
            self.base_url,
            MANIFEST_FILE,
            Utc::now().timestamp_millis()
        );

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let _ = response.bytes().await;
            return Err(ManifestError::Status(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_json = content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"));
        if !is_json {
            let _ = response.bytes().await;
            return Err(ManifestError::ContentType(content_type));
        }

        let body = response.bytes().await?;
        let info: VersionInfo = serde_json::from_slice(&body)?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn fetch_resolves_on_200_json() {
        let router = Router::new().route(
            "/version.json",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    r#"{"version":"2.0.0","productName":"X"}"#,
                )
            }),
        );
        let base = spawn_server(router).await;

        let client = ManifestClient::new(&base).unwrap();
        let info = client.fetch().await.unwrap();
        assert_eq!(info.version, "2.0.0");
        assert_eq!(info.product_name, "X");
        assert!(info.sha256.is_none());
    }

    #[tokio::test]
    async fn fetch_rejects_non_200() {
        let router = Router::new().route(
            "/version.json",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "missing").into_response() }),
        );
        let base = spawn_server(router).await;

        let client = ManifestClient::new(&base).unwrap();
        let err = client.fetch().await.unwrap_err();
        match err {
            ManifestError::Status(status) => assert_eq!(status, reqwest::StatusCode::NOT_FOUND),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_rejects_wrong_content_type() {
        let router = Router::new().route(
            "/version.json",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    r#"{"version":"2.0.0","productName":"X"}"#,
                )
            }),
        );
        let base = spawn_server(router).await;

        let client = ManifestClient::new(&base).unwrap();
        let err = client.fetch().await.unwrap_err();
        match err {
            ManifestError::ContentType(Some(ct)) => assert_eq!(ct, "text/html"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_rejects_malformed_json() {
        let router = Router::new().route(
            "/version.json",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    "not json at all",
                )
            }),
        );
        let base = spawn_server(router).await;

        let client = ManifestClient::new(&base).unwrap();
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, ManifestError::Json(_)));
    }

    #[tokio::test]
    async fn fetch_rejects_unreachable_host() {
        // Port 9 on localhost is the discard service; nothing listens there
        // in the test environment.
        let client = ManifestClient::with_timeout(
            "http://127.0.0.1:9",
            std::time::Duration::from_millis(500),
        )
        .unwrap();
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, ManifestError::Transport(_)));
    }

    #[test]
    fn manifest_parses_optional_checksum() {
        let info: VersionInfo = serde_json::from_str(
            r#"{"version":"1.4.2","productName":"EzyWebTool","sha256":"ab12"}"#,
        )
        .unwrap();
        assert_eq!(info.sha256.as_deref(), Some("ab12"));
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = ManifestClient::new("http://host/path/").unwrap();
        assert_eq!(client.base_url(), "http://host/path");
    }
}
