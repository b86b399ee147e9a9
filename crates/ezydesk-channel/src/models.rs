//! Wire messages carried over the request channel.
//!
//! Both directions use the same JSON envelope, `{"name": ..., "payload":
//! ...}`; replies are keyed by the originating message name with a
//! `-reply` suffix, so window content listens per message it sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use ezydesk_core::DownloadProgress;

/// A decoded inbound frame.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Message name, e.g. `"printPdf"` or `"update"`.
    pub name: String,
    /// Message payload; absent payloads decode as `null`.
    #[serde(default)]
    pub payload: Value,
}

/// An outbound frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundMessage {
    pub name: String,
    pub payload: Value,
}

impl OutboundMessage {
    /// Builds a reply event for the given originating message name.
    pub fn reply(origin: &str, payload: impl Into<Value>) -> Self {
        Self {
            name: format!("{}-reply", origin),
            payload: payload.into(),
        }
    }

    /// Builds a host-initiated event.
    pub fn event(name: &str, payload: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            payload: payload.into(),
        }
    }
}

/// Payload of `synchronous-message` configuration frames.
#[derive(Debug, Deserialize)]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Object-store credentials pushed by the window content at login.
///
/// Held process-wide and replaced wholesale on each configuration message;
/// no expiry tracking is performed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssCredentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: String,
    pub region: String,
    pub bucket: String,
}

/// Page-export parameters forwarded to the document exporter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Page URL; for answer sheets only the fragment is kept and rebased
    /// onto the configured content base URL.
    pub url: String,
    pub api_token: Option<String>,
    pub api_host: Option<String>,
    pub permission: Option<String>,
    pub user_info: Option<String>,
    /// 1 = A4 portrait, 2 = A3 landscape.
    #[serde(default = "default_print_size")]
    pub print_size: u8,
    /// Target directory for saved documents, when the content supplies one.
    pub save_dir: Option<PathBuf>,
}

fn default_print_size() -> u8 {
    1
}

/// Payload of `printPdf`: export an answer sheet and upload it.
#[derive(Debug, Deserialize)]
pub struct PrintPdfRequest {
    pub id: Value,
    pub options: ExportOptions,
}

impl PrintPdfRequest {
    /// Bucket path the exported document is uploaded to.
    pub fn object_path(&self) -> String {
        let id = match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("/pdf/{}/pdf.pdf", id)
    }
}

/// Payload of `printCommonPdf`: export a document and save it locally.
#[derive(Debug, Deserialize)]
pub struct PrintCommonPdfRequest {
    pub title: String,
    pub options: ExportOptions,
}

/// Progress payload for `update-percent` replies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePercent {
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_bytes_per_sec: Option<u64>,
}

impl From<DownloadProgress> for UpdatePercent {
    fn from(progress: DownloadProgress) -> Self {
        Self {
            percent: progress.percent,
            transferred_bytes: Some(progress.transferred_bytes),
            total_bytes: progress.total_bytes,
            speed_bytes_per_sec: Some(progress.speed_bytes_per_sec),
        }
    }
}
