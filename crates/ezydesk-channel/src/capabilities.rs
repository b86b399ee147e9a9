//! Collaborator capabilities invoked by channel handlers.
//!
//! The host shell treats windows, document export, and bucket upload as
//! external services behind narrow traits; implementations live in the
//! application crate and tests substitute their own.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::OssCredentials;

/// Errors from document export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("renderer failed: {0}")]
    Renderer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid export request: {0}")]
    InvalidRequest(String),
}

/// Errors from object-store upload.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Which export pipeline the renderer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Answer-sheet export; the page URL was rebased onto the content host.
    AnswerSheet,
    /// Generic document export.
    Common,
}

/// A fully-resolved export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub mode: ExportMode,
    pub url: String,
    pub api_token: Option<String>,
    pub api_host: Option<String>,
    pub permission: Option<String>,
    pub user_info: Option<String>,
    /// 1 = A4 portrait, 2 = A3 landscape.
    pub print_size: u8,
}

/// Renders a page to a PDF byte buffer.
#[async_trait]
pub trait DocumentExporter: Send + Sync {
    async fn export(&self, request: &ExportRequest) -> Result<Vec<u8>, ExportError>;
}

/// Uploads byte buffers to a path in a cloud bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        credentials: &OssCredentials,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError>;
}

/// Native window control primitives.
///
/// Every method tolerates the no-window case as a silent no-op; window
/// content may send control messages before a window exists or after it
/// closed.
pub trait WindowHost: Send + Sync {
    fn focus(&self);
    fn close(&self);
    fn minimize(&self);
    fn toggle_maximize(&self);
    fn toggle_fullscreen(&self);
    fn resize(&self, width: u32, height: u32);
    fn navigate(&self, url: &str);
}
