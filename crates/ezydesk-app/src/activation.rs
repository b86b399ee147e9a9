//! Custom URL-scheme activation.
//!
//! The installer registers the shell for `ezy-web-tool://` links; the web
//! application uses them to request a document export when the shell is
//! not the foreground app. The OS relays the link as a process argument;
//! everything after the scheme is a query string describing the export.

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::form_urlencoded;

use ezydesk_channel::{DocumentExporter, ExportError, ExportMode, ExportRequest, WindowHost};

/// The registered URL scheme.
pub const SCHEME: &str = "ezy-web-tool";

/// Errors from scheme activation.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("not an {SCHEME} activation URL: {0}")]
    NotActivation(String),

    #[error("activation URL is missing the {0:?} parameter")]
    MissingParam(&'static str),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("no save directory available")]
    NoSaveDirectory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded activation link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    /// Document name used for the saved file.
    pub name: String,
    /// The export job the link describes.
    pub export: ExportRequest,
}

impl ActivationRequest {
    /// Decodes an `ezy-web-tool://...` link.
    pub fn parse(raw: &str) -> Result<Self, ActivationError> {
        let prefix = format!("{}://", SCHEME);
        let query = raw
            .strip_prefix(&prefix)
            .ok_or_else(|| ActivationError::NotActivation(raw.to_string()))?;

        let mut url = None;
        let mut name = None;
        let mut api_token = None;
        let mut api_host = None;
        let mut permission = None;
        let mut user_info = None;
        let mut print_size = 1u8;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "url" => url = Some(value.into_owned()),
                "name" => name = Some(value.into_owned()),
                "apiToken" => api_token = Some(value.into_owned()),
                "apiHost" => api_host = Some(value.into_owned()),
                "permission" => permission = Some(value.into_owned()),
                "userInfo" => user_info = Some(value.into_owned()),
                "printSize" => print_size = value.parse().unwrap_or(1),
                _ => {}
            }
        }

        Ok(Self {
            name: name.ok_or(ActivationError::MissingParam("name"))?,
            export: ExportRequest {
                mode: ExportMode::AnswerSheet,
                url: url.ok_or(ActivationError::MissingParam("url"))?,
                api_token,
                api_host,
                permission,
                user_info,
                print_size,
            },
        })
    }
}

/// Runs the export-and-save flow for an activation link.
///
/// The document lands in `save_dir` (or the user's download folder when
/// none is configured) and the main window is focused afterwards.
pub async fn handle(
    raw: &str,
    exporter: &dyn DocumentExporter,
    windows: &dyn WindowHost,
    save_dir: Option<PathBuf>,
) -> Result<PathBuf, ActivationError> {
    let request = ActivationRequest::parse(raw)?;

    let bytes = exporter.export(&request.export).await?;

    let dir = save_dir
        .or_else(|| {
            directories::UserDirs::new()
                .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        })
        .ok_or(ActivationError::NoSaveDirectory)?;
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.pdf", request.name));
    std::fs::write(&path, &bytes)?;
    tracing::info!(path = %path.display(), "answer sheet saved");

    windows.focus();
    Ok(path)
}
