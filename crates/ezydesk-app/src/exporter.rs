//! Headless document export.
//!
//! Renders a page of the hosted web application to PDF using the system
//! Chrome/Chromium in headless print-to-PDF mode. Session parameters
//! travel to the page as query parameters; the page itself decides what to
//! render from them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use url::Url;

use ezydesk_channel::{DocumentExporter, ExportError, ExportRequest};

/// Environment variable overriding browser discovery.
pub const BROWSER_ENV: &str = "EZYDESK_BROWSER";

/// Time budget the renderer gets to settle network activity, in virtual
/// milliseconds.
const RENDER_BUDGET_MS: u32 = 10_000;

#[cfg(target_os = "macos")]
const BROWSER_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(target_os = "windows")]
const BROWSER_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const BROWSER_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
];

/// Renders pages to PDF with a headless system browser.
pub struct HeadlessExporter {
    browser: Option<PathBuf>,
    scratch_dir: PathBuf,
}

impl HeadlessExporter {
    /// Uses an explicit browser binary.
    pub fn new(browser: PathBuf) -> Self {
        Self {
            browser: Some(browser),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Locates a browser from `EZYDESK_BROWSER` or the well-known install
    /// paths. A missing browser is not fatal here; export requests fail
    /// individually until one appears.
    pub fn discover() -> Self {
        let browser = std::env::var_os(BROWSER_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                BROWSER_CANDIDATES
                    .iter()
                    .map(PathBuf::from)
                    .find(|candidate| candidate.exists())
            });

        match &browser {
            Some(path) => tracing::info!(browser = %path.display(), "using headless renderer"),
            None => tracing::warn!("no headless browser found; document export is unavailable"),
        }

        Self {
            browser,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// The page URL with the session parameters attached.
    fn export_url(request: &ExportRequest) -> Result<String, ExportError> {
        let mut url = Url::parse(&request.url)
            .map_err(|err| ExportError::InvalidRequest(err.to_string()))?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = &request.api_token {
                query.append_pair("apiToken", token);
            }
            if let Some(host) = &request.api_host {
                query.append_pair("apiHost", host);
            }
            if let Some(permission) = &request.permission {
                query.append_pair("permission", permission);
            }
            if let Some(user_info) = &request.user_info {
                query.append_pair("userInfo", user_info);
            }
            query.append_pair("printSize", &request.print_size.to_string());
        }

        Ok(url.to_string())
    }

    fn render_args(url: &str, output: &Path) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-pdf-header-footer".to_string(),
            format!("--virtual-time-budget={}", RENDER_BUDGET_MS),
            format!("--print-to-pdf={}", output.display()),
            url.to_string(),
        ]
    }

    fn scratch_file(&self) -> PathBuf {
        self.scratch_dir.join(format!(
            "ezydesk-export-{}-{}.pdf",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        ))
    }
}

#[async_trait]
impl DocumentExporter for HeadlessExporter {
    async fn export(&self, request: &ExportRequest) -> Result<Vec<u8>, ExportError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ExportError::Renderer("no headless browser available".to_string()))?;

        let url = Self::export_url(request)?;
        let output = self.scratch_file();

        tracing::debug!(%url, output = %output.display(), "rendering document");
        let result = Command::new(browser)
            .args(Self::render_args(&url, &output))
            .output()
            .await?;

        if !result.status.success() {
            let _ = std::fs::remove_file(&output);
            return Err(ExportError::Renderer(
                String::from_utf8_lossy(&result.stderr).trim().to_string(),
            ));
        }

        let bytes = std::fs::read(&output)
            .map_err(|_| ExportError::Renderer("renderer produced no output".to_string()))?;
        let _ = std::fs::remove_file(&output);
        Ok(bytes)
    }
}
