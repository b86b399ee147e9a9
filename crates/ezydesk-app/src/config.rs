//! Application configuration.
//!
//! Deployment-specific URLs come from the environment (or CLI flags layered
//! on top in `main`); everything defaults to the production content host.

use std::path::PathBuf;

/// Remote web application loaded into the main window.
pub const DEFAULT_REMOTE_URL: &str = "http://demo.exam.zykj.org/electron/index.html";

/// Base URL the version manifest is fetched from.
pub const DEFAULT_MANIFEST_BASE_URL: &str = "http://demo.exam.zykj.org/electron";

/// Base URL installer artifacts are downloaded from.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "http://demo.exam.zykj.org/electron/packages";

/// Route fragment the `go-to-login` message navigates to.
pub const LOGIN_FRAGMENT: &str = "#/login";

/// Footprint the main window shrinks to when an update is available.
pub const UPDATE_DIALOG_SIZE: (u32, u32) = (300, 340);

/// Application configuration resolved at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// URL of the hosted web application.
    pub remote_url: String,
    /// Version manifest base URL.
    pub manifest_base_url: String,
    /// Installer artifact base URL.
    pub download_base_url: String,
    /// Request channel port.
    pub channel_port: u16,
    /// Directory installer artifacts are downloaded into.
    pub artifact_dir: PathBuf,
    /// Default directory for saved documents; `None` falls back to the
    /// user's download folder at save time.
    pub save_dir: Option<PathBuf>,
}

impl AppConfig {
    /// The built-in defaults, untouched by the environment.
    pub fn defaults() -> Self {
        Self {
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            manifest_base_url: DEFAULT_MANIFEST_BASE_URL.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            channel_port: ezydesk_channel::DEFAULT_PORT,
            artifact_dir: std::env::temp_dir(),
            save_dir: None,
        }
    }

    /// Defaults overridden by `EZYDESK_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::defaults();
        if let Ok(url) = std::env::var("EZYDESK_REMOTE_URL") {
            config.remote_url = url;
        }
        if let Ok(url) = std::env::var("EZYDESK_MANIFEST_URL") {
            config.manifest_base_url = url;
        }
        if let Ok(url) = std::env::var("EZYDESK_DOWNLOAD_URL") {
            config.download_base_url = url;
        }
        if let Ok(port) = std::env::var("EZYDESK_CHANNEL_PORT") {
            if let Ok(port) = port.parse() {
                config.channel_port = port;
            }
        }
        if let Ok(dir) = std::env::var("EZYDESK_SAVE_DIR") {
            config.save_dir = Some(PathBuf::from(dir));
        }
        config
    }

    /// Login route of the hosted application.
    pub fn login_url(&self) -> String {
        format!("{}{}", self.remote_url, LOGIN_FRAGMENT)
    }
}
