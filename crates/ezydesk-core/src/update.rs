//! Update coordination.
//!
//! Checks the remote manifest for a new build, downloads the installer
//! artifact with progress reporting, and hands it to the platform
//! installer. The whole flow is modeled as one explicit state machine so a
//! request arriving in the wrong state is rejected instead of racing an
//! in-flight session: at most one update session exists at a time.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::install::{InstallError, InstallOutcome, Installer};
use crate::manifest::{ManifestClient, ManifestError, VersionInfo, DEFAULT_TIMEOUT_SECS};
use crate::version::{versions_equal, MalformedVersionError};

/// Errors that can occur during update operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Version(#[from] MalformedVersionError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("no installer artifact is published for this platform")]
    UnsupportedPlatform,

    #[error("artifact transfer failed: {0}")]
    Transfer(#[source] reqwest::Error),

    #[error("artifact checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Install(#[from] InstallError),
}

/// Download progress, emitted once per received chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Fraction complete, `0.0..=1.0`. `0.0` when the total is unknown.
    pub percent: f64,
    /// Bytes written so far.
    pub transferred_bytes: u64,
    /// Total bytes, when the server sent a content length.
    pub total_bytes: Option<u64>,
    /// Average transfer speed since the download started.
    pub speed_bytes_per_sec: u64,
}

impl DownloadProgress {
    /// The single event emitted when an artifact is already on disk.
    fn already_complete(size: u64) -> Self {
        Self {
            percent: 1.0,
            transferred_bytes: size,
            total_bytes: Some(size),
            speed_bytes_per_sec: 0,
        }
    }
}

/// State of the update session.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateState {
    /// No update activity yet.
    Idle,
    /// Manifest fetch in flight.
    Checking,
    /// The remote build matches the running build. Terminal.
    UpToDate,
    /// A different remote build exists; waiting for the user.
    UpdateAvailable(VersionInfo),
    /// Artifact transfer in flight.
    Downloading,
    /// Artifact on disk, ready to install.
    Downloaded(PathBuf),
    /// Platform install sequence running.
    Installing,
    /// The replacement build was launched; this process is exiting.
    Relaunching,
    /// The last operation failed. A new check may start over.
    Failed(String),
}

impl UpdateState {
    fn name(&self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up to date",
            UpdateState::UpdateAvailable(_) => "update available",
            UpdateState::Downloading => "downloading",
            UpdateState::Downloaded(_) => "downloaded",
            UpdateState::Installing => "installing",
            UpdateState::Relaunching => "relaunching",
            UpdateState::Failed(_) => "failed",
        }
    }
}

/// Outcome of a manifest check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Remote and running versions are equal.
    UpToDate,
    /// The remote build differs; an update session is now open.
    UpdateAvailable(VersionInfo),
}

/// Update coordinator configuration.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    /// Base URL of the version manifest.
    pub manifest_base_url: String,
    /// Base URL the installer artifacts are served from.
    pub download_base_url: String,
    /// Directory artifacts are downloaded into.
    pub artifact_dir: PathBuf,
    /// Version of the running application.
    pub current_version: String,
    /// Artifact file extension override. `None` picks the platform default
    /// (`exe` on Windows, `dmg` on macOS).
    pub artifact_extension: Option<String>,
    /// Manifest request timeout.
    pub timeout: Duration,
}

impl UpdateSettings {
    /// Settings with the platform artifact extension, the system temp
    /// directory, and the default manifest timeout.
    pub fn new(
        manifest_base_url: impl Into<String>,
        download_base_url: impl Into<String>,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            manifest_base_url: manifest_base_url.into(),
            download_base_url: download_base_url.into().trim_end_matches('/').to_string(),
            artifact_dir: std::env::temp_dir(),
            current_version: current_version.into(),
            artifact_extension: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Artifact extension for the running platform.
#[cfg(target_os = "windows")]
const fn platform_extension() -> Option<&'static str> {
    Some("exe")
}

#[cfg(target_os = "macos")]
const fn platform_extension() -> Option<&'static str> {
    Some("dmg")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const fn platform_extension() -> Option<&'static str> {
    None
}

/// Coordinates the check → download → install flow.
///
/// Owns the process-wide cached [`VersionInfo`]; the cache is overwritten
/// on each successful check and cleared only by process restart.
pub struct UpdateCoordinator {
    settings: UpdateSettings,
    manifest: ManifestClient,
    client: reqwest::Client,
    state: RwLock<UpdateState>,
    latest: RwLock<Option<VersionInfo>>,
}

impl UpdateCoordinator {
    /// Creates a coordinator in the [`UpdateState::Idle`] state.
    pub fn new(settings: UpdateSettings) -> Result<Self, UpdateError> {
        let manifest = ManifestClient::with_timeout(&settings.manifest_base_url, settings.timeout)?;
        let client = reqwest::Client::builder()
            .user_agent(format!("Ezydesk/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ManifestError::Transport)?;

        Ok(Self {
            settings,
            manifest,
            client,
            state: RwLock::new(UpdateState::Idle),
            latest: RwLock::new(None),
        })
    }

    /// Returns the current session state.
    pub fn state(&self) -> UpdateState {
        self.state.read().unwrap().clone()
    }

    /// Returns the version of the running application.
    pub fn current_version(&self) -> &str {
        &self.settings.current_version
    }

    /// Returns the manifest cached by the last successful check, if any.
    pub fn cached_version_info(&self) -> Option<VersionInfo> {
        self.latest.read().unwrap().clone()
    }

    fn set_state(&self, next: UpdateState) {
        *self.state.write().unwrap() = next;
    }

    fn fail(&self, message: impl Into<String>) {
        self.set_state(UpdateState::Failed(message.into()));
    }

    /// Fetches the manifest and decides whether an update session opens.
    ///
    /// Rejected while a download or install is in flight so a repeated
    /// check can never spawn a second session. Any fetch or comparison
    /// failure lands in [`UpdateState::Failed`]; there is no automatic
    /// retry.
    pub async fn check_for_update(&self) -> Result<CheckOutcome, UpdateError> {
        {
            let mut state = self.state.write().unwrap();
            match &*state {
                UpdateState::Idle
                | UpdateState::UpToDate
                | UpdateState::UpdateAvailable(_)
                | UpdateState::Failed(_) => {}
                other => {
                    return Err(UpdateError::InvalidState {
                        operation: "check for updates",
                        state: other.name(),
                    });
                }
            }
            *state = UpdateState::Checking;
        }

        let info = match self.manifest.fetch().await {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!("version check failed: {}", err);
                self.fail(err.to_string());
                return Err(err.into());
            }
        };
        tracing::info!(
            remote = %info.version,
            current = %self.settings.current_version,
            "fetched version manifest"
        );

        let equal = match versions_equal(&info.version, &self.settings.current_version) {
            Ok(equal) => equal,
            Err(err) => {
                self.fail(err.to_string());
                return Err(err.into());
            }
        };

        if equal {
            self.set_state(UpdateState::UpToDate);
            return Ok(CheckOutcome::UpToDate);
        }

        *self.latest.write().unwrap() = Some(info.clone());
        self.set_state(UpdateState::UpdateAvailable(info.clone()));
        Ok(CheckOutcome::UpdateAvailable(info))
    }

    /// File name of the installer artifact for this platform.
    pub fn artifact_name(&self, info: &VersionInfo) -> Result<String, UpdateError> {
        let extension = match &self.settings.artifact_extension {
            Some(ext) => ext.as_str(),
            None => platform_extension().ok_or(UpdateError::UnsupportedPlatform)?,
        };
        Ok(format!("{}-{}.{}", info.product_name, info.version, extension))
    }

    /// Local path the artifact is downloaded to.
    pub fn artifact_path(&self, info: &VersionInfo) -> Result<PathBuf, UpdateError> {
        Ok(self.settings.artifact_dir.join(self.artifact_name(info)?))
    }

    /// Downloads the installer artifact, reporting progress per chunk.
    ///
    /// Only valid in [`UpdateState::UpdateAvailable`]; a second `update`
    /// request while one transfer is running fails its guard without
    /// touching the in-flight session. A file of the expected name already
    /// present in the artifact directory skips the transfer entirely and
    /// reports a single completed progress event; when the manifest carries
    /// a checksum the file must also match it, otherwise it is discarded
    /// and downloaded again.
    pub async fn download(
        &self,
        on_progress: impl Fn(DownloadProgress),
    ) -> Result<PathBuf, UpdateError> {
        let info = {
            let mut state = self.state.write().unwrap();
            match &*state {
                UpdateState::UpdateAvailable(info) => {
                    let info = info.clone();
                    *state = UpdateState::Downloading;
                    info
                }
                other => {
                    return Err(UpdateError::InvalidState {
                        operation: "download",
                        state: other.name(),
                    });
                }
            }
        };

        match self.download_inner(&info, &on_progress).await {
            Ok(path) => {
                self.set_state(UpdateState::Downloaded(path.clone()));
                Ok(path)
            }
            Err(err) => {
                self.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn download_inner(
        &self,
        info: &VersionInfo,
        on_progress: &impl Fn(DownloadProgress),
    ) -> Result<PathBuf, UpdateError> {
        let path = self.artifact_path(info)?;

        if path.exists() {
            match self.reusable_artifact(&path, info) {
                Ok(size) => {
                    tracing::info!(path = %path.display(), "reusing downloaded artifact");
                    on_progress(DownloadProgress::already_complete(size));
                    return Ok(path);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        "discarding stale artifact: {}", err
                    );
                    std::fs::remove_file(&path)?;
                }
            }
        }

        let result = self.transfer(info, &path, on_progress).await;
        if result.is_err() {
            let _ = std::fs::remove_file(&path);
        }
        result?;
        Ok(path)
    }

    /// Checks whether a pre-existing file can stand in for the download.
    fn reusable_artifact(&self, path: &Path, info: &VersionInfo) -> Result<u64, UpdateError> {
        if let Some(expected) = &info.sha256 {
            verify_checksum(path, expected)?;
        }
        Ok(std::fs::metadata(path)?.len())
    }

    async fn transfer(
        &self,
        info: &VersionInfo,
        path: &Path,
        on_progress: &impl Fn(DownloadProgress),
    ) -> Result<(), UpdateError> {
        let url = format!(
            "{}/{}",
            self.settings.download_base_url,
            self.artifact_name(info)?
        );
        tracing::info!(%url, "downloading installer artifact");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(UpdateError::Transfer)?;

        let total_bytes = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = std::fs::File::create(path)?;
        let mut hasher = info.sha256.as_ref().map(|_| Sha256::new());
        let mut transferred: u64 = 0;
        let started = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(UpdateError::Transfer)?;
            file.write_all(&chunk)?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            transferred += chunk.len() as u64;

            let elapsed = started.elapsed().as_secs_f64();
            let speed = if elapsed > 0.0 {
                (transferred as f64 / elapsed) as u64
            } else {
                0
            };
            let percent = match total_bytes {
                Some(0) | None => 0.0,
                Some(total) => (transferred as f64 / total as f64).min(1.0),
            };
            on_progress(DownloadProgress {
                percent,
                transferred_bytes: transferred,
                total_bytes,
                speed_bytes_per_sec: speed,
            });
        }
        file.flush()?;
        drop(file);

        if let (Some(hasher), Some(expected)) = (hasher, &info.sha256) {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(UpdateError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        on_progress(DownloadProgress {
            percent: 1.0,
            transferred_bytes: transferred,
            total_bytes: total_bytes.or(Some(transferred)),
            speed_bytes_per_sec: 0,
        });
        Ok(())
    }

    /// Runs the platform install sequence for the downloaded artifact.
    ///
    /// Only valid in [`UpdateState::Downloaded`]. Blocks on the shell
    /// commands; call from a blocking context.
    pub fn install(&self, installer: &dyn Installer) -> Result<InstallOutcome, UpdateError> {
        let artifact = {
            let mut state = self.state.write().unwrap();
            match &*state {
                UpdateState::Downloaded(path) => {
                    let path = path.clone();
                    *state = UpdateState::Installing;
                    path
                }
                other => {
                    return Err(UpdateError::InvalidState {
                        operation: "install",
                        state: other.name(),
                    });
                }
            }
        };

        let info = self.cached_version_info().ok_or(UpdateError::InvalidState {
            operation: "install",
            state: "missing version info",
        })?;

        match installer.install(&artifact, &info.product_name, &info.version) {
            Ok(outcome) => {
                if outcome == InstallOutcome::Relaunched {
                    self.set_state(UpdateState::Relaunching);
                }
                Ok(outcome)
            }
            Err(err) => {
                self.fail(err.to_string());
                Err(err.into())
            }
        }
    }
}

/// Compares a file's SHA-256 against an expected hex digest.
fn verify_checksum(path: &Path, expected: &str) -> Result<(), UpdateError> {
    let bytes = std::fs::read(path)?;
    let actual = format!("{:x}", Sha256::digest(&bytes));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(UpdateError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
