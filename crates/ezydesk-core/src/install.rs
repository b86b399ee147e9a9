//! Platform-specific installer invocation.
//!
//! Once an artifact is downloaded, replacing the running application is a
//! short sequence of OS shell commands. Each platform variant can describe
//! that sequence up front as an [`InstallPlan`], so the exact commands are
//! reproducible from the product name and version without executing
//! anything.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

/// Delay between launching the Windows installer and terminating the
/// running process, so the installer can detach first.
pub const WINDOWS_EXIT_DELAY: Duration = Duration::from_millis(1500);

/// Fixed system applications path on macOS.
pub const APPLICATIONS_DIR: &str = "/Applications";

/// Mount root for disk images on macOS.
pub const VOLUMES_DIR: &str = "/Volumes";

/// Errors that can occur while running the install sequence.
#[derive(Debug, Error)]
pub enum InstallError {
    /// A step could not be spawned at all.
    #[error("failed to spawn `{step}`: {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    /// A step ran and exited unsuccessfully.
    #[error("installer step `{step}` failed: {detail}")]
    StepFailed { step: String, detail: String },

    /// No installer exists for the running platform.
    #[error("no installer available for this platform")]
    UnsupportedPlatform,
}

/// One shell command in an install sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PlannedCommand {
    fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Runs the command to completion, treating a non-zero exit as failure.
    fn run(&self) -> Result<(), InstallError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| InstallError::Spawn {
                step: self.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(InstallError::StepFailed {
                step: self.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl fmt::Display for PlannedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// The full command sequence an installer would run.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub steps: Vec<PlannedCommand>,
}

/// What the caller must do after a successful install step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The installer runs detached; terminate this process after `delay`.
    ExitScheduled { delay: Duration },

    /// The replacement bundle was launched; terminate this process now.
    Relaunched,
}

/// Platform-specific install/replace/relaunch sequence.
pub trait Installer: Send + Sync {
    /// Describes the commands `install` would run, without side effects.
    fn plan(&self, artifact: &Path, product: &str, version: &str) -> InstallPlan;

    /// Executes the install sequence for the downloaded artifact.
    fn install(
        &self,
        artifact: &Path,
        product: &str,
        version: &str,
    ) -> Result<InstallOutcome, InstallError>;
}

/// Windows-family install: shell-open the installer executable and let it
/// take over while this process schedules its own exit.
#[derive(Debug, Default)]
pub struct WindowsInstaller;

impl WindowsInstaller {
    fn launch(artifact: &Path) -> PlannedCommand {
        // `start ""` keeps the first quoted argument from being consumed
        // as the window title.
        PlannedCommand::new(
            "cmd",
            [
                "/C".to_string(),
                "start".to_string(),
                String::new(),
                artifact.display().to_string(),
            ],
        )
    }
}

impl Installer for WindowsInstaller {
    fn plan(&self, artifact: &Path, _product: &str, _version: &str) -> InstallPlan {
        InstallPlan {
            steps: vec![Self::launch(artifact)],
        }
    }

    fn install(
        &self,
        artifact: &Path,
        _product: &str,
        _version: &str,
    ) -> Result<InstallOutcome, InstallError> {
        Self::launch(artifact).run()?;
        Ok(InstallOutcome::ExitScheduled {
            delay: WINDOWS_EXIT_DELAY,
        })
    }
}

/// macOS install: mount the disk image, stage the new bundle, swap it into
/// `/Applications`, unmount, relaunch.
///
/// The swap is staged rather than remove-then-copy: the old bundle is moved
/// aside as a backup and restored if the swap fails, so a failed install
/// never leaves `/Applications` without a working bundle.
#[derive(Debug, Default)]
pub struct MacInstaller;

impl MacInstaller {
    /// Mount point of the artifact's disk image, derived from the manifest.
    pub fn volume_path(product: &str, version: &str) -> PathBuf {
        PathBuf::from(VOLUMES_DIR).join(format!("{} {}", product, version))
    }

    /// The installed bundle path under the system applications directory.
    pub fn installed_bundle(product: &str) -> PathBuf {
        PathBuf::from(APPLICATIONS_DIR).join(format!("{}.app", product))
    }

    fn mounted_bundle(product: &str, version: &str) -> PathBuf {
        Self::volume_path(product, version).join(format!("{}.app", product))
    }

    fn staging_bundle(product: &str) -> PathBuf {
        PathBuf::from(APPLICATIONS_DIR).join(format!(".{}-staging.app", product))
    }

    fn backup_bundle(product: &str) -> PathBuf {
        PathBuf::from(APPLICATIONS_DIR).join(format!(".{}-backup.app", product))
    }

    fn attach(artifact: &Path) -> PlannedCommand {
        PlannedCommand::new(
            "hdiutil",
            [
                "attach".to_string(),
                artifact.display().to_string(),
                "-nobrowse".to_string(),
            ],
        )
    }

    fn copy_to_staging(product: &str, version: &str) -> PlannedCommand {
        PlannedCommand::new(
            "ditto",
            [
                Self::mounted_bundle(product, version).display().to_string(),
                Self::staging_bundle(product).display().to_string(),
            ],
        )
    }

    fn move_aside(product: &str) -> PlannedCommand {
        PlannedCommand::new(
            "mv",
            [
                Self::installed_bundle(product).display().to_string(),
                Self::backup_bundle(product).display().to_string(),
            ],
        )
    }

    fn move_into_place(product: &str) -> PlannedCommand {
        PlannedCommand::new(
            "mv",
            [
                Self::staging_bundle(product).display().to_string(),
                Self::installed_bundle(product).display().to_string(),
            ],
        )
    }

    fn restore_backup(product: &str) -> PlannedCommand {
        PlannedCommand::new(
            "mv",
            [
                Self::backup_bundle(product).display().to_string(),
                Self::installed_bundle(product).display().to_string(),
            ],
        )
    }

    fn remove_backup(product: &str) -> PlannedCommand {
        PlannedCommand::new(
            "rm",
            [
                "-rf".to_string(),
                Self::backup_bundle(product).display().to_string(),
            ],
        )
    }

    fn detach(product: &str, version: &str) -> PlannedCommand {
        PlannedCommand::new(
            "hdiutil",
            [
                "detach".to_string(),
                Self::volume_path(product, version).display().to_string(),
            ],
        )
    }

    fn relaunch(product: &str) -> PlannedCommand {
        PlannedCommand::new(
            "open",
            [
                "-n".to_string(),
                Self::installed_bundle(product).display().to_string(),
            ],
        )
    }

    fn swap(product: &str, version: &str) -> Result<(), InstallError> {
        let staging = Self::staging_bundle(product);
        let _ = std::fs::remove_dir_all(&staging);

        Self::copy_to_staging(product, version).run()?;

        let had_existing = Self::installed_bundle(product).exists();
        if had_existing {
            Self::move_aside(product).run()?;
        }

        if let Err(err) = Self::move_into_place(product).run() {
            if had_existing {
                if let Err(restore) = Self::restore_backup(product).run() {
                    tracing::error!("failed to restore previous bundle: {}", restore);
                }
            }
            return Err(err);
        }

        if had_existing {
            Self::remove_backup(product).run()?;
        }

        Ok(())
    }
}

impl Installer for MacInstaller {
    fn plan(&self, artifact: &Path, product: &str, version: &str) -> InstallPlan {
        InstallPlan {
            steps: vec![
                Self::attach(artifact),
                Self::copy_to_staging(product, version),
                Self::move_aside(product),
                Self::move_into_place(product),
                Self::remove_backup(product),
                Self::detach(product, version),
                Self::relaunch(product),
            ],
        }
    }

    fn install(
        &self,
        artifact: &Path,
        product: &str,
        version: &str,
    ) -> Result<InstallOutcome, InstallError> {
        Self::attach(artifact).run()?;

        let swapped = Self::swap(product, version);

        // The volume is detached whether or not the swap succeeded; a
        // lingering mount would block the next attempt.
        let detached = Self::detach(product, version).run();
        swapped?;
        detached?;

        Self::relaunch(product).run()?;
        Ok(InstallOutcome::Relaunched)
    }
}

/// Installer for platforms without a published artifact; every install
/// attempt fails its guard instead of the process.
#[derive(Debug, Default)]
pub struct UnsupportedInstaller;

impl Installer for UnsupportedInstaller {
    fn plan(&self, _artifact: &Path, _product: &str, _version: &str) -> InstallPlan {
        InstallPlan { steps: Vec::new() }
    }

    fn install(
        &self,
        _artifact: &Path,
        _product: &str,
        _version: &str,
    ) -> Result<InstallOutcome, InstallError> {
        Err(InstallError::UnsupportedPlatform)
    }
}

/// Returns the installer for the running platform.
pub fn platform_installer() -> Box<dyn Installer> {
    if cfg!(target_os = "windows") {
        Box::new(WindowsInstaller)
    } else if cfg!(target_os = "macos") {
        Box::new(MacInstaller)
    } else {
        Box::new(UnsupportedInstaller)
    }
}
