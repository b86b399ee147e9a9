//! Ezydesk Core - update coordination for the Ezy desktop client.
//!
//! This crate owns the one stateful subsystem of the host shell: checking a
//! remote manifest for a newer build, downloading the installer artifact
//! with progress reporting, and handing the artifact to a platform-specific
//! installer. Everything UI-facing (windows, the web content, the request
//! channel) lives in the other crates and talks to this one through
//! [`update::UpdateCoordinator`].

pub mod install;
pub mod manifest;
pub mod update;
pub mod version;

pub use install::{
    platform_installer, InstallError, InstallOutcome, InstallPlan, Installer, MacInstaller,
    PlannedCommand, UnsupportedInstaller, WindowsInstaller,
};
pub use manifest::{ManifestClient, ManifestError, VersionInfo};
pub use update::{
    CheckOutcome, DownloadProgress, UpdateCoordinator, UpdateError, UpdateSettings, UpdateState,
};
pub use version::{bigger_version, MalformedVersionError};
