//! Ezydesk - native shell of the Ezy exam-authoring desktop client.
//!
//! This crate provides the pieces the `ezydesk` binary wires together:
//!
//! - Configuration with environment overrides
//! - The headless document exporter
//! - The object-store upload client
//! - The logical window registry
//! - `ezy-web-tool://` scheme activation
//!
//! # Usage
//!
//! ```ignore
//! use ezydesk_app::config::AppConfig;
//! use ezydesk_app::exporter::HeadlessExporter;
//! use ezydesk_app::window::WindowRegistry;
//!
//! let config = AppConfig::from_env();
//! let exporter = HeadlessExporter::discover();
//! let windows = WindowRegistry::new();
//! ```

pub mod activation;
pub mod config;
pub mod exporter;
pub mod store;
pub mod window;

pub use activation::{ActivationError, ActivationRequest};
pub use config::AppConfig;
pub use exporter::HeadlessExporter;
pub use store::OssHttpStore;
pub use window::WindowRegistry;
