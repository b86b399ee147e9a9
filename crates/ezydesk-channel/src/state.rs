//! Shared state behind the request channel.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use ezydesk_core::{Installer, UpdateCoordinator};

use crate::capabilities::{DocumentExporter, ObjectStore, WindowHost};
use crate::models::{OssCredentials, OutboundMessage};

/// Capacity of the host-event broadcast ring.
const EVENT_CAPACITY: usize = 64;

/// Commands the channel raises back to the process owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Terminate the process after `delay` (zero for immediately).
    Exit { delay: Duration },
}

/// Channel-level configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Content host the answer-sheet fragment URLs are rebased onto.
    pub content_base_url: String,
    /// Route loaded by the `go-to-login` message.
    pub login_url: String,
    /// Default directory for locally saved documents; `None` means the
    /// content must supply one per request.
    pub save_dir: Option<PathBuf>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Update coordinator (owns the cached manifest).
    pub coordinator: Arc<UpdateCoordinator>,
    /// Platform installer used by `start-install`.
    pub installer: Arc<dyn Installer>,
    /// Object-store credentials, set by the content's config message and
    /// read on every upload.
    pub credentials: Arc<RwLock<Option<OssCredentials>>>,
    /// Document exporter.
    pub exporter: Arc<dyn DocumentExporter>,
    /// Object store client.
    pub store: Arc<dyn ObjectStore>,
    /// Native window control.
    pub windows: Arc<dyn WindowHost>,
    /// Host-initiated events fanned out to every connected content.
    pub events: broadcast::Sender<OutboundMessage>,
    /// Process-control commands back to the owner.
    pub host: mpsc::UnboundedSender<HostCommand>,
    /// Channel configuration.
    pub config: Arc<ChannelConfig>,
}

impl AppState {
    /// Creates the shared state with empty credentials.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: Arc<UpdateCoordinator>,
        installer: Arc<dyn Installer>,
        exporter: Arc<dyn DocumentExporter>,
        store: Arc<dyn ObjectStore>,
        windows: Arc<dyn WindowHost>,
        host: mpsc::UnboundedSender<HostCommand>,
        config: ChannelConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            coordinator,
            installer,
            credentials: Arc::new(RwLock::new(None)),
            exporter,
            store,
            windows,
            events,
            host,
            config: Arc::new(config),
        }
    }

    /// Replaces the process-wide object-store credentials.
    pub fn set_credentials(&self, credentials: OssCredentials) {
        *self.credentials.write().unwrap() = Some(credentials);
    }

    /// Snapshot of the current credentials.
    pub fn credentials(&self) -> Option<OssCredentials> {
        self.credentials.read().unwrap().clone()
    }

    /// Broadcasts a host-initiated event to all connected content.
    ///
    /// Succeeds trivially when no window content is connected yet.
    pub fn broadcast(&self, message: OutboundMessage) {
        let _ = self.events.send(message);
    }
}
