//! Logical window registry.
//!
//! The shell tracks the main window as a logical record: its URL, mode,
//! and size. Opening and navigation hand the URL to the operating system
//! (which hosts the content in the default browser), while the control
//! messages from the channel mutate the record. Every operation tolerates
//! the no-window case as a silent no-op.

use std::io;
use std::sync::RwLock;

use ezydesk_channel::WindowHost;

/// Initial main-window footprint.
pub const MAIN_WINDOW_SIZE: (u32, u32) = (1280, 800);

type Launcher = Box<dyn Fn(&str) -> io::Result<()> + Send + Sync>;

/// Display mode of the main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

#[derive(Debug, Clone)]
struct WindowRecord {
    url: String,
    mode: WindowMode,
    size: (u32, u32),
}

/// Tracks the main window and forwards URL opens to the OS.
pub struct WindowRegistry {
    main: RwLock<Option<WindowRecord>>,
    launcher: Launcher,
}

impl WindowRegistry {
    /// Registry that opens URLs with the system default handler.
    pub fn new() -> Self {
        Self::with_launcher(Box::new(|url| open::that(url)))
    }

    /// Registry with a custom URL launcher.
    pub fn with_launcher(launcher: Launcher) -> Self {
        Self {
            main: RwLock::new(None),
            launcher,
        }
    }

    /// Opens the main window at the given URL.
    pub fn open_main(&self, url: &str) -> io::Result<()> {
        (self.launcher)(url)?;
        *self.main.write().unwrap() = Some(WindowRecord {
            url: url.to_string(),
            mode: WindowMode::Normal,
            size: MAIN_WINDOW_SIZE,
        });
        tracing::info!(%url, "main window opened");
        Ok(())
    }

    /// Current window mode, if a window exists.
    pub fn mode(&self) -> Option<WindowMode> {
        self.main.read().unwrap().as_ref().map(|record| record.mode)
    }

    /// Current window size, if a window exists.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.main.read().unwrap().as_ref().map(|record| record.size)
    }

    /// Current window URL, if a window exists.
    pub fn url(&self) -> Option<String> {
        self.main
            .read()
            .unwrap()
            .as_ref()
            .map(|record| record.url.clone())
    }

    fn update(&self, apply: impl FnOnce(&mut WindowRecord)) {
        if let Some(record) = self.main.write().unwrap().as_mut() {
            apply(record);
        }
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHost for WindowRegistry {
    fn focus(&self) {
        self.update(|record| {
            if record.mode == WindowMode::Minimized {
                record.mode = WindowMode::Normal;
            }
        });
    }

    fn close(&self) {
        *self.main.write().unwrap() = None;
    }

    fn minimize(&self) {
        self.update(|record| record.mode = WindowMode::Minimized);
    }

    fn toggle_maximize(&self) {
        self.update(|record| {
            record.mode = if record.mode == WindowMode::Maximized {
                WindowMode::Normal
            } else {
                WindowMode::Maximized
            };
        });
    }

    fn toggle_fullscreen(&self) {
        self.update(|record| {
            record.mode = if record.mode == WindowMode::Fullscreen {
                WindowMode::Normal
            } else {
                WindowMode::Fullscreen
            };
        });
    }

    fn resize(&self, width: u32, height: u32) {
        self.update(|record| record.size = (width, height));
    }

    fn navigate(&self, url: &str) {
        let mut main = self.main.write().unwrap();
        let Some(record) = main.as_mut() else {
            return;
        };
        record.url = url.to_string();
        drop(main);

        if let Err(err) = (self.launcher)(url) {
            tracing::warn!(%url, "navigation failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_registry() -> (WindowRegistry, Arc<Mutex<Vec<String>>>) {
        let opened: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let log = opened.clone();
        let registry = WindowRegistry::with_launcher(Box::new(move |url| {
            log.lock().unwrap().push(url.to_string());
            Ok(())
        }));
        (registry, opened)
    }

    #[test]
    fn control_messages_are_noops_without_a_window() {
        let (registry, opened) = recording_registry();

        registry.focus();
        registry.minimize();
        registry.toggle_maximize();
        registry.toggle_fullscreen();
        registry.resize(10, 10);
        registry.navigate("http://somewhere");
        registry.close();

        assert_eq!(registry.mode(), None);
        assert!(opened.lock().unwrap().is_empty());
    }

    #[test]
    fn open_records_window_and_launches_url() {
        let (registry, opened) = recording_registry();

        registry.open_main("http://content.example/index.html").unwrap();
        assert_eq!(registry.mode(), Some(WindowMode::Normal));
        assert_eq!(registry.size(), Some(MAIN_WINDOW_SIZE));
        assert_eq!(
            *opened.lock().unwrap(),
            vec!["http://content.example/index.html"]
        );
    }

    #[test]
    fn maximize_and_fullscreen_toggle() {
        let (registry, _) = recording_registry();
        registry.open_main("http://c/i").unwrap();

        registry.toggle_maximize();
        assert_eq!(registry.mode(), Some(WindowMode::Maximized));
        registry.toggle_maximize();
        assert_eq!(registry.mode(), Some(WindowMode::Normal));

        registry.toggle_fullscreen();
        assert_eq!(registry.mode(), Some(WindowMode::Fullscreen));
        registry.toggle_fullscreen();
        assert_eq!(registry.mode(), Some(WindowMode::Normal));
    }

    #[test]
    fn focus_restores_a_minimized_window() {
        let (registry, _) = recording_registry();
        registry.open_main("http://c/i").unwrap();

        registry.minimize();
        assert_eq!(registry.mode(), Some(WindowMode::Minimized));
        registry.focus();
        assert_eq!(registry.mode(), Some(WindowMode::Normal));
    }

    #[test]
    fn resize_updates_footprint() {
        let (registry, _) = recording_registry();
        registry.open_main("http://c/i").unwrap();

        registry.resize(300, 340);
        assert_eq!(registry.size(), Some((300, 340)));
    }

    #[test]
    fn navigate_replaces_url_and_relaunches() {
        let (registry, opened) = recording_registry();
        registry.open_main("http://c/i").unwrap();

        registry.navigate("http://c/i#/login");
        assert_eq!(registry.url(), Some("http://c/i#/login".to_string()));
        assert_eq!(opened.lock().unwrap().len(), 2);
    }

    #[test]
    fn close_clears_the_record() {
        let (registry, _) = recording_registry();
        registry.open_main("http://c/i").unwrap();

        registry.close();
        assert_eq!(registry.mode(), None);
    }
}
