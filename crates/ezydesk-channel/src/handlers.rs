//! Per-message channel handlers.
//!
//! Every inbound frame is handled independently; failures are converted
//! into reply events at this boundary and never propagate out of the
//! dispatcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use ezydesk_core::InstallOutcome;

use crate::capabilities::{ExportMode, ExportRequest};
use crate::error::ChannelError;
use crate::models::{
    Envelope, ExportOptions, OssCredentials, OutboundMessage, PrintCommonPdfRequest,
    PrintPdfRequest, SyncMessage, UpdatePercent,
};
use crate::state::{AppState, HostCommand};

/// Decodes one inbound frame and runs its handler.
pub async fn dispatch(state: AppState, raw: String, reply: UnboundedSender<OutboundMessage>) {
    let envelope: Envelope = match serde_json::from_str(&raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!("dropping malformed channel frame: {}", err);
            return;
        }
    };
    debug!(name = %envelope.name, "channel message");

    match envelope.name.as_str() {
        "synchronous-message" => handle_sync_config(&state, envelope.payload, &reply),
        "printPdf" => handle_print_pdf(&state, envelope.payload, &reply).await,
        "printCommonPdf" => handle_print_common_pdf(&state, envelope.payload, &reply).await,
        "go-to-login" => state.windows.navigate(&state.config.login_url),
        "win-close" => state.windows.close(),
        "win-max" => state.windows.toggle_maximize(),
        "win-min" => state.windows.minimize(),
        "win-full-screen" => state.windows.toggle_fullscreen(),
        "update" => handle_update(&state, &reply).await,
        "start-install" => handle_start_install(&state, &reply).await,
        other => warn!("unknown channel message {:?}", other),
    }
}

fn parse_payload<T: DeserializeOwned>(name: &str, payload: Value) -> Result<T, ChannelError> {
    serde_json::from_value(payload).map_err(|source| ChannelError::Payload {
        name: name.to_string(),
        source,
    })
}

/// `synchronous-message`: configuration pushed by the window content.
///
/// The content blocks on the acknowledgement, so the reply is sent even
/// when the payload is ignored.
fn handle_sync_config(state: &AppState, payload: Value, reply: &UnboundedSender<OutboundMessage>) {
    match parse_payload::<SyncMessage>("synchronous-message", payload) {
        Ok(message) if message.kind == "oss" => {
            match serde_json::from_value::<OssCredentials>(message.data) {
                Ok(credentials) => {
                    info!(bucket = %credentials.bucket, "object-store credentials configured");
                    state.set_credentials(credentials);
                }
                Err(err) => warn!("ignoring malformed object-store credentials: {}", err),
            }
        }
        Ok(message) => debug!("ignoring config message of type {:?}", message.kind),
        Err(err) => warn!("{}", err),
    }

    let _ = reply.send(OutboundMessage::reply("synchronous-message", "success"));
}

/// Rebase an answer-sheet URL's fragment onto the content host.
fn rebase_fragment(content_base: &str, url: &str) -> String {
    match url.find('#') {
        Some(index) => format!("{}{}", content_base, &url[index..]),
        None => url.to_string(),
    }
}

fn export_request(mode: ExportMode, url: String, options: &ExportOptions) -> ExportRequest {
    ExportRequest {
        mode,
        url,
        api_token: options.api_token.clone(),
        api_host: options.api_host.clone(),
        permission: options.permission.clone(),
        user_info: options.user_info.clone(),
        print_size: options.print_size,
    }
}

/// `printPdf`: export an answer sheet and upload it to the bucket.
async fn handle_print_pdf(
    state: &AppState,
    payload: Value,
    reply: &UnboundedSender<OutboundMessage>,
) {
    let request: PrintPdfRequest = match parse_payload("printPdf", payload) {
        Ok(request) => request,
        Err(err) => {
            warn!("{}", err);
            let _ = reply.send(OutboundMessage::reply("printPdf", "error"));
            return;
        }
    };

    let verdict = match export_and_upload(state, &request).await {
        Ok(()) => "success",
        Err(err) => {
            warn!("printPdf failed: {}", err);
            "error"
        }
    };
    let _ = reply.send(OutboundMessage::reply("printPdf", verdict));
}

async fn export_and_upload(state: &AppState, request: &PrintPdfRequest) -> Result<(), String> {
    let url = rebase_fragment(&state.config.content_base_url, &request.options.url);
    let export = export_request(ExportMode::AnswerSheet, url, &request.options);

    let bytes = state
        .exporter
        .export(&export)
        .await
        .map_err(|err| err.to_string())?;

    match state.credentials() {
        Some(credentials) => state
            .store
            .put(&credentials, &request.object_path(), &bytes)
            .await
            .map_err(|err| err.to_string()),
        None => {
            warn!("no object-store credentials configured; skipping upload");
            Ok(())
        }
    }
}

/// `printCommonPdf`: export a document and save it to disk.
async fn handle_print_common_pdf(
    state: &AppState,
    payload: Value,
    reply: &UnboundedSender<OutboundMessage>,
) {
    let request: PrintCommonPdfRequest = match parse_payload("printCommonPdf", payload) {
        Ok(request) => request,
        Err(err) => {
            warn!("{}", err);
            let _ = reply.send(OutboundMessage::reply("printCommonPdf", "failed"));
            return;
        }
    };

    let export = export_request(
        ExportMode::Common,
        request.options.url.clone(),
        &request.options,
    );
    let verdict = match state.exporter.export(&export).await {
        Err(err) => {
            warn!("printCommonPdf export failed: {}", err);
            "failed"
        }
        Ok(bytes) => {
            let target = request
                .options
                .save_dir
                .clone()
                .or_else(|| state.config.save_dir.clone());
            match target {
                None => "cancel",
                Some(dir) => match save_document(&dir, &request.title, &bytes) {
                    Ok(path) => {
                        info!(path = %path.display(), "document saved");
                        "success"
                    }
                    Err(err) => {
                        warn!("saving document failed: {}", err);
                        "failed"
                    }
                },
            }
        }
    };
    let _ = reply.send(OutboundMessage::reply("printCommonPdf", verdict));
}

/// Writes exported bytes as `{title}.pdf` under `dir`, decoding a
/// percent-encoded title first.
pub fn save_document(dir: &Path, title: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let title = urlencoding::decode(title)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| title.to_string());

    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.pdf", title));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// `update`: stream the installer artifact, reporting progress back under
/// the `update-percent` reply key.
async fn handle_update(state: &AppState, reply: &UnboundedSender<OutboundMessage>) {
    let progress_reply = reply.clone();
    let result = state
        .coordinator
        .download(move |progress| {
            let payload = serde_json::to_value(UpdatePercent::from(progress)).unwrap_or(Value::Null);
            let _ = progress_reply.send(OutboundMessage::event("update-percent", payload));
        })
        .await;

    match result {
        Ok(path) => info!(path = %path.display(), "installer artifact ready"),
        Err(err) => {
            warn!("update download failed: {}", err);
            let _ = reply.send(OutboundMessage::event(
                "update-percent",
                json!({ "error": err.to_string() }),
            ));
        }
    }
}

/// `start-install`: run the platform install sequence, then ask the
/// process owner to exit.
async fn handle_start_install(state: &AppState, reply: &UnboundedSender<OutboundMessage>) {
    let coordinator = state.coordinator.clone();
    let installer = state.installer.clone();

    let outcome =
        match tokio::task::spawn_blocking(move || coordinator.install(installer.as_ref())).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!("install failed: {}", err);
                let _ = reply.send(OutboundMessage::reply(
                    "start-install",
                    json!({ "error": err.to_string() }),
                ));
                return;
            }
            Err(err) => {
                warn!("install task panicked: {}", err);
                let _ = reply.send(OutboundMessage::reply(
                    "start-install",
                    json!({ "error": "install task failed" }),
                ));
                return;
            }
        };

    let delay = match outcome {
        InstallOutcome::ExitScheduled { delay } => delay,
        InstallOutcome::Relaunched => Duration::ZERO,
    };
    info!(?delay, "install sequence complete; scheduling process exit");
    let _ = state.host.send(HostCommand::Exit { delay });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    use ezydesk_core::{
        InstallError, InstallPlan, Installer, UpdateCoordinator, UpdateSettings, UpdateState,
    };

    use crate::capabilities::{
        DocumentExporter, ExportError, ObjectStore, StoreError, WindowHost,
    };
    use crate::state::ChannelConfig;

    const PDF_BYTES: &[u8] = b"%PDF-1.4 test";

    struct StaticExporter {
        bytes: Option<Vec<u8>>,
        seen: Mutex<Vec<ExportRequest>>,
    }

    impl StaticExporter {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                bytes: Some(PDF_BYTES.to_vec()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                bytes: None,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DocumentExporter for StaticExporter {
        async fn export(&self, request: &ExportRequest) -> Result<Vec<u8>, ExportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.bytes
                .clone()
                .ok_or_else(|| ExportError::Renderer("render failed".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        puts: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put(
            &self,
            _credentials: &OssCredentials,
            path: &str,
            bytes: &[u8],
        ) -> Result<(), StoreError> {
            self.puts
                .lock()
                .unwrap()
                .push((path.to_string(), bytes.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingWindows {
        actions: Mutex<Vec<String>>,
    }

    impl RecordingWindows {
        fn record(&self, action: impl Into<String>) {
            self.actions.lock().unwrap().push(action.into());
        }
    }

    impl WindowHost for RecordingWindows {
        fn focus(&self) {
            self.record("focus");
        }
        fn close(&self) {
            self.record("close");
        }
        fn minimize(&self) {
            self.record("minimize");
        }
        fn toggle_maximize(&self) {
            self.record("maximize");
        }
        fn toggle_fullscreen(&self) {
            self.record("fullscreen");
        }
        fn resize(&self, width: u32, height: u32) {
            self.record(format!("resize:{}x{}", width, height));
        }
        fn navigate(&self, url: &str) {
            self.record(format!("navigate:{}", url));
        }
    }

    struct FakeInstaller(InstallOutcome);

    impl Installer for FakeInstaller {
        fn plan(&self, _: &Path, _: &str, _: &str) -> InstallPlan {
            InstallPlan { steps: vec![] }
        }
        fn install(
            &self,
            _: &Path,
            _: &str,
            _: &str,
        ) -> Result<InstallOutcome, InstallError> {
            Ok(self.0.clone())
        }
    }

    struct Harness {
        state: AppState,
        host_rx: mpsc::UnboundedReceiver<HostCommand>,
        windows: Arc<RecordingWindows>,
        store: Arc<RecordingStore>,
        _artifacts: tempfile::TempDir,
    }

    fn harness_with(
        exporter: Arc<dyn DocumentExporter>,
        manifest_base: &str,
        download_base: &str,
        save_dir: Option<PathBuf>,
    ) -> Harness {
        let artifacts = tempfile::tempdir().unwrap();
        let mut settings = UpdateSettings::new(manifest_base, download_base, "1.4.0");
        settings.artifact_dir = artifacts.path().to_path_buf();
        settings.artifact_extension = Some("dmg".to_string());
        let coordinator = Arc::new(UpdateCoordinator::new(settings).unwrap());

        let windows = Arc::new(RecordingWindows::default());
        let store = Arc::new(RecordingStore::default());
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let state = AppState::new(
            coordinator,
            Arc::new(FakeInstaller(InstallOutcome::ExitScheduled {
                delay: Duration::from_millis(1500),
            })),
            exporter,
            store.clone(),
            windows.clone(),
            host_tx,
            ChannelConfig {
                content_base_url: "http://content.example/index.html".to_string(),
                login_url: "http://content.example/index.html#/login".to_string(),
                save_dir,
            },
        );

        Harness {
            state,
            host_rx,
            windows,
            store,
            _artifacts: artifacts,
        }
    }

    fn harness() -> Harness {
        harness_with(
            StaticExporter::ok(),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            None,
        )
    }

    async fn send(
        harness: &Harness,
        raw: &str,
    ) -> Vec<OutboundMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatch(harness.state.clone(), raw.to_string(), tx).await;
        let mut replies = Vec::new();
        while let Ok(message) = rx.try_recv() {
            replies.push(message);
        }
        replies
    }

    fn credentials_frame() -> String {
        json!({
            "name": "synchronous-message",
            "payload": {
                "type": "oss",
                "data": {
                    "accessKeyId": "id",
                    "accessKeySecret": "secret",
                    "securityToken": "token",
                    "region": "oss-cn-hangzhou",
                    "bucket": "exam-papers",
                }
            }
        })
        .to_string()
    }

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn oss_config_sets_credentials_and_acknowledges() {
        let harness = harness();

        let replies = send(&harness, &credentials_frame()).await;
        assert_eq!(
            replies,
            vec![OutboundMessage::reply("synchronous-message", "success")]
        );
        assert_eq!(
            harness.state.credentials().unwrap().bucket,
            "exam-papers"
        );
    }

    #[tokio::test]
    async fn print_pdf_uploads_to_bucket_path() {
        let exporter = StaticExporter::ok();
        let harness = harness_with(
            exporter.clone(),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            None,
        );
        send(&harness, &credentials_frame()).await;

        let frame = json!({
            "name": "printPdf",
            "payload": {
                "id": "42",
                "options": {
                    "url": "http://anywhere/app#/sheet/42",
                    "apiToken": "t",
                    "printSize": 2,
                }
            }
        })
        .to_string();
        let replies = send(&harness, &frame).await;

        assert_eq!(replies, vec![OutboundMessage::reply("printPdf", "success")]);
        let puts = harness.store.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "/pdf/42/pdf.pdf");
        assert_eq!(puts[0].1, PDF_BYTES);

        // The fragment was rebased onto the configured content host.
        let seen = exporter.seen.lock().unwrap();
        assert_eq!(seen[0].url, "http://content.example/index.html#/sheet/42");
        assert_eq!(seen[0].print_size, 2);
        assert_eq!(seen[0].mode, ExportMode::AnswerSheet);
    }

    #[tokio::test]
    async fn print_pdf_without_credentials_skips_upload() {
        let harness = harness();

        let frame = json!({
            "name": "printPdf",
            "payload": {"id": 7, "options": {"url": "http://a/#/x"}}
        })
        .to_string();
        let replies = send(&harness, &frame).await;

        assert_eq!(replies, vec![OutboundMessage::reply("printPdf", "success")]);
        assert!(harness.store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn print_pdf_reports_renderer_failure() {
        let harness = harness_with(
            StaticExporter::failing(),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            None,
        );

        let frame = json!({
            "name": "printPdf",
            "payload": {"id": 7, "options": {"url": "http://a/#/x"}}
        })
        .to_string();
        let replies = send(&harness, &frame).await;

        assert_eq!(replies, vec![OutboundMessage::reply("printPdf", "error")]);
    }

    #[tokio::test]
    async fn print_common_pdf_saves_decoded_title() {
        let save_dir = tempfile::tempdir().unwrap();
        let harness = harness_with(
            StaticExporter::ok(),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            Some(save_dir.path().to_path_buf()),
        );

        let frame = json!({
            "name": "printCommonPdf",
            "payload": {
                "title": "%E6%9C%9F%E4%B8%AD%E8%80%83%E8%AF%95",
                "options": {"url": "http://a/doc"}
            }
        })
        .to_string();
        let replies = send(&harness, &frame).await;

        assert_eq!(
            replies,
            vec![OutboundMessage::reply("printCommonPdf", "success")]
        );
        let saved = save_dir.path().join("期中考试.pdf");
        assert_eq!(std::fs::read(&saved).unwrap(), PDF_BYTES);
    }

    #[tokio::test]
    async fn print_common_pdf_without_target_directory_cancels() {
        let harness = harness();

        let frame = json!({
            "name": "printCommonPdf",
            "payload": {"title": "doc", "options": {"url": "http://a/doc"}}
        })
        .to_string();
        let replies = send(&harness, &frame).await;

        assert_eq!(
            replies,
            vec![OutboundMessage::reply("printCommonPdf", "cancel")]
        );
    }

    #[tokio::test]
    async fn print_common_pdf_reports_write_failure() {
        let save_dir = tempfile::tempdir().unwrap();
        // A file where the save directory should be makes the write fail.
        let blocked = save_dir.path().join("blocked");
        std::fs::write(&blocked, b"file").unwrap();
        let harness = harness_with(
            StaticExporter::ok(),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            Some(blocked),
        );

        let frame = json!({
            "name": "printCommonPdf",
            "payload": {"title": "doc", "options": {"url": "http://a/doc"}}
        })
        .to_string();
        let replies = send(&harness, &frame).await;

        assert_eq!(
            replies,
            vec![OutboundMessage::reply("printCommonPdf", "failed")]
        );
    }

    #[tokio::test]
    async fn window_messages_are_direct_effects_without_replies() {
        let harness = harness();

        for name in ["win-max", "win-min", "win-full-screen", "win-close", "go-to-login"] {
            let replies = send(&harness, &json!({ "name": name }).to_string()).await;
            assert!(replies.is_empty(), "{} must not reply", name);
        }

        let actions = harness.windows.actions.lock().unwrap();
        assert_eq!(
            *actions,
            vec![
                "maximize",
                "minimize",
                "fullscreen",
                "close",
                "navigate:http://content.example/index.html#/login",
            ]
        );
    }

    #[tokio::test]
    async fn update_without_open_session_reports_error() {
        let harness = harness();

        let replies = send(&harness, r#"{"name":"update"}"#).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].name, "update-percent");
        assert!(replies[0].payload["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_silently() {
        let harness = harness();

        assert!(send(&harness, "not json").await.is_empty());
        assert!(send(&harness, r#"{"payload":{}}"#).await.is_empty());
        assert!(send(&harness, r#"{"name":"no-such-message"}"#).await.is_empty());
    }

    #[tokio::test]
    async fn full_update_and_install_flow() {
        let router = Router::new()
            .route(
                "/version.json",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "application/json")],
                        r#"{"version":"2.0.0","productName":"EzyWebTool"}"#,
                    )
                }),
            )
            .route(
                "/EzyWebTool-2.0.0.dmg",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "application/octet-stream")],
                        Bytes::from_static(b"disk image bytes"),
                    )
                }),
            );
        let base = spawn_server(router).await;

        let mut harness = harness_with(StaticExporter::ok(), &base, &base, None);

        harness.state.coordinator.check_for_update().await.unwrap();

        let replies = send(&harness, r#"{"name":"update"}"#).await;
        assert!(!replies.is_empty());
        assert!(replies.iter().all(|r| r.name == "update-percent"));
        let last = replies.last().unwrap();
        assert_eq!(last.payload["percent"], json!(1.0));
        assert!(matches!(
            harness.state.coordinator.state(),
            UpdateState::Downloaded(_)
        ));

        let replies = send(&harness, r#"{"name":"start-install"}"#).await;
        assert!(replies.is_empty());
        assert_eq!(
            harness.host_rx.try_recv().unwrap(),
            HostCommand::Exit {
                delay: Duration::from_millis(1500)
            }
        );
    }
}
