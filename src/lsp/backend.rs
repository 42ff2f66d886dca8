use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc};

use tower_lsp::Client;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{MessageType, Url};

use tracing::{debug, error, info, warn};

use crate::config::AnchorSettings;
use crate::error::AnchorError;
use crate::lsp::document::DocumentStore;
use crate::lsp::engine::AnchorEngine;
use crate::lsp::models::RefreshTree;

// Import types from backend submodules
mod handlers;
mod reactive;
mod state;

pub use state::{AnchorBackend, DocumentChangeEvent};

impl AnchorBackend {
    /// Creates the backend and spawns its background tasks.
    ///
    /// `client_process_id` comes from the command line; the process id sent
    /// with `initialize` replaces it.
    pub fn new(client: Client, engine: Arc<AnchorEngine>, client_process_id: Option<u32>) -> Self {
        let (doc_change_tx, doc_change_rx) = mpsc::channel::<DocumentChangeEvent>(100);
        let (pid_tx, pid_rx) = mpsc::channel::<u32>(4);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let latency = engine.settings().update_file_debounce_latency;

        info!("Creating anchor backend with {} search", engine.search_backend());

        let backend = Self {
            client,
            engine,
            documents: Arc::new(DocumentStore::new()),
            client_process_id: Arc::new(Mutex::new(client_process_id)),
            pid_channel: pid_tx,
            doc_change_tx,
            debounce_latency: Arc::new(AtomicU64::new(latency)),
            shutdown_tx: Arc::new(shutdown_tx),
            startup_error: Arc::new(Mutex::new(None)),
        };

        Self::spawn_document_debouncer(backend.clone(), doc_change_rx);
        Self::spawn_client_monitor(backend.clone(), pid_rx);

        backend
    }

    pub fn engine(&self) -> &Arc<AnchorEngine> {
        &self.engine
    }

    /// Workspace folders from `initialize`, falling back to the root uri.
    #[allow(deprecated)]
    fn workspace_folders(params: &tower_lsp::lsp_types::InitializeParams) -> Vec<Url> {
        if let Some(folders) = &params.workspace_folders {
            return folders.iter().map(|f| f.uri.clone()).collect();
        }
        params.root_uri.iter().cloned().collect()
    }

    fn sync_debounce_latency(&self) {
        let latency = self.engine.settings().update_file_debounce_latency;
        self.debounce_latency.store(latency, Ordering::Relaxed);
    }

    /// Report a settings error to the user.
    async fn report_settings_error(&self, e: &AnchorError) {
        error!("Invalid anchor settings: {}", e);
        self.client
            .show_message(MessageType::ERROR, format!("Anchor settings rejected: {}", e))
            .await;
    }

    /// Push the current state to the client: semantic token refresh, every
    /// file's diagnostics (empty lists included), then the definition tree.
    pub(super) async fn update_client(&self) {
        if let Err(e) = self.client.semantic_tokens_refresh().await {
            debug!("Semantic token refresh not accepted: {}", e);
        }

        let diagnostics = self.engine.refresh_diagnostics().await;
        let published = diagnostics.len();
        for (uri, file_diagnostics) in diagnostics {
            self.client.publish_diagnostics(uri, file_diagnostics, None).await;
        }

        let tree = self.engine.definition_tree().await;
        let tree_len = tree.len();
        if let Err(e) = self.client.send_request::<RefreshTree>(tree).await {
            debug!("Client did not accept the definition tree: {}", e);
        }
        debug!("Updated client: {} file(s) of diagnostics, {} tree item(s)", published, tree_len);
    }

    /// Debounced re-scan of one file, followed by a client update.
    pub(super) async fn on_document_settled(&self, event: DocumentChangeEvent) {
        if self.engine.update_file(&event.uri, &event.text).await {
            self.update_client().await;
        }
    }

    pub(super) async fn queue_document_change(&self, uri: Url, version: i32, text: String) {
        let event = DocumentChangeEvent {
            uri,
            version,
            text: Arc::new(text),
        };
        if let Err(e) = self.doc_change_tx.send(event).await {
            warn!("Document debouncer is gone, dropping change: {}", e);
        }
    }

    /// `anchor/init`: push the current state.
    pub async fn handle_init(&self) -> jsonrpc::Result<()> {
        self.update_client().await;
        info!("Init done");
        Ok(())
    }

    /// `anchor/refresh`: clear and rebuild from a full bulk scan.
    pub async fn handle_refresh(&self) -> jsonrpc::Result<()> {
        if self.engine.patterns().is_none() {
            let e = AnchorError::NoPatterns;
            warn!("{}", e);
            return Err(jsonrpc::Error {
                code: jsonrpc::ErrorCode::InvalidRequest,
                message: e.to_string().into(),
                data: None,
            });
        }
        self.engine.refresh_with(&*self.documents).await;
        self.update_client().await;
        info!("Refresh done");
        Ok(())
    }

    /// `anchor/refreshSettings`: apply new settings and rebuild. A payload
    /// that does not parse, or carries invalid patterns, is rejected and the
    /// previous settings stay in effect.
    pub async fn handle_refresh_settings(&self, params: serde_json::Value) -> jsonrpc::Result<()> {
        let applied = AnchorSettings::from_json(Some(params))
            .and_then(|settings| self.engine.apply_settings(settings));
        if let Err(e) = applied {
            self.report_settings_error(&e).await;
            return Err(jsonrpc::Error::invalid_params(e.to_string()));
        }
        self.sync_debounce_latency();
        self.engine.refresh_with(&*self.documents).await;
        self.update_client().await;
        info!("Settings refreshed");
        Ok(())
    }
}
