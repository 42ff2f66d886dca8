//! Backend state
//!
//! Defines the AnchorBackend struct: the tower-lsp client handle, the anchor
//! engine, open buffers and the channels feeding the background tasks.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::{Mutex, broadcast, mpsc};
use tower_lsp::Client;
use tower_lsp::lsp_types::Url;

use crate::lsp::document::DocumentStore;
use crate::lsp::engine::AnchorEngine;

/// Latest content of a file after an open or change, queued for a debounced
/// re-scan.
#[derive(Debug, Clone)]
pub struct DocumentChangeEvent {
    pub uri: Url,
    pub version: i32,
    pub text: Arc<String>,
}

/// The anchor language server backend.
#[derive(Clone)]
pub struct AnchorBackend {
    pub(super) client: Client,
    pub(super) engine: Arc<AnchorEngine>,
    pub(super) documents: Arc<DocumentStore>,
    pub(super) client_process_id: Arc<Mutex<Option<u32>>>,
    pub(super) pid_channel: mpsc::Sender<u32>,
    pub(super) doc_change_tx: mpsc::Sender<DocumentChangeEvent>,
    /// Milliseconds; read by the debouncer for every new event so that a
    /// settings change applies to the next edit.
    pub(super) debounce_latency: Arc<AtomicU64>,
    pub(super) shutdown_tx: Arc<broadcast::Sender<()>>,
    /// Settings error from `initialize`, reported once the client is ready.
    pub(super) startup_error: Arc<Mutex<Option<String>>>,
}

// Manual Debug implementation, the client handle is left out
impl std::fmt::Debug for AnchorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorBackend")
            .field("engine", &self.engine)
            .field("documents", &self.documents)
            .finish()
    }
}
