//! Background tasks of the backend
//!
//! - The per-file debouncer coalesces rapid edits into one re-scan per file.
//! - The client monitor stops the server when the editor process goes away.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_stream::wrappers::ReceiverStream;
use tower_lsp::lsp_types::Url;
use tracing::{debug, error, info, trace};

use super::state::{AnchorBackend, DocumentChangeEvent};

const CLIENT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Debounce `events` per uri and feed the survivors to `handler`.
///
/// Each event (re)arms its uri's deadline at `latency` from its arrival;
/// when a deadline passes, only the newest version seen for that uri is
/// handled. Handlers run one at a time in deadline order, which makes this
/// task the single writer for incremental updates.
pub(super) async fn debounce_document_changes<S, F, Fut>(
    events: S,
    latency: Arc<AtomicU64>,
    mut handler: F,
) where
    S: Stream<Item = DocumentChangeEvent>,
    F: FnMut(DocumentChangeEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut events = Box::pin(events);
    let mut pending: HashMap<Url, (Instant, DocumentChangeEvent)> = HashMap::new();

    loop {
        let next_deadline = pending.values().map(|(deadline, _)| *deadline).min();
        let far_future = Instant::now() + Duration::from_secs(86_400);

        tokio::select! {
            next = events.next() => {
                let Some(event) = next else { break };
                if let Some((_, queued)) = pending.get(&event.uri) {
                    if queued.version > event.version {
                        trace!("Dropping stale version {} of {}", event.version, event.uri);
                        continue;
                    }
                }
                let delay = Duration::from_millis(latency.load(Ordering::Relaxed));
                pending.insert(event.uri.clone(), (Instant::now() + delay, event));
            }
            _ = sleep_until(next_deadline.unwrap_or(far_future)), if next_deadline.is_some() => {
                let now = Instant::now();
                let mut ready: Vec<(Instant, Url)> = pending
                    .iter()
                    .filter(|(_, (deadline, _))| *deadline <= now)
                    .map(|(uri, (deadline, _))| (*deadline, uri.clone()))
                    .collect();
                ready.sort();
                for (_, uri) in ready {
                    if let Some((_, event)) = pending.remove(&uri) {
                        debug!("Debounced change of {} (version {})", uri, event.version);
                        handler(event).await;
                    }
                }
            }
        }
    }

    info!("Document debouncer terminated with {} pending change(s)", pending.len());
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // EPERM means the process exists but belongs to someone else
    !matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl AnchorBackend {
    /// Spawns the per-file document debouncer.
    pub(super) fn spawn_document_debouncer(
        backend: AnchorBackend,
        doc_change_rx: mpsc::Receiver<DocumentChangeEvent>,
    ) -> JoinHandle<()> {
        let mut shutdown_rx = backend.shutdown_tx.subscribe();
        let latency = backend.debounce_latency.clone();

        tokio::spawn(async move {
            let events = ReceiverStream::new(doc_change_rx).take_until(async move {
                let _ = shutdown_rx.recv().await;
                info!("Document debouncer received shutdown signal");
            });

            debounce_document_changes(events, latency, |event| {
                let backend = backend.clone();
                async move { backend.on_document_settled(event).await }
            })
            .await;
        })
    }

    /// Spawns the client process monitor. Each pid received on the channel
    /// replaces the one being watched.
    pub(super) fn spawn_client_monitor(
        backend: AnchorBackend,
        mut pid_rx: mpsc::Receiver<u32>,
    ) -> JoinHandle<()> {
        let mut shutdown_rx = backend.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut watched: Option<u32> = *backend.client_process_id.lock().await;
            let mut interval = tokio::time::interval(CLIENT_POLL_INTERVAL);

            loop {
                tokio::select! {
                    Some(pid) = pid_rx.recv() => {
                        debug!("Monitoring client process {}", pid);
                        watched = Some(pid);
                    }
                    _ = interval.tick() => {
                        if let Some(pid) = watched {
                            if !process_alive(pid) {
                                error!("Client process {} is gone, exiting", pid);
                                let _ = backend.shutdown_tx.send(());
                                std::process::exit(1);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Client monitor received shutdown signal");
                        break;
                    }
                }
            }
        })
    }
}
