//! The anchor index service
//!
//! [`AnchorEngine`] owns the index and everything needed to keep it in sync:
//! the active patterns, the settings, the workspace folders and the bulk
//! search backend. It has an explicit lifecycle (`init`, `refresh`,
//! `teardown`) and is passed by reference to whoever needs it.
//!
//! All index writes go through a tokio `RwLock`. Every logical update (a
//! file re-scan, a refresh, a rename re-sync) holds the write guard for its
//! whole duration, so readers only ever see a settled index.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::RwLock as SyncRwLock;
use rustc_hash::FxHashSet;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, watch};
use tower_lsp::lsp_types::{Diagnostic, Location, Position, Url, WorkspaceEdit};
use tracing::{debug, info, warn};

use crate::config::AnchorSettings;
use crate::error::Result;
use crate::index::AnchorIndex;
use crate::index::diagnostics::compute_diagnostics;
use crate::lsp::document::{DocumentProvider, apply_text_edits};
use crate::lsp::features::rename::{anchor_on_line, plan_rename};
use crate::lsp::models::DefinitionTreeItem;
use crate::scanner::{BulkSearch, PatternSet, RipgrepSearch, ScanResult, scan_folder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No successful pattern compilation and bulk scan attempt yet.
    Uninitialized,
    Ready,
}

pub struct AnchorEngine {
    index: RwLock<AnchorIndex>,
    patterns: SyncRwLock<Option<Arc<PatternSet>>>,
    settings: SyncRwLock<AnchorSettings>,
    folders: SyncRwLock<Vec<Url>>,
    search: SyncRwLock<Arc<dyn BulkSearch>>,
    /// When set, settings changes do not replace the search backend.
    fixed_search: bool,
    refresh_lock: Mutex<()>,
    state: watch::Sender<EngineState>,
}

impl std::fmt::Debug for AnchorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorEngine")
            .field("search", &self.search.read().backend_name())
            .field("folders", &self.folders.read().len())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Default for AnchorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnchorEngine {
    /// Engine backed by ripgrep, reconfigured from settings on every
    /// `apply_settings`.
    pub fn new() -> Self {
        let settings = AnchorSettings::default();
        let search: Arc<dyn BulkSearch> = Arc::new(RipgrepSearch::from_settings(&settings));
        Self::build(settings, search, false)
    }

    /// Engine with a fixed bulk search backend.
    pub fn with_search(search: Arc<dyn BulkSearch>) -> Self {
        Self::build(AnchorSettings::default(), search, true)
    }

    fn build(settings: AnchorSettings, search: Arc<dyn BulkSearch>, fixed_search: bool) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self {
            index: RwLock::new(AnchorIndex::new()),
            patterns: SyncRwLock::new(None),
            settings: SyncRwLock::new(settings),
            folders: SyncRwLock::new(Vec::new()),
            search: SyncRwLock::new(search),
            fixed_search,
            refresh_lock: Mutex::new(()),
            state,
        }
    }

    /// Apply settings and workspace folders, then run a full bulk scan.
    ///
    /// A settings error is returned after the scan: the previous patterns
    /// (if any) stay active and the index is still rebuilt with them.
    pub async fn init(&self, settings: AnchorSettings, folders: Vec<Url>) -> Result<()> {
        info!("Initializing anchor index for {} workspace folder(s)", folders.len());
        *self.folders.write() = folders;
        let applied = self.apply_settings(settings);
        if let Err(e) = &applied {
            warn!("Keeping previous patterns: {}", e);
        }
        self.refresh().await;
        applied
    }

    /// Compile and install new settings. On error nothing changes.
    pub fn apply_settings(&self, settings: AnchorSettings) -> Result<()> {
        let patterns = PatternSet::from_settings(&settings)?;
        if !self.fixed_search {
            *self.search.write() = Arc::new(RipgrepSearch::from_settings(&settings));
        }
        *self.patterns.write() = Some(Arc::new(patterns));
        *self.settings.write() = settings;
        debug!("Applied settings: {:?}", self.settings.read());
        Ok(())
    }

    pub fn set_folders(&self, folders: Vec<Url>) {
        *self.folders.write() = folders;
    }

    /// Clear the index and rebuild it from a bulk scan of every workspace
    /// folder. Returns the number of anchors indexed.
    pub async fn refresh(&self) -> usize {
        self.rebuild(None).await
    }

    /// Like [`refresh`](Self::refresh), then re-scans the open buffers of
    /// `documents` inside the same write section. The buffers are read once
    /// the write lock is held, so an edit that landed during the bulk scan
    /// is not rolled back.
    pub async fn refresh_with(&self, documents: &dyn DocumentProvider) -> usize {
        self.rebuild(Some(documents)).await
    }

    /// Refreshes are serialized. Folder scans run concurrently; the clear and
    /// the merge happen under one write lock, so a reader sees either the old
    /// index or the new one.
    async fn rebuild(&self, documents: Option<&dyn DocumentProvider>) -> usize {
        let _serial = self.refresh_lock.lock().await;

        let Some(patterns) = self.patterns() else {
            warn!("Refresh requested before any valid patterns were applied");
            return 0;
        };
        let folders = self.folders();
        let search = self.search.read().clone();

        let started = Instant::now();
        let scans = folders
            .iter()
            .map(|folder| scan_folder(search.as_ref(), folder, &patterns));
        let results: Vec<ScanResult> = join_all(scans).await.into_iter().flatten().collect();

        let mut index = self.index.write().await;
        let overlay = documents.map(|d| d.open_buffers()).unwrap_or_default();
        index.clear_all();
        index.insert_all(results);
        for (uri, text) in &overlay {
            index.update_file(uri, text, &patterns);
        }
        let total = index.definition_count() + index.reference_count();
        drop(index);

        self.state.send_replace(EngineState::Ready);
        info!(
            "Indexed {} anchors from {} folder(s) with {} in {:?}, {} open buffer(s) overlaid",
            total,
            folders.len(),
            search.backend_name(),
            started.elapsed(),
            overlay.len()
        );
        total
    }

    /// Re-scan one file from its current text. Returns `false` when no
    /// patterns are active.
    pub async fn update_file(&self, uri: &Url, text: &str) -> bool {
        let Some(patterns) = self.patterns() else {
            debug!("Skipping update of {}: no active patterns", uri);
            return false;
        };
        self.index.write().await.update_file(uri, text, &patterns);
        true
    }

    /// Recompute diagnostics, store them, and return the full per-file set
    /// (including emptied entries).
    pub async fn refresh_diagnostics(&self) -> HashMap<Url, Vec<Diagnostic>> {
        let settings = self.settings.read().diagnostic_settings();
        let folders = self.folders();
        let mut index = self.index.write().await;
        let computed = compute_diagnostics(&index, &settings, &folders);
        index.replace_diagnostics(computed);
        index.diagnostics().clone()
    }

    /// Names defined exactly once, with their references, sorted by name.
    pub async fn definition_tree(&self) -> Vec<DefinitionTreeItem> {
        let index = self.index.read().await;
        let mut items: Vec<DefinitionTreeItem> = index
            .definitions()
            .filter_map(|(name, defs)| match defs {
                [def] => Some(DefinitionTreeItem {
                    name: name.to_string(),
                    uri: def.uri.clone(),
                    range: def.anchor.range,
                    refs: index
                        .references_named(name)
                        .iter()
                        .map(|r| Location::new(r.uri.clone(), r.anchor.range))
                        .collect(),
                }),
                _ => None,
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    /// Rename the anchor under the cursor everywhere.
    ///
    /// The index may trail the editor by one debounce window, so the texts
    /// involved are gathered first: every open buffer, the request file, and
    /// every other file the index has for the name under the cursor. Under
    /// one write lock those texts are re-scanned, the rename is planned from
    /// the result, and each edited file is re-scanned again with its edits
    /// applied. Edits are therefore computed against the same text they are
    /// applied to.
    pub async fn rename(
        &self,
        uri: &Url,
        position: Position,
        new_name: &str,
        documents: &dyn DocumentProvider,
    ) -> Option<WorkspaceEdit> {
        let patterns = self.patterns()?;
        let texts = self.rename_texts(uri, position, &patterns, documents).await;

        let mut index = self.index.write().await;
        for (file, text) in &texts {
            index.update_file(file, text, &patterns);
        }
        let plan = plan_rename(&index, uri, position, new_name)?;

        for (file, edits) in &plan.edits {
            match texts.get(file) {
                Some(text) => {
                    let edited = apply_text_edits(text, edits);
                    index.update_file(file, &edited, &patterns);
                }
                None => debug!("No text for {}, leaving it to the next change", file),
            }
        }
        drop(index);

        info!(
            "Renamed {:?} to {:?} across {} file(s)",
            plan.old_name,
            plan.new_name,
            plan.edits.len()
        );
        Some(plan.to_workspace_edit())
    }

    /// Live texts for a rename, read without holding the index lock.
    async fn rename_texts(
        &self,
        uri: &Url,
        position: Position,
        patterns: &PatternSet,
        documents: &dyn DocumentProvider,
    ) -> HashMap<Url, String> {
        let mut texts: HashMap<Url, String> = documents.open_buffers().into_iter().collect();
        if !texts.contains_key(uri) {
            if let Some(text) = documents.text(uri).await {
                texts.insert(uri.clone(), text);
            }
        }

        let name = texts
            .get(uri)
            .and_then(|text| text.split('\n').nth(position.line as usize))
            .and_then(|line| anchor_on_line(line, position.line, patterns, position))
            .map(|anchor| anchor.name);
        let Some(name) = name else {
            return texts;
        };

        let closed: FxHashSet<Url> = {
            let index = self.index.read().await;
            index
                .definitions_named(&name)
                .iter()
                .chain(index.references_named(&name))
                .filter(|location| !texts.contains_key(&location.uri))
                .map(|location| location.uri.clone())
                .collect()
        };
        for file in closed {
            match documents.text(&file).await {
                Some(text) => {
                    texts.insert(file, text);
                }
                None => debug!("No text for {}, renaming from its indexed anchors", file),
            }
        }
        texts
    }

    /// Drop all state. The engine can be re-initialized afterwards.
    pub async fn teardown(&self) {
        let _serial = self.refresh_lock.lock().await;
        *self.index.write().await = AnchorIndex::new();
        *self.patterns.write() = None;
        self.state.send_replace(EngineState::Uninitialized);
        debug!("Anchor engine torn down");
    }

    pub async fn index(&self) -> RwLockReadGuard<'_, AnchorIndex> {
        self.index.read().await
    }

    pub fn patterns(&self) -> Option<Arc<PatternSet>> {
        self.patterns.read().clone()
    }

    pub fn settings(&self) -> AnchorSettings {
        self.settings.read().clone()
    }

    pub fn folders(&self) -> Vec<Url> {
        self.folders.read().clone()
    }

    pub fn search_backend(&self) -> &'static str {
        self.search.read().backend_name()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }
}
