//! Shared fixtures for integration tests: an in-memory bulk search that
//! reports matches the way ripgrep does, a slow variant of it, and an
//! in-memory document provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tower_lsp::lsp_types::Url;

use anchor_language_server::error::{AnchorError, Result};
use anchor_language_server::lsp::document::DocumentProvider;
use anchor_language_server::scanner::{BulkSearch, SearchMatch};

pub const WORKSPACE: &str = "/workspace";

pub fn uri(relative: &str) -> Url {
    Url::from_file_path(Path::new(WORKSPACE).join(relative)).unwrap()
}

pub fn workspace_folder() -> Url {
    Url::from_directory_path(WORKSPACE).unwrap()
}

/// Files keyed by absolute path, searched line by line with the regex crate.
/// Reported offsets are bytes within the line, and the line text keeps its
/// terminator, as ripgrep's JSON output does.
#[derive(Default)]
pub struct MemorySearch {
    files: Mutex<HashMap<PathBuf, String>>,
    pub calls: AtomicUsize,
}

impl MemorySearch {
    pub fn new(files: &[(&str, &str)]) -> Arc<Self> {
        let search = Self::default();
        for (relative, text) in files {
            search.write(relative, text);
        }
        Arc::new(search)
    }

    pub fn write(&self, relative: &str, text: &str) {
        self.files
            .lock()
            .insert(Path::new(WORKSPACE).join(relative), text.to_string());
    }

    pub fn text(&self, uri: &Url) -> Option<String> {
        let path = uri.to_file_path().ok()?;
        self.files.lock().get(&path).cloned()
    }
}

#[async_trait]
impl BulkSearch for MemorySearch {
    async fn search(&self, root: &Path, pattern: &str) -> Result<Vec<SearchMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let regex = regex::Regex::new(pattern).map_err(|e| AnchorError::SearchFailed {
            root: root.to_path_buf(),
            message: e.to_string(),
        })?;

        let files = self.files.lock();
        let mut matches = Vec::new();
        for (path, text) in files.iter().filter(|(path, _)| path.starts_with(root)) {
            for (i, line) in text.split('\n').enumerate() {
                for m in regex.find_iter(line) {
                    matches.push(SearchMatch {
                        path: path.clone(),
                        line_number: i as u32 + 1,
                        line_text: format!("{}\n", line),
                        match_text: m.as_str().to_string(),
                        start: m.start(),
                        end: m.end(),
                    });
                }
            }
        }
        Ok(matches)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// A search backend whose executable is missing.
pub struct UnavailableSearch;

#[async_trait]
impl BulkSearch for UnavailableSearch {
    async fn search(&self, _root: &Path, _pattern: &str) -> Result<Vec<SearchMatch>> {
        Err(AnchorError::SearchUnavailable {
            binary: PathBuf::from("/nonexistent/rg"),
            reason: "not found".to_string(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}

/// Delays every search, so that a bulk scan stays in flight while a test
/// does something else.
pub struct SlowSearch {
    pub inner: Arc<MemorySearch>,
    pub delay: Duration,
}

#[async_trait]
impl BulkSearch for SlowSearch {
    async fn search(&self, root: &Path, pattern: &str) -> Result<Vec<SearchMatch>> {
        tokio::time::sleep(self.delay).await;
        self.inner.search(root, pattern).await
    }

    fn backend_name(&self) -> &'static str {
        "slow memory"
    }
}

/// Document provider standing in for the editor: open buffers first, then
/// the [`MemorySearch`] file set as the disk.
pub struct MemoryDocuments {
    files: Arc<MemorySearch>,
    open: Mutex<HashMap<Url, String>>,
}

impl MemoryDocuments {
    pub fn new(files: Arc<MemorySearch>) -> Self {
        Self {
            files,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or edit) a buffer without touching the file set.
    pub fn open(&self, relative: &str, text: &str) {
        self.open.lock().insert(uri(relative), text.to_string());
    }
}

#[async_trait]
impl DocumentProvider for MemoryDocuments {
    async fn text(&self, uri: &Url) -> Option<String> {
        let buffer = self.open.lock().get(uri).cloned();
        buffer.or_else(|| self.files.text(uri))
    }

    fn open_buffers(&self) -> Vec<(Url, String)> {
        self.open
            .lock()
            .iter()
            .map(|(uri, text)| (uri.clone(), text.clone()))
            .collect()
    }
}
