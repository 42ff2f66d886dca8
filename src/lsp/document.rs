use async_trait::async_trait;

use dashmap::DashMap;

use ropey::Rope;

use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, TextEdit, Url};

use tracing::{debug, trace};

/// Converts an LSP position (UTF-16 columns) to a char index in the Rope.
/// Positions past the end of a line clamp to the line end; lines past the
/// end of the text clamp to the end of the text.
fn position_to_char_index(position: &Position, text: &Rope) -> usize {
    let line = position.line as usize;
    if line >= text.len_lines() {
        return text.len_chars();
    }
    let line_start = text.line_to_char(line);
    let slice = text.line(line);
    let mut content_chars = slice.len_chars();
    if content_chars > 0 && slice.char(content_chars - 1) == '\n' {
        content_chars -= 1;
    }
    let content_units = slice.char_to_utf16_cu(content_chars);
    let units = (position.character as usize).min(content_units);
    line_start + slice.utf16_cu_to_char(units)
}

fn replace(text: &mut Rope, start: &Position, end: &Position, new_text: &str) {
    let start = position_to_char_index(start, text);
    let end = position_to_char_index(end, text).max(start);
    text.remove(start..end);
    text.insert(start, new_text);
}

/// An editor buffer the host has opened, possibly with unsaved changes.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub version: i32,
    pub text: Rope,
}

impl OpenDocument {
    pub fn new(text: &str, version: i32) -> Self {
        Self {
            version,
            text: Rope::from_str(text),
        }
    }

    /// Applies a list of content changes in order. Returns the new text, or
    /// `None` without touching the buffer when `version` is not newer.
    pub fn apply(&mut self, changes: &[TextDocumentContentChangeEvent], version: i32) -> Option<String> {
        if version <= self.version {
            debug!("Ignoring change version {} not newer than {}", version, self.version);
            return None;
        }
        for change in changes {
            match change.range {
                Some(range) => replace(&mut self.text, &range.start, &range.end, &change.text),
                None => self.text = Rope::from_str(&change.text),
            }
        }
        self.version = version;
        Some(self.text.to_string())
    }

    /// Text of one line without its terminator, or `None` past the end.
    pub fn line(&self, line: u32) -> Option<String> {
        let line = line as usize;
        if line >= self.text.len_lines() {
            return None;
        }
        let mut content = self.text.line(line).to_string();
        if content.ends_with('\n') {
            content.pop();
        }
        Some(content)
    }
}

/// Apply a set of non-overlapping edits to `text`.
///
/// Edits are applied from the end of the document backwards so that earlier
/// positions stay valid.
pub fn apply_text_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| (e.range.start.line, e.range.start.character));
    let mut rope = Rope::from_str(text);
    for edit in ordered.into_iter().rev() {
        replace(&mut rope, &edit.range.start, &edit.range.end, &edit.new_text);
    }
    rope.to_string()
}

/// Prefix of `line` up to a UTF-16 column, clamped to the line length.
pub fn line_prefix(line: &str, character: u32) -> &str {
    let mut units = 0u32;
    for (byte, ch) in line.char_indices() {
        if units >= character {
            return &line[..byte];
        }
        units += ch.len_utf16() as u32;
    }
    line
}

/// Read access to the live content of files, used where unsaved edits
/// matter (rename, completion).
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn text(&self, uri: &Url) -> Option<String>;

    /// Every buffer held in memory, which may be ahead of the index.
    fn open_buffers(&self) -> Vec<(Url, String)> {
        Vec::new()
    }

    async fn line(&self, uri: &Url, line: u32) -> Option<String> {
        let text = self.text(uri).await?;
        text.split('\n')
            .nth(line as usize)
            .map(|l| l.to_string())
    }
}

/// Buffers currently open in the editor.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, OpenDocument>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, uri: Url, text: &str, version: i32) {
        trace!("Opened {} at version {}", uri, version);
        self.documents.insert(uri, OpenDocument::new(text, version));
    }

    /// Apply changes to an open buffer and return its new text. Changes to a
    /// buffer that was never opened are dropped.
    pub fn change(
        &self,
        uri: &Url,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Option<String> {
        let Some(mut document) = self.documents.get_mut(uri) else {
            debug!("Change for unopened document {}", uri);
            return None;
        };
        document.apply(changes, version)
    }

    pub fn close(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    pub fn get_text(&self, uri: &Url) -> Option<String> {
        self.documents.get(uri).map(|d| d.text.to_string())
    }

    pub fn version(&self, uri: &Url) -> Option<i32> {
        self.documents.get(uri).map(|d| d.version)
    }

    /// Current text of every open buffer.
    pub fn snapshot(&self) -> Vec<(Url, String)> {
        self.documents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().text.to_string()))
            .collect()
    }
}

#[async_trait]
impl DocumentProvider for DocumentStore {
    /// The open buffer if there is one, otherwise the file on disk.
    async fn text(&self, uri: &Url) -> Option<String> {
        if let Some(text) = self.get_text(uri) {
            return Some(text);
        }
        let path = uri.to_file_path().ok()?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn open_buffers(&self) -> Vec<(Url, String)> {
        self.snapshot()
    }

    async fn line(&self, uri: &Url, line: u32) -> Option<String> {
        if let Some(document) = self.documents.get(uri) {
            return document.line(line);
        }
        let text = self.text(uri).await?;
        text.split('\n').nth(line as usize).map(|l| l.to_string())
    }
}
