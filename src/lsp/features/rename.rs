//! Cross-file anchor rename
//!
//! Renaming starts from either a definition or a reference under the cursor
//! and always resolves to a name. The edit set replaces the name sub-span of
//! every definition and every reference carrying that name; delimiters are
//! left alone. A reference whose name has no definition cannot be renamed.
//!
//! Planning is pure. The engine first brings the index up to date with the
//! live text of every file involved, plans, and then re-scans each edited
//! file from its edited text, all under a single write lock.

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    Position, PrepareRenameResponse, TextEdit, Url, WorkspaceEdit,
};
use tracing::debug;

use crate::index::{AnchorIndex, AnchorLocation};
use crate::scanner::{Anchor, PatternSet, scan_line};

/// A resolved rename: the name being replaced and the edits per file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenamePlan {
    pub old_name: String,
    pub new_name: String,
    pub edits: HashMap<Url, Vec<TextEdit>>,
}

impl RenamePlan {
    pub fn to_workspace_edit(&self) -> WorkspaceEdit {
        WorkspaceEdit::new(self.edits.clone())
    }

    pub fn files(&self) -> impl Iterator<Item = &Url> {
        self.edits.keys()
    }
}

/// A new name must be non-empty and fit on one line, since anchors never
/// span lines.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['\n', '\r'])
}

/// The anchor under the cursor on one line of text, definitions and
/// references alike. The leftmost wins when matches overlap.
pub fn anchor_on_line(
    line_text: &str,
    line: u32,
    patterns: &PatternSet,
    position: Position,
) -> Option<Anchor> {
    let mut candidates: Vec<Anchor> = scan_line(line_text, line, &patterns.definition);
    candidates.extend(scan_line(line_text, line, &patterns.reference));

    candidates
        .into_iter()
        .filter(|a| a.contains(position))
        .min_by_key(|a| a.start_key())
}

/// The renameable span under the cursor on the live line text.
///
/// The line is re-scanned rather than looked up in the index because the
/// buffer may have changed since the last debounced update.
pub fn prepare_rename(
    line_text: &str,
    line: u32,
    patterns: &PatternSet,
    position: Position,
) -> Option<PrepareRenameResponse> {
    anchor_on_line(line_text, line, patterns, position).map(|a| {
        PrepareRenameResponse::RangeWithPlaceholder {
            range: a.name_range,
            placeholder: a.name,
        }
    })
}

/// Resolve the anchor under the cursor and build the edit set.
pub fn plan_rename(
    index: &AnchorIndex,
    uri: &Url,
    position: Position,
    new_name: &str,
) -> Option<RenamePlan> {
    let (_, anchor) = index.anchor_at(uri, position)?;
    let name = anchor.name.clone();

    let defs = index.definitions_named(&name);
    if defs.is_empty() {
        debug!("Not renaming {:?}: reference has no definition", name);
        return None;
    }

    let mut edits: HashMap<Url, Vec<TextEdit>> = HashMap::new();
    let mut push = |location: &AnchorLocation| {
        edits
            .entry(location.uri.clone())
            .or_default()
            .push(TextEdit::new(location.anchor.name_range, new_name.to_string()));
    };
    defs.iter().for_each(&mut push);
    index.references_named(&name).iter().for_each(&mut push);

    for file_edits in edits.values_mut() {
        file_edits.sort_by_key(|e| (e.range.start.line, e.range.start.character));
    }

    Some(RenamePlan {
        old_name: name,
        new_name: new_name.to_string(),
        edits,
    })
}
