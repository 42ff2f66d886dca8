use tower_lsp::lsp_types::{Location, Position, Url};

use crate::index::AnchorIndex;

/// Every reference, across all files, to the definition under the cursor.
/// `None` when the cursor is not on a definition.
pub fn find_references(index: &AnchorIndex, uri: &Url, position: Position) -> Option<Vec<Location>> {
    let def = index.definition_at(uri, position)?;
    Some(
        index
            .references_named(&def.name)
            .iter()
            .map(|r| Location::new(r.uri.clone(), r.anchor.range))
            .collect(),
    )
}
