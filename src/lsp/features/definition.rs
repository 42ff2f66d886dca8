use tower_lsp::lsp_types::{Location, Position, Url};
use tracing::trace;

use crate::index::AnchorIndex;

/// Resolve the reference under the cursor to the first definition recorded
/// for its name. Duplicates are not disambiguated further.
pub fn goto_definition(index: &AnchorIndex, uri: &Url, position: Position) -> Option<Location> {
    let reference = index.reference_at(uri, position)?;
    let Some(def) = index.first_definition(&reference.name) else {
        trace!("Reference {:?} at {:?} has no definition", reference.name, position);
        return None;
    };
    Some(Location::new(def.uri.clone(), def.anchor.range))
}
