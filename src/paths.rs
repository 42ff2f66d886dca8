//! Display helpers for file locations shown to the user.

use tower_lsp::lsp_types::{Position, Url};

/// Render `uri` relative to the first workspace folder that contains it,
/// or as the full uri when none does.
pub fn relative_path(uri: &Url, folders: &[Url]) -> String {
    if let Ok(path) = uri.to_file_path() {
        for folder in folders {
            let Ok(root) = folder.to_file_path() else {
                continue;
            };
            if let Ok(relative) = path.strip_prefix(&root) {
                return relative.to_string_lossy().into_owned();
            }
        }
    }
    uri.to_string()
}

/// Editor link to a position, in the `#L<line>,<col>` form hosts understand
/// (1-based).
pub fn position_link(uri: &Url, position: Position) -> String {
    format!("{}#L{},{}", uri, position.line + 1, position.character + 1)
}
