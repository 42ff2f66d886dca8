use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, CompletionItemLabelDetails, Url};

use crate::index::AnchorIndex;
use crate::paths::relative_path;
use crate::scanner::AnchorPattern;

/// The partial name typed after the last completion prefix in `line_prefix`
/// (the current line up to the cursor). `None` when no prefix is present.
pub fn typed_name<'a>(line_prefix: &'a str, prefix_pattern: &AnchorPattern) -> Option<&'a str> {
    let last = prefix_pattern.last_match(line_prefix)?;
    Some(&line_prefix[last.end..])
}

/// Definition names starting with the partially typed name, sorted by name.
/// Each item is annotated with the relative path of the name's first
/// definition.
pub fn completion_items(
    index: &AnchorIndex,
    line_prefix: &str,
    prefix_pattern: &AnchorPattern,
    folders: &[Url],
) -> Vec<CompletionItem> {
    let Some(typed) = typed_name(line_prefix, prefix_pattern) else {
        return Vec::new();
    };

    let mut items: Vec<CompletionItem> = index
        .definitions()
        .filter(|(name, _)| name.starts_with(typed))
        .filter_map(|(name, defs)| {
            let first = defs.first()?;
            Some(CompletionItem {
                label: name.to_string(),
                kind: Some(CompletionItemKind::CONSTANT),
                label_details: Some(CompletionItemLabelDetails {
                    detail: None,
                    description: Some(relative_path(&first.uri, folders)),
                }),
                detail: Some("Anchor definition".to_string()),
                filter_text: Some(name.to_string()),
                ..Default::default()
            })
        })
        .collect();
    items.sort_by(|a, b| a.label.cmp(&b.label));
    items
}
