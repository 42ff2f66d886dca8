//! Hover cards for anchors
//!
//! A definition shows its name. A reference shows its name and where it is
//! defined, with a link that jumps to the definition, or a note that it is
//! not defined anywhere.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Url};

use crate::index::AnchorIndex;
use crate::paths::{position_link, relative_path};
use crate::scanner::Kind;

fn markdown(sections: &[Vec<String>]) -> String {
    sections
        .iter()
        .map(|lines| lines.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn quoted(name: &str) -> String {
    serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name))
}

pub fn hover(index: &AnchorIndex, uri: &Url, position: Position, folders: &[Url]) -> Option<Hover> {
    let (kind, anchor) = index.anchor_at(uri, position)?;
    let title = vec!["```".to_string(), quoted(&anchor.name), "```".to_string()];

    let sections = match kind {
        Kind::Definition => vec![title, vec!["Anchor definition.".to_string()]],
        Kind::Reference => match index.first_definition(&anchor.name) {
            Some(def) => vec![
                title,
                vec![format!(
                    "From: [{}]({}).",
                    relative_path(&def.uri, folders),
                    def.uri
                )],
                vec![format!(
                    "Anchor reference. [Go to definition]({}).",
                    position_link(&def.uri, def.anchor.range.start)
                )],
            ],
            None => vec![
                title,
                vec![format!("The anchor for {} is not defined", quoted(&anchor.name))],
                vec!["Anchor reference.".to_string()],
            ],
        },
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown(&sections),
        }),
        range: Some(anchor.range),
    })
}
