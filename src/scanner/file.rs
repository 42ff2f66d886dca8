//! In-process line scanner
//!
//! Anchors never span lines, so text is split on `\n` and every line is
//! matched independently. Columns are reported in UTF-16 code units.

use tracing::trace;

use super::pattern::AnchorPattern;
use super::{Anchor, ColumnMapper, Kind, single_line_range};

/// Scan a single line. The name of each anchor is its first capture group;
/// matches whose first group is missing or empty are skipped.
pub fn scan_line(line: &str, line_index: u32, pattern: &AnchorPattern) -> Vec<Anchor> {
    let mut columns = ColumnMapper::new(line);
    let mut anchors = Vec::new();

    for m in pattern.matches(line) {
        let Some(name) = m.name.filter(|name| !name.is_empty()) else {
            trace!(
                "Skipping {} match without a name on line {}: {:?}",
                pattern.role(),
                line_index,
                &line[m.whole.clone()]
            );
            continue;
        };

        let start = columns.column(m.whole.start);
        let name_start = columns.column(name.start);
        let name_end = columns.column(name.end);
        let end = columns.column(m.whole.end);

        anchors.push(Anchor {
            name: line[name].to_string(),
            range: single_line_range(line_index, start, end),
            name_range: single_line_range(line_index, name_start, name_end),
        });
    }

    anchors
}

/// Scan a whole text. Within a line, definitions come before references;
/// within one kind, anchors are in document order.
pub fn scan_text(
    text: &str,
    definition: &AnchorPattern,
    reference: &AnchorPattern,
) -> Vec<(Kind, Anchor)> {
    let mut results = Vec::new();
    for (line_index, line) in text.split('\n').enumerate() {
        let line_index = line_index as u32;
        results.extend(
            scan_line(line, line_index, definition)
                .into_iter()
                .map(|anchor| (Kind::Definition, anchor)),
        );
        results.extend(
            scan_line(line, line_index, reference)
                .into_iter()
                .map(|anchor| (Kind::Reference, anchor)),
        );
    }
    results
}
