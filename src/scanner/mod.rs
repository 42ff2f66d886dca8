//! Anchor scanning
//!
//! Two strategies produce the same [`ScanResult`] records:
//! - [`file`] scans text already in memory, line by line, with the compiled
//!   patterns. Used for every incremental update of a single file.
//! - [`ripgrep`] delegates a whole workspace folder to an external search tool
//!   and translates its matches back into anchors. Used for cold start and
//!   refresh.

pub mod file;
pub mod pattern;
pub mod ripgrep;

use std::fmt;

use tower_lsp::lsp_types::{Position, Range, Url};

pub use file::{scan_line, scan_text};
pub use pattern::{AnchorPattern, PatternRole, PatternSet};
pub use ripgrep::{BulkSearch, RipgrepSearch, SearchMatch, scan_folder};

/// Whether an anchor declares a name or points at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Definition,
    Reference,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Definition => write!(f, "definition"),
            Kind::Reference => write!(f, "reference"),
        }
    }
}

/// A single matched definition or reference.
///
/// `range` covers the whole matched token including delimiters; `name_range`
/// covers only the first capture group. Both are single-line and use UTF-16
/// code unit columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub name: String,
    pub range: Range,
    pub name_range: Range,
}

impl Anchor {
    /// Hit test used by every position query. The end is inclusive so that a
    /// cursor resting right after the closing delimiter still resolves.
    pub fn contains(&self, position: Position) -> bool {
        self.range.start.line == position.line
            && self.range.start.character <= position.character
            && position.character <= self.range.end.character
    }

    pub fn start_key(&self) -> (u32, u32) {
        position_key(self.range.start)
    }
}

/// An anchor tagged with the file it was found in and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub uri: Url,
    pub kind: Kind,
    pub anchor: Anchor,
}

pub fn position_key(position: Position) -> (u32, u32) {
    (position.line, position.character)
}

pub(crate) fn single_line_range(line: u32, start: u32, end: u32) -> Range {
    Range {
        start: Position { line, character: start },
        end: Position { line, character: end },
    }
}

/// Maps byte offsets within one line to UTF-16 columns.
///
/// Offsets are expected in ascending order, which is how matches are
/// produced; a backwards request restarts from the beginning of the line.
pub(crate) struct ColumnMapper<'a> {
    line: &'a str,
    byte: usize,
    column: u32,
}

impl<'a> ColumnMapper<'a> {
    pub(crate) fn new(line: &'a str) -> Self {
        Self { line, byte: 0, column: 0 }
    }

    pub(crate) fn column(&mut self, byte: usize) -> u32 {
        if byte < self.byte {
            self.byte = 0;
            self.column = 0;
        }
        let advanced: usize = self.line[self.byte..byte]
            .chars()
            .map(char::len_utf16)
            .sum();
        self.column += advanced as u32;
        self.byte = byte;
        self.column
    }
}
