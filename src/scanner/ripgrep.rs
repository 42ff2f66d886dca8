//! Bulk folder scanning through an external search tool
//!
//! Scanning thousands of files line by line in-process is too slow for a cold
//! start, so whole folders are handed to ripgrep (`rg --json`). Ripgrep reports
//! the whole-match span of every submatch but not capture group offsets, so
//! each reported match is translated back into an [`Anchor`] by re-running the
//! compiled pattern in-process (see [`recover_anchor`]).
//!
//! A missing binary or a timed-out search degrades to an empty result set:
//! the index still initializes and files opened by the host are picked up by
//! the incremental scanner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tower_lsp::lsp_types::Url;
use tracing::{debug, error, info, trace, warn};

use super::pattern::{AnchorPattern, PatternSet};
use super::{Anchor, ColumnMapper, Kind, ScanResult, single_line_range};
use crate::error::{AnchorError, Result};

/// One submatch reported by a bulk search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub path: PathBuf,
    /// 1-based.
    pub line_number: u32,
    /// Full text of the matched line, possibly with its line terminator.
    pub line_text: String,
    pub match_text: String,
    /// Byte offsets of the submatch within `line_text`.
    pub start: usize,
    pub end: usize,
}

/// High-throughput search over a folder.
///
/// Implementations must understand the same regex syntax as the in-process
/// matcher closely enough that re-matching a reported line reproduces the
/// reported span.
#[async_trait::async_trait]
pub trait BulkSearch: Send + Sync {
    async fn search(&self, root: &Path, pattern: &str) -> Result<Vec<SearchMatch>>;

    /// Human-readable name for logging.
    fn backend_name(&self) -> &'static str;
}

/// [`BulkSearch`] backed by the ripgrep executable.
#[derive(Debug, Clone)]
pub struct RipgrepSearch {
    binary: PathBuf,
    timeout: Duration,
}

impl RipgrepSearch {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &crate::config::AnchorSettings) -> Self {
        Self::new(settings.ripgrep_binary(), settings.scan_timeout())
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait::async_trait]
impl BulkSearch for RipgrepSearch {
    async fn search(&self, root: &Path, pattern: &str) -> Result<Vec<SearchMatch>> {
        debug!("Running {:?} --json -e {:?} {:?}", self.binary, pattern, root);

        let child = tokio::process::Command::new(&self.binary)
            .arg("--json")
            .arg("--no-config")
            .arg("--regexp")
            .arg(pattern)
            .arg("--")
            .arg(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AnchorError::SearchUnavailable {
                binary: self.binary.clone(),
                reason: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_elapsed) => {
                return Err(AnchorError::SearchTimeout {
                    root: root.to_path_buf(),
                    timeout: self.timeout,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("ripgrep stderr while scanning {}: {}", root.display(), stderr.trim());
        }

        // Exit code 1 means "no matches"; 2 means an error occurred, but
        // ripgrep still prints whatever it found before that.
        match output.status.code() {
            Some(0) | Some(1) => {}
            Some(2) if !output.stdout.is_empty() => {
                warn!("ripgrep reported errors in {}, keeping partial results", root.display());
            }
            _ => {
                return Err(AnchorError::SearchFailed {
                    root: root.to_path_buf(),
                    message: format!("ripgrep exited with {}", output.status),
                });
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_json_output(&stdout, root))
    }

    fn backend_name(&self) -> &'static str {
        "ripgrep"
    }
}

#[derive(Deserialize)]
struct RgMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct RgText {
    text: Option<String>,
}

#[derive(Deserialize)]
struct RgMatch {
    path: RgText,
    lines: RgText,
    line_number: Option<u32>,
    submatches: Vec<RgSubmatch>,
}

#[derive(Deserialize)]
struct RgSubmatch {
    #[serde(rename = "match")]
    matched: RgText,
    start: usize,
    end: usize,
}

/// Decode `rg --json` output. Only `match` messages are used; entries whose
/// path or line is not valid UTF-8 (reported by ripgrep as base64 `bytes`)
/// are skipped. Relative paths are resolved against `root`.
pub fn parse_json_output(output: &str, root: &Path) -> Vec<SearchMatch> {
    let mut matches = Vec::new();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let message: RgMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping malformed ripgrep output line ({}): {}", e, line);
                continue;
            }
        };
        if message.kind != "match" {
            continue;
        }
        let data: RgMatch = match serde_json::from_value(message.data) {
            Ok(data) => data,
            Err(e) => {
                warn!("Skipping malformed ripgrep match ({})", e);
                continue;
            }
        };

        let (Some(path), Some(line_text), Some(line_number)) =
            (data.path.text, data.lines.text, data.line_number)
        else {
            trace!("Skipping ripgrep match with non-UTF-8 path or line");
            continue;
        };
        let path = if Path::new(&path).is_absolute() {
            PathBuf::from(path)
        } else {
            root.join(path)
        };

        for submatch in data.submatches {
            let Some(match_text) = submatch.matched.text else {
                continue;
            };
            matches.push(SearchMatch {
                path: path.clone(),
                line_number,
                line_text: line_text.clone(),
                match_text,
                start: submatch.start,
                end: submatch.end,
            });
        }
    }

    matches
}

/// Translate one external match back into an anchor.
///
/// The line is re-matched in full first and the capture whose whole-match
/// span equals the reported span is used, which keeps context-sensitive
/// constructs (`^`, `\b`, lookbehind-like prefixes) honest. If no match lines
/// up, the reported substring is re-matched on its own and accepted only when
/// the pattern covers it completely. Anything else is dropped: a wrong name
/// span is worse than a missing anchor.
pub fn recover_anchor(
    line_text: &str,
    line_index: u32,
    start: usize,
    end: usize,
    pattern: &AnchorPattern,
) -> Option<Anchor> {
    let line = line_text.strip_suffix('\n').unwrap_or(line_text);
    if start > end
        || end > line.len()
        || !line.is_char_boundary(start)
        || !line.is_char_boundary(end)
    {
        return None;
    }

    let name = pattern
        .matches(line)
        .into_iter()
        .find(|m| m.whole == (start..end))
        .and_then(|m| m.name)
        .or_else(|| {
            let substring = &line[start..end];
            pattern
                .matches(substring)
                .into_iter()
                .find(|m| m.whole == (0..substring.len()))
                .and_then(|m| m.name)
                .map(|name| name.start + start..name.end + start)
        })
        .filter(|name| !name.is_empty())?;

    let mut columns = ColumnMapper::new(line);
    let range_start = columns.column(start);
    let name_start = columns.column(name.start);
    let name_end = columns.column(name.end);
    let range_end = columns.column(end);

    Some(Anchor {
        name: line[name].to_string(),
        range: single_line_range(line_index, range_start, range_end),
        name_range: single_line_range(line_index, name_start, name_end),
    })
}

fn to_scan_results(matches: Vec<SearchMatch>, kind: Kind, pattern: &AnchorPattern) -> Vec<ScanResult> {
    let mut results = Vec::with_capacity(matches.len());
    for m in matches {
        let Ok(uri) = Url::from_file_path(&m.path) else {
            warn!("Cannot convert {} to a file uri", m.path.display());
            continue;
        };
        let line_index = m.line_number.saturating_sub(1);
        match recover_anchor(&m.line_text, line_index, m.start, m.end, pattern) {
            Some(anchor) => results.push(ScanResult { uri, kind, anchor }),
            None => warn!(
                "Could not recover {} name from {:?} at {}:{}; the search backend and the pattern disagree",
                kind, m.match_text, m.path.display(), m.line_number
            ),
        }
    }
    results
}

async fn search_kind(
    search: &dyn BulkSearch,
    root: &Path,
    kind: Kind,
    pattern: &AnchorPattern,
) -> Vec<ScanResult> {
    match search.search(root, pattern.source()).await {
        Ok(matches) => to_scan_results(matches, kind, pattern),
        Err(e) if e.is_backend_unavailable() => {
            warn!("Bulk {} scan of {} skipped: {}", kind, root.display(), e);
            Vec::new()
        }
        Err(e) => {
            error!("Bulk {} scan of {} failed: {}", kind, root.display(), e);
            Vec::new()
        }
    }
}

/// Scan a workspace folder for definitions and references. The two searches
/// run concurrently. Failures are logged and yield no results.
pub async fn scan_folder(
    search: &dyn BulkSearch,
    folder: &Url,
    patterns: &PatternSet,
) -> Vec<ScanResult> {
    let Ok(root) = folder.to_file_path() else {
        warn!("Workspace folder {} is not a local path, skipping bulk scan", folder);
        return Vec::new();
    };

    let (mut definitions, references) = tokio::join!(
        search_kind(search, &root, Kind::Definition, &patterns.definition),
        search_kind(search, &root, Kind::Reference, &patterns.reference),
    );

    info!(
        "Bulk scan of {} via {}: {} definitions, {} references",
        folder,
        search.backend_name(),
        definitions.len(),
        references.len()
    );

    definitions.extend(references);
    definitions
}
