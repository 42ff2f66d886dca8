//! Correctness diagnostics over the anchor index.
//!
//! Computed from scratch on every call. The caller installs the result with
//! [`AnchorIndex::replace_diagnostics`], which gives per-file replace
//! semantics.

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location, Url,
};

use super::{AnchorIndex, AnchorLocation};
use crate::paths::relative_path;

pub const DIAGNOSTIC_SOURCE: &str = "anchor";

/// Which rules run and at what severity. All rules share one severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticSettings {
    pub severity: DiagnosticSeverity,
    pub report_duplicates: bool,
    pub report_undefined: bool,
    pub report_unused: bool,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            severity: DiagnosticSeverity::WARNING,
            report_duplicates: true,
            report_undefined: true,
            report_unused: true,
        }
    }
}

/// Compute every finding for the current index.
///
/// Each file holding at least one anchor gets an entry, empty when nothing
/// is wrong with it. Within a file, diagnostics are ordered by position.
/// `folders` only affects how other locations are rendered in messages.
pub fn compute_diagnostics(
    index: &AnchorIndex,
    settings: &DiagnosticSettings,
    folders: &[Url],
) -> HashMap<Url, Vec<Diagnostic>> {
    let mut out: HashMap<Url, Vec<Diagnostic>> = index
        .files()
        .into_iter()
        .map(|uri| (uri.clone(), Vec::new()))
        .collect();

    let mut emit = |uri: &Url, diagnostic: Diagnostic| {
        out.entry(uri.clone()).or_default().push(diagnostic);
    };

    for (name, defs) in index.definitions() {
        if settings.report_duplicates && defs.len() > 1 {
            for (i, def) in defs.iter().enumerate() {
                let others: Vec<&AnchorLocation> = defs
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| other)
                    .collect();
                emit(&def.uri, duplicate_definition(name, def, &others, settings, folders));
            }
        }

        if settings.report_unused && index.references_named(name).is_empty() {
            for def in defs {
                emit(
                    &def.uri,
                    finding(def, format!("unused definition: {}", name), settings),
                );
            }
        }
    }

    if settings.report_undefined {
        for (name, refs) in index.references() {
            if !index.definitions_named(name).is_empty() {
                continue;
            }
            for reference in refs {
                emit(
                    &reference.uri,
                    finding(reference, format!("undefined reference: {}", name), settings),
                );
            }
        }
    }

    for diagnostics in out.values_mut() {
        diagnostics.sort_by_key(|d| (d.range.start.line, d.range.start.character));
    }
    out
}

fn finding(location: &AnchorLocation, message: String, settings: &DiagnosticSettings) -> Diagnostic {
    Diagnostic {
        range: location.anchor.range,
        severity: Some(settings.severity),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message,
        ..Default::default()
    }
}

fn duplicate_definition(
    name: &str,
    def: &AnchorLocation,
    others: &[&AnchorLocation],
    settings: &DiagnosticSettings,
    folders: &[Url],
) -> Diagnostic {
    let elsewhere: Vec<String> = others
        .iter()
        .map(|other| {
            let start = other.anchor.range.start;
            format!(
                "{}:{}:{}",
                relative_path(&other.uri, folders),
                start.line + 1,
                start.character + 1
            )
        })
        .collect();

    let related = others
        .iter()
        .map(|other| DiagnosticRelatedInformation {
            location: Location::new(other.uri.clone(), other.anchor.range),
            message: format!("also defined here: {}", name),
        })
        .collect();

    Diagnostic {
        related_information: Some(related),
        ..finding(
            def,
            format!("duplicate definition: {}, also defined at {}", name, elsewhere.join(", ")),
            settings,
        )
    }
}
