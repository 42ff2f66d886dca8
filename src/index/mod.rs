//! Bidirectional anchor index
//!
//! The index keeps every anchor twice: once under its file and once under its
//! name, separately for definitions and references. Both copies are inserted
//! and removed together, so for every name `n` and file `f` an anchor appears
//! in `name2defs[n]` with file `f` exactly when it appears in `uri2defs[f]`
//! with name `n` (and likewise for references).
//!
//! Per-file lists are kept sorted by start position, which lets position
//! queries use binary search. Per-name lists keep insertion order: the first
//! definition recorded for a name is the one navigation resolves to.
//!
//! Diagnostics live here as well. Their per-file entries are replaced, never
//! removed, so a file whose findings disappear is still reported with an
//! empty list and the host can clear what it showed before.

pub mod diagnostics;

use std::collections::HashMap;

use rustc_hash::{FxHashMap, FxHashSet};
use tower_lsp::lsp_types::{Diagnostic, Position, Url};
use tracing::trace;

use crate::scanner::pattern::PatternSet;
use crate::scanner::{Anchor, Kind, ScanResult, position_key, scan_text};

/// An anchor together with the file it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorLocation {
    pub uri: Url,
    pub anchor: Anchor,
}

#[derive(Debug, Default)]
pub struct AnchorIndex {
    name2defs: FxHashMap<String, Vec<AnchorLocation>>,
    uri2defs: FxHashMap<Url, Vec<Anchor>>,
    name2refs: FxHashMap<String, Vec<AnchorLocation>>,
    uri2refs: FxHashMap<Url, Vec<Anchor>>,
    diagnostics: HashMap<Url, Vec<Diagnostic>>,
}

impl AnchorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn maps_mut(
        &mut self,
        kind: Kind,
    ) -> (
        &mut FxHashMap<Url, Vec<Anchor>>,
        &mut FxHashMap<String, Vec<AnchorLocation>>,
    ) {
        match kind {
            Kind::Definition => (&mut self.uri2defs, &mut self.name2defs),
            Kind::Reference => (&mut self.uri2refs, &mut self.name2refs),
        }
    }

    /// Record an anchor under both its file and its name.
    ///
    /// Appending in document order is O(1); out-of-order inserts shift the
    /// tail of the file's list to keep it sorted.
    pub fn insert(&mut self, uri: &Url, kind: Kind, anchor: Anchor) {
        let (by_uri, by_name) = self.maps_mut(kind);

        let file_anchors = by_uri.entry(uri.clone()).or_default();
        let key = anchor.start_key();
        let at = file_anchors.partition_point(|a| a.start_key() <= key);
        file_anchors.insert(at, anchor.clone());

        by_name
            .entry(anchor.name.clone())
            .or_default()
            .push(AnchorLocation {
                uri: uri.clone(),
                anchor,
            });
    }

    pub fn insert_all(&mut self, results: impl IntoIterator<Item = ScanResult>) {
        for result in results {
            self.insert(&result.uri, result.kind, result.anchor);
        }
    }

    /// Remove every anchor recorded for `uri`. Anchors of other files that
    /// share a name are untouched.
    pub fn clear_file(&mut self, uri: &Url) {
        for kind in [Kind::Definition, Kind::Reference] {
            let (by_uri, by_name) = self.maps_mut(kind);
            let Some(anchors) = by_uri.remove(uri) else {
                continue;
            };
            let names: FxHashSet<&str> = anchors.iter().map(|a| a.name.as_str()).collect();
            for name in names {
                if let Some(bucket) = by_name.get_mut(name) {
                    bucket.retain(|location| &location.uri != uri);
                    if bucket.is_empty() {
                        by_name.remove(name);
                    }
                }
            }
        }
    }

    /// Drop all anchors. Diagnostic entries are kept but emptied so that the
    /// next publish clears them on the host.
    pub fn clear_all(&mut self) {
        self.name2defs.clear();
        self.uri2defs.clear();
        self.name2refs.clear();
        self.uri2refs.clear();
        for diagnostics in self.diagnostics.values_mut() {
            diagnostics.clear();
        }
    }

    /// Replace the anchors of one file with a fresh scan of `text`.
    ///
    /// Callers hold the index exclusively for the duration, so no reader sees
    /// the file between the clear and the re-insert.
    pub fn update_file(&mut self, uri: &Url, text: &str, patterns: &PatternSet) {
        self.clear_file(uri);
        let results = scan_text(text, &patterns.definition, &patterns.reference);
        trace!("Re-scanned {}: {} anchors", uri, results.len());
        for (kind, anchor) in results {
            self.insert(uri, kind, anchor);
        }
    }

    pub fn definitions_named(&self, name: &str) -> &[AnchorLocation] {
        self.name2defs.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn references_named(&self, name: &str) -> &[AnchorLocation] {
        self.name2refs.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// The definition navigation resolves `name` to.
    pub fn first_definition(&self, name: &str) -> Option<&AnchorLocation> {
        self.definitions_named(name).first()
    }

    pub fn definitions_in(&self, uri: &Url) -> &[Anchor] {
        self.uri2defs.get(uri).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn references_in(&self, uri: &Url) -> &[Anchor] {
        self.uri2refs.get(uri).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn anchors_in(&self, uri: &Url, kind: Kind) -> &[Anchor] {
        match kind {
            Kind::Definition => self.definitions_in(uri),
            Kind::Reference => self.references_in(uri),
        }
    }

    /// Both kinds for one file, merged in document order.
    pub fn all_anchors_in(&self, uri: &Url) -> Vec<(Kind, &Anchor)> {
        let mut merged: Vec<(Kind, &Anchor)> = self
            .definitions_in(uri)
            .iter()
            .map(|a| (Kind::Definition, a))
            .chain(self.references_in(uri).iter().map(|a| (Kind::Reference, a)))
            .collect();
        merged.sort_by_key(|(_, a)| a.start_key());
        merged
    }

    pub fn definition_at(&self, uri: &Url, position: Position) -> Option<&Anchor> {
        anchor_at(self.definitions_in(uri), position)
    }

    pub fn reference_at(&self, uri: &Url, position: Position) -> Option<&Anchor> {
        anchor_at(self.references_in(uri), position)
    }

    /// Whichever definition or reference encloses `position`, preferring the
    /// one that starts first.
    pub fn anchor_at(&self, uri: &Url, position: Position) -> Option<(Kind, &Anchor)> {
        let definition = self.definition_at(uri, position).map(|a| (Kind::Definition, a));
        let reference = self.reference_at(uri, position).map(|a| (Kind::Reference, a));
        match (definition, reference) {
            (Some(d), Some(r)) => Some(if r.1.start_key() < d.1.start_key() { r } else { d }),
            (d, r) => d.or(r),
        }
    }

    /// Every defined name with its definitions, in no particular order.
    pub fn definitions(&self) -> impl Iterator<Item = (&str, &[AnchorLocation])> {
        self.name2defs.iter().map(|(name, defs)| (name.as_str(), defs.as_slice()))
    }

    pub fn references(&self) -> impl Iterator<Item = (&str, &[AnchorLocation])> {
        self.name2refs.iter().map(|(name, refs)| (name.as_str(), refs.as_slice()))
    }

    /// Files that currently hold at least one anchor.
    pub fn files(&self) -> FxHashSet<&Url> {
        self.uri2defs.keys().chain(self.uri2refs.keys()).collect()
    }

    pub fn definition_count(&self) -> usize {
        self.uri2defs.values().map(Vec::len).sum()
    }

    pub fn reference_count(&self) -> usize {
        self.uri2refs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.uri2defs.is_empty() && self.uri2refs.is_empty()
    }

    pub fn diagnostics(&self) -> &HashMap<Url, Vec<Diagnostic>> {
        &self.diagnostics
    }

    /// Install a freshly computed diagnostic set. Files missing from
    /// `computed` but known from an earlier round are set to empty.
    pub fn replace_diagnostics(&mut self, mut computed: HashMap<Url, Vec<Diagnostic>>) {
        for (uri, diagnostics) in self.diagnostics.iter_mut() {
            *diagnostics = computed.remove(uri).unwrap_or_default();
        }
        self.diagnostics.extend(computed);
    }

    /// Check that the file-keyed and name-keyed maps mirror each other.
    pub fn is_consistent(&self) -> bool {
        mirrors(&self.uri2defs, &self.name2defs) && mirrors(&self.uri2refs, &self.name2refs)
    }
}

fn mirrors(
    by_uri: &FxHashMap<Url, Vec<Anchor>>,
    by_name: &FxHashMap<String, Vec<AnchorLocation>>,
) -> bool {
    let from_files: usize = by_uri.values().map(Vec::len).sum();
    let from_names: usize = by_name.values().map(Vec::len).sum();
    if from_files != from_names {
        return false;
    }

    let no_empty_buckets =
        by_uri.values().all(|v| !v.is_empty()) && by_name.values().all(|v| !v.is_empty());

    let names_backed_by_files = by_name.iter().all(|(name, locations)| {
        locations.iter().all(|location| {
            &location.anchor.name == name
                && by_uri
                    .get(&location.uri)
                    .is_some_and(|anchors| anchors.contains(&location.anchor))
        })
    });

    let files_backed_by_names = by_uri.iter().all(|(uri, anchors)| {
        anchors.iter().all(|anchor| {
            by_name.get(&anchor.name).is_some_and(|locations| {
                locations
                    .iter()
                    .any(|l| &l.uri == uri && &l.anchor == anchor)
            })
        })
    });

    no_empty_buckets && names_backed_by_files && files_backed_by_names
}

/// Find the anchor enclosing `position` in a list sorted by start. Anchors of
/// one kind never overlap, but two may touch; the earlier one wins then.
pub fn anchor_at(anchors: &[Anchor], position: Position) -> Option<&Anchor> {
    let key = position_key(position);
    let upper = anchors.partition_point(|a| a.start_key() <= key);
    anchors[..upper]
        .iter()
        .rev()
        .take(2)
        .filter(|a| a.contains(position))
        .last()
}
