//! Property tests for the anchor index.
//!
//! Documents are generated from a small vocabulary of anchor tokens and filler
//! text (including non-ASCII characters so UTF-16 columns differ from byte
//! offsets). The properties check that incremental updates agree with a
//! fresh scan, that updates are idempotent, that the two index views never
//! drift apart, and that the bulk scan path builds the same index as the
//! per-file path.

mod common;

use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};
use tower_lsp::lsp_types::Url;

use anchor_language_server::config::AnchorSettings;
use anchor_language_server::index::AnchorIndex;
use anchor_language_server::scanner::{Kind, PatternSet, scan_folder, scan_text};

use common::{MemorySearch, uri, workspace_folder};

const TOKENS: &[&str] = &[
    "[[alpha]]",
    "[[@alpha]]",
    "[[beta]]",
    "[[@beta]]",
    "[[@gamma]]",
    "[[naïve]]",
    "[[@naïve]]",
    "[[🎉 party]]",
    "[[@🎉 party]]",
    "see ",
    "text",
    " ",
    "é",
    "😀",
    "[",
    "]",
];

const FILES: &[&str] = &["a.md", "b.md", "docs/c.md"];

#[derive(Debug, Clone)]
struct AnchorDoc(String);

impl Arbitrary for AnchorDoc {
    fn arbitrary(g: &mut Gen) -> Self {
        let line_count = usize::arbitrary(g) % 6;
        let lines: Vec<String> = (0..line_count)
            .map(|_| {
                let token_count = usize::arbitrary(g) % 8;
                (0..token_count)
                    .filter_map(|_| g.choose(TOKENS).copied())
                    .collect()
            })
            .collect();
        AnchorDoc(lines.join("\n"))
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let lines: Vec<String> = self.0.split('\n').map(str::to_string).collect();
        if lines.len() <= 1 {
            return Box::new(std::iter::empty());
        }
        let shrunk: Vec<AnchorDoc> = (0..lines.len())
            .map(|skip| {
                let kept: Vec<&str> = lines
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != skip)
                    .map(|(_, l)| l.as_str())
                    .collect();
                AnchorDoc(kept.join("\n"))
            })
            .collect();
        Box::new(shrunk.into_iter())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Update(usize, AnchorDoc),
    Clear(usize),
    ClearAll,
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        let file = usize::arbitrary(g) % FILES.len();
        match u8::arbitrary(g) % 8 {
            0 => Op::ClearAll,
            1 | 2 => Op::Clear(file),
            _ => Op::Update(file, AnchorDoc::arbitrary(g)),
        }
    }
}

fn patterns() -> PatternSet {
    PatternSet::from_settings(&AnchorSettings::default()).unwrap()
}

/// Every anchor in the index as a sortable tuple, so two indexes can be
/// compared regardless of hash map iteration order.
fn snapshot(index: &AnchorIndex) -> Vec<(String, String, String, (u32, u32, u32, u32))> {
    let mut out = Vec::new();
    for (label, locations) in index
        .definitions()
        .map(|(n, l)| (format!("def:{}", n), l))
        .chain(index.references().map(|(n, l)| (format!("ref:{}", n), l)))
    {
        for location in locations {
            let r = location.anchor.name_range;
            out.push((
                label.clone(),
                location.uri.to_string(),
                location.anchor.name.clone(),
                (r.start.line, r.start.character, r.end.line, r.end.character),
            ));
        }
    }
    out.sort();
    out
}

#[test]
fn prop_update_matches_fresh_scan() {
    fn prop(doc: AnchorDoc) -> TestResult {
        let patterns = patterns();
        let file = uri("a.md");
        let mut index = AnchorIndex::new();
        index.update_file(&file, &doc.0, &patterns);

        let scanned = scan_text(&doc.0, &patterns.definition, &patterns.reference);
        let expected = |kind: Kind| -> Vec<_> {
            scanned
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, a)| a.clone())
                .collect()
        };

        TestResult::from_bool(
            index.definitions_in(&file) == expected(Kind::Definition).as_slice()
                && index.references_in(&file) == expected(Kind::Reference).as_slice(),
        )
    }

    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(AnchorDoc) -> TestResult);
}

#[test]
fn prop_update_is_idempotent() {
    fn prop(first: AnchorDoc, second: AnchorDoc) -> TestResult {
        let patterns = patterns();
        let file = uri("a.md");
        let other = uri("b.md");

        let mut once = AnchorIndex::new();
        once.update_file(&other, &first.0, &patterns);
        once.update_file(&file, &second.0, &patterns);

        let mut twice = AnchorIndex::new();
        twice.update_file(&other, &first.0, &patterns);
        twice.update_file(&file, &first.0, &patterns);
        twice.update_file(&file, &second.0, &patterns);
        twice.update_file(&file, &second.0, &patterns);

        TestResult::from_bool(snapshot(&once) == snapshot(&twice))
    }

    QuickCheck::new()
        .tests(300)
        .quickcheck(prop as fn(AnchorDoc, AnchorDoc) -> TestResult);
}

#[test]
fn prop_views_stay_consistent() {
    fn prop(ops: Vec<Op>) -> TestResult {
        let patterns = patterns();
        let uris: Vec<Url> = FILES.iter().map(|f| uri(f)).collect();
        let mut index = AnchorIndex::new();

        for op in ops {
            match op {
                Op::Update(file, doc) => index.update_file(&uris[file], &doc.0, &patterns),
                Op::Clear(file) => index.clear_file(&uris[file]),
                Op::ClearAll => index.clear_all(),
            }
            if !index.is_consistent() {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }

    QuickCheck::new()
        .tests(300)
        .quickcheck(prop as fn(Vec<Op>) -> TestResult);
}

#[test]
fn prop_clear_file_leaves_other_files_alone() {
    fn prop(a: AnchorDoc, b: AnchorDoc) -> TestResult {
        let patterns = patterns();
        let (file_a, file_b) = (uri("a.md"), uri("b.md"));

        let mut only_b = AnchorIndex::new();
        only_b.update_file(&file_b, &b.0, &patterns);

        let mut both = AnchorIndex::new();
        both.update_file(&file_a, &a.0, &patterns);
        both.update_file(&file_b, &b.0, &patterns);
        both.clear_file(&file_a);

        TestResult::from_bool(
            snapshot(&only_b) == snapshot(&both)
                && both.definitions_in(&file_a).is_empty()
                && both.references_in(&file_a).is_empty(),
        )
    }

    QuickCheck::new()
        .tests(300)
        .quickcheck(prop as fn(AnchorDoc, AnchorDoc) -> TestResult);
}

#[test]
fn prop_bulk_scan_agrees_with_file_scan() {
    fn prop(docs: Vec<AnchorDoc>) -> TestResult {
        let patterns = patterns();
        let files: Vec<(&str, &str)> = FILES
            .iter()
            .zip(docs.iter())
            .map(|(f, d)| (*f, d.0.as_str()))
            .collect();
        let search = MemorySearch::new(&files);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let results = runtime.block_on(scan_folder(search.as_ref(), &workspace_folder(), &patterns));

        let mut bulk = AnchorIndex::new();
        bulk.insert_all(results);

        let mut incremental = AnchorIndex::new();
        for (file, text) in &files {
            incremental.update_file(&uri(file), text, &patterns);
        }

        TestResult::from_bool(bulk.is_consistent() && snapshot(&bulk) == snapshot(&incremental))
    }

    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(Vec<AnchorDoc>) -> TestResult);
}
