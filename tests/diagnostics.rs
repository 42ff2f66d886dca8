//! Diagnostics computed by the engine after a bulk scan and after
//! incremental updates.

mod common;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Url};

use anchor_language_server::config::AnchorSettings;
use anchor_language_server::index::diagnostics::DIAGNOSTIC_SOURCE;
use anchor_language_server::lsp::engine::AnchorEngine;

use common::{MemorySearch, uri, workspace_folder};

async fn engine_with(settings: AnchorSettings, files: &[(&str, &str)]) -> AnchorEngine {
    let engine = AnchorEngine::with_search(MemorySearch::new(files));
    engine.init(settings, vec![workspace_folder()]).await.unwrap();
    engine
}

fn messages(diagnostics: &std::collections::HashMap<Url, Vec<Diagnostic>>, file: &str) -> Vec<String> {
    diagnostics
        .get(&uri(file))
        .map(|d| d.iter().map(|d| d.message.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_clean_workspace_has_empty_entries() {
    let engine = engine_with(
        AnchorSettings::default(),
        &[("a.md", "[[target]]"), ("b.md", "[[@target]]")],
    )
    .await;

    let diagnostics = engine.refresh_diagnostics().await;
    assert_eq!(diagnostics.len(), 2, "every file with anchors gets an entry");
    assert!(diagnostics.values().all(Vec::is_empty));
}

#[tokio::test]
async fn test_duplicate_definitions_reported_at_each_site() {
    let engine = engine_with(
        AnchorSettings::default(),
        &[("a.md", "[[dup]]"), ("b.md", "\n[[dup]]"), ("c.md", "[[@dup]]")],
    )
    .await;

    let diagnostics = engine.refresh_diagnostics().await;
    assert_eq!(
        messages(&diagnostics, "a.md"),
        vec!["duplicate definition: dup, also defined at b.md:2:1"]
    );
    assert_eq!(
        messages(&diagnostics, "b.md"),
        vec!["duplicate definition: dup, also defined at a.md:1:1"]
    );
    assert!(messages(&diagnostics, "c.md").is_empty());

    let first = &diagnostics[&uri("a.md")][0];
    assert_eq!(first.source.as_deref(), Some(DIAGNOSTIC_SOURCE));
    assert_eq!(first.severity, Some(DiagnosticSeverity::WARNING));
    let related = first.related_information.as_ref().unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].location.uri, uri("b.md"));
}

#[tokio::test]
async fn test_undefined_and_unused() {
    let engine = engine_with(
        AnchorSettings::default(),
        &[("a.md", "[[lonely]] [[@missing]]")],
    )
    .await;

    let diagnostics = engine.refresh_diagnostics().await;
    assert_eq!(
        messages(&diagnostics, "a.md"),
        vec!["unused definition: lonely", "undefined reference: missing"]
    );
}

#[tokio::test]
async fn test_settings_disable_rules_and_set_severity() {
    let settings = AnchorSettings {
        allow_unused_definitions: true,
        report_undefined_references: false,
        report_duplicate_definitions: false,
        diagnostic_severity: 1,
        ..AnchorSettings::default()
    };
    let engine = engine_with(
        settings,
        &[("a.md", "[[lonely]] [[@missing]] [[x]] [[x]]")],
    )
    .await;

    let diagnostics = engine.refresh_diagnostics().await;
    assert!(messages(&diagnostics, "a.md").is_empty());

    let settings = AnchorSettings {
        diagnostic_severity: 1,
        ..AnchorSettings::default()
    };
    engine.apply_settings(settings).unwrap();
    let diagnostics = engine.refresh_diagnostics().await;
    let found = &diagnostics[&uri("a.md")];
    assert!(!found.is_empty());
    assert!(found.iter().all(|d| d.severity == Some(DiagnosticSeverity::ERROR)));
}

#[tokio::test]
async fn test_fixing_a_file_clears_its_diagnostics() {
    let engine = engine_with(
        AnchorSettings::default(),
        &[("a.md", "[[@target]]"), ("b.md", "[[other]] [[@other]]")],
    )
    .await;

    let diagnostics = engine.refresh_diagnostics().await;
    assert_eq!(messages(&diagnostics, "a.md"), vec!["undefined reference: target"]);

    engine.update_file(&uri("a.md"), "plain text").await;
    let diagnostics = engine.refresh_diagnostics().await;
    assert!(
        diagnostics.contains_key(&uri("a.md")),
        "a file that lost its findings must still be published, empty"
    );
    assert!(messages(&diagnostics, "a.md").is_empty());
}

#[tokio::test]
async fn test_diagnostics_follow_incremental_definitions() {
    let engine = engine_with(AnchorSettings::default(), &[("a.md", "[[@target]]")]).await;

    engine.update_file(&uri("b.md"), "[[target]]").await;
    let diagnostics = engine.refresh_diagnostics().await;
    assert!(messages(&diagnostics, "a.md").is_empty());
    assert!(messages(&diagnostics, "b.md").is_empty());

    engine.update_file(&uri("b.md"), "").await;
    let diagnostics = engine.refresh_diagnostics().await;
    assert_eq!(messages(&diagnostics, "a.md"), vec!["undefined reference: target"]);
    assert!(messages(&diagnostics, "b.md").is_empty());
}
