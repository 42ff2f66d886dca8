//! Engine lifecycle: initialization, refresh, settings changes, degraded
//! operation without a bulk search backend, and teardown.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tower_lsp::lsp_types::Url;

use anchor_language_server::config::AnchorSettings;
use anchor_language_server::error::AnchorError;
use anchor_language_server::lsp::engine::{AnchorEngine, EngineState};

use common::{MemoryDocuments, MemorySearch, SlowSearch, UnavailableSearch, uri, workspace_folder};

#[tokio::test]
async fn test_init_indexes_every_folder() {
    let search = MemorySearch::new(&[("a.md", "[[one]] [[@two]]"), ("sub/b.md", "[[two]]")]);
    let engine = AnchorEngine::with_search(search.clone());
    assert_eq!(engine.state(), EngineState::Uninitialized);

    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();

    assert_eq!(engine.state(), EngineState::Ready);
    // One search per kind per folder.
    assert_eq!(search.calls.load(Ordering::SeqCst), 2);

    let index = engine.index().await;
    assert_eq!(index.definition_count(), 2);
    assert_eq!(index.reference_count(), 1);
    assert_eq!(index.definitions_in(&uri("sub/b.md")).len(), 1);
}

#[tokio::test]
async fn test_unavailable_backend_degrades_to_incremental_only() {
    let engine = AnchorEngine::with_search(Arc::new(UnavailableSearch));

    let result = engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await;
    assert!(result.is_ok(), "a missing search tool must not fail init");
    assert_eq!(engine.state(), EngineState::Ready);
    assert!(engine.index().await.is_empty());

    assert!(engine.update_file(&uri("a.md"), "[[local]]").await);
    assert_eq!(engine.index().await.definitions_named("local").len(), 1);
}

#[tokio::test]
async fn test_missing_ripgrep_binary_degrades() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.md"), "[[on disk]]").unwrap();
    let folder = Url::from_directory_path(dir.path()).unwrap();

    let settings = AnchorSettings {
        ripgrep_path: Some(dir.path().join("no-such-rg")),
        ..AnchorSettings::default()
    };
    let engine = AnchorEngine::new();
    engine.init(settings, vec![folder]).await.unwrap();

    assert_eq!(engine.search_backend(), "ripgrep");
    assert!(engine.index().await.is_empty());

    let file = Url::from_file_path(dir.path().join("a.md")).unwrap();
    assert!(engine.update_file(&file, "[[on disk]]").await);
    assert_eq!(engine.index().await.definitions_named("on disk").len(), 1);
}

#[tokio::test]
async fn test_invalid_settings_at_init_leave_engine_without_patterns() {
    let search = MemorySearch::new(&[("a.md", "[[one]]")]);
    let engine = AnchorEngine::with_search(search);

    let settings = AnchorSettings {
        definition_pattern: "[[(unclosed".to_string(),
        ..AnchorSettings::default()
    };
    let err = engine
        .init(settings, vec![workspace_folder()])
        .await
        .unwrap_err();
    assert!(matches!(err, AnchorError::InvalidPattern { .. }), "got {:?}", err);

    assert!(engine.patterns().is_none());
    assert!(engine.index().await.is_empty());
    assert!(!engine.update_file(&uri("a.md"), "[[one]]").await);
}

#[tokio::test]
async fn test_invalid_settings_keep_previous_patterns() {
    let search = MemorySearch::new(&[("a.md", "<<one>> [[two]]")]);
    let engine = AnchorEngine::with_search(search);
    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();
    assert_eq!(engine.index().await.definitions_named("two").len(), 1);

    let missing_group = AnchorSettings {
        definition_pattern: "<<[a-z]+>>".to_string(),
        ..AnchorSettings::default()
    };
    let err = engine.apply_settings(missing_group).unwrap_err();
    assert!(matches!(err, AnchorError::MissingNameGroup { .. }), "got {:?}", err);
    assert_eq!(engine.settings(), AnchorSettings::default());

    engine.refresh().await;
    assert_eq!(engine.index().await.definitions_named("two").len(), 1);

    let angle = AnchorSettings {
        definition_pattern: "<<([a-z]+)>>".to_string(),
        ..AnchorSettings::default()
    };
    engine.apply_settings(angle).unwrap();
    engine.refresh().await;

    let index = engine.index().await;
    assert_eq!(index.definitions_named("one").len(), 1);
    assert!(index.definitions_named("two").is_empty());
}

#[tokio::test]
async fn test_refresh_replaces_index_and_applies_overlay() {
    let search = MemorySearch::new(&[("a.md", "[[old]]"), ("b.md", "[[@old]]")]);
    let engine = AnchorEngine::with_search(search.clone());
    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();

    search.write("a.md", "[[new]]");
    // b.md is open in the editor with unsaved content.
    let documents = MemoryDocuments::new(search);
    documents.open("b.md", "[[@new]] [[@new]]");
    let total = engine.refresh_with(&documents).await;
    assert_eq!(total, 3);

    let index = engine.index().await;
    assert!(index.definitions_named("old").is_empty());
    assert!(index.references_named("old").is_empty());
    assert_eq!(index.references_named("new").len(), 2);
    assert!(index.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_refresh_is_not_rolled_back() {
    let files = MemorySearch::new(&[("a.md", "[[v0]]")]);
    let search = Arc::new(SlowSearch {
        inner: files.clone(),
        delay: Duration::from_millis(200),
    });
    let engine = Arc::new(AnchorEngine::with_search(search));
    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();
    let documents = Arc::new(MemoryDocuments::new(files));
    documents.open("a.md", "[[v1]]");

    let refresh = {
        let (engine, documents) = (Arc::clone(&engine), Arc::clone(&documents));
        tokio::spawn(async move { engine.refresh_with(&*documents).await })
    };

    // The buffer moves on and its debounced update lands mid-scan.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!refresh.is_finished());
    documents.open("a.md", "[[v2]]");
    assert!(engine.update_file(&uri("a.md"), "[[v2]]").await);

    assert_eq!(refresh.await.unwrap(), 1);
    let index = engine.index().await;
    assert_eq!(index.definitions_named("v2").len(), 1);
    assert!(index.definitions_named("v1").is_empty());
    assert!(index.definitions_named("v0").is_empty());
}

#[tokio::test]
async fn test_concurrent_refreshes_settle_on_one_index() {
    let search = MemorySearch::new(&[("a.md", "[[x]] [[@x]]"), ("b.md", "[[y]]")]);
    let engine = Arc::new(AnchorEngine::with_search(search));
    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.refresh().await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 3);
    }

    let index = engine.index().await;
    assert_eq!(index.definition_count(), 2);
    assert_eq!(index.reference_count(), 1);
    assert!(index.is_consistent());
}

#[tokio::test]
async fn test_definition_tree_skips_duplicates() {
    let search = MemorySearch::new(&[
        ("a.md", "[[beta]] [[alpha]] [[dup]]"),
        ("b.md", "[[dup]] [[@alpha]] [[@alpha]]"),
    ]);
    let engine = AnchorEngine::with_search(search);
    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();

    let tree = engine.definition_tree().await;
    let names: Vec<&str> = tree.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert_eq!(tree[0].uri, uri("a.md"));
    assert_eq!(tree[0].refs.len(), 2);
    assert!(tree[1].refs.is_empty());
}

#[tokio::test]
async fn test_teardown_resets_and_allows_reinit() {
    let search = MemorySearch::new(&[("a.md", "[[one]]")]);
    let engine = AnchorEngine::with_search(search);
    let mut state = engine.subscribe();

    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();
    state.changed().await.unwrap();
    assert_eq!(*state.borrow_and_update(), EngineState::Ready);

    engine.teardown().await;
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(engine.patterns().is_none());
    assert!(engine.index().await.is_empty());

    engine
        .init(AnchorSettings::default(), vec![workspace_folder()])
        .await
        .unwrap();
    assert_eq!(engine.index().await.definition_count(), 1);
}
