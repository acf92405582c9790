//! Ingest files from disk, then query them through the retriever.

use crate::common::{TestProject, add_topic_docs};
use docatlas::config::{ChunkingConfig, SearchConfig};
use docatlas::documents::{Principal, Visibility};
use docatlas::retrieval::{NO_RESULTS_ANSWER, Retriever};
use docatlas::vector::{DocumentSource, MemoryVectorStore};
use std::sync::Arc;

fn retriever(store: &Arc<MemoryVectorStore>) -> Retriever {
    Retriever::new(store.clone(), store.clone(), SearchConfig::default())
}

#[test]
fn test_ingest_directory_then_search() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.add_file("cooking/photo.png", "not text");

    let stats = project
        .indexer(&ChunkingConfig::default())
        .index_paths(&[project.path().to_path_buf()], 1, Visibility::Private, None);
    assert_eq!(stats.files_indexed, 6);
    assert_eq!(stats.files_skipped, 1);
    assert_eq!(stats.chunks_indexed, 6);

    let hits = retriever(&project.store)
        .semantic_search(&Principal::new(1), "flour oven baking", 3, None)
        .unwrap();
    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert!(
            ["bread.md", "pizza.md", "cake.txt"].contains(&hit.filename.as_str()),
            "unexpected hit {}",
            hit.filename
        );
    }
}

#[test]
fn test_other_users_only_see_public_documents() {
    let project = TestProject::new();
    project.add_file("private/ledger.md", "ledger balance account");
    project.add_file("shared/menu.md", "menu soup bread");

    let indexer = project.indexer(&ChunkingConfig::default());
    indexer.index_paths(&[project.path().join("private")], 1, Visibility::Private, None);
    indexer.index_paths(&[project.path().join("shared")], 1, Visibility::Public, None);

    let visible = project
        .store
        .list_accessible_documents(&Principal::new(2))
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].filename, "menu.md");

    let hits = retriever(&project.store)
        .semantic_search(&Principal::new(2), "ledger balance", 10, None)
        .unwrap();
    assert!(hits.iter().all(|h| h.filename == "menu.md"));
}

#[test]
fn test_long_document_is_chunked_with_overlap() {
    let project = TestProject::new();
    let sentence = "The quarterly ledger shows every payment and balance. ";
    let path = project.add_file("report.md", &sentence.repeat(20));

    let chunking = ChunkingConfig {
        chunk_size: 200,
        chunk_overlap: 40,
        ..ChunkingConfig::default()
    };
    let indexed = project
        .indexer(&chunking)
        .index_file(&path, 1, Visibility::Private, None)
        .unwrap();
    assert!(indexed.chunks > 1);

    let documents = project
        .store
        .list_accessible_documents(&Principal::new(1))
        .unwrap();
    let chunks = &documents[0].chunks;
    assert_eq!(chunks.len(), indexed.chunks);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, i);
        assert!(chunk.content.chars().count() <= 200);
    }
}

#[test]
fn test_snapshot_survives_reopen() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.ingest_all(1, Visibility::Private);

    let snapshot = project.path().join("data").join("store.json");
    project.store.save(&snapshot).unwrap();

    let reopened = Arc::new(MemoryVectorStore::open(&snapshot, project.store.embedder()).unwrap());
    assert_eq!(reopened.document_count(), 6);
    assert_eq!(reopened.vector_count(), 6);

    let before = retriever(&project.store)
        .semantic_search(&Principal::new(1), "invoice payment", 2, None)
        .unwrap();
    let after = retriever(&reopened)
        .semantic_search(&Principal::new(1), "invoice payment", 2, None)
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_ask_without_documents() {
    let project = TestProject::new();
    let answer = retriever(&project.store)
        .rag(&Principal::new(1), "anything at all")
        .unwrap();
    assert_eq!(answer.answer, NO_RESULTS_ANSWER);
    assert!(answer.sources.is_empty());
}
