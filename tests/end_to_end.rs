//! End-to-end scenarios S1-S6 (§8): each exercises the engine's public
//! `index`/`search` surface against an in-memory SQLite-backed engine, the
//! way a host would actually call this crate.

use fulltext_core::config::{EngineConfig, IndexerConfig};
use fulltext_core::extractor::PlainTextExtractor;
use fulltext_core::identifier::ExternalId;
use fulltext_core::model::Indexable;
use fulltext_core::stemmer::IdentityStemmer;
use fulltext_core::storage::SqliteStorage;
use fulltext_core::{SearchEngine, SearchQuery};
use std::sync::Arc;

fn engine() -> SearchEngine {
    // Best-effort: only the first test in the binary actually installs the
    // subscriber, which is fine since we only want warnings visible with
    // `--nocapture`, not a hard dependency for the assertions below.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    SearchEngine::new(
        storage,
        Arc::new(PlainTextExtractor),
        Arc::new(IdentityStemmer),
        EngineConfig::default(),
    )
    .unwrap()
}

/// S1: empty store, index one document, query a repeated word, expect one
/// hit with a non-empty snippet.
#[test]
fn s1_single_document_multiple_occurrences() {
    let engine = engine();
    let id = ExternalId::without_instance("doc1");
    engine
        .index(&Indexable::new(id.clone(), "Hello World", "hello world hello", "h1"))
        .unwrap();

    let results = engine.search(&SearchQuery::new("hello")).unwrap();
    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].external_id, id);
    assert!(!results.hits[0].snippet.is_empty());
}

/// S2: compound decomposition lets a query on a component word find a
/// document that only contains the compound.
#[test]
fn s2_compound_word_component_query() {
    let engine = engine();
    let id = ExternalId::without_instance("a");
    engine
        .index(&Indexable::new(id.clone(), "", "well-known fact", "h1"))
        .unwrap();

    let results = engine.search(&SearchQuery::new("well")).unwrap();
    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].external_id, id);
}

/// S3: abundance reduction ranks a document matching a rare query term above
/// one that only matches a common term, in a 100-document corpus.
#[test]
fn s3_abundance_reduction_ranks_rare_term_higher() {
    let engine = engine();

    // 98 filler documents mentioning only "the".
    for i in 0..98 {
        let id = ExternalId::without_instance(format!("filler{i}"));
        engine
            .index(&Indexable::new(id, "", "the common word appears here", format!("f{i}")))
            .unwrap();
    }
    // One document mentioning both "the" and the rare "cat".
    let cat_doc = ExternalId::without_instance("cat-doc");
    engine
        .index(&Indexable::new(cat_doc.clone(), "", "the cat sat on the mat", "hc"))
        .unwrap();
    // One more document mentioning "the" and the other rare term "cat" too,
    // so "cat" appears in exactly 2 of the 100 documents per S3's setup.
    let cat_doc2 = ExternalId::without_instance("cat-doc-2");
    engine
        .index(&Indexable::new(cat_doc2, "", "the cat again", "hc2"))
        .unwrap();

    let results = engine
        .search(&SearchQuery {
            limit: 100,
            ..SearchQuery::new("the cat")
        })
        .unwrap();

    assert!(!results.hits.is_empty());
    assert_eq!(results.hits[0].external_id, cat_doc);
}

/// S4: auto-erase recovery — covered at the storage+indexer layer since the
/// engine always has a valid schema once constructed; this drops the schema
/// out from under a live storage so `index` genuinely hits `EmptyIndex` on
/// its first attempt and must catch it, call `erase()`, and retry before
/// this assertion can pass.
#[test]
fn s4_auto_erase_recovery_on_empty_index() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    storage.drop_schema().unwrap();

    let indexer = fulltext_core::indexer::Indexer::new(
        storage.clone(),
        Arc::new(PlainTextExtractor),
        Arc::new(IdentityStemmer),
        IndexerConfig {
            auto_erase: true,
            ..IndexerConfig::default()
        },
    );

    let id = ExternalId::without_instance("x");
    indexer
        .index(&Indexable::new(id.clone(), "Title", "content here", "h1"))
        .unwrap();

    assert_eq!(storage.get_toc_size(None).unwrap(), 1);
}

/// S5: reindexing with changed content replaces the old fulltext entirely.
#[test]
fn s5_reindex_with_changed_content_replaces_fulltext() {
    let engine = engine();
    let id = ExternalId::without_instance("d");
    engine.index(&Indexable::new(id.clone(), "", "alpha", "h1")).unwrap();
    engine.index(&Indexable::new(id.clone(), "", "beta", "h2")).unwrap();

    let alpha_results = engine.search(&SearchQuery::new("alpha")).unwrap();
    assert!(alpha_results.hits.is_empty());

    let beta_results = engine.search(&SearchQuery::new("beta")).unwrap();
    assert_eq!(beta_results.hits.len(), 1);
    assert_eq!(beta_results.hits[0].external_id, id);
}

/// S6: a title-only match falls back to the document's first two snippet
/// rows, since "cat" never occurs in the content field.
#[test]
fn s6_title_only_match_falls_back_to_first_snippets() {
    let engine = engine();
    let id = ExternalId::without_instance("doc1");
    engine
        .index(&Indexable::new(
            id.clone(),
            "cat",
            "first paragraph here\n\nsecond paragraph there",
            "h1",
        ))
        .unwrap();

    let results = engine.search(&SearchQuery::new("cat")).unwrap();
    assert_eq!(results.hits.len(), 1);
    assert!(results.hits[0].snippet.contains("first paragraph"));
    assert!(results.hits[0].snippet.contains("second paragraph"));
}
