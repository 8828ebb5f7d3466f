//! Embeddable full-text search engine: inverted index, ranking and snippet
//! assembly over a relational store.
//!
//! Read path: [`SearchEngine::search`] drives `Query -> Stemmer ->
//! Storage.fulltext_result_by_words -> FulltextResultBuilder ->
//! ResultSet (sorted, paged) -> Storage.get_toc_by_external_ids +
//! Storage.get_snippets -> SnippetBuilder`.
//!
//! Write path: [`SearchEngine::index`] drives `Indexable -> Extractor ->
//! SentenceMap -> Stemmer/CompoundDecomposer -> Storage.write`.

pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod identifier;
pub mod indexer;
pub mod model;
pub mod position;
pub mod ranking;
pub mod result_set;
pub mod snippet;
pub mod stemmer;
pub mod storage;

pub use config::{EngineConfig, IndexerConfig, SnippetConfig, StoreConfig};
pub use engine::{SearchEngine, SearchHit, SearchQuery, SearchResults};
pub use error::{Error, Result};
pub use identifier::ExternalId;
pub use model::{Indexable, TocEntry};
