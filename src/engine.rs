//! `SearchEngine`: the facade a host actually constructs, wiring storage,
//! indexer, stemmer and snippet builder behind the read/write paths of §2.
//!
//! Mirrors the shape of this codebase's top-level store facade: one struct
//! owning the collaborators, a thin `index`/`remove`/`search` surface, no
//! business logic of its own beyond orchestration.

use crate::config::{EngineConfig, IndexerConfig, SnippetConfig, StoreConfig};
use crate::error::Result;
use crate::extractor::Extractor;
use crate::identifier::ExternalId;
use crate::indexer::Indexer;
use crate::model::Indexable;
use crate::ranking::{FulltextResultBuilder, QueryWord};
use crate::result_set::ResultSet;
use crate::snippet::{HighlightedSnippet, SnippetBuilder};
use crate::stemmer::Stemmer;
use crate::storage::{SqliteStorage, Storage};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// One ranked hit: the document id, its aggregate score, and its assembled
/// snippet.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub external_id: ExternalId,
    pub score: f64,
    pub snippet: String,
}

/// A page of search results plus the total number of documents the query
/// matched (before paging).
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total_matched: usize,
}

/// Query parameters: the raw text, paging, and an optional instance scope.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub limit: usize,
    pub offset: usize,
    pub instance_id: Option<u32>,
    pub debug: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 10,
            offset: 0,
            instance_id: None,
            debug: false,
        }
    }
}

/// Read path orchestration per §2: `Query -> Stemmer ->
/// Storage.fulltext_result_by_words -> FulltextResultBuilder.fill_result_set
/// -> ResultSet (sorted, paged) -> Storage.get_toc_by_external_ids +
/// Storage.get_snippets -> SnippetBuilder -> results`.
pub struct SearchEngine {
    storage: Arc<dyn Storage>,
    indexer: Indexer,
    stemmer: Arc<dyn Stemmer>,
    snippet_builder: SnippetBuilder,
}

impl SearchEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        extractor: Arc<dyn Extractor>,
        stemmer: Arc<dyn Stemmer>,
        config: EngineConfig,
    ) -> Result<Self> {
        let indexer = Indexer::new(
            storage.clone(),
            extractor,
            stemmer.clone(),
            config.indexer,
        );
        let snippet_builder = SnippetBuilder::new(stemmer.clone(), config.snippet)?;
        Ok(Self {
            storage,
            indexer,
            stemmer,
            snippet_builder,
        })
    }

    /// Opens a `SqliteStorage`-backed engine with the given extractor and
    /// stemmer, the combination most hosts reach for.
    pub fn open_sqlite<P: AsRef<Path>>(
        path: P,
        extractor: Arc<dyn Extractor>,
        stemmer: Arc<dyn Stemmer>,
        store_config: StoreConfig,
        indexer_config: IndexerConfig,
        snippet_config: SnippetConfig,
    ) -> Result<Self> {
        let storage = Arc::new(SqliteStorage::open(path, store_config)?);
        Self::new(
            storage,
            extractor,
            stemmer,
            EngineConfig {
                store: StoreConfig::default(),
                indexer: indexer_config,
                snippet: snippet_config,
            },
        )
    }

    pub fn index(&self, indexable: &Indexable) -> Result<()> {
        self.indexer.index(indexable)
    }

    pub fn remove(&self, external_id: &ExternalId) -> Result<()> {
        self.indexer.remove(external_id)
    }

    /// Answers `query` end to end and returns a page of ranked hits with
    /// assembled, highlighted snippets.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let query_stems = self.tokenize_query(&query.text);
        if query_stems.is_empty() {
            return Ok(SearchResults::default());
        }

        let mut query_words = Vec::with_capacity(query_stems.len());
        let mut stem_set = HashSet::new();
        for (i, stem) in query_stems.iter().enumerate() {
            if self.storage.is_excluded_word(stem)? {
                continue;
            }
            stem_set.insert(stem.clone());
            query_words.push(QueryWord {
                stem: stem.clone(),
                query_position: i as i32,
            });
        }
        if query_words.is_empty() {
            return Ok(SearchResults::default());
        }

        let toc_size = self.storage.get_toc_size(query.instance_id)?;
        let stems: Vec<String> = query_words.iter().map(|q| q.stem.clone()).collect();
        let content = self.storage.fulltext_result_by_words(&stems, query.instance_id)?;

        let mut result_set = ResultSet::new(query.limit, query.offset, query.debug);
        FulltextResultBuilder::new(&content, &query_words, toc_size).fill_result_set(&mut result_set)?;
        result_set.freeze()?;

        let total_matched = result_set.sorted_external_ids_unpaged()?.len();
        let page: Vec<ExternalId> = result_set.sorted_external_ids()?.to_vec();

        let toc_rows = self.storage.get_toc_by_external_ids(&page)?;
        result_set.attach_toc(toc_rows)?;

        let positions_for = |id: &ExternalId| result_set.matched_content_positions(id);
        let snippets = self
            .snippet_builder
            .build(self.storage.as_ref(), &page, positions_for, &stem_set)?;

        let snippet_by_id: std::collections::HashMap<ExternalId, String> = snippets
            .into_iter()
            .map(|HighlightedSnippet { external_id, text }| (external_id, text))
            .collect();

        let hits = page
            .into_iter()
            .map(|id| {
                let score = result_set.score_of(&id);
                let snippet = snippet_by_id.get(&id).cloned().unwrap_or_default();
                SearchHit {
                    external_id: id,
                    score,
                    snippet,
                }
            })
            .collect();

        Ok(SearchResults {
            hits,
            total_matched,
        })
    }

    /// Whitespace-tokenizes the query text and stems each word with
    /// `normalize=false`, the internal equality key used everywhere else.
    fn tokenize_query(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| self.stemmer.stem_word(w, false))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::extractor::PlainTextExtractor;
    use crate::stemmer::IdentityStemmer;

    fn engine() -> SearchEngine {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        SearchEngine::new(
            storage,
            Arc::new(PlainTextExtractor),
            Arc::new(IdentityStemmer),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn empty_query_yields_no_hits() {
        let engine = engine();
        let results = engine.search(&SearchQuery::new("   ")).unwrap();
        assert!(results.hits.is_empty());
    }

    #[test]
    fn indexed_document_is_found_with_snippet() {
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
}
