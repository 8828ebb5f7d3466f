//! The indexer (§4.2): orchestrates compute-hash, diff, delete, extract,
//! stem, write for a single [`Indexable`].

use crate::config::IndexerConfig;
use crate::error::{Error, Result, RuntimeError};
use crate::extractor::Extractor;
use crate::model::{Indexable, TocEntry};
use crate::stemmer::{stem_with_components, Stemmer};
use crate::storage::Storage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Compiled once per process and shared by every `Indexer` instance, the way
/// this codebase's other process-wide singletons are built.
static HTML_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&[a-zA-Z#][a-zA-Z0-9]*;").expect("static regex"));

pub struct Indexer {
    storage: Arc<dyn Storage>,
    extractor: Arc<dyn Extractor>,
    stemmer: Arc<dyn Stemmer>,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(
        storage: Arc<dyn Storage>,
        extractor: Arc<dyn Extractor>,
        stemmer: Arc<dyn Stemmer>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            storage,
            extractor,
            stemmer,
            config,
        }
    }

    /// Indexes `indexable`, auto-erasing and retrying once on `EmptyIndex`
    /// if configured to do so (§4.2 "Auto-erase").
    pub fn index(&self, indexable: &Indexable) -> Result<()> {
        match self.try_index(indexable) {
            Ok(()) => Ok(()),
            Err(Error::Runtime(RuntimeError::EmptyIndex)) if self.config.auto_erase => {
                tracing::warn!(external_id = %indexable.external_id, "empty index on write, erasing and retrying");
                self.storage.erase()?;
                tracing::info!(external_id = %indexable.external_id, "erase complete, retrying index");
                self.try_index(indexable)
            }
            Err(e) => Err(e),
        }
    }

    fn try_index(&self, indexable: &Indexable) -> Result<()> {
        self.storage.start_transaction()?;
        match self.do_index(indexable) {
            Ok(()) => {
                self.storage.commit_transaction()?;
                Ok(())
            }
            Err(e) => {
                // Best-effort: a rollback failure must not mask the original error.
                let _ = self.storage.rollback_transaction();
                Err(e)
            }
        }
    }

    fn do_index(&self, indexable: &Indexable) -> Result<()> {
        let mut entry = TocEntry::new(&indexable.title, &indexable.url, &indexable.hash);
        entry.external_relevance_ratio = indexable.external_relevance_ratio;
        entry.metadata = indexable.metadata.clone();

        let changed = self.storage.upsert_if_changed(&entry, &indexable.external_id)?;
        if !changed {
            return Ok(());
        }

        self.storage.remove_from_index(&indexable.external_id)?;

        let extraction = self.extractor.extract(&indexable.content);
        for warning in &extraction.errors {
            tracing::warn!(external_id = %indexable.external_id, warning, "extractor warning");
        }

        let title_tokens = self.normalize_and_tokenize(&indexable.title);
        let keyword_tokens = self.normalize_and_tokenize(&indexable.keywords);

        let (raw_content_words, snippet_sources) = extraction.content.sentence_map.to_sentence_collection();
        let mut content_words = Vec::with_capacity(raw_content_words.len());
        for (pos, word) in raw_content_words {
            if self.storage.is_excluded_word(&word)? {
                continue;
            }
            content_words.push((pos, word));
        }

        let word_count = (title_tokens.len() + content_words.len()) as i64;
        let images = serde_json::to_value(&extraction.content.images)
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        self.storage.add_metadata(&indexable.external_id, word_count, images)?;
        self.storage.add_snippets(&indexable.external_id, &snippet_sources)?;

        let title_positions: Vec<(i32, String)> = title_tokens
            .into_iter()
            .enumerate()
            .map(|(i, w)| (i as i32, w))
            .collect();
        let keyword_positions: Vec<(i32, String)> = keyword_tokens
            .into_iter()
            .enumerate()
            .map(|(i, w)| (i as i32, w))
            .collect();

        let title_stems = stem_with_components(self.stemmer.as_ref(), &title_positions);
        let keyword_stems = stem_with_components(self.stemmer.as_ref(), &keyword_positions);
        let content_stems = stem_with_components(self.stemmer.as_ref(), &content_words);

        self.storage.add_to_fulltext_index(
            &title_stems,
            &keyword_stems,
            &content_stems,
            &indexable.external_id,
        )?;

        Ok(())
    }

    pub fn remove(&self, external_id: &crate::identifier::ExternalId) -> Result<()> {
        self.storage.start_transaction()?;
        match (|| -> Result<()> {
            self.storage.remove_from_index(external_id)?;
            self.storage.remove_from_toc(external_id)?;
            Ok(())
        })() {
            Ok(()) => {
                self.storage.commit_transaction()?;
                Ok(())
            }
            Err(e) => {
                let _ = self.storage.rollback_transaction();
                Err(e)
            }
        }
    }

    /// Lowercases, strips HTML entities, replaces non-letter/digit/`.,-`
    /// characters with spaces (preserving letters of all scripts), then
    /// tokenizes on punctuation-with-optional-whitespace, dropping tokens
    /// that exceed the configured maximum length.
    ///
    /// NOTE: the keyword field arguably deserves different tokenization
    /// (commas as hard delimiters) but this preserves the source behavior
    /// of identical tokenization for title and keywords (§9 open question).
    fn normalize_and_tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let without_entities = HTML_ENTITY.replace_all(&lowered, " ");
        let mut cleaned: String = without_entities
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '.' | ',' | '-') {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        cleaned.push(' ');

        cleaned
            .split(|c: char| c == '.' || c == ',' || c == '-' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .filter(|t| t.chars().count() <= self.config.max_title_keyword_token_length)
            .map(|t| t.to_string())
            .collect()
    }
}
