//! The snippet builder (§4.5): selects and highlights snippet text for
//! displayed results, falling back to a document's first two paragraphs
//! when no matched position maps to a stored sentence.

use crate::config::SnippetConfig;
use crate::error::{Error, Result};
use crate::identifier::ExternalId;
use crate::stemmer::Stemmer;
use crate::storage::{SnippetQuery, SnippetRequest, Storage};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One display result's assembled, highlighted snippet text.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightedSnippet {
    pub external_id: ExternalId,
    pub text: String,
}

pub struct SnippetBuilder {
    stemmer: Arc<dyn Stemmer>,
    config: SnippetConfig,
    patterns: Vec<Regex>,
}

impl SnippetBuilder {
    pub fn new(stemmer: Arc<dyn Stemmer>, config: SnippetConfig) -> Result<Self> {
        let patterns = config
            .highlight_mask_regex_array
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::InvalidArgument(e.to_string())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stemmer,
            config,
            patterns,
        })
    }

    /// Builds one highlighted snippet per external id, in the order given.
    /// `matched_positions` supplies, per id, the union of matched content
    /// positions (empty meaning "no content-field hit" — still yields the
    /// fallback rows per §4.5). `query_stems` is the set of query-word stems
    /// used to decide what to highlight.
    pub fn build(
        &self,
        storage: &dyn Storage,
        display_order: &[ExternalId],
        matched_positions: impl Fn(&ExternalId) -> Vec<i32>,
        query_stems: &HashSet<String>,
    ) -> Result<Vec<HighlightedSnippet>> {
        let requests: Vec<SnippetRequest> = display_order
            .iter()
            .map(|external_id| SnippetRequest {
                external_id: external_id.clone(),
                positions: matched_positions(external_id),
            })
            .collect();

        let rows = storage.get_snippets(&SnippetQuery { requests })?;

        let mut by_id: HashMap<ExternalId, Vec<String>> = HashMap::new();
        for row in rows {
            by_id
                .entry(row.external_id)
                .or_default()
                .push(self.highlight(&row.source.text, query_stems));
        }

        Ok(display_order
            .iter()
            .map(|external_id| HighlightedSnippet {
                external_id: external_id.clone(),
                text: by_id
                    .remove(external_id)
                    .unwrap_or_default()
                    .join(&self.config.snippet_line_separator),
            })
            .collect())
    }

    fn highlight(&self, text: &str, query_stems: &HashSet<String>) -> String {
        let mut result = text.to_string();
        for pattern in &self.patterns {
            result = self.highlight_with_pattern(&result, pattern, query_stems);
        }
        result
    }

    fn highlight_with_pattern(&self, text: &str, pattern: &Regex, query_stems: &HashSet<String>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in pattern.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            let word = m.as_str();
            let stem = self.stemmer.stem_word(word, false);
            if query_stems.contains(&stem) {
                out.push_str(&self.config.highlight_template.replace("{word}", word));
            } else {
                out.push_str(word);
            }
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SnippetFormat, SnippetSource, TocEntry};
    use crate::stemmer::IdentityStemmer;
    use crate::storage::SqliteStorage;

    fn storage_with_one_doc() -> (SqliteStorage, ExternalId) {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let id = ExternalId::without_instance("doc1");
        storage.add_entry_to_toc(&TocEntry::new("T", "u", "h1"), &id).unwrap();
        storage
            .add_snippets(
                &id,
                &[
                    SnippetSource {
                        min_word_pos: 0,
                        max_word_pos: 2,
                        text: "hello world hello".to_string(),
                        format: SnippetFormat::Plain,
                    },
                    SnippetSource {
                        min_word_pos: 3,
                        max_word_pos: 4,
                        text: "second paragraph".to_string(),
                        format: SnippetFormat::Plain,
                    },
                    SnippetSource {
                        min_word_pos: 5,
                        max_word_pos: 7,
                        text: "third unrelated paragraph".to_string(),
                        format: SnippetFormat::Plain,
                    },
                ],
            )
            .unwrap();
        (storage, id)
    }

    fn builder() -> SnippetBuilder {
        SnippetBuilder::new(Arc::new(IdentityStemmer), SnippetConfig::default()).unwrap()
    }

    #[test]
    fn matched_position_selects_the_covering_sentence() {
        let (storage, id) = storage_with_one_doc();
        let b = builder();
        let mut stems = HashSet::new();
        stems.insert("hello".to_string());
        let out = b
            .build(&storage, &[id.clone()], |_| vec![1], &stems)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("<mark>hello</mark>"));
    }

    /// The fallback set (first two rows by max_word_pos) is unioned in
    /// unconditionally per §4.5/§9, even when the matched set already covers
    /// a different sentence than the fallback rows.
    #[test]
    fn fallback_rows_are_always_unioned_in_even_with_a_match_elsewhere() {
        let (storage, id) = storage_with_one_doc();
        let b = builder();
        let mut stems = HashSet::new();
        stems.insert("unrelated".to_string());
        // position 6 only falls inside the third paragraph's range.
        let out = b
            .build(&storage, &[id.clone()], |_| vec![6], &stems)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("<mark>unrelated</mark>"));
        assert!(out[0].text.contains("hello world hello"));
        assert!(out[0].text.contains("second paragraph"));
    }

    #[test]
    fn empty_positions_falls_back_to_first_two_rows() {
        let (storage, id) = storage_with_one_doc();
        let b = builder();
        let stems = HashSet::new();
        let out = b.build(&storage, &[id.clone()], |_| vec![], &stems).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("hello world hello"));
        assert!(out[0].text.contains("second paragraph"));
        assert!(!out[0].text.contains("third unrelated paragraph"));
    }

    #[test]
    fn unmatched_word_is_not_highlighted() {
        let (storage, id) = storage_with_one_doc();
        let b = builder();
        let mut stems = HashSet::new();
        stems.insert("nonexistent".to_string());
        let out = b.build(&storage, &[id.clone()], |_| vec![1], &stems).unwrap();
        assert!(!out[0].text.contains("<mark>"));
    }
}
