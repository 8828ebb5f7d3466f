//! Data model entities (§3).

use crate::identifier::ExternalId;
use std::collections::HashMap;

/// Per-document descriptor. Unique by `(external_id, instance_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TocEntry {
    pub title: String,
    pub url: String,
    pub hash: String,
    /// Host-supplied per-document multiplier; 1.0 means "no bias".
    pub external_relevance_ratio: f64,
    pub date: Option<chrono::DateTime<chrono::Utc>>,
    /// Domain-opaque metadata the host chose to persist, stored as JSON.
    pub metadata: serde_json::Value,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            hash: hash.into(),
            external_relevance_ratio: 1.0,
            date: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Internal surrogate id plus the external id it was looked up by, as
/// returned from batch TOC reads.
#[derive(Debug, Clone, PartialEq)]
pub struct TocEntryWithMetadata {
    pub toc_id: i64,
    pub external_id: ExternalId,
    pub entry: TocEntry,
    pub word_count: i64,
}

/// `(word_count, images)`, one row per TOC entry, created lazily.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    pub word_count: i64,
    pub images: serde_json::Value,
}

/// A stored paragraph/sentence fragment with the word-position range it
/// covers.
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetSource {
    pub min_word_pos: i32,
    pub max_word_pos: i32,
    pub text: String,
    pub format: SnippetFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetFormat {
    Plain,
    Internal,
    Html,
}

impl SnippetFormat {
    pub fn as_id(self) -> i32 {
        match self {
            SnippetFormat::Plain => 0,
            SnippetFormat::Internal => 1,
            SnippetFormat::Html => 2,
        }
    }

    pub fn from_id(id: i32) -> Self {
        match id {
            1 => SnippetFormat::Internal,
            2 => SnippetFormat::Html,
            _ => SnippetFormat::Plain,
        }
    }
}

/// A row returned by `get_snippets`, re-attached to its external id.
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetRow {
    pub external_id: ExternalId,
    pub source: SnippetSource,
}

/// Any object presenting enough to be indexed: the hash is computed by the
/// host (it is the host's content-change signal, not this crate's).
#[derive(Debug, Clone)]
pub struct Indexable {
    pub external_id: ExternalId,
    pub title: String,
    pub keywords: String,
    pub url: String,
    pub content: String,
    pub hash: String,
    pub external_relevance_ratio: f64,
    pub metadata: serde_json::Value,
}

impl Indexable {
    pub fn new(
        external_id: ExternalId,
        title: impl Into<String>,
        content: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            external_id,
            title: title.into(),
            keywords: String::new(),
            url: String::new(),
            content: content.into(),
            hash: hash.into(),
            external_relevance_ratio: 1.0,
            metadata: serde_json::Value::Null,
        }
    }
}

/// `(word_id, toc_id, positions)` conceptually; once decoded, one bag per
/// (word, external_id) pair returned from `fulltext_result_by_words`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionBag {
    pub title_positions: Vec<i32>,
    pub keyword_positions: Vec<i32>,
    pub content_positions: Vec<i32>,
    pub word_count: i64,
    pub external_relevance_ratio: f64,
}

/// Per-query-word results: for each word, the set of documents that matched
/// it and their position bags.
#[derive(Debug, Clone, Default)]
pub struct FulltextIndexContent {
    pub by_word: HashMap<String, HashMap<ExternalId, PositionBag>>,
}
