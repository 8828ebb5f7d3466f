//! The storage repository contract (§4.1): a narrow write API, read API,
//! erase API and transactional API over the data model of §3. Concrete
//! backends classify their native errors into `EmptyIndex` / `Unknown`
//! (see [`crate::error`]) and otherwise just need to honor this trait.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::Result;
use crate::identifier::ExternalId;
use crate::model::{FulltextIndexContent, SnippetRow, TocEntry, TocEntryWithMetadata};
use crate::position::Position;
use std::collections::HashMap;

/// One external id's matched content positions, used to build a
/// [`SnippetQuery`].
#[derive(Debug, Clone)]
pub struct SnippetRequest {
    pub external_id: ExternalId,
    /// Matched content positions for this document; empty means "no
    /// content-field hit", which still yields the fallback rows.
    pub positions: Vec<i32>,
}

/// Union of a matched-sentence query and a per-document fallback query
/// (§4.5).
#[derive(Debug, Clone, Default)]
pub struct SnippetQuery {
    pub requests: Vec<SnippetRequest>,
}

pub trait Storage: Send + Sync {
    /// Upsert TOC row; after return, `get_toc_by_external_id` resolves.
    fn add_entry_to_toc(&self, entry: &TocEntry, external_id: &ExternalId) -> Result<()>;

    /// Upsert-if-changed in one call (§9 redesign note): returns `true` if
    /// the entry was absent or its hash differed from what's stored, in
    /// which case the TOC row has already been upserted and the caller
    /// must wipe+rebuild the rest of the index.
    fn upsert_if_changed(&self, entry: &TocEntry, external_id: &ExternalId) -> Result<bool>;

    fn get_toc_by_external_id(&self, external_id: &ExternalId) -> Result<Option<TocEntry>>;

    fn get_toc_by_external_ids(
        &self,
        ids: &[ExternalId],
    ) -> Result<Vec<TocEntryWithMetadata>>;

    fn remove_from_index(&self, external_id: &ExternalId) -> Result<()>;
    fn remove_from_toc(&self, external_id: &ExternalId) -> Result<()>;

    fn add_to_fulltext_index(
        &self,
        title_words: &HashMap<Position, String>,
        keyword_words: &HashMap<Position, String>,
        content_words: &HashMap<Position, String>,
        external_id: &ExternalId,
    ) -> Result<()>;

    fn add_metadata(
        &self,
        external_id: &ExternalId,
        word_count: i64,
        images: serde_json::Value,
    ) -> Result<()>;

    fn add_snippets(
        &self,
        external_id: &ExternalId,
        sources: &[crate::model::SnippetSource],
    ) -> Result<()>;

    fn fulltext_result_by_words(
        &self,
        words: &[String],
        instance_id: Option<u32>,
    ) -> Result<FulltextIndexContent>;

    fn get_snippets(&self, query: &SnippetQuery) -> Result<Vec<SnippetRow>>;

    fn get_toc_size(&self, instance_id: Option<u32>) -> Result<i64>;

    fn is_excluded_word(&self, word: &str) -> Result<bool>;

    /// Drop and recreate the schema. Not transactional.
    fn erase(&self) -> Result<()>;
    /// Drop the schema without recreating it. Not transactional.
    fn drop_schema(&self) -> Result<()>;

    /// Reentrant: if a transaction is already open, the inner pair is a
    /// no-op ("external transaction" mode).
    fn start_transaction(&self) -> Result<()>;
    fn commit_transaction(&self) -> Result<()>;
    fn rollback_transaction(&self) -> Result<()>;
}
