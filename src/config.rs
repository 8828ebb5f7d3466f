//! Host-wired knobs. None of this is normative for the indexing/ranking/
//! snippet algorithms themselves; a host constructs these with `Default`
//! and overrides only what it needs.

/// Storage-level configuration: table naming and the excluded-word threshold.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Prefix applied to every table name; `""` uses the bare names.
    pub table_prefix: String,
    /// Document-frequency ratio above which a word is excluded from content
    /// indexing (e.g. 0.5 excludes any word appearing in more than half the
    /// indexed documents).
    pub excluded_word_threshold_ratio: f64,
    /// Word surface forms longer than this are truncated at a UTF-8 boundary
    /// before being looked up or inserted (§3 Word). Lives here, not on
    /// `IndexerConfig`, because the storage backend is what actually performs
    /// the truncation.
    pub max_word_length: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_prefix: String::new(),
            excluded_word_threshold_ratio: 0.5,
            max_word_length: 255,
        }
    }
}

/// Indexer-level configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Retry once via `erase()` when the storage reports `EmptyIndex`.
    pub auto_erase: bool,
    /// Title/keyword tokens longer than this are dropped entirely.
    pub max_title_keyword_token_length: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            auto_erase: true,
            max_title_keyword_token_length: 255,
        }
    }
}

/// Snippet assembly configuration.
#[derive(Debug, Clone)]
pub struct SnippetConfig {
    /// Template with a `{word}` placeholder; semantics of reinsertion are
    /// owned by the host.
    pub highlight_template: String,
    /// Joins multiple snippet rows when a host renders them as one block.
    pub snippet_line_separator: String,
    /// Regex patterns matching word-like runs in snippet text, used to find
    /// highlight candidates.
    pub highlight_mask_regex_array: Vec<String>,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            highlight_template: "<mark>{word}</mark>".to_string(),
            snippet_line_separator: "\n".to_string(),
            highlight_mask_regex_array: vec![r"[\p{L}\p{N}]+".to_string()],
        }
    }
}

/// Aggregate configuration handed to [`crate::engine::SearchEngine`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub indexer: IndexerConfig,
    pub snippet: SnippetConfig,
}
