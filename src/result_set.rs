//! The result set (§4.6): score aggregation, sorting, paging, and the
//! matched-position lookup the snippet builder needs.

use crate::error::{Error, Result, RuntimeError};
use crate::identifier::ExternalId;
use crate::model::TocEntryWithMetadata;
use std::collections::HashMap;

/// A label plus a monotonic sequence number, recorded at each scoring step
/// for instrumentation. Fetching the log is side-effect free; only
/// `record` advances the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePoint {
    pub label: String,
    pub seq: u64,
}

#[derive(Debug, Default)]
struct DocState {
    score: f64,
    /// matched content positions per query word, for snippet assembly
    positions_by_word: HashMap<String, Vec<i32>>,
}

/// Mutable until [`ResultSet::freeze`]; every score-affecting write after
/// that point fails with [`RuntimeError::Immutable`].
pub struct ResultSet {
    limit: usize,
    offset: usize,
    debug: bool,
    frozen: bool,
    docs: HashMap<ExternalId, DocState>,
    toc: HashMap<ExternalId, TocEntryWithMetadata>,
    profile: Vec<ProfilePoint>,
    next_seq: u64,
    sorted_ids: Vec<ExternalId>,
}

impl ResultSet {
    pub fn new(limit: usize, offset: usize, debug: bool) -> Self {
        Self {
            limit,
            offset,
            debug,
            frozen: false,
            docs: HashMap::new(),
            toc: HashMap::new(),
            profile: Vec::new(),
            next_seq: 0,
            sorted_ids: Vec::new(),
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    fn record(&mut self, label: impl Into<String>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.profile.push(ProfilePoint {
            label: label.into(),
            seq,
        });
    }

    /// Ordered profile points recorded so far; side-effect free.
    pub fn profile(&self) -> &[ProfilePoint] {
        &self.profile
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            Err(Error::Runtime(RuntimeError::Immutable))
        } else {
            Ok(())
        }
    }

    /// Multiplies `weights`'s values together and adds the product to
    /// `external_id`'s aggregate score. `content_positions`, when present,
    /// are recorded under `word` for later snippet assembly.
    pub fn add_word_weight(
        &mut self,
        word: String,
        external_id: ExternalId,
        weights: HashMap<&'static str, f64>,
        content_positions: Option<Vec<i32>>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let contribution: f64 = weights.values().product();
        let state = self.docs.entry(external_id).or_default();
        state.score += contribution;
        if let Some(positions) = content_positions {
            state.positions_by_word.entry(word.clone()).or_default().extend(positions);
        }
        self.record(format!("word_weight:{word}"));
        Ok(())
    }

    pub fn add_neighbour_weight(
        &mut self,
        w1: String,
        w2: String,
        external_id: ExternalId,
        weight: f64,
        distance: f64,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let state = self.docs.entry(external_id).or_default();
        state.score += weight;
        self.record(format!("neighbour:{w1}-{w2}@{distance}"));
        Ok(())
    }

    /// Sorts and pages. Idempotent; a second call re-sorts with whatever
    /// state existed at the time (harmless since scoring calls are rejected
    /// once frozen).
    pub fn freeze(&mut self) -> Result<()> {
        let mut ids: Vec<ExternalId> = self.docs.keys().cloned().collect();
        ids.sort_by(|a, b| {
            let score_a = self.docs[a].score;
            let score_b = self.docs[b].score;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        self.sorted_ids = ids;
        self.frozen = true;
        Ok(())
    }

    /// Reading sorted/paged results before `freeze()` is a pipeline bug, not
    /// a recoverable condition — the caller is expected to always freeze
    /// before reading.
    fn ensure_frozen(&self) -> Result<()> {
        if self.frozen {
            Ok(())
        } else {
            Err(Error::Logic("result set read before freeze()".to_string()))
        }
    }

    /// Descending by score, ties broken ascending by external id, limited to
    /// `[offset, offset+limit)`.
    pub fn sorted_external_ids(&self) -> Result<&[ExternalId]> {
        self.ensure_frozen()?;
        let start = self.offset.min(self.sorted_ids.len());
        let end = (self.offset + self.limit).min(self.sorted_ids.len());
        Ok(&self.sorted_ids[start..end])
    }

    /// The full sorted id list, unpaged — used to drive `attach_toc`/snippet
    /// lookups without re-querying documents outside the displayed page.
    pub fn sorted_external_ids_unpaged(&self) -> Result<&[ExternalId]> {
        self.ensure_frozen()?;
        Ok(&self.sorted_ids)
    }

    pub fn score_of(&self, external_id: &ExternalId) -> f64 {
        self.docs.get(external_id).map(|s| s.score).unwrap_or(0.0)
    }

    /// Matched content positions, per query word, for the given document.
    pub fn get_found_word_positions_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> HashMap<String, Vec<i32>> {
        self.docs
            .get(external_id)
            .map(|s| s.positions_by_word.clone())
            .unwrap_or_default()
    }

    /// Union of every matched content position across query words, sorted
    /// and deduplicated — what the snippet builder hands to the storage
    /// query.
    pub fn matched_content_positions(&self, external_id: &ExternalId) -> Vec<i32> {
        let Some(state) = self.docs.get(external_id) else {
            return Vec::new();
        };
        let mut all: Vec<i32> = state.positions_by_word.values().flatten().copied().collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    /// Memoizes TOC data for the displayed page; independent of the freeze
    /// gate since it doesn't affect scoring.
    pub fn attach_toc(&mut self, entries: Vec<TocEntryWithMetadata>) -> Result<()> {
        for entry in entries {
            self.toc.insert(entry.external_id.clone(), entry);
        }
        Ok(())
    }

    pub fn toc_entry(&self, external_id: &ExternalId) -> Option<&TocEntryWithMetadata> {
        self.toc.get(external_id)
    }
}
