//! The fulltext result builder (§4.4): turns raw per-word position bags into
//! per-`(word, external_id)` weighted contributions plus neighbour-pair
//! bonuses, feeding them into a [`crate::result_set::ResultSet`].

use crate::identifier::ExternalId;
use crate::model::FulltextIndexContent;
use crate::result_set::ResultSet;
use std::collections::HashMap;

/// Document-frequency-based down-weighting of a query term. `N < 5` always
/// returns 1 (too little corpus signal to discriminate); otherwise decays as
/// a Gaussian in the document-frequency ratio.
pub fn freq_reduction(toc_size: i64, matching_docs: i64) -> f64 {
    if toc_size < 5 {
        return 1.0;
    }
    let ratio = matching_docs as f64 / toc_size as f64;
    (-(ratio / 0.38).powi(2)).exp()
}

/// Diminishing-returns multiplier for repeated content occurrences of the
/// same word in one document, capped at 4x.
pub fn repeat_multiply(content_hit_count: usize) -> f64 {
    (0.5 * (content_hit_count as f64 - 1.0) + 1.0).min(4.0)
}

/// Down-weights matches in very long documents relative to the word count,
/// saturating for short documents (`< 10` words is a no-op).
pub fn entry_size_weight(word_count: i64) -> f64 {
    if word_count < 10 {
        return 1.0;
    }
    let w = word_count as f64;
    1.0 + 1.0 / (1.0 + ((w.sqrt() - 18.0).powi(2) / 60.0).exp())
}

/// Bonus for two query words whose content occurrences are roughly the same
/// distance apart in the document as they are in the query.
pub fn neighbour_weight(distance: f64) -> f64 {
    30.0 / (1.0 + (distance / 7.0).powi(2))
}

const KEYWORD_BASE_WEIGHT: f64 = 10.0;
const TITLE_BASE_WEIGHT: f64 = 25.0;

/// One query word together with its 0-indexed position in the query, used
/// as the `q1`/`q2` reference positions for the neighbour-pair bonus.
#[derive(Debug, Clone)]
pub struct QueryWord {
    pub stem: String,
    pub query_position: i32,
}

/// Builds per-document weight contributions from a [`FulltextIndexContent`]
/// and feeds them into a [`ResultSet`].
pub struct FulltextResultBuilder<'a> {
    content: &'a FulltextIndexContent,
    query: &'a [QueryWord],
    toc_size: i64,
}

impl<'a> FulltextResultBuilder<'a> {
    pub fn new(content: &'a FulltextIndexContent, query: &'a [QueryWord], toc_size: i64) -> Self {
        Self {
            content,
            query,
            toc_size,
        }
    }

    /// Runs the weighting model of §4.4 against `result_set`.
    pub fn fill_result_set(&self, result_set: &mut ResultSet) -> crate::error::Result<()> {
        let mut abundance_reduction: HashMap<&str, f64> = HashMap::new();

        for qw in self.query {
            let docs = self.content.by_word.get(&qw.stem);
            let matching_docs = docs.map(|d| d.len() as i64).unwrap_or(0);
            let r_w = freq_reduction(self.toc_size, matching_docs);
            abundance_reduction.insert(&qw.stem, r_w);

            let Some(docs) = docs else { continue };
            for (external_id, bag) in docs {
                if !bag.content_positions.is_empty() {
                    let mut factors = HashMap::new();
                    factors.insert("abundance_reduction", r_w);
                    factors.insert("repeat_multiply", repeat_multiply(bag.content_positions.len()));
                    factors.insert("entry_size", entry_size_weight(bag.word_count));
                    if bag.external_relevance_ratio != 1.0 {
                        factors.insert("external_ratio", bag.external_relevance_ratio);
                    }
                    result_set.add_word_weight(
                        qw.stem.clone(),
                        external_id.clone(),
                        factors,
                        Some(bag.content_positions.clone()),
                    )?;
                }

                if !bag.keyword_positions.is_empty() {
                    let mut factors = HashMap::new();
                    factors.insert("keyword", KEYWORD_BASE_WEIGHT);
                    factors.insert("abundance_reduction", r_w);
                    if bag.external_relevance_ratio != 1.0 {
                        factors.insert("external_ratio", bag.external_relevance_ratio);
                    }
                    result_set.add_word_weight(qw.stem.clone(), external_id.clone(), factors, None)?;
                }

                if !bag.title_positions.is_empty() {
                    let mut factors = HashMap::new();
                    factors.insert("title", TITLE_BASE_WEIGHT);
                    factors.insert("abundance_reduction", r_w);
                    if bag.external_relevance_ratio != 1.0 {
                        factors.insert("external_ratio", bag.external_relevance_ratio);
                    }
                    result_set.add_word_weight(qw.stem.clone(), external_id.clone(), factors, None)?;
                }
            }
        }

        self.fill_neighbour_bonuses(result_set, &abundance_reduction)
    }

    fn fill_neighbour_bonuses(
        &self,
        result_set: &mut ResultSet,
        abundance_reduction: &HashMap<&str, f64>,
    ) -> crate::error::Result<()> {
        for i in 0..self.query.len() {
            for j in (i + 1)..self.query.len() {
                let w1 = &self.query[i];
                let w2 = &self.query[j];
                if w1.stem == w2.stem {
                    continue;
                }
                let (Some(bags1), Some(bags2)) = (
                    self.content.by_word.get(&w1.stem),
                    self.content.by_word.get(&w2.stem),
                ) else {
                    continue;
                };

                let d_query = (w1.query_position - w2.query_position).unsigned_abs() as f64;

                let docs: Vec<&ExternalId> = bags1.keys().filter(|id| bags2.contains_key(*id)).collect();
                for external_id in docs {
                    let bag1 = &bags1[external_id];
                    let bag2 = &bags2[external_id];
                    let min_distance = min_neighbour_distance(&bag1.content_positions, &bag2.content_positions, d_query);
                    let Some(d) = min_distance else { continue };

                    let r1 = abundance_reduction.get(w1.stem.as_str()).copied().unwrap_or(1.0);
                    let r2 = abundance_reduction.get(w2.stem.as_str()).copied().unwrap_or(1.0);
                    let weight = neighbour_weight(d) * r1 * r2;
                    result_set.add_neighbour_weight(
                        w1.stem.clone(),
                        w2.stem.clone(),
                        (*external_id).clone(),
                        weight,
                        d,
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// The minimum `|d_doc - d_query|` over every pair of content positions
/// belonging to the two words, per the tie-break rule in §4.4.
fn min_neighbour_distance(positions1: &[i32], positions2: &[i32], d_query: f64) -> Option<f64> {
    let mut min_d: Option<f64> = None;
    for &p1 in positions1 {
        for &p2 in positions2 {
            let d_doc = (p1 - p2).unsigned_abs() as f64;
            let d = (d_doc - d_query).abs();
            min_d = Some(min_d.map_or(d, |m: f64| m.min(d)));
        }
    }
    min_d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freq_reduction_is_one_below_corpus_floor() {
        assert_eq!(freq_reduction(4, 4), 1.0);
        assert_eq!(freq_reduction(0, 0), 1.0);
    }

    #[test]
    fn freq_reduction_is_monotone_non_increasing() {
        let n = 100;
        let mut prev = freq_reduction(n, 0);
        for matching in 1..=n {
            let r = freq_reduction(n, matching);
            assert!(r <= prev + 1e-12, "expected non-increasing, {} > {}", r, prev);
            prev = r;
        }
    }

    #[test]
    fn repeat_multiply_saturates_at_four() {
        assert_eq!(repeat_multiply(1), 1.0);
        assert_eq!(repeat_multiply(7), 4.0);
        assert_eq!(repeat_multiply(100), 4.0);
    }

    #[test]
    fn entry_size_weight_is_one_below_floor() {
        assert_eq!(entry_size_weight(0), 1.0);
        assert_eq!(entry_size_weight(9), 1.0);
    }

    #[test]
    fn entry_size_weight_grows_past_floor() {
        assert!(entry_size_weight(400) > 1.0);
    }

    #[test]
    fn neighbour_weight_peaks_at_zero_distance() {
        assert_eq!(neighbour_weight(0.0), 30.0);
        assert!(neighbour_weight(7.0) < neighbour_weight(0.0));
        assert!(neighbour_weight(70.0) < neighbour_weight(7.0));
    }

    #[test]
    fn min_neighbour_distance_picks_the_closest_occurrence_pair() {
        // query distance 1; doc occurrences 10/11 (d_doc=1, d=0) and 10/50 (d=39)
        let d = min_neighbour_distance(&[10], &[11, 50], 1.0).unwrap();
        assert_eq!(d, 0.0);
    }
}
