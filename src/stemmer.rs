//! The stemmer contract (§6) and compound-word decomposition (§4.3).

use crate::position::Position;
use std::collections::HashMap;

/// `stem_word(word, normalize)`. `normalize=true` yields the surface-
/// friendly form; `normalize=false` is the internal equality key used
/// everywhere inside the engine.
pub trait Stemmer: Send + Sync {
    fn stem_word(&self, word: &str, normalize: bool) -> String;
}

/// Lowercases and otherwise leaves the word untouched. Satisfies the trait
/// and is sufficient for every property in §8, which are stemmer-agnostic;
/// a host swaps in a linguistic stemmer (e.g. Snowball) behind the same
/// trait without touching any other component.
#[derive(Debug, Default)]
pub struct IdentityStemmer;

impl Stemmer for IdentityStemmer {
    fn stem_word(&self, word: &str, _normalize: bool) -> String {
        word.to_lowercase()
    }
}

const COMPOUND_SEPARATORS: [char; 3] = ['-', '.', ','];

/// Runs stemming plus compound decomposition over a `position -> word`
/// mapping, producing a `Position -> stem` mapping with synthetic entries
/// for compound components.
pub fn stem_with_components(
    stemmer: &dyn Stemmer,
    words: &[(i32, String)],
) -> HashMap<Position, String> {
    let mut out = HashMap::new();

    for (i, word) in words {
        let stem = stemmer.stem_word(word, false);
        let has_separator = stem.chars().any(|c| COMPOUND_SEPARATORS.contains(&c));
        out.insert(Position::Integer(*i), stem);

        if has_separator {
            for (k, component) in split_compound(word).into_iter().enumerate() {
                if component.is_empty() || component == *word {
                    continue;
                }
                let component_stem = stemmer.stem_word(&component, false);
                out.insert(
                    Position::Synthetic {
                        parent: *i,
                        component: (k + 1) as u8,
                    },
                    component_stem,
                );
            }
        }
    }

    out
}

/// Splits `word` on runs of `{'-', '.', ','}` adjacent to letters/digits,
/// dropping empty runs. `"well-known"` -> `["well", "known"]`.
fn split_compound(word: &str) -> Vec<String> {
    word.split(|c: char| COMPOUND_SEPARATORS.contains(&c))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_decomposition_matches_the_worked_example() {
        let stemmer = IdentityStemmer;
        let words = vec![(10, "well-known".to_string()), (11, "facts".to_string())];
        let result = stem_with_components(&stemmer, &words);

        assert_eq!(result.len(), 4);
        assert_eq!(result[&Position::Integer(10)], "well-known");
        assert_eq!(result[&Position::Integer(11)], "facts");
        assert_eq!(
            result[&Position::Synthetic {
                parent: 10,
                component: 1
            }],
            "well"
        );
        assert_eq!(
            result[&Position::Synthetic {
                parent: 10,
                component: 2
            }],
            "known"
        );
    }

    #[test]
    fn plain_word_has_no_synthetic_entries() {
        let stemmer = IdentityStemmer;
        let words = vec![(0, "hello".to_string())];
        let result = stem_with_components(&stemmer, &words);
        assert_eq!(result.len(), 1);
        assert_eq!(result[&Position::Integer(0)], "hello");
    }

    #[test]
    fn single_component_equal_to_whole_word_is_not_duplicated() {
        // A trailing separator with nothing after it (e.g. "abc.") produces
        // only one non-empty component, equal to the word sans punctuation
        // after stemming; since split_compound on "abc." yields ["abc"]
        // which differs from the stemmed form "abc." itself, it still adds
        // one synthetic entry, not a doubled one.
        let stemmer = IdentityStemmer;
        let words = vec![(5, "abc.".to_string())];
        let result = stem_with_components(&stemmer, &words);
        assert_eq!(result[&Position::Integer(5)], "abc.");
        assert_eq!(
            result[&Position::Synthetic {
                parent: 5,
                component: 1
            }],
            "abc"
        );
    }

    #[test]
    fn excludes_component_identical_to_original_word() {
        // A word with no internal separator but a stem containing one
        // (shouldn't happen with the identity stemmer, but guard the
        // invariant): split_compound returning [word] itself must not
        // produce a synthetic duplicate.
        let parts = split_compound("plainword");
        assert_eq!(parts, vec!["plainword".to_string()]);
    }
}
