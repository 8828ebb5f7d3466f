//! The extractor contract (§6): raw document text in, a sentence map plus
//! images and warnings out. Concrete HTML-aware extraction is a host
//! concern; this crate ships a minimal whitespace/paragraph splitter that
//! satisfies the trait and is enough to drive indexing end to end.

use crate::model::{SnippetFormat, SnippetSource};

/// One paragraph-sized chunk of source text.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceMapEntry {
    pub paragraph_index: usize,
    pub url: Option<String>,
    pub text: String,
    pub format: SnippetFormat,
}

/// Ordered collection of sentence-map entries, plus the machinery to flatten
/// them into the word/position stream the indexer consumes.
#[derive(Debug, Clone, Default)]
pub struct SentenceMap {
    pub entries: Vec<SentenceMapEntry>,
}

impl SentenceMap {
    pub fn push(&mut self, entry: SentenceMapEntry) {
        self.entries.push(entry);
    }

    /// Flattens to `(word, absolute_position)` pairs, in order, plus the
    /// parallel list of `SnippetSource` records covering each paragraph's
    /// position range.
    pub fn to_sentence_collection(&self) -> (Vec<(i32, String)>, Vec<SnippetSource>) {
        let mut words = Vec::new();
        let mut sources = Vec::new();
        let mut pos: i32 = 0;

        for entry in &self.entries {
            let min_pos = pos;
            for token in entry.text.split_whitespace() {
                words.push((pos, token.to_string()));
                pos += 1;
            }
            let max_pos = (pos - 1).max(min_pos);
            sources.push(SnippetSource {
                min_word_pos: min_pos,
                max_word_pos: max_pos,
                text: entry.text.clone(),
                format: entry.format,
            });
        }

        (words, sources)
    }
}

/// A single image reference discovered during extraction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ImgCollection {
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone)]
pub struct ContentWithMetadata {
    pub sentence_map: SentenceMap,
    pub images: ImgCollection,
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub content: ContentWithMetadata,
    pub errors: Vec<String>,
}

/// Capability-based collaborator: raw text -> sentence map + images +
/// warnings. Hosts wire their own HTML-aware implementation.
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &str) -> ExtractionResult;
}

/// Splits on blank lines into paragraphs, each paragraph becoming one
/// sentence-map entry. Good enough to exercise the pipeline; a host with
/// real HTML content supplies its own extractor behind the same trait.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, text: &str) -> ExtractionResult {
        let mut sentence_map = SentenceMap::default();
        let mut paragraph_index = 0;

        for para in text.split("\n\n") {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }
            sentence_map.push(SentenceMapEntry {
                paragraph_index,
                url: None,
                text: trimmed.to_string(),
                format: SnippetFormat::Plain,
            });
            paragraph_index += 1;
        }

        ExtractionResult {
            content: ContentWithMetadata {
                sentence_map,
                images: ImgCollection::default(),
            },
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_paragraph_flattens_to_words_with_positions() {
        let extractor = PlainTextExtractor;
        let result = extractor.extract("hello world hello");
        let (words, sources) = result.content.sentence_map.to_sentence_collection();
        assert_eq!(
            words,
            vec![
                (0, "hello".to_string()),
                (1, "world".to_string()),
                (2, "hello".to_string()),
            ]
        );
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].min_word_pos, 0);
        assert_eq!(sources[0].max_word_pos, 2);
    }

    #[test]
    fn multiple_paragraphs_get_contiguous_positions() {
        let extractor = PlainTextExtractor;
        let result = extractor.extract("alpha beta\n\ngamma delta epsilon");
        let (words, sources) = result.content.sentence_map.to_sentence_collection();
        assert_eq!(words.len(), 5);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].min_word_pos, 0);
        assert_eq!(sources[0].max_word_pos, 1);
        assert_eq!(sources[1].min_word_pos, 2);
        assert_eq!(sources[1].max_word_pos, 4);
    }

    #[test]
    fn blank_input_produces_no_sources() {
        let extractor = PlainTextExtractor;
        let result = extractor.extract("   \n\n  ");
        assert!(result.content.sentence_map.entries.is_empty());
    }
}
