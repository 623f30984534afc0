//! Content selection: keep only what the model needs to see.
//!
//! An earnings release runs to dozens of pages of boilerplate, safe-harbour
//! language and segment commentary. The selector keeps:
//!
//! * the first few sentences of page one, where the company and period are
//!   almost always named
//! * every sentence on every page that matches the salience pattern
//!   (currency, percentages, "million"/"billion", "gross")
//! * every table that is mostly filled in, serialized to bracketed text
//!
//! Output order is page order; within a page, header sentences, then salient
//! sentences, then tables. A header sentence that is also salient appears
//! twice.

use crate::config::ExtractionConfig;
use crate::document::{Document, Table};
use crate::error::ExtractError;
use crate::pipeline::segment::SentenceSegmenter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The selected snippets of one document, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateContent(Vec<String>);

impl CandidateContent {
    pub fn new(snippets: Vec<String>) -> Self {
        Self(snippets)
    }

    pub fn snippets(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Newline-joined body for the prompt.
    pub fn joined(&self) -> String {
        self.0.join("\n")
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// A table is kept when it has cells and fewer than `max_empty_ratio` of
/// them are null or empty.
pub fn valid_table(table: &Table, max_empty_ratio: f64) -> bool {
    table.cell_count() > 0 && table.empty_ratio() < max_empty_ratio
}

/// Reduces a [`Document`] to its financially salient snippets.
#[derive(Clone)]
pub struct ContentSelector {
    segmenter: Arc<dyn SentenceSegmenter>,
    header_sentences: usize,
    salience: Regex,
    max_empty_cell_ratio: f64,
}

impl std::fmt::Debug for ContentSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSelector")
            .field("header_sentences", &self.header_sentences)
            .field("salience", &self.salience.as_str())
            .field("max_empty_cell_ratio", &self.max_empty_cell_ratio)
            .finish()
    }
}

impl ContentSelector {
    pub fn new(
        segmenter: Arc<dyn SentenceSegmenter>,
        header_sentences: usize,
        salience: Regex,
        max_empty_cell_ratio: f64,
    ) -> Self {
        Self {
            segmenter,
            header_sentences,
            salience,
            max_empty_cell_ratio,
        }
    }

    /// Build a selector from the heuristics in `config`.
    ///
    /// # Errors
    /// [`ExtractError::InvalidConfig`] when the salience pattern does not compile.
    pub fn from_config(
        segmenter: Arc<dyn SentenceSegmenter>,
        config: &ExtractionConfig,
    ) -> Result<Self, ExtractError> {
        let salience = Regex::new(&config.salience_pattern)
            .map_err(|e| ExtractError::InvalidConfig(format!("salience pattern: {e}")))?;
        Ok(Self::new(
            segmenter,
            config.header_sentences,
            salience,
            config.max_empty_cell_ratio,
        ))
    }

    /// Same heuristics, different sentence model.
    pub fn with_segmenter(mut self, segmenter: Arc<dyn SentenceSegmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Select the salient content of `document`. Never fails.
    pub fn select(&self, document: &Document) -> CandidateContent {
        let mut out = Vec::new();
        let mut dropped_tables = 0usize;

        for (idx, page) in document.pages.iter().enumerate() {
            let sentences = self.segmenter.sentences(&page.text);

            if idx == 0 {
                out.extend(sentences.iter().take(self.header_sentences).cloned());
            }

            out.extend(sentences.into_iter().filter(|s| self.salience.is_match(s)));

            for table in &page.tables {
                if valid_table(table, self.max_empty_cell_ratio) {
                    out.push(table.to_string());
                } else {
                    dropped_tables += 1;
                }
            }
        }

        debug!(
            "Selected {} snippets from {} pages ({} sparse tables dropped)",
            out.len(),
            document.pages.len(),
            dropped_tables
        );
        CandidateContent(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SALIENCE_PATTERN;
    use crate::document::Page;
    use crate::pipeline::segment::UnicodeSentenceSegmenter;

    fn selector() -> ContentSelector {
        ContentSelector::from_config(
            Arc::new(UnicodeSentenceSegmenter),
            &ExtractionConfig::default(),
        )
        .unwrap()
    }

    fn grid(filled: usize, empty: usize) -> Table {
        let mut cells: Vec<Option<String>> = (0..filled).map(|i| Some(format!("c{i}"))).collect();
        cells.extend((0..empty).map(|_| None));
        Table::new(cells.chunks(2).map(<[_]>::to_vec).collect())
    }

    #[test]
    fn valid_table_threshold() {
        assert!(valid_table(&grid(3, 1), 0.5));
        assert!(!valid_table(&grid(2, 2), 0.5));
        assert!(!valid_table(&grid(1, 3), 0.5));
    }

    #[test]
    fn valid_table_irregular_rows() {
        let table = Table::new(vec![
            vec![Some("Revenue".into()), Some("$1.3B".into()), Some("$1.1B".into())],
            vec![Some("EPS".into())],
            vec![None, Some(String::new())],
        ]);
        // 2 of 6 cells empty
        assert!(valid_table(&table, 0.5));

        let sparse = Table::new(vec![vec![Some("x".into())], vec![None, None, Some(String::new())]]);
        assert!(!valid_table(&sparse, 0.5));
    }

    #[test]
    fn zero_cell_table_is_invalid() {
        assert!(!valid_table(&Table::default(), 0.5));
        assert!(!valid_table(&Table::new(vec![vec![], vec![]]), 0.5));
    }

    #[test]
    fn header_sentences_only_from_first_page() {
        let doc = Document::new(vec![
            Page::new("Acme Corp. Third quarter. Results. Fourth line."),
            Page::new("Page two intro. Another sentence."),
        ]);
        let content = selector().select(&doc);
        assert_eq!(
            content.snippets(),
            &["Acme Corp.", "Third quarter.", "Results."]
        );
    }

    #[test]
    fn salient_header_sentence_is_emitted_twice() {
        let doc = Document::new(vec![Page::new("Revenue was $5 million. Thanks.")]);
        let content = selector().select(&doc);
        assert_eq!(
            content.snippets(),
            &["Revenue was $5 million.", "Thanks.", "Revenue was $5 million."]
        );
    }

    #[test]
    fn salience_is_case_sensitive() {
        let doc = Document::new(vec![
            Page::new(""),
            Page::new("GROSS MARGIN IMPROVED. Gross margin was strong. The gross margin was 40 percent."),
        ]);
        let content = selector().select(&doc);
        assert_eq!(content.snippets(), &["The gross margin was 40 percent."]);
    }

    #[test]
    fn tables_follow_sentences_within_a_page() {
        let doc = Document::new(vec![Page::new("Revenue rose 8%.")
            .with_table(Table::from_strs(vec![vec!["Revenue", "$1.3B"]]))]);
        let content = selector().select(&doc);
        assert_eq!(content.len(), 3);
        assert_eq!(content.snippets()[2], "[['Revenue', '$1.3B']]");
    }

    #[test]
    fn empty_document_selects_nothing() {
        assert!(selector().select(&Document::default()).is_empty());
        assert!(selector().select(&Document::new(vec![Page::new("")])).is_empty());
    }

    #[test]
    fn custom_heuristics() {
        let sel = ContentSelector::new(
            Arc::new(UnicodeSentenceSegmenter),
            0,
            Regex::new(DEFAULT_SALIENCE_PATTERN).unwrap(),
            0.9,
        );
        let doc = Document::new(vec![Page::new("Intro. Net sales were $2 billion.").with_table(grid(2, 2))]);
        let content = sel.select(&doc);
        assert_eq!(content.len(), 2);
        assert_eq!(content.joined().lines().count(), 2);
    }
}
