//! Parsed-document model shared by the loader and the content selector.
//!
//! A [`Document`] is what remains of a PDF once pdfium has been asked for its
//! text and its table-like text regions: an ordered list of [`Page`]s, each
//! with raw text and zero or more [`Table`]s, plus [`DocumentMetadata`].
//! Nothing here touches pdfium, so selection logic can be tested on
//! hand-built documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed document: pages in reading order plus metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pages: Vec<Page>,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Build a document from pages with empty metadata.
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// One page: raw extracted text and the tables detected on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub text: String,
    pub tables: Vec<Table>,
}

impl Page {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }
}

/// A grid of nullable text cells. Rows may differ in length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<Option<String>>>) -> Self {
        Self { rows }
    }

    /// Build a table from string rows; empty strings stay empty (not null).
    pub fn from_strs(rows: Vec<Vec<&str>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| Some(c.to_string())).collect())
                .collect(),
        }
    }

    /// Total number of cells, counted row by row.
    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Number of cells that are null or the empty string.
    pub fn empty_cell_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|c| c.as_deref().map_or(true, str::is_empty))
            .count()
    }

    /// Fraction of empty cells; a table with no cells counts as fully empty.
    pub fn empty_ratio(&self) -> f64 {
        let total = self.cell_count();
        if total == 0 {
            return 1.0;
        }
        self.empty_cell_count() as f64 / total as f64
    }
}

/// Flat bracketed form sent to the LLM: `[['Revenue', '$1.3B', None], ...]`.
///
/// The extraction prompt tells the model that bracketed text is a table, so
/// this exact shape matters.
impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("[")?;
            for (j, cell) in row.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                match cell {
                    Some(text) => f.write_str(&quoted(text))?,
                    None => f.write_str("None")?,
                }
            }
            f.write_str("]")?;
        }
        f.write_str("]")
    }
}

/// Single-quote a cell, escaping backslashes, quotes and newlines.
fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Metadata extracted from a PDF without reading its content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
}

impl DocumentMetadata {
    /// The metadata header placed in front of the prompt body.
    ///
    /// Only author and title help the model find the company and period;
    /// returns `None` when neither is set.
    pub fn prompt_header(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(author) = self.author.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("'Author': {}", quoted(author)));
        }
        if let Some(title) = self.title.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("'Title': {}", quoted(title)));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("{{{}}}", parts.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_display_is_bracketed() {
        let table = Table::new(vec![
            vec![Some("Revenue".into()), Some("$1,300.2".into()), None],
            vec![Some("Net income".into()), Some(String::new())],
        ]);
        assert_eq!(
            table.to_string(),
            "[['Revenue', '$1,300.2', None], ['Net income', '']]"
        );
    }

    #[test]
    fn table_display_escapes_quotes() {
        let table = Table::from_strs(vec![vec!["Q3 '24"]]);
        assert_eq!(table.to_string(), r"[['Q3 \'24']]");
    }

    #[test]
    fn empty_ratio_counts_null_and_blank() {
        let table = Table::new(vec![
            vec![Some("a".into()), None],
            vec![Some(String::new()), Some("b".into())],
        ]);
        assert_eq!(table.cell_count(), 4);
        assert_eq!(table.empty_cell_count(), 2);
        assert!((table.empty_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_table_is_fully_empty() {
        assert_eq!(Table::default().empty_ratio(), 1.0);
    }

    #[test]
    fn prompt_header_includes_author_and_title() {
        let meta = DocumentMetadata {
            author: Some("Acme Corp".into()),
            title: Some("Q3 2024 Earnings".into()),
            ..Default::default()
        };
        assert_eq!(
            meta.prompt_header().as_deref(),
            Some("{'Author': 'Acme Corp', 'Title': 'Q3 2024 Earnings'}")
        );
    }

    #[test]
    fn prompt_header_absent_without_author_or_title() {
        let meta = DocumentMetadata {
            producer: Some("Word".into()),
            ..Default::default()
        };
        assert_eq!(meta.prompt_header(), None);
    }
}
