//! Sentence segmentation for page text.
//!
//! pdfium returns page text with a hard line break at the end of every
//! printed line, so a sentence wrapped across two lines would otherwise be
//! cut in half. A single line break is folded into a space when the text
//! reads on: the line ends in sentence punctuation, a comma or a hyphen, or
//! the next line starts in lower case. Otherwise the break ends a segment,
//! so the rows of a statement table (`Revenue $1,300` / `Cost of sales 800`)
//! stay separate. Blank lines always end a paragraph.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Splits text into sentences.
pub trait SentenceSegmenter: Send + Sync {
    /// Trimmed, non-empty sentences in reading order.
    fn sentences(&self, text: &str) -> Vec<String>;
}

/// UAX #29 sentence boundaries via `unicode-segmentation`.
///
/// Decimal points between digits (`$1.3 billion`) are not boundaries under
/// UAX #29, so figures stay inside their sentence.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSentenceSegmenter;

static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n[ \t]*\r?\n\s*").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

impl SentenceSegmenter for UnicodeSentenceSegmenter {
    fn sentences(&self, text: &str) -> Vec<String> {
        RE_PARAGRAPH_BREAK
            .split(text)
            .flat_map(join_wrapped_lines)
            .flat_map(|segment| {
                let flat = RE_WHITESPACE.replace_all(&segment, " ");
                flat.unicode_sentences()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// Split a paragraph into segments, joining lines that continue the previous one.
fn join_wrapped_lines(paragraph: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for line in paragraph.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match segments.last_mut() {
            Some(current) if reads_on(current, line) => {
                current.push(' ');
                current.push_str(line);
            }
            _ => segments.push(line.to_string()),
        }
    }
    segments
}

fn reads_on(previous: &str, next: &str) -> bool {
    let tail = previous.trim_end_matches(['"', '\'', ')', ']', '\u{201D}', '\u{2019}']);
    tail.ends_with(['.', '!', '?', ',', '-'])
        || next.chars().next().is_some_and(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<String> {
        UnicodeSentenceSegmenter.sentences(text)
    }

    #[test]
    fn splits_on_sentence_boundaries() {
        assert_eq!(
            split("Revenue grew. Margins held! Was guidance raised? Yes."),
            vec!["Revenue grew.", "Margins held!", "Was guidance raised?", "Yes."]
        );
    }

    #[test]
    fn decimal_figures_stay_in_one_sentence() {
        assert_eq!(
            split("Revenue was $1.3 billion, up 12.3% year over year. EPS was $1.25."),
            vec![
                "Revenue was $1.3 billion, up 12.3% year over year.",
                "EPS was $1.25."
            ]
        );
    }

    #[test]
    fn wrapped_lines_are_joined() {
        assert_eq!(
            split("Net income was $500 million\r\ncompared with $400 million last year."),
            vec!["Net income was $500 million compared with $400 million last year."]
        );
    }

    #[test]
    fn unpunctuated_lines_stay_separate() {
        assert_eq!(
            split("Revenue $1,300\nCost of sales 800\nGross profit 500"),
            vec!["Revenue $1,300", "Cost of sales 800", "Gross profit 500"]
        );
    }

    #[test]
    fn punctuated_lines_are_joined_then_split() {
        assert_eq!(
            split("Revenue grew 8%, driven by\nCloud. Margins held.\nGuidance was raised."),
            vec!["Revenue grew 8%, driven by Cloud.", "Margins held.", "Guidance was raised."]
        );
    }

    #[test]
    fn blank_lines_end_a_paragraph() {
        assert_eq!(
            split("Acme Corp Third Quarter Results\r\n\r\nRevenue rose 8%."),
            vec!["Acme Corp Third Quarter Results", "Revenue rose 8%."]
        );
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        assert!(split("").is_empty());
        assert!(split("   \n\n  ").is_empty());
    }
}
