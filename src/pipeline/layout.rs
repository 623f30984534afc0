//! Table detection from positioned text runs.
//!
//! pdfium reports text as runs with bounding boxes but has no notion of a
//! table. Financial statements are laid out as aligned columns, so tables are
//! recovered geometrically:
//!
//! 1. runs are grouped into lines by vertical overlap
//! 2. a line is split into cells wherever the horizontal gap between two runs
//!    is wide compared to the line height
//! 3. two or more consecutive multi-cell lines form a table
//! 4. column spans are the union of the cells' horizontal extents; every row
//!    is aligned to them, so a missing figure becomes a null cell
//!
//! Coordinates are PDF points with the origin at the bottom-left, so `top`
//! is greater than `bottom`. Nothing here touches pdfium.

use crate::document::Table;

/// A horizontal gap wider than this many line heights separates two cells.
const CELL_GAP_FACTOR: f32 = 1.5;

/// Runs must share at least this fraction of the smaller height to sit on
/// the same line.
const LINE_OVERLAP: f32 = 0.5;

/// Gaps narrower than this fraction of the line height join runs without a
/// space (kerning splits, not word breaks).
const WORD_GAP_FACTOR: f32 = 0.15;

/// A run of text and its bounding box on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            text: text.into(),
            left,
            bottom,
            right,
            top,
        }
    }

    fn height(&self) -> f32 {
        (self.top - self.bottom).max(0.0)
    }
}

#[derive(Debug)]
struct Line {
    top: f32,
    bottom: f32,
    runs: Vec<TextRun>,
}

impl Line {
    fn height(&self) -> f32 {
        (self.top - self.bottom).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    text: String,
    left: f32,
    right: f32,
}

/// Detect every table on a page from its text runs.
pub fn detect_tables(runs: &[TextRun]) -> Vec<Table> {
    let lines = group_lines(runs);
    let mut tables = Vec::new();
    let mut block: Vec<Vec<Cell>> = Vec::new();

    for line in &lines {
        let cells = split_cells(line);
        if cells.len() >= 2 {
            block.push(cells);
        } else {
            flush_block(&mut block, &mut tables);
        }
    }
    flush_block(&mut block, &mut tables);
    tables
}

fn flush_block(block: &mut Vec<Vec<Cell>>, tables: &mut Vec<Table>) {
    if block.len() >= 2 {
        let rows = std::mem::take(block);
        let spans = column_spans(&rows);
        tables.push(align(&rows, &spans));
    } else {
        block.clear();
    }
}

// ── Lines ────────────────────────────────────────────────────────────────

fn group_lines(runs: &[TextRun]) -> Vec<Line> {
    let mut sorted: Vec<&TextRun> = runs.iter().filter(|r| !r.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| b.top.total_cmp(&a.top).then(a.left.total_cmp(&b.left)));

    let mut lines: Vec<Line> = Vec::new();
    for run in sorted {
        match lines.last_mut() {
            Some(line) if same_line(line, run) => {
                line.top = line.top.max(run.top);
                line.bottom = line.bottom.min(run.bottom);
                line.runs.push(run.clone());
            }
            _ => lines.push(Line {
                top: run.top,
                bottom: run.bottom,
                runs: vec![run.clone()],
            }),
        }
    }
    lines
}

fn same_line(line: &Line, run: &TextRun) -> bool {
    let overlap = line.top.min(run.top) - line.bottom.max(run.bottom);
    let smaller = line.height().min(run.height());
    if smaller <= 0.0 {
        return overlap >= 0.0;
    }
    overlap >= LINE_OVERLAP * smaller
}

// ── Cells ────────────────────────────────────────────────────────────────

fn split_cells(line: &Line) -> Vec<Cell> {
    let mut runs: Vec<&TextRun> = line.runs.iter().collect();
    runs.sort_by(|a, b| a.left.total_cmp(&b.left));

    let height = line.height().max(1.0);
    let mut cells: Vec<Cell> = Vec::new();
    for run in runs {
        let text = run.text.trim();
        match cells.last_mut() {
            Some(cell) if run.left - cell.right <= CELL_GAP_FACTOR * height => {
                if run.left - cell.right > WORD_GAP_FACTOR * height {
                    cell.text.push(' ');
                }
                cell.text.push_str(text);
                cell.right = cell.right.max(run.right);
            }
            _ => cells.push(Cell {
                text: text.to_string(),
                left: run.left,
                right: run.right,
            }),
        }
    }
    cells
}

// ── Columns ──────────────────────────────────────────────────────────────

fn column_spans(rows: &[Vec<Cell>]) -> Vec<(f32, f32)> {
    let mut extents: Vec<(f32, f32)> = rows.iter().flatten().map(|c| (c.left, c.right)).collect();
    extents.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut spans: Vec<(f32, f32)> = Vec::new();
    for (left, right) in extents {
        match spans.last_mut() {
            Some(span) if left <= span.1 => span.1 = span.1.max(right),
            _ => spans.push((left, right)),
        }
    }
    spans
}

fn align(rows: &[Vec<Cell>], spans: &[(f32, f32)]) -> Table {
    let aligned = rows
        .iter()
        .map(|cells| {
            let mut row: Vec<Option<String>> = vec![None; spans.len()];
            for cell in cells {
                let Some(col) = spans.iter().position(|&(l, r)| cell.left >= l && cell.left <= r) else {
                    continue;
                };
                match &mut row[col] {
                    Some(existing) => {
                        existing.push(' ');
                        existing.push_str(&cell.text);
                    }
                    slot @ None => *slot = Some(cell.text.clone()),
                }
            }
            row
        })
        .collect();
    Table::new(aligned)
}
