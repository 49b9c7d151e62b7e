// src/extractors/tables.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::models::{Document, SourceRef, TextSegment};
use crate::extractors::candidate::{ExtractionMethod, FieldCandidate, FieldValue, Row};
use crate::extractors::patterns::field_names;
use crate::reconcile::confidence::{self, thresholds, AdjustmentSet};

/// Catch-all column for header cells that map to no known column.
pub const RAW_TEXT_COLUMN: &str = "raw_text";

/// Header plus at least one row.
const MIN_TABLE_LINES: usize = 2;

/// Distinct header keywords needed to recognise a table type.
const MIN_HEADER_KEYWORDS: usize = 2;

static SPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t| {2,}").expect("Failed to compile SPACE_RUN_RE"));

static DIVIDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s|:+\-=]+$").expect("Failed to compile DIVIDER_RE"));

static NUMERIC_CELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:rs\.?|inr|₹)?\s*\d[\d,]*(?:\.\d+)?\s*(?:%|/-)?$").expect("Failed to compile NUMERIC_CELL_RE")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Director,
    Shareholding,
    CapitalStructure,
}

struct ColumnSpec {
    name: &'static str,
    keywords: &'static [&'static str],
    required: bool,
    numeric: bool,
}

const DIRECTOR_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "name", keywords: &["name"], required: true, numeric: false },
    ColumnSpec { name: "designation", keywords: &["designation", "role", "position"], required: false, numeric: false },
    ColumnSpec { name: "din", keywords: &["din", "identification"], required: false, numeric: true },
    ColumnSpec { name: "date_of_appointment", keywords: &["appointment", "appointed"], required: false, numeric: false },
    ColumnSpec { name: "address", keywords: &["address"], required: false, numeric: false },
];

const SHAREHOLDING_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "shareholder", keywords: &["shareholder", "name", "member", "subscriber"], required: true, numeric: false },
    ColumnSpec { name: "shares", keywords: &["shares", "number"], required: true, numeric: true },
    ColumnSpec { name: "percentage", keywords: &["%", "percent", "holding"], required: false, numeric: true },
];

const CAPITAL_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "share_class", keywords: &["class", "type", "category", "particulars"], required: true, numeric: false },
    ColumnSpec { name: "number_of_shares", keywords: &["number", "shares"], required: false, numeric: true },
    ColumnSpec { name: "nominal_value", keywords: &["nominal", "face value", "par value"], required: false, numeric: true },
    ColumnSpec { name: "amount", keywords: &["amount", "total", "capital"], required: true, numeric: true },
];

impl TableType {
    const ALL: [TableType; 3] = [TableType::Director, TableType::Shareholding, TableType::CapitalStructure];

    pub fn field_name(&self) -> &'static str {
        match self {
            TableType::Director => field_names::BOARD_LIST,
            TableType::Shareholding => field_names::SHAREHOLDING_SCHEDULE,
            TableType::CapitalStructure => field_names::CAPITAL_STRUCTURE,
        }
    }

    pub fn base_confidence(&self) -> f64 {
        match self {
            TableType::Director | TableType::Shareholding => thresholds::TABLE_ROW,
            TableType::CapitalStructure => thresholds::CAPITAL_ROW,
        }
    }

    fn header_keywords(&self) -> &'static [&'static str] {
        match self {
            TableType::Director => &["director", "designation", "din", "appointment"],
            TableType::Shareholding => &["shareholder", "shares", "percentage", "%", "holding", "subscriber"],
            TableType::CapitalStructure => &["class", "nominal", "face value", "authorised", "authorized", "amount"],
        }
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        match self {
            TableType::Director => DIRECTOR_COLUMNS,
            TableType::Shareholding => SHAREHOLDING_COLUMNS,
            TableType::CapitalStructure => CAPITAL_COLUMNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Row,
    pub confidence: f64,
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCandidate {
    pub table_type: TableType,
    pub rows: Vec<TableRow>,
    pub source_ref: SourceRef,
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Pipe,
    Spaces,
}

/// Detects director, shareholding and capital-structure tables in
/// segment text and maps their columns onto structured rows.
#[derive(Debug, Default)]
pub struct TableExtractor;

impl TableExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_tables(&self, document: &Document) -> Vec<TableCandidate> {
        let tables: Vec<TableCandidate> = document
            .text_segments
            .iter()
            .flat_map(|segment| self.tables_in_segment(&document.doc_id, segment))
            .collect();
        tracing::info!("Found {} tables in {}", tables.len(), document.doc_id);
        tables
    }

    fn tables_in_segment(&self, doc_id: &str, segment: &TextSegment) -> Vec<TableCandidate> {
        let lines: Vec<&str> = segment.text.lines().collect();
        let mut tables = Vec::new();
        let mut idx = 0;

        while idx < lines.len() {
            let Some((separator, header)) = split_line(lines[idx]) else {
                idx += 1;
                continue;
            };
            let Some(table_type) = classify_header(&header) else {
                idx += 1;
                continue;
            };

            // Collect consecutive rows split the same way as the header.
            let mut region = vec![lines[idx]];
            let mut body: Vec<BodyRow> = Vec::new();
            let mut end = idx + 1;
            while end < lines.len() {
                let line = lines[end];
                if DIVIDER_RE.is_match(line) && line.contains(['-', '=']) {
                    region.push(line);
                    end += 1;
                    continue;
                }
                match split_line(line) {
                    Some((sep, cells)) if sep == separator => {
                        region.push(line);
                        let found = cells.len();
                        let cells = if separator == Separator::Spaces && found != header.len() && !line.contains('\t') {
                            align_to_header(lines[idx], header.len(), line)
                        } else {
                            cells
                        };
                        body.push(BodyRow { cells, found });
                        end += 1;
                    }
                    _ => break,
                }
            }

            if body.len() + 1 >= MIN_TABLE_LINES {
                let raw_text = region.join("\n");
                tracing::debug!("{:?} table with {} rows on page {}", table_type, body.len(), segment.page);
                tables.push(TableCandidate {
                    table_type,
                    rows: build_rows(table_type, &header, &body),
                    source_ref: SourceRef::new(doc_id, segment, &raw_text),
                    raw_text,
                });
                idx = end;
            } else {
                idx += 1;
            }
        }

        tables
    }
}

/// Cells of one body line, and how many the line itself carried.
struct BodyRow {
    cells: Vec<String>,
    found: usize,
}

/// Non-empty cells of a space-aligned line with their starting column.
fn cell_spans(line: &str) -> Vec<(usize, String)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    for gap in SPACE_RUN_RE.find_iter(line) {
        bounds.push((start, gap.start()));
        start = gap.end();
    }
    bounds.push((start, line.len()));

    bounds
        .into_iter()
        .filter_map(|(from, to)| {
            let piece = &line[from..to];
            let text = piece.trim();
            if text.is_empty() {
                return None;
            }
            let lead = piece.len() - piece.trim_start().len();
            Some((line[..from + lead].chars().count(), text.to_string()))
        })
        .collect()
}

/// Places each cell of `line` under the header cell whose start column is
/// nearest, leaving blanks where the row has no value.
fn align_to_header(header_line: &str, columns: usize, line: &str) -> Vec<String> {
    let header = cell_spans(header_line);
    let mut cells = vec![String::new(); columns];
    for (offset, text) in cell_spans(line) {
        let nearest = header.iter().enumerate().min_by_key(|(_, (start, _))| start.abs_diff(offset)).map(|(i, _)| i);
        let Some(cell) = nearest.and_then(|i| cells.get_mut(i)) else {
            continue;
        };
        if !cell.is_empty() {
            cell.push(' ');
        }
        cell.push_str(&text);
    }
    cells
}

/// Splits a line into cells when it carries column separators.
/// Returns `None` for prose lines and lines with fewer than two cells.
fn split_line(line: &str) -> Option<(Separator, Vec<String>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (separator, cells): (Separator, Vec<String>) = if trimmed.contains('|') {
        let mut cells: Vec<String> = trimmed.split('|').map(|c| c.trim().to_string()).collect();
        if cells.first().is_some_and(|c| c.is_empty()) {
            cells.remove(0);
        }
        if cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }
        (Separator::Pipe, cells)
    } else if SPACE_RUN_RE.is_match(trimmed) {
        (Separator::Spaces, SPACE_RUN_RE.split(trimmed).map(|c| c.trim().to_string()).collect())
    } else {
        return None;
    };

    if cells.len() >= 2 {
        Some((separator, cells))
    } else {
        None
    }
}

/// Case-insensitive keyword test. Short alphanumeric keywords ("din")
/// must match a whole word so they are not found inside "holding".
fn cell_matches(cell: &str, keyword: &str) -> bool {
    let cell = cell.to_lowercase();
    if keyword.len() <= 3 && keyword.chars().all(|c| c.is_ascii_alphanumeric()) {
        cell.split(|c: char| !c.is_alphanumeric()).any(|token| token == keyword)
    } else {
        cell.contains(keyword)
    }
}

fn classify_header(cells: &[String]) -> Option<TableType> {
    TableType::ALL
        .iter()
        .map(|table_type| {
            let hits = table_type
                .header_keywords()
                .iter()
                .filter(|kw| cells.iter().any(|cell| cell_matches(cell, kw)))
                .count();
            (*table_type, hits)
        })
        .filter(|(_, hits)| *hits >= MIN_HEADER_KEYWORDS)
        // Earlier types win ties.
        .fold(None, |best: Option<(TableType, usize)>, (t, hits)| match best {
            Some((_, best_hits)) if best_hits >= hits => best,
            _ => Some((t, hits)),
        })
        .map(|(t, _)| t)
}

/// Header index -> canonical column name; `None` for unmapped headers.
fn map_header(table_type: TableType, header: &[String]) -> Vec<Option<&'static str>> {
    let mut taken: Vec<&'static str> = Vec::new();
    header
        .iter()
        .map(|cell| {
            let column = table_type
                .columns()
                .iter()
                .find(|column| !taken.contains(&column.name) && column.keywords.iter().any(|kw| cell_matches(cell, kw)))
                .map(|column| column.name);
            if let Some(name) = column {
                taken.push(name);
            }
            column
        })
        .collect()
}

fn build_rows(table_type: TableType, header: &[String], body: &[BodyRow]) -> Vec<TableRow> {
    let mapping = map_header(table_type, header);

    body.iter()
        .map(|body_row| {
            let mut row = Row::new();
            let mut unmapped = Vec::new();

            for (idx, value) in body_row.cells.iter().enumerate() {
                match mapping.get(idx).copied().flatten() {
                    Some(column) => {
                        row.insert(column.to_string(), value.clone());
                    }
                    None if value.is_empty() => {}
                    None => {
                        let label = header.get(idx).map(String::as_str).unwrap_or("extra");
                        unmapped.push(format!("{}: {}", label, value));
                    }
                }
            }
            if !unmapped.is_empty() {
                row.insert(RAW_TEXT_COLUMN.to_string(), unmapped.join("; "));
            }

            let mut issues = Vec::new();
            if body_row.found != header.len() {
                issues.push(format!("{} cells for {} header columns", body_row.found, header.len()));
            }
            issues.extend(row_issues(table_type, &row));
            let malformed = !issues.is_empty();
            TableRow {
                cells: row,
                confidence: confidence::adjust(table_type.base_confidence(), &AdjustmentSet { malformed, ..Default::default() }),
                needs_review: malformed,
                issues,
            }
        })
        .collect()
}

fn row_issues(table_type: TableType, row: &Row) -> Vec<String> {
    let mut issues = Vec::new();
    for column in table_type.columns() {
        let value = row.get(column.name).map(|v| v.trim()).filter(|v| !v.is_empty());
        match value {
            None if column.required => issues.push(format!("missing required column {}", column.name)),
            Some(v) if column.numeric && !NUMERIC_CELL_RE.is_match(v) => {
                issues.push(format!("non-numeric {}: {}", column.name, v));
            }
            _ => {}
        }
    }
    issues
}

/// One candidate per document and table type. Tables of the same type in
/// one document (a schedule continued over pages) are concatenated in page
/// order. Confidence is that of the weakest row.
pub fn table_field_candidates(tables: &[TableCandidate]) -> Vec<FieldCandidate> {
    let mut groups: Vec<((&str, TableType), Vec<&TableCandidate>)> = Vec::new();
    for table in tables.iter().filter(|t| !t.rows.is_empty()) {
        let key = (table.source_ref.doc_id.as_str(), table.table_type);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, parts)) => parts.push(table),
            None => groups.push((key, vec![table])),
        }
    }

    groups
        .into_iter()
        .map(|((_, table_type), parts)| {
            let rows: Vec<&TableRow> = parts.iter().flat_map(|t| t.rows.iter()).collect();
            let confidence = rows.iter().map(|r| r.confidence).fold(1.0_f64, f64::min);
            let issues: Vec<String> = rows
                .iter()
                .enumerate()
                .flat_map(|(idx, row)| row.issues.iter().map(move |issue| format!("row {}: {}", idx + 1, issue)))
                .collect();
            if parts.len() > 1 {
                tracing::debug!("Joined {} {:?} tables into {} rows", parts.len(), table_type, rows.len());
            }
            FieldCandidate {
                field_name: table_type.field_name().to_string(),
                value: FieldValue::Rows(rows.iter().map(|r| r.cells.clone()).collect()),
                raw_text: parts.iter().map(|t| t.raw_text.as_str()).collect::<Vec<_>>().join("\n\n"),
                confidence,
                source_refs: parts.iter().map(|t| t.source_ref.clone()).collect(),
                extraction_method: ExtractionMethod::Table,
                needs_review: rows.iter().any(|r| r.needs_review),
                issues,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::models::{DocType, SegmentType};

    fn doc_with(text: &str) -> Document {
        Document {
            doc_id: "doc-t".into(),
            doc_type: DocType::MoaAoa,
            text_segments: vec![TextSegment { text: text.to_string(), page: 4, segment_type: SegmentType::Table }],
        }
    }

    #[test]
    fn director_table_with_extra_column() {
        let text = "Name | Designation | DIN | Nationality\n\
                    Ravi Kumar | Director | 01234567 | Indian\n\
                    Anita Shah | Managing Director | 07654321 | Indian\n\
                    John Mathew | Director | 09876543 | British";
        let tables = TableExtractor::new().extract_tables(&doc_with(text));
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.table_type, TableType::Director);
        assert_eq!(table.rows.len(), 3);
        for row in &table.rows {
            assert_eq!(row.confidence, 0.80);
            assert!(!row.needs_review);
            assert!(row.cells.contains_key("name"));
            assert!(row.cells.contains_key("din"));
            assert!(row.cells[RAW_TEXT_COLUMN].starts_with("Nationality: "));
        }
        assert_eq!(table.rows[1].cells["designation"], "Managing Director");
        assert_eq!(table.source_ref.page, 4);
    }

    #[test]
    fn multi_space_shareholding_table() {
        let text = "Schedule of shareholding\n\
                    Name of Shareholder    No. of Shares    % Holding\n\
                    Ravi Kumar             30,000           60%\n\
                    Anita Shah             20,000           40%\n\
                    Signed by the subscribers";
        let tables = TableExtractor::new().extract_tables(&doc_with(text));
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_type, TableType::Shareholding);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[0].cells["shares"], "30,000");
        assert_eq!(tables[0].rows[1].cells["percentage"], "40%");
    }

    #[test]
    fn capital_structure_rows_score_higher() {
        let text = "Class of Shares\tNumber of Shares\tNominal Value\tAmount\n\
                    Equity\t50,000\tRs. 10\tRs. 5,00,000";
        let tables = TableExtractor::new().extract_tables(&doc_with(text));
        assert_eq!(tables[0].table_type, TableType::CapitalStructure);
        assert_eq!(tables[0].rows[0].confidence, 0.85);
        assert_eq!(tables[0].rows[0].cells["nominal_value"], "Rs. 10");
    }

    #[test]
    fn malformed_rows_are_kept_and_flagged() {
        let text = "Designation | Name | DIN\n\
                    Director | Ravi Kumar | pending\n\
                    Director |  | 07654321";
        let tables = TableExtractor::new().extract_tables(&doc_with(text));
        let rows = &tables[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].confidence, 0.70);
        assert!(rows[0].needs_review);
        assert!(rows[0].issues[0].contains("non-numeric din"));
        assert!(rows[1].needs_review);
        assert!(rows[1].issues[0].contains("missing required column name"));
    }

    #[test]
    fn blank_space_aligned_cell_keeps_its_column() {
        let text = [
            format!("{:<14}{:<19}{}", "Name", "Designation", "DIN"),
            format!("{:<14}{:<19}{}", "Ravi Kumar", "Director", "01234567"),
            format!("{:<33}{}", "Anita Shah", "07654321"),
        ]
        .join("\n");
        let tables = TableExtractor::new().extract_tables(&doc_with(&text));
        let rows = &tables[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].confidence, 0.80);
        assert!(!rows[0].needs_review);

        assert_eq!(rows[1].cells["name"], "Anita Shah");
        assert_eq!(rows[1].cells["din"], "07654321");
        assert_eq!(rows[1].cells["designation"], "");
        assert_eq!(rows[1].confidence, 0.70);
        assert!(rows[1].needs_review);
        assert_eq!(rows[1].issues[0], "2 cells for 3 header columns");
    }

    #[test]
    fn short_pipe_row_is_flagged() {
        let text = "Name | Designation | DIN\nRavi Kumar | Director | 01234567\nAnita Shah | 07654321";
        let tables = TableExtractor::new().extract_tables(&doc_with(text));
        let rows = &tables[0].rows;
        assert!(!rows[0].needs_review);
        assert!(rows[1].needs_review);
        assert_eq!(rows[1].confidence, 0.70);
        assert!(rows[1].issues.iter().any(|i| i == "2 cells for 3 header columns"));
    }

    #[test]
    fn header_alone_is_not_a_table() {
        let tables = TableExtractor::new().extract_tables(&doc_with("Name | Designation | DIN\nThe directors are listed above."));
        assert!(tables.is_empty());
    }

    #[test]
    fn prose_is_not_a_table() {
        let tables = TableExtractor::new().extract_tables(&doc_with("The directors of the company are appointed by the board."));
        assert!(tables.is_empty());
    }

    #[test]
    fn short_keywords_match_whole_words() {
        assert!(cell_matches("DIN", "din"));
        assert!(!cell_matches("% Holding", "din"));
        assert!(cell_matches("Shareholding %", "%"));
    }

    #[test]
    fn tables_become_field_candidates() {
        let text = "Name | Designation | DIN\nRavi Kumar | Director | pending\nAnita Shah | Director | 07654321";
        let tables = TableExtractor::new().extract_tables(&doc_with(text));
        let candidates = table_field_candidates(&tables);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.field_name, field_names::BOARD_LIST);
        assert_eq!(c.extraction_method, ExtractionMethod::Table);
        assert_eq!(c.confidence, 0.70);
        assert!(c.needs_review);
        assert_eq!(c.value.as_rows().unwrap().len(), 2);
        assert!(c.issues[0].starts_with("row 1:"));
    }

    #[test]
    fn table_continued_over_pages_is_one_candidate() {
        let document = Document {
            doc_id: "moa".into(),
            doc_type: DocType::MoaAoa,
            text_segments: vec![
                TextSegment {
                    text: "Name | Designation | DIN\nRavi Kumar | Director | 01234567".into(),
                    page: 3,
                    segment_type: SegmentType::Table,
                },
                TextSegment {
                    text: "Name | Designation | DIN\nAnita Shah | Director | 07654321".into(),
                    page: 4,
                    segment_type: SegmentType::Table,
                },
            ],
        };
        let tables = TableExtractor::new().extract_tables(&document);
        assert_eq!(tables.len(), 2);

        let candidates = table_field_candidates(&tables);
        assert_eq!(candidates.len(), 1);
        let rows = candidates[0].value.as_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Ravi Kumar");
        assert_eq!(rows[1]["name"], "Anita Shah");
        let pages: Vec<u32> = candidates[0].source_refs.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![3, 4]);
        assert_eq!(candidates[0].confidence, 0.80);
    }
}
