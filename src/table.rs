//! In-memory metrics table parsed from delimited text
//!
//! Cells are typed per value rather than per column: the metrics exports mix
//! numeric scores, identifiers and free text, and any column may carry blanks.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use crate::errors::{PortalError, Result};

/// One table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Classify a raw field: blank is null, finite floats are numbers.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(raw.to_string()),
        }
    }

    /// Classify a raw field without numeric inference: blank is null.
    pub fn text(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Cell::Null
        } else {
            Cell::Text(raw.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String form used for filter comparisons and candidate lists.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Number(n) => Some(format_number(*n)),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    /// Total order for display sorting: numbers, then text, then nulls.
    /// Integer-looking text sorts numerically ahead of other text.
    pub fn sort_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Number(_), _) => Ordering::Less,
            (_, Cell::Number(_)) => Ordering::Greater,
            (Cell::Text(a), Cell::Text(b)) => text_cmp(a, b),
            (Cell::Text(_), Cell::Null) => Ordering::Less,
            (Cell::Null, Cell::Text(_)) => Ordering::Greater,
            (Cell::Null, Cell::Null) => Ordering::Equal,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            // Blank cells render as empty strings
            Cell::Null => serializer.serialize_str(""),
            Cell::Number(n) => serializer.serialize_f64(*n),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

fn text_cmp(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Integral floats print without a fractional part, matching the source file.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Named columns over rows of typed cells
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl MetricsTable {
    /// Build a table, checking every row is as wide as the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(PortalError::Parse(format!("duplicate column {}", column)));
            }
        }
        if let Some(pos) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(PortalError::Parse(format!(
                "row {} has {} fields, expected {}",
                pos + 1,
                rows[pos].len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Parse UTF-8 delimited text whose first record is the header.
    pub fn from_csv(data: &[u8]) -> Result<Self> {
        Self::from_csv_with_text_columns(data, &[])
    }

    /// Like [`from_csv`](Self::from_csv), but cells of `text_columns` are
    /// never read as numbers.
    pub fn from_csv_with_text_columns(data: &[u8], text_columns: &[&str]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(PortalError::Parse("missing header row".to_string()));
        }
        let verbatim: Vec<bool> = columns
            .iter()
            .map(|c| text_columns.contains(&c.as_str()))
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .zip(&verbatim)
                    .map(|(raw, &text)| if text { Cell::text(raw) } else { Cell::parse(raw) })
                    .collect(),
            );
        }

        Self::new(columns, rows)
    }

    #[cfg(test)]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Like [`column_index`](Self::column_index) but failing with a filter error.
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| PortalError::FilterConfig {
                column: column.to_string(),
            })
    }

    #[cfg(test)]
    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Sorted distinct non-null values of a column, as text.
    pub fn unique_text(&self, column: &str) -> Vec<String> {
        let Some(idx) = self.column_index(column) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|r| r[idx].as_text())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows for which `keep` returns true, in their original order.
    pub fn filter_rows<F>(&self, mut keep: F) -> MetricsTable
    where
        F: FnMut(&[Cell]) -> bool,
    {
        MetricsTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Stable sort on the given columns; unknown columns are ignored.
    pub fn sort_by_columns(&mut self, columns: &[&str]) {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| a[i].sort_cmp(&b[i]))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }

    /// Append a derived column computed from each row.
    pub fn push_column<F>(&mut self, name: &str, mut derive: F) -> Result<()>
    where
        F: FnMut(&[Cell]) -> Cell,
    {
        if self.has_column(name) {
            return Err(PortalError::Parse(format!("duplicate column {}", name)));
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            let cell = derive(row);
            row.push(cell);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "TenantId,AssessmentId,Note_Type,Notes,BLEU_Score_File\n\
                          B,2,SOAP,null,41.5\n\
                          A,10,SOAP,HospX,87.25\n\
                          A,9,Progress,,\n";

    #[test]
    fn test_parses_header_and_typed_cells() {
        let table = MetricsTable::from_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.columns().len(), 5);
        assert_eq!(table.len(), 3);
        assert_eq!(table.value(0, "TenantId"), Some(&Cell::Text("B".into())));
        assert_eq!(table.value(1, "BLEU_Score_File"), Some(&Cell::Number(87.25)));
        assert_eq!(table.value(2, "Notes"), Some(&Cell::Null));
    }

    #[test]
    fn test_ragged_rows_are_parse_errors() {
        let data = "TenantId,AssessmentId\nA,1\nB\n";
        let err = MetricsTable::from_csv(data.as_bytes()).unwrap_err();
        assert!(matches!(err, PortalError::Parse(_)));
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let data = b"TenantId,Notes\nA,\xff\xfe\n";
        let err = MetricsTable::from_csv(data).unwrap_err();
        assert!(matches!(err, PortalError::Parse(_)));
    }

    #[test]
    fn test_empty_payload_is_parse_error() {
        assert!(matches!(
            MetricsTable::from_csv(b""),
            Err(PortalError::Parse(_))
        ));
    }

    #[test]
    fn test_duplicate_headers_rejected() {
        let data = "TenantId,TenantId\nA,B\n";
        assert!(MetricsTable::from_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_unique_text_sorted_and_skips_nulls() {
        let table = MetricsTable::from_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.unique_text("Notes"), vec!["HospX", "null"]);
        assert_eq!(table.unique_text("AssessmentId"), vec!["10", "2", "9"]);
        assert!(table.unique_text("Missing").is_empty());
    }

    #[test]
    fn test_sort_is_numeric_within_tenant() {
        let mut table = MetricsTable::from_csv(SAMPLE.as_bytes()).unwrap();
        table.sort_by_columns(&["TenantId", "AssessmentId"]);
        let keys: Vec<_> = (0..table.len())
            .map(|i| table.value(i, "AssessmentId").and_then(Cell::as_text).unwrap())
            .collect();
        assert_eq!(keys, vec!["9", "10", "2"]);
    }

    #[test]
    fn test_identifier_columns_keep_leading_zeros() {
        let data = "TenantId,AssessmentId,BLEU_Score_File\n007,10,1.5\n007,9,\n";
        let mut table = MetricsTable::from_csv_with_text_columns(
            data.as_bytes(),
            &["TenantId", "AssessmentId"],
        )
        .unwrap();
        assert_eq!(table.value(0, "TenantId"), Some(&Cell::Text("007".into())));
        assert_eq!(table.value(0, "BLEU_Score_File"), Some(&Cell::Number(1.5)));
        assert_eq!(table.value(1, "BLEU_Score_File"), Some(&Cell::Null));

        table.sort_by_columns(&["TenantId", "AssessmentId"]);
        assert_eq!(table.value(0, "AssessmentId"), Some(&Cell::Text("9".into())));
    }

    #[test]
    fn test_text_sort_is_a_total_order() {
        let mut cells: Vec<Cell> = ["5a", "10", "9", "b", "007", "7"]
            .iter()
            .map(|s| Cell::Text(s.to_string()))
            .collect();
        cells.sort_by(Cell::sort_cmp);
        let sorted: Vec<_> = cells.iter().filter_map(Cell::as_text).collect();
        assert_eq!(sorted, vec!["007", "7", "9", "10", "5a", "b"]);
    }

    #[test]
    fn test_filter_rows_preserves_order() {
        let table = MetricsTable::from_csv(SAMPLE.as_bytes()).unwrap();
        let soap = table.filter_rows(|r| r[2] == Cell::Text("SOAP".into()));
        assert_eq!(soap.len(), 2);
        assert_eq!(soap.value(0, "TenantId"), Some(&Cell::Text("B".into())));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_null_serializes_as_empty_string() {
        let json = serde_json::to_string(&vec![Cell::Null, Cell::Number(1.5)]).unwrap();
        assert_eq!(json, r#"["",1.5]"#);
    }
}
