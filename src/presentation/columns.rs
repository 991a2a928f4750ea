//! Column display configuration
//!
//! The label registry fixes both which columns appear and their on-screen
//! order. Kinds are assigned by precedence: the feedback link column, then
//! percent columns, then number columns, then plain text.

use serde::Serialize;

use crate::schema::{ColumnLabel, FILE_LINK_COL};
use crate::table::MetricsTable;

/// Decimal places used for percentage columns
pub const PERCENT_DECIMALS: usize = 1;

const LINK_TEXT: &str = "Open Feedback";

/// How a column is rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ColumnKind {
    Link { display_text: String },
    Percent { decimals: usize },
    Number,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnWidth {
    Small,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub column: String,
    pub label: String,
    pub kind: ColumnKind,
    pub width: ColumnWidth,
}

/// Ordered display specs, one per registry entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ColumnDisplaySpec(Vec<ColumnSpec>);

impl ColumnDisplaySpec {
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.0
    }

    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&ColumnSpec> {
        self.0.iter().find(|spec| spec.column == column)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop entries for columns the table does not carry.
    pub fn present_in(&self, table: &MetricsTable) -> ColumnDisplaySpec {
        ColumnDisplaySpec(
            self.0
                .iter()
                .filter(|spec| table.has_column(&spec.column))
                .cloned()
                .collect(),
        )
    }
}

/// Map every registry entry to a display spec, preserving registry order.
pub fn build_column_config(
    labels: &[ColumnLabel],
    percent_columns: &[String],
    number_columns: &[String],
) -> ColumnDisplaySpec {
    let specs = labels
        .iter()
        .map(|entry| {
            let column = entry.column.as_str();
            let (kind, width) = if column == FILE_LINK_COL {
                (
                    ColumnKind::Link {
                        display_text: LINK_TEXT.to_string(),
                    },
                    ColumnWidth::Small,
                )
            } else if percent_columns.iter().any(|c| c == column) {
                (
                    ColumnKind::Percent {
                        decimals: PERCENT_DECIMALS,
                    },
                    ColumnWidth::Small,
                )
            } else if number_columns.iter().any(|c| c == column) {
                (ColumnKind::Number, ColumnWidth::Small)
            } else {
                (ColumnKind::Text, ColumnWidth::Auto)
            };

            ColumnSpec {
                column: entry.column.clone(),
                label: entry.label.clone(),
                kind,
                width,
            }
        })
        .collect();

    ColumnDisplaySpec(specs)
}

/// Render a percentage value, e.g. `87.3%`.
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value)
}
