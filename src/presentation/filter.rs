//! Row filtering and filter candidate lists

use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::schema::{LocationFilter, SourceSchema, ACCURACY_COL, NOTE_TYPE_COL};
use crate::table::{Cell, MetricsTable};

pub const ALL_LEVELS: &str = "All Levels";
pub const ALL_TYPES: &str = "All Types";

/// Accuracy buckets offered by the similarity-level filter
pub const ACCURACY_LEVELS: [&str; 3] = ["High", "Medium", "Low"];

/// Hospital placeholder written by the export for unknown hospitals
const NULL_HOSPITAL: &str = "null";

/// A filter value: everything, or one concrete value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum Choice {
    #[default]
    All,
    Value(String),
}

impl Choice {
    /// Parse a widget value; blanks and the "All ..." sentinels mean no filter.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Choice::All;
        };
        let sentinels = [
            "all",
            ALL_LEVELS,
            ALL_TYPES,
            LocationFilter::Hospital.all_label(),
            LocationFilter::Tenant.all_label(),
        ];
        if sentinels.iter().any(|s| s.eq_ignore_ascii_case(raw)) {
            Choice::All
        } else {
            Choice::Value(raw.to_string())
        }
    }

    #[cfg(test)]
    pub fn is_all(&self) -> bool {
        matches!(self, Choice::All)
    }
}

/// Values selected in the three filter widgets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilterSelection {
    pub accuracy_level: Choice,
    pub note_type: Choice,
    pub hospital_or_tenant: Choice,
}

impl FilterSelection {
    #[cfg(test)]
    pub fn all() -> Self {
        Self::default()
    }
}

fn is_null_hospital(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(NULL_HOSPITAL)
}

/// Column index for a filter, or `None` when the table lacks it.
fn filter_column(table: &MetricsTable, column: &str) -> Option<usize> {
    match table.require_column(column) {
        Ok(idx) => Some(idx),
        Err(e) => {
            debug!(error = %e, "Filter disabled for this table");
            None
        }
    }
}

/// Keep the rows that satisfy every concrete choice in `selection`.
///
/// A filter whose column is missing from the table is skipped. Row order is
/// preserved; the input table is never modified.
pub fn apply_filters(
    table: &MetricsTable,
    selection: &FilterSelection,
    location: LocationFilter,
) -> MetricsTable {
    let accuracy = match &selection.accuracy_level {
        Choice::All => None,
        Choice::Value(v) => filter_column(table, ACCURACY_COL).map(|idx| (idx, v.as_str())),
    };
    let note_type = match &selection.note_type {
        Choice::All => None,
        Choice::Value(v) => filter_column(table, NOTE_TYPE_COL).map(|idx| (idx, v.as_str())),
    };
    let place = match &selection.hospital_or_tenant {
        Choice::All => None,
        Choice::Value(v) => filter_column(table, location.column()).map(|idx| (idx, v.as_str())),
    };

    table.filter_rows(|row| {
        let text = |idx: usize| row[idx].as_text();

        if let Some((idx, wanted)) = accuracy {
            if text(idx).as_deref() != Some(wanted) {
                return false;
            }
        }
        if let Some((idx, wanted)) = note_type {
            if text(idx).as_deref() != Some(wanted) {
                return false;
            }
        }
        if let Some((idx, wanted)) = place {
            let matched = match (location, text(idx)) {
                (LocationFilter::Hospital, Some(h)) => !is_null_hospital(&h) && h == wanted,
                (LocationFilter::Tenant, Some(t)) => t.to_lowercase() == wanted.to_lowercase(),
                (_, None) => false,
            };
            if !matched {
                return false;
            }
        }
        true
    })
}

/// Candidate values for the filter widgets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub accuracy_levels: Vec<String>,
    pub note_types: Vec<String>,
    pub location_filter: LocationFilter,
    pub locations: Vec<String>,
}

/// Build the widget candidate lists from the full table.
pub fn filter_options(table: &MetricsTable, schema: &SourceSchema) -> FilterOptions {
    let accuracy_levels = std::iter::once(ALL_LEVELS)
        .chain(ACCURACY_LEVELS)
        .map(str::to_string)
        .collect();

    let note_types = std::iter::once(ALL_TYPES.to_string())
        .chain(table.unique_text(NOTE_TYPE_COL))
        .collect();

    let location = schema.location_filter;
    let mut values = table.unique_text(location.column());
    match location {
        LocationFilter::Hospital => values.retain(|h| !is_null_hospital(h)),
        // Tenants match case-insensitively, so `A` and `a` are one choice
        LocationFilter::Tenant => {
            let mut seen = HashSet::new();
            values.retain(|t| seen.insert(t.to_lowercase()));
        }
    }
    let locations = std::iter::once(location.all_label().to_string())
        .chain(values)
        .collect();

    FilterOptions {
        accuracy_levels,
        note_types,
        location_filter: location,
        locations,
    }
}

/// Whether a cell holds a known hospital name.
pub(crate) fn is_known_hospital(cell: &Cell) -> bool {
    match cell.as_text() {
        Some(h) => !is_null_hospital(&h),
        None => false,
    }
}
