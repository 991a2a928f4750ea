//! Summary statistics over a filtered table

use serde::Serialize;
use std::collections::HashSet;

use crate::presentation::columns::{format_percent, PERCENT_DECIMALS};
use crate::presentation::filter::is_known_hospital;
use crate::schema::{LocationFilter, SourceSchema, NOTE_TYPE_COL};
use crate::table::MetricsTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_records: usize,
    pub location_filter: LocationFilter,
    /// Distinct hospitals or tenants, if the column exists
    pub unique_locations: Option<usize>,
    pub unique_note_types: Option<usize>,
    /// Mean of the schema's score column over rows with a numeric score
    pub average_score: Option<f64>,
    pub average_score_display: Option<String>,
}

/// Summarize a filtered table; `None` when there are no rows.
pub fn summarize(table: &MetricsTable, schema: &SourceSchema) -> Option<SummaryStats> {
    if table.is_empty() {
        return None;
    }

    let location = schema.location_filter;
    let unique_locations = table.column_index(location.column()).map(|idx| {
        table
            .rows()
            .iter()
            .map(|row| &row[idx])
            .filter(|cell| match location {
                LocationFilter::Hospital => is_known_hospital(cell),
                LocationFilter::Tenant => !cell.is_null(),
            })
            .filter_map(|cell| cell.as_text())
            .map(|value| match location {
                LocationFilter::Hospital => value,
                LocationFilter::Tenant => value.to_lowercase(),
            })
            .collect::<HashSet<_>>()
            .len()
    });

    let unique_note_types = table
        .has_column(NOTE_TYPE_COL)
        .then(|| table.unique_text(NOTE_TYPE_COL).len());

    let average_score = table.column_index(&schema.score_column).and_then(|idx| {
        let scores: Vec<f64> = table.rows().iter().filter_map(|r| r[idx].as_f64()).collect();
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
    });

    let is_percent = schema.percent_columns.contains(&schema.score_column);
    let average_score_display = average_score.map(|avg| {
        if is_percent {
            format_percent(avg, PERCENT_DECIMALS)
        } else {
            format!("{:.2}", avg)
        }
    });

    Some(SummaryStats {
        total_records: table.len(),
        location_filter: location,
        unique_locations,
        unique_note_types,
        average_score,
        average_score_display,
    })
}
