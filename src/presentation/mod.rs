//! Filter and presentation engine
//!
//! Turns a cached [`MetricsTable`] plus the user's filter choices into what
//! the view layer draws: the visible rows in display order, the column
//! display specs and the summary. Cached tables are only ever read here.

pub mod columns;
pub mod filter;
pub mod summary;

use serde::Serialize;

use crate::schema::{SourceSchema, ASSESSMENT_COL, TENANT_COL};
use crate::table::{Cell, MetricsTable};

pub use columns::{build_column_config, ColumnDisplaySpec, ColumnKind, ColumnSpec};
pub use filter::{apply_filters, filter_options, Choice, FilterOptions, FilterSelection};
pub use summary::{summarize, SummaryStats};

/// Rows and columns ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub record_count: usize,
    pub columns: ColumnDisplaySpec,
    /// One entry per row, cells in `columns` order
    pub rows: Vec<Vec<Cell>>,
    pub summary: SummaryStats,
    pub options: FilterOptions,
}

/// Outcome of one render pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricsView {
    #[serde(rename = "ok")]
    Data(TableView),
    /// The filters matched nothing; no summary is computed
    NoData { options: FilterOptions },
}

impl MetricsView {
    pub fn is_empty(&self) -> bool {
        matches!(self, MetricsView::NoData { .. })
    }
}

/// Filter, sort and project `table` for display.
pub fn render_view(
    table: &MetricsTable,
    schema: &SourceSchema,
    selection: &FilterSelection,
) -> MetricsView {
    let options = filter_options(table, schema);

    let mut filtered = apply_filters(table, selection, schema.location_filter);
    if filtered.is_empty() {
        return MetricsView::NoData { options };
    }
    filtered.sort_by_columns(&[TENANT_COL, ASSESSMENT_COL]);

    let Some(summary) = summarize(&filtered, schema) else {
        return MetricsView::NoData { options };
    };

    let columns = build_column_config(
        &schema.labels,
        &schema.percent_columns,
        &schema.number_columns,
    )
    .present_in(&filtered);

    let indices: Vec<usize> = columns
        .columns()
        .iter()
        .filter_map(|spec| filtered.column_index(&spec.column))
        .collect();
    let rows = filtered
        .rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();

    MetricsView::Data(TableView {
        record_count: filtered.len(),
        columns,
        rows,
        summary,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SourceSchema, FILE_LINK_COL};

    fn scenario_table() -> MetricsTable {
        MetricsTable::from_csv(
            b"TenantId,AssessmentId,Note_Type,Notes,Accuracy,BLEU_Score_File\n\
              A,1,SOAP,HospX,High,88\n\
              B,2,SOAP,null,Low,40\n" as &[u8],
        )
        .unwrap()
    }

    fn select(accuracy: &str, place: &str) -> FilterSelection {
        FilterSelection {
            accuracy_level: Choice::parse(Some(accuracy)),
            note_type: Choice::All,
            hospital_or_tenant: Choice::parse(Some(place)),
        }
    }

    #[test]
    fn test_accuracy_high_returns_first_row_only() {
        let view = render_view(
            &scenario_table(),
            &SourceSchema::saas(),
            &select("High", "All Hospitals"),
        );
        let MetricsView::Data(view) = view else {
            panic!("expected data");
        };
        assert_eq!(view.record_count, 1);
        assert_eq!(view.rows[0][0], Cell::Text("A".into()));
        assert_eq!(view.summary.total_records, 1);
    }

    #[test]
    fn test_all_hospitals_keeps_both_rows_but_hides_null_candidate() {
        let view = render_view(
            &scenario_table(),
            &SourceSchema::saas(),
            &select("All Levels", "All Hospitals"),
        );
        let MetricsView::Data(view) = view else {
            panic!("expected data");
        };
        assert_eq!(view.record_count, 2);
        assert_eq!(view.options.locations, vec!["All Hospitals", "HospX"]);
    }

    #[test]
    fn test_no_match_yields_no_data_without_summary() {
        let view = render_view(&scenario_table(), &SourceSchema::saas(), &select("Medium", "All"));
        assert!(view.is_empty());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "no_data");
        assert!(json.get("summary").is_none());
    }

    #[test]
    fn test_rows_are_projected_in_registry_order_and_sorted() {
        let table = MetricsTable::from_csv(
            b"BLEU_Score_File,Notes,Note_Type,AssessmentId,TenantId,Extra\n\
              10,H1,SOAP,2,B,x\n\
              20,H2,SOAP,10,A,y\n\
              30,H3,SOAP,9,A,z\n" as &[u8],
        )
        .unwrap();
        let view = render_view(&table, &SourceSchema::saas(), &FilterSelection::all());
        let MetricsView::Data(view) = view else {
            panic!("expected data");
        };

        let names: Vec<_> = view
            .columns
            .columns()
            .iter()
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["TenantId", "AssessmentId", "Note_Type", "Notes", "BLEU_Score_File"]
        );
        assert!(view.columns.get(FILE_LINK_COL).is_none());

        let order: Vec<_> = view.rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(order, vec![Cell::Number(9.0), Cell::Number(10.0), Cell::Number(2.0)]);
    }

    #[test]
    fn test_render_does_not_touch_source_table() {
        let table = scenario_table();
        let before = table.clone();
        let _ = render_view(&table, &SourceSchema::saas(), &select("High", "HospX"));
        assert_eq!(table, before);
    }
}
