// Column diff engine: pre/post-image capture and per-row correlation

use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;

use crate::engine::EngineHandle;
use crate::error::{EngineError, HookError};
use crate::hooks::registry::HookRegistry;
use crate::types::Row;

/// Columns present on both rows whose values differ, as (column, previous, current)
pub fn changed_columns<'a>(new_row: &'a Row, prev_row: &'a Row) -> Vec<(&'a str, &'a Value, &'a Value)> {
    new_row
        .iter()
        .filter_map(|(column, current)| {
            let previous = prev_row.get(column)?;
            (previous != current).then_some((column.as_str(), previous, current))
        })
        .collect()
}

/// Outcome of one diff pass
#[derive(Debug, Default)]
pub struct DiffReport {
    pub matched: usize,
    pub skipped: usize,
    pub failures: Vec<(String, HookError)>,
}

pub struct ColumnDiff;

impl ColumnDiff {
    /// Read rows through the engine; the id column is always part of the projection
    pub async fn fetch_rows(
        engine: &EngineHandle,
        model: &str,
        filter: &Value,
        projection: Option<&[String]>,
        id_field: &str,
    ) -> Result<Vec<Row>, EngineError> {
        let projection = projection.map(|columns| {
            let mut columns = columns.to_vec();
            if !columns.iter().any(|c| c == id_field) {
                columns.push(id_field.to_string());
            }
            columns
        });

        let rows = engine.find_many(model, filter, projection.as_deref()).await?;
        tracing::debug!("Fetched {} rows from {} for diffing", rows.len(), model);
        Ok(rows)
    }

    /// Correlate `new_rows` with `prev_rows` by id and dispatch column hooks for the changes
    ///
    /// New rows without a matching previous row (or without an id) are skipped.
    pub async fn diff(
        registry: &HookRegistry,
        model: &str,
        new_rows: &[Row],
        prev_rows: &[Row],
        engine: &EngineHandle,
    ) -> DiffReport {
        let id_field = registry.id_field();

        // Keyed by the id's JSON text so numeric and string ids both work
        let prev_by_id: HashMap<String, &Row> = prev_rows
            .iter()
            .filter_map(|row| row.get(id_field).map(|id| (id.to_string(), row)))
            .collect();

        let mut report = DiffReport::default();
        let mut pairs = Vec::new();
        for new_row in new_rows {
            match new_row.get(id_field).and_then(|id| prev_by_id.get(&id.to_string())) {
                Some(prev_row) => pairs.push((new_row, *prev_row)),
                None => {
                    tracing::debug!(
                        "No pre-image for {} row {:?}, skipping",
                        model,
                        new_row.get(id_field)
                    );
                    report.skipped += 1;
                }
            }
        }
        report.matched = pairs.len();

        let results = join_all(
            pairs
                .iter()
                .map(|(new_row, prev_row)| registry.run_column_hooks(model, new_row, prev_row, engine)),
        )
        .await;
        report.failures = results.into_iter().flatten().collect();

        tracing::debug!(
            "Column diff for {}: {} matched, {} skipped, {} failures",
            model, report.matched, report.skipped, report.failures.len()
        );
        report
    }
}
