//! `restock-recon`: replenishment reconciliation engine.
//!
//! Pure engine crate: receives loaded grids, mutates the target grid in
//! memory and returns a report. No file IO and no CLI.
//!
//! Pipeline: [`aggregate::build_index`] turns the inventory sheet into a
//! key → delta index, [`locate::locate`] finds the order sheet's key and
//! quantity columns, [`engine::reconcile`] writes the deltas, and
//! [`similarity::find_gaps`] reports source keys the order sheet lacks.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod key;
pub mod locate;
pub mod model;
pub mod similarity;

pub use config::{ColumnRef, RunConfig, TargetConfig};
pub use error::ReconError;
pub use grid::{CellValue, Grid};
pub use locate::ColumnRoles;
pub use model::RunReport;

use log::info;
use serde::Serialize;

use crate::aggregate::build_index;
use crate::engine::reconcile;
use crate::locate::locate;
use crate::model::{ResolvedColumns, RunMeta, SourceSummary};
use crate::similarity::find_gaps;

/// Resolve one target role: explicit column first, inferred column second.
fn resolve_column(
    explicit: Option<ColumnRef>,
    inferred: Option<usize>,
    max_col: usize,
    field: &str,
) -> Result<Option<usize>, ReconError> {
    match explicit {
        Some(col) if col.index() > max_col => Err(ReconError::ConfigValidation(format!(
            "target.{field} {col} is beyond the sheet's last column {}",
            grid::column_letters(max_col)
        ))),
        Some(col) => Ok(Some(col.index())),
        None => Ok(inferred),
    }
}

/// Where the engine will read keys and write values in the target sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetLayout {
    /// What header inference found on its own.
    pub inferred: ColumnRoles,
    /// Inference with explicit overrides applied, role by role.
    pub resolved: ColumnRoles,
    pub first_data_row: usize,
    pub last_data_row: usize,
}

/// Infer the target's columns and apply the explicit overrides from `tc`.
///
/// Roles that stay unresolved are `None` here; [`engine::reconcile`]
/// rejects them. Explicit columns past the sheet edge are a config error.
pub fn resolve_layout(target: &Grid, tc: &TargetConfig) -> Result<TargetLayout, ReconError> {
    let inferred = locate(target, &tc.role_keywords(), tc.scan_rows, tc.fallback_first_data_row);
    info!(
        "target columns inferred: key={:?} value={:?} header_row={:?}",
        inferred.join_key_column, inferred.target_value_column, inferred.header_row
    );

    let resolved = ColumnRoles {
        join_key_column: resolve_column(
            tc.key_column,
            inferred.join_key_column,
            target.max_col(),
            "key_column",
        )?,
        target_value_column: resolve_column(
            tc.value_column,
            inferred.target_value_column,
            target.max_col(),
            "value_column",
        )?,
        header_row: inferred.header_row,
        first_data_row: tc.first_data_row.or(inferred.first_data_row),
    };

    Ok(TargetLayout {
        inferred,
        resolved,
        first_data_row: resolved.first_data_row.unwrap_or(tc.fallback_first_data_row),
        last_data_row: target.last_populated_row(),
    })
}

/// Run a full reconciliation per config.
///
/// On success `target` holds the written cells (see [`Grid::writes`]). On
/// error the caller must discard `target`; nothing should be persisted.
pub fn run(source: &Grid, target: &mut Grid, config: &RunConfig) -> Result<RunReport, ReconError> {
    config.validate()?;

    let index = build_index(source, &config.source)?;
    let layout = resolve_layout(target, &config.target)?;
    let (first_row, last_row) = (layout.first_data_row, layout.last_data_row);

    let outcome = reconcile(target, &layout.resolved, &index, first_row, last_row)?;
    let gaps = find_gaps(index.keys(), &outcome.observed_target_keys, config.report.similarity_threshold);

    // reconcile() has already rejected unresolved roles.
    let key_col = layout.resolved.join_key_column.unwrap_or_default();
    let value_col = layout.resolved.target_value_column.unwrap_or_default();
    let header_row = layout.resolved.header_row.unwrap_or(first_row.saturating_sub(1));
    let columns = ResolvedColumns {
        join_key_column: key_col,
        target_value_column: value_col,
        key_header: target.label(header_row, key_col),
        value_header: target.label(header_row, value_col),
        first_data_row: first_row,
        last_data_row: last_row,
        inferred: layout.inferred,
    };

    Ok(RunReport {
        meta: RunMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            similarity_threshold: config.report.similarity_threshold,
        },
        columns,
        source: SourceSummary {
            distinct_keys: index.keys().len(),
            indexed_keys: index.len(),
            non_negative_keys: index.non_negative_count(),
            stats: index.stats.clone(),
        },
        outcome,
        gaps,
        warnings: Vec::new(),
    })
}
