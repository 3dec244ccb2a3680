use std::collections::BTreeSet;

use log::{debug, info};
use serde::Serialize;

use crate::aggregate::SourceIndex;
use crate::error::ReconError;
use crate::grid::Grid;
use crate::key::TargetKey;
use crate::locate::ColumnRoles;

/// Counts and key sets from one pass over the target rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationOutcome {
    pub first_row: usize,
    pub last_row: usize,
    pub rows_scanned: usize,
    /// Cells overwritten with a non-negative delta.
    pub updated: usize,
    /// Matched rows whose delta was negative; the cell is left as-is.
    pub skipped_negative: usize,
    /// Rows with an empty join-key cell.
    pub empty_key: usize,
    /// Rows whose key has no entry in the source index.
    pub unmatched: usize,
    /// Every non-empty key seen in the target's join-key column.
    pub observed_target_keys: BTreeSet<TargetKey>,
    /// Keys found in the source index, written or not.
    pub matched_keys: BTreeSet<String>,
}

/// Write source deltas into the target's value column.
///
/// Rows `first_row..=last_row` are visited in order. A row is matched when
/// its key cell is text equal to a source key; the target side is not
/// normalized and numeric key cells never match. Negative deltas are never
/// written.
pub fn reconcile(
    target: &mut Grid,
    roles: &ColumnRoles,
    index: &SourceIndex,
    first_row: usize,
    last_row: usize,
) -> Result<ReconciliationOutcome, ReconError> {
    let (Some(key_col), Some(value_col)) = (roles.join_key_column, roles.target_value_column) else {
        return Err(ReconError::UnresolvedColumns {
            missing_key: roles.join_key_column.is_none(),
            missing_value: roles.target_value_column.is_none(),
        });
    };

    let mut outcome = ReconciliationOutcome { first_row, last_row, ..Default::default() };

    for row in first_row..=last_row {
        outcome.rows_scanned += 1;

        let Some(cell_key) = TargetKey::from_cell(target.get(row, key_col)) else {
            outcome.empty_key += 1;
            continue;
        };
        let text_key = cell_key.as_text().map(str::to_string);
        outcome.observed_target_keys.insert(cell_key);

        let Some((key, delta)) = text_key.and_then(|k| index.get(&k).map(|d| (k, d))) else {
            outcome.unmatched += 1;
            continue;
        };
        outcome.matched_keys.insert(key.clone());

        if delta >= 0.0 {
            target.set_number(row, value_col, delta)?;
            debug!("row {row}: {key} -> {delta}");
            outcome.updated += 1;
        } else {
            debug!("row {row}: {key} delta {delta} is negative, left unchanged");
            outcome.skipped_negative += 1;
        }
    }

    info!(
        "reconciled rows {first_row}..={last_row}: {} updated, {} negative, {} unmatched, {} empty",
        outcome.updated, outcome.skipped_negative, outcome.unmatched, outcome.empty_key
    );

    Ok(outcome)
}
