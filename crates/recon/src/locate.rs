//! Header inference for loosely structured sheets.
//!
//! Order sheets put their header anywhere in the first few rows and name the
//! columns inconsistently ("产品型号", "货号", "Model"...). The locator scans a
//! bounded window top-to-bottom, left-to-right, and locks in the first cell
//! whose text contains one of a role's keywords.

use log::debug;
use serde::Serialize;

use crate::grid::Grid;

/// Number of rows below the header searched for the first data row.
pub const DATA_ROW_LOOKAHEAD: usize = 4;

/// Keyword sets per semantic role. An empty set means the role is not requested.
#[derive(Debug, Clone, Default)]
pub struct RoleKeywords {
    pub join_key: Vec<String>,
    pub target_value: Vec<String>,
}

/// Inferred physical positions of the semantic roles (all 1-based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnRoles {
    pub join_key_column: Option<usize>,
    pub target_value_column: Option<usize>,
    pub header_row: Option<usize>,
    pub first_data_row: Option<usize>,
}

/// First keyword (in configured order) contained in `text`.
fn matching_keyword<'a>(text: &str, keywords: &'a [String]) -> Option<&'a str> {
    keywords
        .iter()
        .find(|k| !k.is_empty() && text.contains(k.as_str()))
        .map(String::as_str)
}

/// Scan the header window of `grid` for the requested roles.
///
/// The header row is the row where the join-key column was found, or the
/// value column's row when only that one resolved. `fallback_first_data_row`
/// is returned as the first data row when no header is found at all.
pub fn locate(
    grid: &Grid,
    keywords: &RoleKeywords,
    scan_rows: usize,
    fallback_first_data_row: usize,
) -> ColumnRoles {
    let want_key = keywords.join_key.iter().any(|k| !k.is_empty());
    let want_value = keywords.target_value.iter().any(|k| !k.is_empty());

    let mut key_hit: Option<(usize, usize)> = None;
    let mut value_hit: Option<(usize, usize)> = None;

    let last_scan_row = scan_rows.min(grid.max_row());
    'rows: for row in 1..=last_scan_row {
        for col in 1..=grid.max_col() {
            let Some(text) = grid.get(row, col).as_str() else {
                continue;
            };
            if want_key && key_hit.is_none() {
                if let Some(kw) = matching_keyword(text, &keywords.join_key) {
                    debug!("join-key column {col} matched {kw:?} in row {row}");
                    key_hit = Some((row, col));
                }
            }
            if want_value && value_hit.is_none() {
                if let Some(kw) = matching_keyword(text, &keywords.target_value) {
                    debug!("value column {col} matched {kw:?} in row {row}");
                    value_hit = Some((row, col));
                }
            }
            if (!want_key || key_hit.is_some()) && (!want_value || value_hit.is_some()) {
                break 'rows;
            }
        }
    }

    let header_row = key_hit.or(value_hit).map(|(row, _)| row);
    let first_data_row = match header_row {
        Some(h) => Some(first_data_row_after(grid, h)),
        None => Some(fallback_first_data_row),
    };

    ColumnRoles {
        join_key_column: key_hit.map(|(_, col)| col),
        target_value_column: value_hit.map(|(_, col)| col),
        header_row,
        first_data_row,
    }
}

/// First non-empty row within `DATA_ROW_LOOKAHEAD` rows below the header,
/// defaulting to the row right after it.
pub fn first_data_row_after(grid: &Grid, header_row: usize) -> usize {
    let last = (header_row + DATA_ROW_LOOKAHEAD).min(grid.max_row());
    ((header_row + 1)..=last)
        .find(|&row| grid.row_has_data(row))
        .unwrap_or(header_row + 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
