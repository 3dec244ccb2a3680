//! Workbook → `Grid` loading through calamine.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use log::debug;
use restock_recon::{CellValue, Grid};

use crate::error::IoError;

/// Map one calamine cell onto the engine's three scalar kinds.
pub fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::from(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
        // Dates surface as their serial number
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Copy a calamine range into a grid with absolute 1-based coordinates.
///
/// Ranges do not necessarily start at A1; leading empty rows and columns are
/// kept so that grid coordinates match the worksheet's cell references.
pub fn range_to_grid(range: &Range<Data>) -> Grid {
    let Some((start_row, start_col)) = range.start() else {
        return Grid::new(0, 0);
    };
    let (height, width) = range.get_size();
    let (start_row, start_col) = (start_row as usize, start_col as usize);
    let mut grid = Grid::new(start_row + height, start_col + width);

    for (row_idx, row) in range.rows().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let value = cell_value(cell);
            if value.is_empty() {
                continue;
            }
            // In bounds by construction; a failure here would be a calamine bug.
            if grid.load(start_row + row_idx + 1, start_col + col_idx + 1, value).is_err() {
                debug!("dropped cell outside range at ({row_idx}, {col_idx})");
            }
        }
    }

    grid
}

/// Load one worksheet of a workbook file. `sheet` defaults to the first.
pub fn load_sheet(path: &Path, sheet: Option<&str>) -> Result<(String, Grid), IoError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| IoError::unreadable(path, e))?;

    let name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IoError::unreadable(path, "workbook contains no sheets"))?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| IoError::unreadable(path, format!("sheet '{name}': {e}")))?;
    let grid = range_to_grid(&range);
    debug!("loaded sheet '{name}': {} rows x {} cols", grid.max_row(), grid.max_col());

    Ok((name, grid))
}
