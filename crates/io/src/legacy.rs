//! `.xls` → `.xlsx` upconversion.
//!
//! The binary target is read with calamine and written back out with
//! rust_xlsxwriter, values only. Cell styles, merged cells and images do not
//! survive; the caller reports that as a warning.

use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xls};
use log::info;
use rust_xlsxwriter::Workbook as XlsxWorkbook;

use crate::error::IoError;

/// Warning attached to every run whose target went through [`upconvert`].
pub const LOSSY_WARNING: &str =
    "target was a legacy .xls workbook; it was converted to .xlsx and its styles, merged cells and images were not carried over";

const MAX_ROW: u32 = 1_048_575;
const MAX_COL: u32 = 16_383;

fn convert_err(e: impl std::fmt::Display) -> IoError {
    IoError::LegacyConversion(e.to_string())
}

/// Convert the `.xls` at `path` into `.xlsx` bytes, one worksheet per sheet,
/// in the original order.
pub fn upconvert(path: &Path) -> Result<Vec<u8>, IoError> {
    let mut source: Xls<_> = open_workbook(path).map_err(convert_err)?;
    let names = source.sheet_names();
    if names.is_empty() {
        return Err(IoError::LegacyConversion("workbook contains no sheets".into()));
    }

    let mut out = XlsxWorkbook::new();
    for name in &names {
        let range = source.worksheet_range(name).map_err(convert_err)?;
        let sheet = out.add_worksheet();
        sheet.set_name(name).map_err(convert_err)?;

        let Some((start_row, start_col)) = range.start() else {
            continue;
        };
        for (row_idx, row) in range.rows().enumerate() {
            let r = start_row + row_idx as u32;
            for (col_idx, cell) in row.iter().enumerate() {
                let c = start_col + col_idx as u32;
                if r > MAX_ROW || c > MAX_COL {
                    return Err(IoError::LegacyConversion(format!(
                        "sheet '{name}' exceeds the .xlsx grid at row {}",
                        r + 1
                    )));
                }
                let c = c as u16;
                match cell {
                    Data::Empty => {}
                    Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                        sheet.write_string(r, c, s).map_err(convert_err)?;
                    }
                    Data::Float(n) => {
                        sheet.write_number(r, c, *n).map_err(convert_err)?;
                    }
                    Data::Int(n) => {
                        sheet.write_number(r, c, *n as f64).map_err(convert_err)?;
                    }
                    Data::Bool(b) => {
                        sheet.write_boolean(r, c, *b).map_err(convert_err)?;
                    }
                    Data::DateTime(dt) => {
                        sheet.write_number(r, c, dt.as_f64()).map_err(convert_err)?;
                    }
                    Data::Error(e) => {
                        sheet.write_string(r, c, format!("#{:?}", e)).map_err(convert_err)?;
                    }
                }
            }
        }
    }

    let bytes = out.save_to_buffer().map_err(convert_err)?;
    info!("converted legacy workbook {} ({} sheets)", path.display(), names.len());
    Ok(bytes)
}
