//! Source and target documents as the CLI sees them.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use log::{info, warn};
use restock_recon::config::InputConfig;
use restock_recon::Grid;
use serde::Serialize;
use zip::ZipArchive;

use crate::error::IoError;
use crate::format::{read_input, DocumentFormat, RawDocument};
use crate::legacy::{upconvert, LOSSY_WARNING};
use crate::load::load_sheet;
use crate::patch::{patch_package, PatchStats};
use crate::staging::{write_atomic, Staging};
use crate::workbook::{active_worksheet, read_entry, SheetEntry, WORKBOOK_PART, WORKBOOK_RELS_PART};

/// Load the inventory report (`.xlsx`, `.xls` or `.csv`) as a grid.
/// Workbooks contribute their first sheet.
pub fn load_source(path: &Path, input: &InputConfig) -> Result<Grid, IoError> {
    let raw = read_input(path, input.min_document_bytes)?;
    let grid = match raw.format {
        DocumentFormat::Csv => {
            crate::csv::load_grid(&raw.bytes).map_err(|e| IoError::unreadable(path, e))?
        }
        DocumentFormat::Xlsx | DocumentFormat::Xls => {
            let staging = Staging::new()?;
            let staged = staging.put(&format!("source.{}", raw.format.extension()), &raw.bytes)?;
            let (name, grid) = load_sheet(&staged, None).map_err(|e| reattribute(e, path))?;
            info!("source sheet '{name}' loaded from {}", path.display());
            grid
        }
    };
    Ok(grid)
}

/// Errors from staged copies should name the caller's file.
fn reattribute(err: IoError, path: &Path) -> IoError {
    match err {
        IoError::UnreadableDocument { reason, .. } => IoError::unreadable(path, reason),
        other => other,
    }
}

fn active_sheet(path: &Path, package: &[u8]) -> Result<SheetEntry, IoError> {
    let mut archive =
        ZipArchive::new(Cursor::new(package)).map_err(|e| IoError::unreadable(path, e))?;
    let workbook_xml = read_entry(&mut archive, WORKBOOK_PART)
        .ok_or_else(|| IoError::unreadable(path, format!("{WORKBOOK_PART} is missing")))?;
    let rels_xml = read_entry(&mut archive, WORKBOOK_RELS_PART)
        .ok_or_else(|| IoError::unreadable(path, format!("{WORKBOOK_RELS_PART} is missing")))?;
    active_worksheet(&workbook_xml, &rels_xml)
        .ok_or_else(|| IoError::unreadable(path, "workbook has no worksheets"))
}

/// Summary of a saved output document.
#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub path: PathBuf,
    pub sheet: String,
    #[serde(flatten)]
    pub patch: PatchStats,
}

/// The order sheet: an in-memory `.xlsx` package plus its active sheet as a
/// grid. The engine mutates `grid`; [`TargetDocument::save`] replays the
/// grid's writes into a copy of the package.
#[derive(Debug)]
pub struct TargetDocument {
    pub path: PathBuf,
    pub sheet: SheetEntry,
    pub grid: Grid,
    /// The input was a legacy `.xls` and was upconverted.
    pub converted_from_legacy: bool,
    pub warnings: Vec<String>,
    package: Vec<u8>,
}

impl TargetDocument {
    pub fn open(path: &Path, input: &InputConfig) -> Result<Self, IoError> {
        let RawDocument { bytes, format, .. } = read_input(path, input.min_document_bytes)?;
        let staging = Staging::new()?;
        let mut warnings = Vec::new();

        let (package, converted_from_legacy) = match format {
            DocumentFormat::Xlsx => (bytes, false),
            DocumentFormat::Xls => {
                let staged = staging.put("target.xls", &bytes)?;
                let converted = upconvert(&staged)?;
                warn!("{}: {LOSSY_WARNING}", path.display());
                warnings.push(LOSSY_WARNING.to_string());
                (converted, true)
            }
            DocumentFormat::Csv => {
                return Err(IoError::unreadable(path, "the order sheet must be an .xlsx or .xls workbook"));
            }
        };

        let sheet = active_sheet(path, &package)?;
        let staged = staging.put("target.xlsx", &package)?;
        let (_, grid) = load_sheet(&staged, Some(&sheet.name)).map_err(|e| reattribute(e, path))?;
        info!(
            "target sheet '{}' ({}) loaded: {} rows x {} cols",
            sheet.name,
            sheet.path,
            grid.max_row(),
            grid.max_col()
        );

        Ok(Self {
            path: path.to_path_buf(),
            sheet,
            grid,
            converted_from_legacy,
            warnings,
            package,
        })
    }

    /// Write the patched copy to `dest`. The original input is never touched.
    pub fn save(&self, dest: &Path) -> Result<SaveSummary, IoError> {
        let mut stats = PatchStats::default();
        write_atomic(dest, |file| {
            stats = patch_package(&self.package, &self.sheet.path, self.grid.writes(), file)?;
            Ok(())
        })?;
        Ok(SaveSummary { path: dest.to_path_buf(), sheet: self.sheet.name.clone(), patch: stats })
    }
}
