//! Container detection and raw input reading.
//!
//! The container is decided by magic bytes, not by extension: order-sheet
//! uploads are regularly binary `.xls` files renamed to `.xlsx`.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::IoError;

/// OLE2 compound document header (BIFF `.xls`).
const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// Local file header of a zip archive (OOXML `.xlsx`).
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Office Open XML workbook (zip container).
    Xlsx,
    /// Legacy binary workbook (OLE2 container).
    Xls,
    /// Delimited text.
    Csv,
}

impl DocumentFormat {
    /// Extension used when staging a copy for the workbook reader.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Decide the container from the leading bytes. Text files fall back to
/// CSV only when their extension says so.
pub fn sniff(bytes: &[u8], path: &Path) -> Option<DocumentFormat> {
    if bytes.starts_with(&OLE2_MAGIC) {
        return Some(DocumentFormat::Xls);
    }
    if bytes.starts_with(&ZIP_MAGIC) {
        return Some(DocumentFormat::Xlsx);
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("csv") | Some("tsv") | Some("txt") => Some(DocumentFormat::Csv),
        _ => None,
    }
}

/// An input file read fully into memory. The caller's file is never
/// touched again after this.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
}

/// Read `path`, reject files below `floor` bytes, and sniff the container.
pub fn read_input(path: &Path, floor: u64) -> Result<RawDocument, IoError> {
    if !path.exists() {
        return Err(IoError::InputMissing { path: path.to_path_buf() });
    }
    let bytes = std::fs::read(path)?;
    let size = bytes.len() as u64;
    if size < floor {
        return Err(IoError::EmptyOrTruncatedDocument { path: path.to_path_buf(), size, floor });
    }

    let format = sniff(&bytes, path).ok_or_else(|| {
        IoError::unreadable(path, "not an .xlsx, .xls or .csv document")
    })?;
    debug!("{}: {size} bytes, detected {format}", path.display());

    Ok(RawDocument { path: path.to_path_buf(), bytes, format })
}
