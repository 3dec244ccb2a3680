//! Join keys: extraction from composite merchant codes on the source side,
//! typed key cells on the order-sheet side.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::grid::{format_number, CellValue};

/// Separator between the vendor prefix and the model segments.
pub const CODE_DELIMITER: char = '-';

/// Derive a join key from a composite code such as `"VENDOR-MODEL-VARIANT"`.
///
/// The vendor prefix (everything up to the first `-`) is dropped and the
/// remaining segments are kept as-is, so `"V-MODEL-X1"` yields `"MODEL-X1"`.
/// Returns `None` for non-text cells and codes without a delimiter. A code
/// with nothing after the delimiter (`"V-"`) yields the empty key `""`,
/// which still claims the row: later code columns do not replace it.
pub fn extract_key(raw: &CellValue) -> Option<String> {
    let code = raw.as_str()?;
    let (_vendor, rest) = code.split_once(CODE_DELIMITER)?;
    Some(rest.to_string())
}

/// A numeric key cell, ordered by `f64::total_cmp`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct NumericKey(pub f64);

impl PartialEq for NumericKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumericKey {}

impl PartialOrd for NumericKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumericKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A non-empty join-key cell read from the order sheet.
///
/// Text and numbers never compare equal: a numeric cell `1200` does not
/// match the text key `"1200"` derived from a source code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum TargetKey {
    Text(String),
    Number(NumericKey),
}

impl TargetKey {
    /// `None` for empty cells and zero-length text.
    pub fn from_cell(cell: &CellValue) -> Option<Self> {
        match cell {
            CellValue::Empty => None,
            CellValue::Text(s) if s.is_empty() => None,
            CellValue::Text(s) => Some(Self::Text(s.clone())),
            CellValue::Number(n) => Some(Self::Number(NumericKey(*n))),
        }
    }

    /// The key as it can match a source key; numbers never do.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => f.write_str(&format_number(n.0)),
        }
    }
}
