use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// A single scalar held by a grid cell.
///
/// Loaders map container-specific types onto these three variants: booleans
/// and error codes become `Text`, dates become their serial `Number`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

static EMPTY: CellValue = CellValue::Empty;

impl CellValue {
    /// True for `Empty` and for zero-length text.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell. Text is accepted when it parses as a number
    /// after trimming, so quantities exported as text still count.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

/// Format a number the way a spreadsheet shows it: integers without decimals.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// A fixed-size, 1-indexed table of cells loaded from one worksheet.
///
/// Bounds are set at construction and never change. Every numeric write is
/// also recorded in a write log so the IO layer can replay it into the
/// original container without touching anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<CellValue>,
    writes: BTreeMap<(usize, usize), f64>,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![CellValue::Empty; rows * cols],
            writes: BTreeMap::new(),
        }
    }

    /// Build a grid from row-major values. The width is that of the longest row.
    pub fn from_rows<R, V>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        let collected: Vec<Vec<CellValue>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(Into::into).collect())
            .collect();
        let width = collected.iter().map(Vec::len).max().unwrap_or(0);
        let mut grid = Self::new(collected.len(), width);
        for (r, row) in collected.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                grid.cells[r * width + c] = value;
            }
        }
        grid
    }

    pub fn max_row(&self) -> usize {
        self.rows
    }

    pub fn max_col(&self) -> usize {
        self.cols
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        if row == 0 || col == 0 || row > self.rows || col > self.cols {
            None
        } else {
            Some((row - 1) * self.cols + (col - 1))
        }
    }

    /// Read a cell. Coordinates outside the grid read as empty.
    pub fn get(&self, row: usize, col: usize) -> &CellValue {
        self.index(row, col).map(|i| &self.cells[i]).unwrap_or(&EMPTY)
    }

    /// Place a loaded value. Used by loaders; not recorded as a write.
    pub fn load(&mut self, row: usize, col: usize, value: CellValue) -> Result<(), ReconError> {
        let i = self.index(row, col).ok_or(ReconError::CellOutOfBounds { row, col })?;
        self.cells[i] = value;
        Ok(())
    }

    /// Overwrite a cell with a number and record the write.
    pub fn set_number(&mut self, row: usize, col: usize, value: f64) -> Result<(), ReconError> {
        let i = self.index(row, col).ok_or(ReconError::CellOutOfBounds { row, col })?;
        self.cells[i] = CellValue::Number(value);
        self.writes.insert((row, col), value);
        Ok(())
    }

    /// Every cell written through `set_number`, keyed by `(row, col)`.
    pub fn writes(&self) -> &BTreeMap<(usize, usize), f64> {
        &self.writes
    }

    pub fn row_has_data(&self, row: usize) -> bool {
        (1..=self.cols).any(|col| !self.get(row, col).is_empty())
    }

    /// Last row holding any non-empty cell, or 0 for a blank grid.
    pub fn last_populated_row(&self) -> usize {
        (1..=self.rows).rev().find(|&r| self.row_has_data(r)).unwrap_or(0)
    }

    /// Header label of a column in a given row, as shown to the user.
    pub fn label(&self, row: usize, col: usize) -> String {
        let value = self.get(row, col);
        if value.is_empty() {
            format!("column {}", column_letters(col))
        } else {
            value.to_string()
        }
    }
}

/// Convert a 1-based column index to letters (1 -> A, 27 -> AA).
pub fn column_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        result.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    result
}

/// Parse column letters to a 1-based index ("A" -> 1, "aa" -> 27).
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut col = 0usize;
    for ch in letters.chars() {
        col = col.checked_mul(26)?.checked_add(ch.to_ascii_uppercase() as usize - 'A' as usize + 1)?;
    }
    Some(col)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
