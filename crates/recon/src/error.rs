use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, empty keyword list, etc.).
    ConfigValidation(String),
    /// A required source column is absent from the header row.
    MissingColumn { column: String },
    /// No source header contains every composite-code marker.
    NoKeyColumn { markers: Vec<String> },
    /// Target join-key and/or value column could not be resolved.
    UnresolvedColumns { missing_key: bool, missing_value: bool },
    /// Duplicate join key under the `error` duplicate policy.
    DuplicateKey { key: String, first_row: usize, row: usize },
    /// Write outside the loaded grid.
    CellOutOfBounds { row: usize, col: usize },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { column } => {
                write!(f, "source is missing required column '{column}'")
            }
            Self::NoKeyColumn { markers } => {
                write!(f, "no source column header contains all of {:?}", markers)
            }
            Self::UnresolvedColumns { missing_key, missing_value } => {
                let missing = match (missing_key, missing_value) {
                    (true, true) => "join-key and value columns",
                    (true, false) => "join-key column",
                    _ => "value column",
                };
                write!(f, "target {missing} could not be resolved")
            }
            Self::DuplicateKey { key, first_row, row } => {
                write!(f, "join key '{key}' appears on source rows {first_row} and {row}")
            }
            Self::CellOutOfBounds { row, col } => {
                write!(f, "cell (row {row}, column {col}) is outside the sheet")
            }
        }
    }
}

impl std::error::Error for ReconError {}
