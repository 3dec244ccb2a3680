use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::grid::{column_index, column_letters};
use crate::locate::RoleKeywords;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Run configuration, normally read from a `.toml` file.
///
/// Every section and field has a default, so an empty document is a valid
/// config for the stock inventory/order-sheet layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub report: ReportConfig,
    pub input: InputConfig,
}

// ---------------------------------------------------------------------------
// Source (inventory report)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Row holding the real header. Row 1 of the export is a title banner.
    pub header_row: usize,
    /// Exact header of the available-stock column.
    pub primary_column: String,
    /// Exact header of the recent-sales column.
    pub secondary_column: String,
    /// A header is a composite-code column when it contains all of these.
    pub key_markers: Vec<String>,
    pub duplicate_keys: DuplicatePolicy,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            header_row: 2,
            primary_column: "实际可用数".into(),
            secondary_column: "30天销量".into(),
            key_markers: vec!["商家".into(), "编码".into()],
            duplicate_keys: DuplicatePolicy::default(),
        }
    }
}

/// What happens when two source rows derive the same join key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Later rows overwrite earlier ones.
    #[default]
    LastWins,
    /// The first row with a key is kept.
    FirstWins,
    /// Duplicate keys abort the run.
    Error,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastWins => write!(f, "last_wins"),
            Self::FirstWins => write!(f, "first_wins"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Target (order sheet)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Header keywords for the join-key column, tried in order.
    pub key_keywords: Vec<String>,
    /// Header keywords for the value column, tried in order.
    pub value_keywords: Vec<String>,
    /// Number of leading rows scanned for headers.
    pub scan_rows: usize,
    /// First data row used when no header is found.
    pub fallback_first_data_row: usize,
    /// Explicit join-key column; skips inference for that role.
    pub key_column: Option<ColumnRef>,
    /// Explicit value column; skips inference for that role.
    pub value_column: Option<ColumnRef>,
    /// Explicit first data row; overrides the inferred one.
    pub first_data_row: Option<usize>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            key_keywords: ["产品型号", "商品货号", "货号", "型号", "model", "code"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            value_keywords: ["所需数量", "数量", "订货数量", "进货数量", "数量/个", "quantity", "qty"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scan_rows: 10,
            fallback_first_data_row: 4,
            key_column: None,
            value_column: None,
            first_data_row: None,
        }
    }
}

impl TargetConfig {
    pub fn role_keywords(&self) -> RoleKeywords {
        RoleKeywords {
            join_key: self.key_keywords.clone(),
            target_value: self.value_keywords.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report + Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Minimum similarity ratio for a gap suggestion, in [0, 1].
    pub similarity_threshold: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { similarity_threshold: 0.8 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Documents smaller than this are rejected as empty or truncated.
    pub min_document_bytes: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { min_document_bytes: 100 }
    }
}

// ---------------------------------------------------------------------------
// Column references
// ---------------------------------------------------------------------------

/// A 1-based column position, written as a number (`3`) or letters (`"C"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawColumnRef", into = "usize")]
pub struct ColumnRef(usize);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumnRef {
    Index(usize),
    Text(String),
}

impl ColumnRef {
    pub fn new(index: usize) -> Option<Self> {
        (index > 0).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl From<ColumnRef> for usize {
    fn from(c: ColumnRef) -> usize {
        c.0
    }
}

impl TryFrom<RawColumnRef> for ColumnRef {
    type Error = String;

    fn try_from(raw: RawColumnRef) -> Result<Self, Self::Error> {
        match raw {
            RawColumnRef::Index(i) => {
                ColumnRef::new(i).ok_or_else(|| "column index must be 1 or greater".to_string())
            }
            RawColumnRef::Text(s) => s.parse(),
        }
    }
}

impl FromStr for ColumnRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(i) = s.parse::<usize>() {
            return ColumnRef::new(i).ok_or_else(|| "column index must be 1 or greater".to_string());
        }
        column_index(s)
            .map(ColumnRef)
            .ok_or_else(|| format!("invalid column reference {s:?} (use a number like 3 or letters like C)"))
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", column_letters(self.0))
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: RunConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let invalid = |msg: &str| Err(ReconError::ConfigValidation(msg.to_string()));

        if self.source.header_row == 0 {
            return invalid("source.header_row must be 1 or greater");
        }
        if self.source.primary_column.is_empty() || self.source.secondary_column.is_empty() {
            return invalid("source quantity column names must not be empty");
        }
        if self.source.primary_column == self.source.secondary_column {
            return invalid("source.primary_column and source.secondary_column must differ");
        }
        if self.source.key_markers.iter().all(|m| m.is_empty()) {
            return invalid("source.key_markers must contain at least one non-empty marker");
        }

        if self.target.scan_rows == 0 {
            return invalid("target.scan_rows must be 1 or greater");
        }
        if self.target.fallback_first_data_row == 0 {
            return invalid("target.fallback_first_data_row must be 1 or greater");
        }
        if self.target.first_data_row == Some(0) {
            return invalid("target.first_data_row must be 1 or greater");
        }
        if self.target.key_column.is_none() && self.target.key_keywords.iter().all(|k| k.is_empty()) {
            return invalid("target.key_keywords is empty and no target.key_column is set");
        }
        if self.target.value_column.is_none()
            && self.target.value_keywords.iter().all(|k| k.is_empty())
        {
            return invalid("target.value_keywords is empty and no target.value_column is set");
        }

        let t = self.report.similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ReconError::ConfigValidation(format!(
                "report.similarity_threshold must be between 0 and 1, got {t}"
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
