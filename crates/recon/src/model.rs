use serde::Serialize;

use crate::aggregate::SourceStats;
use crate::engine::ReconciliationOutcome;
use crate::locate::ColumnRoles;
use crate::similarity::SimilarityMatch;

// ---------------------------------------------------------------------------
// Resolved target layout
// ---------------------------------------------------------------------------

/// Target columns and row range actually used for the run, after explicit
/// overrides were applied on top of header inference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedColumns {
    pub join_key_column: usize,
    pub target_value_column: usize,
    pub key_header: String,
    pub value_header: String,
    pub first_data_row: usize,
    pub last_data_row: usize,
    /// What header inference found on its own.
    pub inferred: ColumnRoles,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    #[serde(flatten)]
    pub stats: SourceStats,
    pub distinct_keys: usize,
    pub indexed_keys: usize,
    pub non_negative_keys: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub run_at: String,
    pub similarity_threshold: f64,
}

/// Everything a caller needs to show after a run. Built once, never mutated
/// by the engine afterwards; front ends may append warnings of their own.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub meta: RunMeta,
    pub columns: ResolvedColumns,
    pub source: SourceSummary,
    pub outcome: ReconciliationOutcome,
    pub gaps: Vec<SimilarityMatch>,
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Gap entries that carry a suggestion.
    pub fn suggested_gaps(&self) -> impl Iterator<Item = &SimilarityMatch> {
        self.gaps.iter().filter(|g| g.best_match.is_some())
    }
}
