use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info};
use serde::Serialize;

use crate::config::{DuplicatePolicy, SourceConfig};
use crate::error::ReconError;
use crate::grid::Grid;
use crate::key::extract_key;

/// Join key → replenishment delta, plus every key the source mentioned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceIndex {
    deltas: BTreeMap<String, f64>,
    keys: BTreeSet<String>,
    pub stats: SourceStats,
}

/// Counters gathered while collapsing source rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    /// Headers of the composite-code columns, in precedence order.
    pub key_columns: Vec<String>,
    pub rows_scanned: usize,
    /// Rows where no candidate column produced a key.
    pub rows_without_key: usize,
    /// Rows with a key but a non-numeric stock or sales cell.
    pub rows_without_quantity: usize,
    /// Rows whose key had already been indexed by an earlier row.
    pub duplicate_rows: usize,
}

impl SourceIndex {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.deltas.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Every distinct key derived from the source, including keys whose
    /// quantities could not be read.
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.deltas.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of keys that would be written (delta >= 0).
    pub fn non_negative_count(&self) -> usize {
        self.deltas.values().filter(|d| **d >= 0.0).count()
    }
}

impl FromIterator<(String, f64)> for SourceIndex {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let deltas: BTreeMap<String, f64> = iter.into_iter().collect();
        let keys = deltas.keys().cloned().collect();
        Self { deltas, keys, stats: SourceStats::default() }
    }
}

/// Find a header cell whose text equals `name` exactly.
fn find_column(grid: &Grid, header_row: usize, name: &str) -> Result<usize, ReconError> {
    (1..=grid.max_col())
        .find(|&col| grid.get(header_row, col).to_string() == name)
        .ok_or_else(|| ReconError::MissingColumn { column: name.to_string() })
}

/// Columns whose header contains every non-empty marker, left to right.
fn key_columns(grid: &Grid, header_row: usize, markers: &[String]) -> Vec<usize> {
    let markers: Vec<&str> = markers.iter().map(String::as_str).filter(|m| !m.is_empty()).collect();
    (1..=grid.max_col())
        .filter(|&col| {
            let header = grid.get(header_row, col).to_string();
            !header.is_empty() && markers.iter().all(|m| header.contains(m))
        })
        .collect()
}

/// Collapse the inventory sheet into a key → delta index.
///
/// The delta is `secondary - primary` (recent sales minus available stock):
/// a positive value is the quantity to reorder. Each row's key comes from
/// the first composite-code column that yields one; later columns only fill
/// gaps left by earlier ones.
pub fn build_index(grid: &Grid, config: &SourceConfig) -> Result<SourceIndex, ReconError> {
    let header_row = config.header_row;
    let primary_col = find_column(grid, header_row, &config.primary_column)?;
    let secondary_col = find_column(grid, header_row, &config.secondary_column)?;

    let code_cols = key_columns(grid, header_row, &config.key_markers);
    if code_cols.is_empty() {
        return Err(ReconError::NoKeyColumn { markers: config.key_markers.clone() });
    }

    let mut stats = SourceStats {
        key_columns: code_cols.iter().map(|&c| grid.get(header_row, c).to_string()).collect(),
        ..Default::default()
    };
    debug!(
        "source columns: primary={primary_col} secondary={secondary_col} codes={:?}",
        stats.key_columns
    );

    let mut deltas: BTreeMap<String, f64> = BTreeMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut keys: BTreeSet<String> = BTreeSet::new();

    for row in (header_row + 1)..=grid.max_row() {
        stats.rows_scanned += 1;

        let Some(key) = code_cols.iter().find_map(|&col| extract_key(grid.get(row, col))) else {
            stats.rows_without_key += 1;
            continue;
        };
        keys.insert(key.clone());

        let primary = grid.get(row, primary_col).as_number();
        let secondary = grid.get(row, secondary_col).as_number();
        let (Some(primary), Some(secondary)) = (primary, secondary) else {
            debug!("source row {row}: key {key:?} has no numeric quantities");
            stats.rows_without_quantity += 1;
            continue;
        };
        let delta = secondary - primary;

        if let Some(&first_row) = first_seen.get(&key) {
            stats.duplicate_rows += 1;
            match config.duplicate_keys {
                DuplicatePolicy::LastWins => {
                    deltas.insert(key, delta);
                }
                DuplicatePolicy::FirstWins => {}
                DuplicatePolicy::Error => {
                    return Err(ReconError::DuplicateKey { key, first_row, row });
                }
            }
        } else {
            first_seen.insert(key.clone(), row);
            deltas.insert(key, delta);
        }
    }

    info!(
        "source index: {} keys with deltas, {} distinct keys, {} rows without key",
        deltas.len(),
        keys.len(),
        stats.rows_without_key
    );

    Ok(SourceIndex { deltas, keys, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellValue;

    fn cfg() -> SourceConfig {
        SourceConfig::default()
    }

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn t(s: &str) -> CellValue {
        CellValue::from(s)
    }

    /// Inventory export: title row, header row, then data.
    fn inventory(rows: Vec<Vec<CellValue>>) -> Grid {
        let mut all = vec![
            vec![t("库存报表"), t(""), t(""), t(""), t("")],
            vec![t("商品名称"), t("商家编码"), t("实际可用数"), t("30天销量"), t("商家SKU编码")],
        ];
        all.extend(rows);
        Grid::from_rows(all)
    }

    #[test]
    fn delta_is_sales_minus_stock() {
        let grid = inventory(vec![
            vec![t("a"), t("V1-M100"), n(5.0), n(8.0), t("")],
            vec![t("b"), t("V2-M200"), n(10.0), n(3.0), t("")],
        ]);
        let index = build_index(&grid, &cfg()).unwrap();
        assert_eq!(index.get("M100"), Some(3.0));
        assert_eq!(index.get("M200"), Some(-7.0));
        assert_eq!(index.non_negative_count(), 1);
        assert_eq!(index.stats.key_columns, vec!["商家编码", "商家SKU编码"]);
    }

    #[test]
    fn later_code_column_fills_gaps() {
        let grid = inventory(vec![
            vec![t("a"), t("NOCODE"), n(1.0), n(4.0), t("S-M300")],
            vec![t("b"), t("V-M400"), n(1.0), n(2.0), t("S-OTHER")],
        ]);
        let index = build_index(&grid, &cfg()).unwrap();
        assert_eq!(index.get("M300"), Some(3.0));
        assert_eq!(index.get("M400"), Some(1.0));
        assert_eq!(index.get("OTHER"), None, "first column wins when both have codes");
    }

    #[test]
    fn malformed_code_contributes_nothing() {
        let grid = inventory(vec![
            vec![t("a"), t("NOCODE"), n(5.0), n(9.0), t("")],
            vec![t("b"), n(42.0), n(5.0), n(9.0), t("")],
        ]);
        let index = build_index(&grid, &cfg()).unwrap();
        assert!(index.is_empty());
        assert!(index.keys().is_empty());
        assert_eq!(index.stats.rows_without_key, 2);
        assert_eq!(index.stats.rows_scanned, 2);
    }

    #[test]
    fn non_numeric_quantity_keeps_key_but_no_delta() {
        let grid = inventory(vec![vec![t("a"), t("V-M1"), t("n/a"), n(3.0), t("")]]);
        let index = build_index(&grid, &cfg()).unwrap();
        assert_eq!(index.get("M1"), None);
        assert!(index.keys().contains("M1"));
        assert_eq!(index.stats.rows_without_quantity, 1);
    }

    #[test]
    fn numeric_text_quantities_are_parsed() {
        let grid = inventory(vec![vec![t("a"), t("V-M1"), t("2"), t("10"), t("")]]);
        let index = build_index(&grid, &cfg()).unwrap();
        assert_eq!(index.get("M1"), Some(8.0));
    }

    #[test]
    fn duplicate_keys_last_wins_by_default() {
        let grid = inventory(vec![
            vec![t("a"), t("V1-M1"), n(0.0), n(1.0), t("")],
            vec![t("b"), t("V2-M1"), n(0.0), n(5.0), t("")],
        ]);
        let index = build_index(&grid, &cfg()).unwrap();
        assert_eq!(index.get("M1"), Some(5.0));
        assert_eq!(index.stats.duplicate_rows, 1);
    }

    #[test]
    fn duplicate_keys_first_wins() {
        let grid = inventory(vec![
            vec![t("a"), t("V1-M1"), n(0.0), n(1.0), t("")],
            vec![t("b"), t("V2-M1"), n(0.0), n(5.0), t("")],
        ]);
        let config = SourceConfig { duplicate_keys: DuplicatePolicy::FirstWins, ..cfg() };
        let index = build_index(&grid, &config).unwrap();
        assert_eq!(index.get("M1"), Some(1.0));
    }

    #[test]
    fn duplicate_keys_error_policy() {
        let grid = inventory(vec![
            vec![t("a"), t("V1-M1"), n(0.0), n(1.0), t("")],
            vec![t("b"), t("V2-M1"), n(0.0), n(5.0), t("")],
        ]);
        let config = SourceConfig { duplicate_keys: DuplicatePolicy::Error, ..cfg() };
        let err = build_index(&grid, &config).unwrap_err();
        assert!(matches!(err, ReconError::DuplicateKey { ref key, first_row: 3, row: 4 } if key == "M1"));
    }

    #[test]
    fn missing_required_column() {
        let grid = Grid::from_rows(vec![
            vec!["title", "", ""],
            vec!["商家编码", "实际可用数", "7天销量"],
        ]);
        let err = build_index(&grid, &cfg()).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { ref column } if column == "30天销量"));
    }

    #[test]
    fn required_column_match_is_exact() {
        let grid = Grid::from_rows(vec![
            vec!["title", "", ""],
            vec!["商家编码", "实际可用数 ", "30天销量"],
        ]);
        let err = build_index(&grid, &cfg()).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { ref column } if column == "实际可用数"));
    }

    #[test]
    fn no_key_column() {
        let grid = Grid::from_rows(vec![
            vec!["title", "", "", ""],
            vec!["商家", "编码", "实际可用数", "30天销量"],
        ]);
        let err = build_index(&grid, &cfg()).unwrap_err();
        assert!(matches!(err, ReconError::NoKeyColumn { .. }));
    }

    #[test]
    fn header_on_title_row_is_not_found() {
        let grid = Grid::from_rows(vec![
            vec!["商家编码", "实际可用数", "30天销量"],
            vec!["V-M1", "1", "2"],
        ]);
        assert!(matches!(build_index(&grid, &cfg()), Err(ReconError::MissingColumn { .. })));
        let config = SourceConfig { header_row: 1, ..cfg() };
        assert_eq!(build_index(&grid, &config).unwrap().get("M1"), Some(1.0));
    }

    #[test]
    fn empty_remainder_claims_the_row() {
        let grid = inventory(vec![
            vec![t("a"), t("V-"), n(1.0), n(4.0), t("X-M500")],
            vec![t("b"), t("NOCODE"), n(2.0), n(2.0), t("X-M600")],
        ]);
        let index = build_index(&grid, &cfg()).unwrap();
        assert_eq!(index.get(""), Some(3.0));
        assert_eq!(index.get("M500"), None);
        assert_eq!(index.get("M600"), Some(0.0));
    }
}
