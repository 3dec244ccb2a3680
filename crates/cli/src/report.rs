//! Human-readable run summaries for stderr.

use restock_io::SaveSummary;
use restock_recon::grid::column_letters;
use restock_recon::RunReport;

/// `2 (B) - 产品型号`
pub fn column_label(col: usize, header: &str) -> String {
    format!("{col} ({}) - {header}", column_letters(col))
}

pub fn render_summary(report: &RunReport, saved: &SaveSummary) -> Vec<String> {
    let mut lines = Vec::new();
    let src = &report.source;
    let cols = &report.columns;
    let out = &report.outcome;

    lines.push(format!(
        "source: {} rows, {} keys from {}",
        src.stats.rows_scanned,
        src.distinct_keys,
        src.stats.key_columns.join(", "),
    ));
    lines.push(format!(
        "target: key {}, value {}, rows {}-{}",
        column_label(cols.join_key_column, &cols.key_header),
        column_label(cols.target_value_column, &cols.value_header),
        cols.first_data_row,
        cols.last_data_row,
    ));
    lines.push(format!(
        "{} updated, {} skipped (negative), {} unmatched, {} empty key",
        out.updated, out.skipped_negative, out.unmatched, out.empty_key,
    ));

    if !report.gaps.is_empty() {
        lines.push(format!(
            "{} source keys missing from the order sheet ({} with a suggestion at {}):",
            report.gaps.len(),
            report.suggested_gaps().count(),
            report.meta.similarity_threshold,
        ));
        for gap in &report.gaps {
            match &gap.best_match {
                Some(m) => lines.push(format!("  {} -> {} ({:.2})", gap.key, m, gap.score)),
                None => lines.push(format!("  {} (no match, best {:.2})", gap.key, gap.score)),
            }
        }
    }

    for warning in &report.warnings {
        lines.push(format!("warning: {warning}"));
    }

    lines.push(format!("wrote {} (sheet '{}')", saved.path.display(), saved.sheet));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_shows_index_letters_and_header() {
        assert_eq!(column_label(2, "产品型号"), "2 (B) - 产品型号");
        assert_eq!(column_label(28, "column AB"), "28 (AB) - column AB");
    }
}
