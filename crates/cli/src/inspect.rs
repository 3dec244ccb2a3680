//! `restock inspect`: preview the order-sheet layout a run would use.

use std::path::PathBuf;

use restock_io::TargetDocument;
use restock_recon::grid::column_letters;
use restock_recon::{resolve_layout, ColumnRoles, Grid, TargetLayout};
use serde::Serialize;

use crate::exit_codes::EXIT_WRITE;
use crate::report::column_label;
use crate::run::load_config;
use crate::CliError;

#[derive(Serialize)]
struct RoleColumn {
    column: usize,
    letter: String,
    header: String,
    /// Taken from config rather than header inference.
    explicit: bool,
}

#[derive(Serialize)]
struct InspectOutput {
    sheet: String,
    rows: usize,
    cols: usize,
    converted_from_legacy: bool,
    join_key: Option<RoleColumn>,
    value: Option<RoleColumn>,
    header_row: Option<usize>,
    first_data_row: usize,
    last_data_row: usize,
    inferred: ColumnRoles,
    warnings: Vec<String>,
}

fn role_column(
    grid: &Grid,
    layout: &TargetLayout,
    resolved: Option<usize>,
    inferred: Option<usize>,
) -> Option<RoleColumn> {
    let col = resolved?;
    let header_row = layout
        .resolved
        .header_row
        .unwrap_or(layout.first_data_row.saturating_sub(1));
    Some(RoleColumn {
        column: col,
        letter: column_letters(col),
        header: grid.label(header_row, col),
        explicit: inferred != Some(col),
    })
}

fn describe(role: &Option<RoleColumn>) -> String {
    match role {
        Some(r) if r.explicit => format!("{} [explicit]", column_label(r.column, &r.header)),
        Some(r) => column_label(r.column, &r.header),
        None => "not found".to_string(),
    }
}

pub fn cmd_inspect(target: PathBuf, config: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let config = load_config(config.as_deref())?;
    let doc = TargetDocument::open(&target, &config.input)?;
    let layout = resolve_layout(&doc.grid, &config.target)?;

    let output = InspectOutput {
        sheet: doc.sheet.name.clone(),
        rows: doc.grid.max_row(),
        cols: doc.grid.max_col(),
        converted_from_legacy: doc.converted_from_legacy,
        join_key: role_column(
            &doc.grid,
            &layout,
            layout.resolved.join_key_column,
            layout.inferred.join_key_column,
        ),
        value: role_column(
            &doc.grid,
            &layout,
            layout.resolved.target_value_column,
            layout.inferred.target_value_column,
        ),
        header_row: layout.resolved.header_row,
        first_data_row: layout.first_data_row,
        last_data_row: layout.last_data_row,
        inferred: layout.inferred,
        warnings: doc.warnings.clone(),
    };

    if json {
        let json_str = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::new(EXIT_WRITE, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
        return Ok(());
    }

    println!("sheet:          {} ({} rows x {} cols)", output.sheet, output.rows, output.cols);
    println!("join key:       {}", describe(&output.join_key));
    println!("value:          {}", describe(&output.value));
    match output.header_row {
        Some(row) => println!("header row:     {row}"),
        None => println!("header row:     not found"),
    }
    println!("data rows:      {}-{}", output.first_data_row, output.last_data_row);
    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }

    Ok(())
}
