//! CLI Exit Code Registry
//!
//! Every exit code `restock` can return is defined here. Scripts that wrap
//! the tool branch on these, so a code never changes meaning once shipped.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                  |
//! |---------|-----------|----------------------------------------------|
//! | 0       | Universal | Success                                      |
//! | 1       | Universal | General error (unspecified)                  |
//! | 2       | Universal | CLI usage error (bad args, output == target) |
//! | 60-63   | input     | Reading the source and target documents      |
//! | 64-66   | columns   | Locating source and target columns           |
//! | 67      | config    | Config parse and validation                  |
//! | 68      | output    | Writing the output workbook or report        |
//! | 69      | source    | Duplicate join key under `duplicate_keys = "error"` |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Update the table above
//! 3. Map the error that triggers it in `recon_exit_code` / `io_exit_code`

use restock_io::IoError;
use restock_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success: the output workbook was written.
pub const EXIT_SUCCESS: u8 = 0;

/// General error. Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error: bad arguments, or `--output` pointing at the target itself.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Input (60-63)
// =============================================================================

/// A source or target path does not exist.
pub const EXIT_INPUT_MISSING: u8 = 60;

/// Not a workbook/CSV, or the container could not be parsed.
pub const EXIT_UNREADABLE: u8 = 61;

/// Legacy `.xls` target could not be converted to `.xlsx`.
pub const EXIT_LEGACY_CONVERSION: u8 = 62;

/// File is smaller than the sanity floor (still downloading, truncated).
pub const EXIT_EMPTY_INPUT: u8 = 63;

// =============================================================================
// Columns (64-66)
// =============================================================================

/// Source header row lacks the stock or sales column.
pub const EXIT_MISSING_COLUMN: u8 = 64;

/// No source header carries every key marker.
pub const EXIT_NO_KEY_COLUMN: u8 = 65;

/// Target join-key or value column neither inferred nor given.
pub const EXIT_UNRESOLVED_COLUMNS: u8 = 66;

// =============================================================================
// Config (67)
// =============================================================================

/// Config file unreadable, malformed, or rejected by validation.
pub const EXIT_INVALID_CONFIG: u8 = 67;

// =============================================================================
// Output (68-69)
// =============================================================================

/// Output workbook or JSON report could not be written.
pub const EXIT_WRITE: u8 = 68;

/// Two source rows derived the same join key and the policy is `error`.
pub const EXIT_DUPLICATE_KEY: u8 = 69;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::MissingColumn { .. } => EXIT_MISSING_COLUMN,
        ReconError::NoKeyColumn { .. } => EXIT_NO_KEY_COLUMN,
        ReconError::UnresolvedColumns { .. } => EXIT_UNRESOLVED_COLUMNS,
        ReconError::DuplicateKey { .. } => EXIT_DUPLICATE_KEY,
        ReconError::CellOutOfBounds { .. } => EXIT_ERROR,
    }
}

/// Map a document IO error to its exit code.
pub fn io_exit_code(err: &IoError) -> u8 {
    match err {
        IoError::InputMissing { .. } => EXIT_INPUT_MISSING,
        IoError::UnreadableDocument { .. } => EXIT_UNREADABLE,
        IoError::LegacyConversion(_) => EXIT_LEGACY_CONVERSION,
        IoError::EmptyOrTruncatedDocument { .. } => EXIT_EMPTY_INPUT,
        IoError::Write(_) => EXIT_WRITE,
        IoError::Io(_) => EXIT_ERROR,
    }
}
