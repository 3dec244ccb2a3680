// Document IO: loading grids, legacy upconversion, in-place .xlsx patching

pub mod csv;
pub mod document;
pub mod error;
pub mod format;
pub mod legacy;
pub mod load;
pub mod patch;
pub mod staging;
pub mod workbook;

pub use document::{load_source, SaveSummary, TargetDocument};
pub use error::IoError;
pub use format::DocumentFormat;
pub use staging::default_output_path;
