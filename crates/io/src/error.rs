use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum IoError {
    /// The input path does not exist.
    InputMissing { path: PathBuf },
    /// The file exists but is not a workbook or CSV we can read.
    UnreadableDocument { path: PathBuf, reason: String },
    /// A legacy `.xls` target could not be upconverted.
    LegacyConversion(String),
    /// The file is smaller than the configured sanity floor.
    EmptyOrTruncatedDocument { path: PathBuf, size: u64, floor: u64 },
    /// Building or persisting the output document failed.
    Write(String),
    Io(std::io::Error),
}

impl IoError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::UnreadableDocument { path: path.into(), reason: reason.to_string() }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputMissing { path } => write!(f, "input not found: {}", path.display()),
            Self::UnreadableDocument { path, reason } => {
                write!(f, "cannot read {}: {reason}", path.display())
            }
            Self::LegacyConversion(msg) => write!(f, "legacy .xls conversion failed: {msg}"),
            Self::EmptyOrTruncatedDocument { path, size, floor } => write!(
                f,
                "{} is {size} bytes, below the {floor}-byte minimum (empty or truncated upload?)",
                path.display()
            ),
            Self::Write(msg) => write!(f, "cannot write output: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
