//! Run-scoped temporary files.
//!
//! Everything a run puts on disk besides its output lives in one `TempDir`
//! that is removed when the `Staging` value drops, on success and on error.
//! Output goes through a `NamedTempFile` next to the destination and is only
//! renamed into place once it has been written completely.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tempfile::{NamedTempFile, TempDir};

use crate::error::IoError;

pub struct Staging {
    dir: TempDir,
}

impl Staging {
    pub fn new() -> Result<Self, IoError> {
        let dir = tempfile::Builder::new().prefix("restock-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `bytes` to `file_name` inside the staging directory.
    pub fn put(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, IoError> {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Write `dest` atomically: `fill` writes into a temp file in the same
/// directory, which is then renamed over `dest`. On any error the temp file
/// is removed and `dest` is left as it was.
pub fn write_atomic<F>(dest: &Path, fill: F) -> Result<(), IoError>
where
    F: FnOnce(&mut std::fs::File) -> Result<(), IoError>,
{
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| IoError::Write(format!("cannot create temp file in {}: {e}", dir.display())))?;
    fill(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.persist(dest)
        .map_err(|e| IoError::Write(format!("cannot move output to {}: {}", dest.display(), e.error)))?;
    Ok(())
}

/// Default output path: `<stem>_<YYYYmmdd_HHMMSS>.xlsx` next to `target`.
pub fn default_output_path<Tz: TimeZone>(target: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = format!("{stem}_{}.xlsx", now.format("%Y%m%d_%H%M%S"));
    match target.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn staging_dir_is_removed_on_drop() {
        let staging = Staging::new().unwrap();
        let file = staging.put("input.xlsx", b"data").unwrap();
        let dir = staging.path().to_path_buf();
        assert!(file.exists());
        drop(staging);
        assert!(!dir.exists());
    }

    #[test]
    fn atomic_write_replaces_dest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.xlsx");
        std::fs::write(&dest, b"old").unwrap();
        write_atomic(&dest, |f| Ok(f.write_all(b"new")?)).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.xlsx");
        let err = write_atomic(&dest, |_| Err(IoError::Write("boom".into()))).unwrap_err();
        assert!(matches!(err, IoError::Write(_)));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn output_name_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = default_output_path(Path::new("/data/订货单.xlsx"), &now);
        assert_eq!(path, PathBuf::from("/data/订货单_20240309_140507.xlsx"));
        let path = default_output_path(Path::new("order.xls"), &now);
        assert_eq!(path, PathBuf::from("order_20240309_140507.xlsx"));
    }
}
