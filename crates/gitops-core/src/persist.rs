//! Locked filesystem primitives shared by the registry and history stores.
//!
//! Writes use the write-to-temp-then-rename strategy so a crash never leaves
//! a half-written file behind, and advisory locks keep concurrent engine
//! processes from interleaving.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::error::Result;

/// Write content atomically, replacing whatever was at `path`.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    fs::create_dir_all(dir)?;

    // Uniquely named temp file in the target directory, so concurrent
    // writers never share a name and the rename stays on one filesystem
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Append one line to a file, creating it (and its parents) if needed.
///
/// The line is written under an exclusive lock so two writers never
/// interleave partial lines.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    file.unlock()?;
    Ok(())
}

/// Read a whole file under a shared lock. Returns `None` if it does not exist.
pub fn read_locked(path: &Path) -> Result<Option<String>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    file.lock_shared()?;
    let content = fs::read_to_string(path)?;
    file.unlock()?;
    Ok(Some(content))
}
