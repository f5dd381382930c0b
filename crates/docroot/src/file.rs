//! Whole-file reads and writes

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

/// Load a regular file into memory
///
/// # Returns
/// * `Err(Error::NotFound)` - nothing exists at `path`
/// * `Err(Error::NotAFile)` - `path` is a directory, socket, etc.
pub fn load(path: &Path) -> Result<Vec<u8>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if !meta.is_file() {
        return Err(Error::NotAFile(path.to_path_buf()));
    }

    Ok(fs::read(path)?)
}

/// Write `data` to `path`, creating missing parent directories
///
/// Existing files are truncated.
pub fn save(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}
