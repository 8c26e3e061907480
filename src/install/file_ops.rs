//! Atomic file operations for service registration artifacts.
//!
//! Descriptors are written to a sibling temp file and renamed into place so a
//! failed write never leaves a truncated unit or plist behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{ServiceError, io_err};

/// Write file atomically with the given permission bits.
pub(crate) fn write_file_atomic(path: &Path, content: &str, mode: u32) -> Result<(), ServiceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path).map_err(|e| io_err(&temp_path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| io_err(&temp_path, e))?;
        file.sync_all().map_err(|e| io_err(&temp_path, e))?;
    }

    fs::set_permissions(&temp_path, fs::Permissions::from_mode(mode))
        .map_err(|e| io_err(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Remove `path`; absence is not an error. Returns whether a file was removed.
pub(crate) fn remove_if_present(path: &Path) -> Result<bool, ServiceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path, e)),
    }
}
