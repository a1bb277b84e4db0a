use std::io::Write;
use std::path::Path;

use crate::error::StorageError;

pub(crate) fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Writes `content` to a file that must not exist yet (`O_CREAT | O_EXCL`).
pub(crate) fn write_new(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    let write_error = |e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(write_error)?;
    file.write_all(content).map_err(write_error)?;
    file.sync_all().map_err(write_error)
}

pub(crate) fn copy_file(from: &Path, to: &Path) -> Result<(), StorageError> {
    std::fs::copy(from, to).map_err(|e| StorageError::CopyFile {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
