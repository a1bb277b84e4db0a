use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::StrategyError;
use crate::extract::ExtractionStrategy;

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar"];
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Last resort: treats the upload as the payload itself and copies it into
/// the target under its own file name. Inputs that look like archives are
/// refused so a corrupt archive surfaces as an extraction failure.
pub struct PassthroughStrategy;

impl ExtractionStrategy for PassthroughStrategy {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn attempt_extract(&self, source: &Path, dest: &Path) -> Result<(), StrategyError> {
        if has_archive_extension(source) {
            return Err(StrategyError::NotApplicable(
                "input has an archive extension".to_string(),
            ));
        }
        if starts_with_zip_magic(source)? {
            return Err(StrategyError::NotApplicable(
                "input starts with a zip signature".to_string(),
            ));
        }

        let file_name = source.file_name().ok_or_else(|| {
            StrategyError::NotApplicable("input has no file name".to_string())
        })?;

        std::fs::copy(source, dest.join(file_name))?;
        Ok(())
    }
}

fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            ARCHIVE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn starts_with_zip_magic(path: &Path) -> Result<bool, StrategyError> {
    let mut header = [0u8; 4];
    let mut file = File::open(path)?;
    let mut read = 0;
    while read < header.len() {
        match file.read(&mut header[read..])? {
            0 => break,
            n => read += n,
        }
    }
    Ok(read == header.len() && &header == ZIP_MAGIC)
}
