use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::StrategyError;
use crate::extract::ExtractionStrategy;

/// Resolves `program` on `PATH` (or as an explicit path).
pub(crate) fn locate_tool(program: &str) -> Result<PathBuf, StrategyError> {
    which::which(program).map_err(|_| StrategyError::ToolMissing(program.to_string()))
}

fn run_tool(program: &str, cmd: &mut Command) -> Result<(), StrategyError> {
    let output: Output = cmd.output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(StrategyError::ToolFailed {
            tool: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// `unzip -o -qq <source> -d <dest>`
pub struct UnzipCommand {
    program: String,
}

impl UnzipCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ExtractionStrategy for UnzipCommand {
    fn name(&self) -> &'static str {
        "unzip"
    }

    fn attempt_extract(&self, source: &Path, dest: &Path) -> Result<(), StrategyError> {
        let tool = locate_tool(&self.program)?;

        let mut cmd = Command::new(tool);
        cmd.arg("-o").arg("-qq").arg(source).arg("-d").arg(dest);

        run_tool(&self.program, &mut cmd)
    }
}

/// `tar -xf <source> -C <dest>`. Modern tar implementations sniff the
/// compression and several also read zip archives.
pub struct TarCommand {
    program: String,
}

impl TarCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ExtractionStrategy for TarCommand {
    fn name(&self) -> &'static str {
        "tar"
    }

    fn attempt_extract(&self, source: &Path, dest: &Path) -> Result<(), StrategyError> {
        let tool = locate_tool(&self.program)?;

        let mut cmd = Command::new(tool);
        cmd.arg("-xf").arg(source).arg("-C").arg(dest);

        run_tool(&self.program, &mut cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_tool_is_reported() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.zip");
        std::fs::write(&source, b"x").unwrap();

        let strategy = UnzipCommand::new("capture-ingest-missing-unzip");
        let err = strategy.attempt_extract(&source, tmp.path()).unwrap_err();

        assert!(matches!(err, StrategyError::ToolMissing(ref name) if name == "capture-ingest-missing-unzip"));
    }

    #[test]
    fn test_tar_round_trip_when_available() {
        if which::which("tar").is_err() {
            return;
        }

        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        std::fs::write(staging.join("video.mp4"), b"frames").unwrap();

        let archive = tmp.path().join("upload.tar");
        let status = Command::new("tar")
            .arg("-cf")
            .arg(&archive)
            .arg("-C")
            .arg(&staging)
            .arg("video.mp4")
            .status()
            .unwrap();
        assert!(status.success());

        let dest = tmp.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        TarCommand::new("tar").attempt_extract(&archive, &dest).unwrap();

        assert_eq!(std::fs::read(dest.join("video.mp4")).unwrap(), b"frames");
    }

    #[test]
    fn test_tool_failure_carries_stderr() {
        if which::which("tar").is_err() {
            return;
        }

        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("garbage.tar");
        std::fs::write(&source, b"this is not a tarball").unwrap();

        let dest = tmp.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        let err = TarCommand::new("tar").attempt_extract(&source, &dest).unwrap_err();

        assert!(matches!(err, StrategyError::ToolFailed { .. }));
    }
}
