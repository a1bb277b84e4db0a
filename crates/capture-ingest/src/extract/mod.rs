//! Archive extraction with an ordered fallback chain.
//!
//! Upload clients are not under our control, so the extractor tries every
//! strategy in turn (external unarchivers, the linked `zip` reader, and
//! finally a verbatim copy) and only fails once all of them have.

pub mod command;
pub mod passthrough;
pub mod zip_library;

use std::path::Path;

use log::{debug, info};

use crate::config::ToolsConfig;
use crate::error::{ExtractionError, StrategyError, StrategyFailure};
use crate::sanitize;

pub use command::{TarCommand, UnzipCommand};
pub use passthrough::PassthroughStrategy;
pub use zip_library::ZipLibraryStrategy;

pub trait ExtractionStrategy: Send + Sync {
    /// Short name used in logs and aggregated errors.
    fn name(&self) -> &'static str;

    /// Extracts `source` into `dest`. `dest` exists and is empty.
    fn attempt_extract(&self, source: &Path, dest: &Path) -> Result<(), StrategyError>;
}

pub struct ArchiveExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ArchiveExtractor {
    /// The production chain: `unzip`, `tar`, the `zip` crate, then a verbatim copy.
    pub fn new(tools: &ToolsConfig) -> Self {
        Self::with_strategies(vec![
            Box::new(UnzipCommand::new(&tools.unzip)),
            Box::new(TarCommand::new(&tools.tar)),
            Box::new(ZipLibraryStrategy),
            Box::new(PassthroughStrategy),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Extracts `source` into `target`, returning the name of the strategy
    /// that succeeded.
    pub fn extract(&self, source: &Path, target: &Path) -> Result<&'static str, ExtractionError> {
        let file = sanitize::redact_path(source);
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            reset_directory(target)?;

            let _span = tracing::debug_span!("extract.strategy", strategy = strategy.name()).entered();
            match strategy
                .attempt_extract(source, target)
                .and_then(|()| ensure_not_empty(target))
            {
                Ok(()) => {
                    info!("Extracted {} using {}", file, strategy.name());
                    return Ok(strategy.name());
                }
                Err(error) => {
                    debug!("Strategy {} failed for {}: {}", strategy.name(), file, error);
                    attempts.push(StrategyFailure {
                        strategy: strategy.name(),
                        error,
                    });
                }
            }
        }

        // Leave nothing half-extracted behind for the resolver to trip over.
        let _ = std::fs::remove_dir_all(target);

        Err(ExtractionError::AllStrategiesFailed { file, attempts })
    }
}

fn reset_directory(path: &Path) -> Result<(), ExtractionError> {
    let prepare = |source| ExtractionError::PrepareTarget {
        path: path.to_path_buf(),
        source,
    };

    if path.exists() {
        std::fs::remove_dir_all(path).map_err(prepare)?;
    }
    std::fs::create_dir_all(path).map_err(prepare)
}

fn ensure_not_empty(dir: &Path) -> Result<(), StrategyError> {
    let mut entries = std::fs::read_dir(dir)?;
    if entries.next().is_some() {
        Ok(())
    } else {
        Err(StrategyError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Failing(&'static str);

    impl ExtractionStrategy for Failing {
        fn name(&self) -> &'static str {
            self.0
        }

        fn attempt_extract(&self, _source: &Path, dest: &Path) -> Result<(), StrategyError> {
            // Leaves debris so the next strategy must start from a clean directory.
            std::fs::write(dest.join("partial.bin"), b"junk")?;
            Err(StrategyError::Archive(format!("{} broke", self.0)))
        }
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl ExtractionStrategy for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn attempt_extract(&self, _source: &Path, dest: &Path) -> Result<(), StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(!dest.join("partial.bin").exists());
            std::fs::write(dest.join("video.mp4"), b"frames")?;
            Ok(())
        }
    }

    fn zip_fixture(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("upload.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("video.mp4", options).unwrap();
        writer.write_all(b"fake video").unwrap();
        writer.start_file("events.json", options).unwrap();
        writer.write_all(br#"{"events":[]}"#).unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_first_success_wins_and_later_strategies_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("upload.bin");
        std::fs::write(&source, b"x").unwrap();

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let extractor = ArchiveExtractor::with_strategies(vec![
            Box::new(Failing("one")),
            Box::new(Counting {
                calls: Arc::clone(&first),
            }),
            Box::new(Counting {
                calls: Arc::clone(&second),
            }),
        ]);

        let target = tmp.path().join("out");
        let winner = extractor.extract(&source, &target).unwrap();

        assert_eq!(winner, "counting");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert!(target.join("video.mp4").exists());
    }

    #[test]
    fn test_all_failures_are_aggregated() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("upload.zip");
        std::fs::write(&source, b"x").unwrap();

        let extractor =
            ArchiveExtractor::with_strategies(vec![Box::new(Failing("a")), Box::new(Failing("b"))]);

        let target = tmp.path().join("out");
        let err = extractor.extract(&source, &target).unwrap_err();

        match &err {
            ExtractionError::AllStrategiesFailed { file, attempts } => {
                assert_eq!(file, "upload.zip");
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].strategy, "a");
                assert_eq!(attempts[1].strategy, "b");
            }
            other => panic!("Expected AllStrategiesFailed, got {:?}", other),
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_library_fallback_when_external_tools_are_missing() {
        let tmp = TempDir::new().unwrap();
        let source = zip_fixture(tmp.path());

        let extractor = ArchiveExtractor::with_strategies(vec![
            Box::new(UnzipCommand::new("capture-ingest-no-such-unzip")),
            Box::new(TarCommand::new("capture-ingest-no-such-tar")),
            Box::new(ZipLibraryStrategy),
            Box::new(PassthroughStrategy),
        ]);

        let target = tmp.path().join("out");
        let winner = extractor.extract(&source, &target).unwrap();

        assert_eq!(winner, "zip");
        assert_eq!(std::fs::read(target.join("video.mp4")).unwrap(), b"fake video");
        assert!(target.join("events.json").exists());
    }

    #[test]
    fn test_default_chain_order() {
        let extractor = ArchiveExtractor::new(&ToolsConfig::default());
        assert_eq!(
            extractor.strategy_names(),
            vec!["unzip", "tar", "zip", "copy"]
        );
    }

    #[test]
    fn test_default_chain_copies_non_archive() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("capture.raw");
        std::fs::write(&source, b"not an archive at all").unwrap();

        let extractor = ArchiveExtractor::new(&ToolsConfig::default());
        let target = tmp.path().join("out");
        let winner = extractor.extract(&source, &target).unwrap();

        assert_eq!(winner, "copy");
        assert!(target.join("capture.raw").exists());
    }

    #[test]
    fn test_default_chain_rejects_corrupt_zip() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("broken.zip");
        std::fs::write(&source, b"PK\x03\x04 definitely truncated").unwrap();

        let extractor = ArchiveExtractor::new(&ToolsConfig::default());
        let err = extractor.extract(&source, &tmp.path().join("out")).unwrap_err();

        assert!(err.to_string().contains("copy: not applicable"));
    }
}
