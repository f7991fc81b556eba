#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tablescope::{config::PipelineConfig, normalize::ProcessedDataset, pipeline::ingest};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Runs the inline pipeline over in-memory text with default settings.
pub fn ingest_text(file_name: &str, contents: &str) -> ProcessedDataset {
    ingest(
        contents.as_bytes(),
        file_name,
        None,
        None,
        &PipelineConfig::default(),
        |_| {},
    )
    .expect("ingest")
    .dataset
}

pub fn ingest_fixture(name: &str) -> ProcessedDataset {
    let bytes = fs::read(fixture_path(name)).expect("read fixture");
    ingest(&bytes, name, None, None, &PipelineConfig::default(), |_| {})
        .expect("ingest fixture")
        .dataset
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}
