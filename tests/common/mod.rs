#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use report_recon::{FieldSpec, FieldType, KeyRule, RecordSchema};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Work-order schema used across the integration tests.
pub fn work_order_schema() -> RecordSchema {
    RecordSchema::new(
        "work_orders",
        vec![
            FieldSpec::new("work_order_id", FieldType::String).from_column("WO_ID"),
            FieldSpec::new("site", FieldType::String),
            FieldSpec::new("amount", FieldType::Decimal).nullable(),
            FieldSpec::new("quantity", FieldType::Int32),
            FieldSpec::new("completed", FieldType::Boolean).nullable(),
            FieldSpec::new("updated_at", FieldType::Timestamp).nullable(),
            FieldSpec::new("sync_token", FieldType::String).ignored(),
        ],
        KeyRule::new(["work_order_id", "site"]),
    )
    .expect("valid work order schema")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Copies a fixture from `tests/data` into the workspace.
    pub fn copy_fixture(&self, name: &str) -> PathBuf {
        let target = self.temp_dir.path().join(name);
        fs::copy(fixture_path(name), &target).expect("copy fixture");
        target
    }

    /// The single timestamped report directory created under `output_dir`.
    pub fn single_report_dir(&self, output_dir: &str, prefix: &str) -> PathBuf {
        let entries = fs::read_dir(self.path().join(output_dir))
            .expect("read output dir")
            .map(|entry| entry.expect("dir entry").path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&format!("{prefix}_")))
            })
            .collect::<Vec<_>>();
        assert_eq!(entries.len(), 1, "expected one report dir, got {entries:?}");
        entries.into_iter().next().expect("report dir")
    }
}
