//! Common test utilities

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory holding an `Armadafile` with the given
/// content.
pub fn write_task_file(content: &str) -> (TempDir, PathBuf) {
    write_task_file_named("Armadafile", content)
}

/// Create a temporary directory holding a task file with an arbitrary
/// name (e.g. `stack.afx` for the full grammar).
pub fn write_task_file_named(name: &str, content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    fs::write(&path, content).unwrap();
    (temp_dir, path)
}
