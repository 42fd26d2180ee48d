//! File materializer: writes literal files into the session directory.

use crate::util::safe_file_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePhaseStatus {
    Success,
    PartialFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePhaseResult {
    pub status: FilePhaseStatus,
    pub created_files: Vec<String>,
    pub file_count: usize,
    /// Sum of the UTF-8 byte lengths of every written file.
    pub total_size: u64,
    pub errors: Vec<String>,
    pub execution_time: f64,
}

impl FilePhaseResult {
    pub fn is_success(&self) -> bool {
        self.status == FilePhaseStatus::Success
    }
}

/// Write every entry of `files` into `dir` under its base name.
///
/// A failed write is recorded and the remaining files are still written.
pub fn materialize(files: &BTreeMap<String, String>, dir: &Path) -> FilePhaseResult {
    let start = Instant::now();
    tracing::info!(count = files.len(), dir = %dir.display(), "creating files");

    let mut created_files = Vec::with_capacity(files.len());
    let mut total_size = 0u64;
    let mut errors = Vec::new();

    for (name, content) in files {
        match write_one(dir, name, content) {
            Ok(path) => {
                let size = content.len() as u64;
                tracing::info!(file = %path, bytes = size, "created file");
                total_size += size;
                created_files.push(path);
            }
            Err(reason) => {
                let message = format!("Failed to create {}: {}", name, reason);
                tracing::warn!("{}", message);
                errors.push(message);
            }
        }
    }

    FilePhaseResult {
        status: if errors.is_empty() {
            FilePhaseStatus::Success
        } else {
            FilePhaseStatus::PartialFailure
        },
        file_count: created_files.len(),
        created_files,
        total_size,
        errors,
        execution_time: start.elapsed().as_secs_f64(),
    }
}

fn write_one(dir: &Path, name: &str, content: &str) -> Result<String, String> {
    let base = safe_file_name(name).ok_or_else(|| "invalid file name".to_string())?;
    let path = dir.join(base);
    fs::write(&path, content.as_bytes()).map_err(|e| e.to_string())?;
    Ok(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_contents_and_sizes_match_input() {
        let dir = TempDir::new().unwrap();
        let input = files(&[("index.html", "<p>héllo</p>"), ("styles.css", "p {}")]);
        let result = materialize(&input, dir.path());

        assert!(result.is_success());
        assert_eq!(result.file_count, 2);
        assert_eq!(result.total_size, ("<p>héllo</p>".len() + "p {}".len()) as u64);
        for (name, content) in &input {
            assert_eq!(&fs::read_to_string(dir.path().join(name)).unwrap(), content);
        }
    }

    #[test]
    fn test_parent_escapes_write_base_name_only() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("session");
        fs::create_dir_all(&dir).unwrap();
        let result = materialize(&files(&[("../../escape.txt", "x")]), &dir);

        assert!(result.is_success());
        assert!(dir.join("escape.txt").is_file());
        assert!(!root.path().join("escape.txt").exists());
    }

    #[test]
    fn test_failures_are_recorded_per_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("taken")).unwrap();
        let result = materialize(&files(&[("..", "a"), ("ok.txt", "b"), ("taken", "c")]), dir.path());

        assert_eq!(result.status, FilePhaseStatus::PartialFailure);
        assert_eq!(result.file_count, 1);
        assert_eq!(result.total_size, 1);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0], "Failed to create ..: invalid file name");
        assert!(result.errors[1].starts_with("Failed to create taken: "));
    }
}
