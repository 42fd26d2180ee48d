//! Sessions: one output directory per identifier.

use crate::util::safe_file_name;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SESSION_ID: &str = "default_session";

/// A sanitized session identifier and the directory it owns.
///
/// The directory is created on first use and never removed here.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    dir: PathBuf,
}

impl Session {
    pub fn open(output_root: &Path, id: &str) -> Result<Self> {
        let id = safe_file_name(id).ok_or_else(|| anyhow!("Invalid session id: {:?}", id))?;
        let dir = output_root.join(&id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory {}", dir.display()))?;
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_dir_is_created_under_root() {
        let root = TempDir::new().unwrap();
        let session = Session::open(root.path(), "run_42").unwrap();
        assert_eq!(session.id(), "run_42");
        assert_eq!(session.dir(), root.path().join("run_42"));
        assert!(session.dir().is_dir());
    }

    #[test]
    fn test_session_id_cannot_escape_root() {
        let root = TempDir::new().unwrap();
        let session = Session::open(root.path(), "../outside").unwrap();
        assert_eq!(session.id(), "outside");
        assert!(session.dir().starts_with(root.path()));
        assert!(Session::open(root.path(), "..").is_err());
    }
}
