//! Path jail confining tools to the project directory
//!
//! Every path a tool touches is resolved against the project root,
//! canonicalized (symlinks, `..` and `.` resolved) and rejected unless the
//! result still lies under the root.

use crate::errors::{AgentError, Result};
use std::path::{Path, PathBuf};

/// Path jail security manager
#[derive(Debug, Clone)]
pub struct PathJail {
    /// Canonicalized jail root directory
    jail_root: PathBuf,
}

impl PathJail {
    /// Create new path jail with given root directory
    pub fn new(jail_root: impl AsRef<Path>) -> Result<Self> {
        let jail_root = jail_root.as_ref();

        if !jail_root.exists() {
            return Err(AgentError::ConfigError(format!(
                "Project directory does not exist: {}",
                jail_root.display()
            )));
        }

        let jail_root = jail_root.canonicalize().map_err(|e| {
            AgentError::ConfigError(format!("Failed to canonicalize project directory: {}", e))
        })?;

        Ok(Self { jail_root })
    }

    /// Verify path is within jail and return canonical path
    ///
    /// Relative paths are taken from the jail root. The target must exist;
    /// none of the tools create files.
    pub fn verify_and_canonicalize(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.jail_root.join(path)
        };

        let canonical = full_path.canonicalize().map_err(|e| {
            AgentError::Tool(format!("cannot access {}: {}", path.display(), e))
        })?;

        if !canonical.starts_with(&self.jail_root) {
            return Err(AgentError::PathViolation(format!(
                "path escapes project directory: {}",
                path.display()
            )));
        }

        Ok(canonical)
    }

    /// Get jail root directory
    pub fn jail_root(&self) -> &Path {
        &self.jail_root
    }
}
