//! Per-project tool permission persistence
//!
//! A decision is keyed by (function, project). Only `Always` and `Never`
//! are ever stored; `Once` applies to a single call and is dropped.
//!
//! Two stores implement the contract: an in-memory one for tests and
//! `--no-persist` sessions, and a JSON file under `~/.deepbuddy`.

use crate::errors::{AgentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, RwLock};

/// How long an approval decision lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// This call only
    Once,

    /// Every call to this function in this project
    Always,

    /// No call to this function in this project
    Never,
}

impl PermissionLevel {
    /// Whether a decision at this level outlives the call
    pub fn persists(&self) -> bool {
        !matches!(self, PermissionLevel::Once)
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Once => write!(f, "once"),
            PermissionLevel::Always => write!(f, "always"),
            PermissionLevel::Never => write!(f, "never"),
        }
    }
}

impl FromStr for PermissionLevel {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "once" => Ok(PermissionLevel::Once),
            "always" => Ok(PermissionLevel::Always),
            "never" => Ok(PermissionLevel::Never),
            other => Err(AgentError::PermissionStore(format!(
                "unknown permission level: {}",
                other
            ))),
        }
    }
}

/// A stored decision for one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub level: PermissionLevel,
    pub updated_at: DateTime<Utc>,
}

/// Permission persistence contract
pub trait PermissionStore: Send + Sync {
    /// Stored level for a function, `None` meaning "ask"
    fn check(&self, function: &str, project: &str) -> Result<Option<PermissionLevel>>;

    /// Store a decision; `Once` is ignored
    fn set(&self, function: &str, project: &str, level: PermissionLevel) -> Result<()>;

    /// Every stored decision for a project, sorted by function
    fn list(&self, project: &str) -> Result<Vec<(String, PermissionRecord)>>;

    /// Forget a project's decisions, returning how many were removed
    fn reset(&self, project: &str) -> Result<usize>;
}

/// Serialized form: project → function → record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PermissionDocument {
    #[serde(default)]
    projects: BTreeMap<String, BTreeMap<String, PermissionRecord>>,
}

impl PermissionDocument {
    fn get(&self, function: &str, project: &str) -> Option<PermissionLevel> {
        self.projects
            .get(project)
            .and_then(|functions| functions.get(function))
            .map(|record| record.level)
    }

    fn insert(&mut self, function: &str, project: &str, level: PermissionLevel) {
        self.projects.entry(project.to_string()).or_default().insert(
            function.to_string(),
            PermissionRecord {
                level,
                updated_at: Utc::now(),
            },
        );
    }

    fn list(&self, project: &str) -> Vec<(String, PermissionRecord)> {
        self.projects
            .get(project)
            .map(|functions| {
                functions
                    .iter()
                    .map(|(name, record)| (name.clone(), record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove_project(&mut self, project: &str) -> usize {
        self.projects.remove(project).map_or(0, |functions| functions.len())
    }
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::PermissionStore("permission store lock poisoned".to_string())
}

/// In-memory store; decisions last for the process only
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    document: RwLock<PermissionDocument>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn check(&self, function: &str, project: &str) -> Result<Option<PermissionLevel>> {
        Ok(self.document.read().map_err(poisoned)?.get(function, project))
    }

    fn set(&self, function: &str, project: &str, level: PermissionLevel) -> Result<()> {
        if !level.persists() {
            return Ok(());
        }
        self.document
            .write()
            .map_err(poisoned)?
            .insert(function, project, level);
        Ok(())
    }

    fn list(&self, project: &str) -> Result<Vec<(String, PermissionRecord)>> {
        Ok(self.document.read().map_err(poisoned)?.list(project))
    }

    fn reset(&self, project: &str) -> Result<usize> {
        Ok(self.document.write().map_err(poisoned)?.remove_project(project))
    }
}

/// JSON-file store, rewritten on every change
#[derive(Debug)]
pub struct FilePermissionStore {
    path: PathBuf,
    document: Mutex<PermissionDocument>,
}

impl FilePermissionStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                AgentError::PermissionStore(format!("failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                AgentError::PermissionStore(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            PermissionDocument::default()
        };

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write via a temp file and rename so a crash never leaves half a file
    fn save(&self, document: &PermissionDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Write `document`, putting `previous` back if the write fails so memory
    /// never holds a decision the file does not
    fn save_or_restore(&self, document: &mut PermissionDocument, previous: PermissionDocument) -> Result<()> {
        if let Err(e) = self.save(document) {
            *document = previous;
            return Err(e);
        }
        Ok(())
    }
}

impl PermissionStore for FilePermissionStore {
    fn check(&self, function: &str, project: &str) -> Result<Option<PermissionLevel>> {
        Ok(self.document.lock().map_err(poisoned)?.get(function, project))
    }

    fn set(&self, function: &str, project: &str, level: PermissionLevel) -> Result<()> {
        if !level.persists() {
            return Ok(());
        }
        let mut document = self.document.lock().map_err(poisoned)?;
        let previous = document.clone();
        document.insert(function, project, level);
        self.save_or_restore(&mut document, previous)
    }

    fn list(&self, project: &str) -> Result<Vec<(String, PermissionRecord)>> {
        Ok(self.document.lock().map_err(poisoned)?.list(project))
    }

    fn reset(&self, project: &str) -> Result<usize> {
        let mut document = self.document.lock().map_err(poisoned)?;
        let previous = document.clone();
        let removed = document.remove_project(project);
        if removed > 0 {
            self.save_or_restore(&mut document, previous)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!("Always".parse::<PermissionLevel>().unwrap(), PermissionLevel::Always);
        assert_eq!(PermissionLevel::Never.to_string(), "never");
        assert!("sometimes".parse::<PermissionLevel>().is_err());
    }

    #[test]
    fn test_unknown_function_means_ask() {
        let store = MemoryPermissionStore::new();
        assert_eq!(store.check("read_file", "/p").unwrap(), None);
    }

    #[test]
    fn test_once_is_not_persisted() {
        let store = MemoryPermissionStore::new();
        store.set("read_file", "/p", PermissionLevel::Once).unwrap();
        assert_eq!(store.check("read_file", "/p").unwrap(), None);
        assert!(store.list("/p").unwrap().is_empty());
    }

    #[test]
    fn test_decisions_scoped_to_project() {
        let store = MemoryPermissionStore::new();
        store.set("read_file", "/a", PermissionLevel::Always).unwrap();
        store.set("git_diff", "/a", PermissionLevel::Never).unwrap();

        assert_eq!(store.check("read_file", "/a").unwrap(), Some(PermissionLevel::Always));
        assert_eq!(store.check("git_diff", "/a").unwrap(), Some(PermissionLevel::Never));
        assert_eq!(store.check("read_file", "/b").unwrap(), None);

        let listed: Vec<String> = store.list("/a").unwrap().into_iter().map(|(f, _)| f).collect();
        assert_eq!(listed, ["git_diff", "read_file"]);

        assert_eq!(store.reset("/a").unwrap(), 2);
        assert_eq!(store.check("read_file", "/a").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("permissions.json");

        {
            let store = FilePermissionStore::open(&path).unwrap();
            store.set("list_files", "/proj", PermissionLevel::Always).unwrap();
        }

        let store = FilePermissionStore::open(&path).unwrap();
        assert_eq!(store.check("list_files", "/proj").unwrap(), Some(PermissionLevel::Always));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_overwrites_decision() {
        let temp = TempDir::new().unwrap();
        let store = FilePermissionStore::open(temp.path().join("p.json")).unwrap();

        store.set("git_diff", "/proj", PermissionLevel::Always).unwrap();
        store.set("git_diff", "/proj", PermissionLevel::Never).unwrap();
        assert_eq!(store.check("git_diff", "/proj").unwrap(), Some(PermissionLevel::Never));
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.json");
        fs::write(&path, "not json").unwrap();

        let result = FilePermissionStore::open(&path);
        assert!(matches!(result, Err(AgentError::PermissionStore(_))));
    }

    #[test]
    fn test_failed_write_leaves_decision_unrecorded() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let store = FilePermissionStore::open(blocker.join("permissions.json")).unwrap();
        assert!(store.set("read_file", "/proj", PermissionLevel::Always).is_err());
        assert_eq!(store.check("read_file", "/proj").unwrap(), None);
        assert!(store.list("/proj").unwrap().is_empty());
    }
}
