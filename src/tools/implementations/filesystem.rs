//! Filesystem tool implementations
//!
//! - read_file: Read file contents with size limits
//! - list_files: List directory contents, optionally recursive and filtered
//!
//! Both are read-only and resolve every path through the project's path jail.

use crate::errors::{AgentError, Result};
use crate::tools::types::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::json;
use std::fs;
use std::path::Path;

/// Directories never descended into by a recursive listing
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

/// Read a UTF-8 text file
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file in the project"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let path = args["path"]
            .as_str()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AgentError::Tool("missing required argument: path".to_string()))?;

        let verified = ctx.resolve(path)?;
        if !verified.is_file() {
            return Err(AgentError::Tool(format!("path is not a file: {}", path)));
        }

        let metadata = fs::metadata(&verified)?;
        if metadata.len() > ctx.max_output_size as u64 {
            return Err(AgentError::Tool(format!(
                "file too large: {} bytes (max {} bytes)",
                metadata.len(),
                ctx.max_output_size
            )));
        }

        let bytes = fs::read(&verified)?;
        String::from_utf8(bytes)
            .map_err(|_| AgentError::Tool(format!("file is not valid UTF-8: {}", path)))
    }
}

/// List directory entries
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories in the project"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the project root",
                    "default": "."
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to list recursively",
                    "default": false
                },
                "pattern": {
                    "type": "string",
                    "description": "Only include entries whose name contains this text"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let path = args["path"].as_str().unwrap_or(".");
        let recursive = args["recursive"].as_bool().unwrap_or(false);
        let pattern = args["pattern"].as_str().filter(|p| !p.is_empty());

        let verified = ctx.resolve(path)?;
        if !verified.is_dir() {
            return Err(AgentError::Tool(format!("path is not a directory: {}", path)));
        }

        let mut entries = Vec::new();
        collect_entries(&verified, &verified, recursive, &mut entries)?;

        let mut lines: Vec<String> = entries
            .into_iter()
            .filter(|(name, _)| pattern.map_or(true, |p| name.contains(p)))
            .map(|(name, kind)| match kind {
                EntryKind::Dir => format!("DIR  {}/", name),
                EntryKind::File => format!("FILE {}", name),
                EntryKind::Link => format!("LINK {}", name),
            })
            .collect();
        lines.sort();

        if lines.is_empty() {
            return Ok("(no entries)".to_string());
        }
        Ok(lines.join("\n"))
    }
}

/// What a listed entry is; symlinks are reported, never followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Link,
}

fn collect_entries(
    base: &Path,
    current: &Path,
    recursive: bool,
    entries: &mut Vec<(String, EntryKind)>,
) -> Result<()> {
    let read_dir = fs::read_dir(current)
        .map_err(|e| AgentError::Tool(format!("failed to read directory: {}", e)))?;

    for entry in read_dir {
        let entry = entry.map_err(|e| AgentError::Tool(format!("failed to read entry: {}", e)))?;
        let file_type = entry
            .file_type()
            .map_err(|e| AgentError::Tool(format!("failed to read entry type: {}", e)))?;
        let path = entry.path();
        let relative = path.strip_prefix(base).unwrap_or(&path);
        let name = relative.to_string_lossy().to_string();

        // file_type() does not follow links, so a link to a directory outside
        // the project (or to an ancestor) is never descended into
        let kind = if file_type.is_symlink() {
            EntryKind::Link
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        entries.push((name, kind));

        let skipped = entry
            .file_name()
            .to_str()
            .map_or(false, |n| SKIPPED_DIRS.contains(&n));
        if recursive && kind == EntryKind::Dir && !skipped {
            collect_entries(base, &path, recursive, entries)?;
        }
    }

    Ok(())
}
