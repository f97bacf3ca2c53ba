//! `search_files`: find files under a directory whose name matches a glob.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{Tool, ToolResult};
use regex_lite::Regex;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::required_str;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

pub struct SearchFilesTool;

/// Translate a file-name glob (`*`, `?`) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, ToolError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex_lite::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| ToolError::InvalidArguments(format!("Bad pattern '{pattern}': {e}")))
}

fn search(root: PathBuf, matcher: Regex) -> Vec<String> {
    let mut matches: Vec<String> = WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| matcher.is_match(&e.file_name().to_string_lossy()))
        .map(|e| e.path().display().to_string())
        .collect();
    matches.sort();
    matches
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Recursively list files under a directory (default '.') whose name matches a glob pattern."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = required_str(&arguments, "pattern")?;
        let root = PathBuf::from(arguments["path"].as_str().unwrap_or("."));
        let matcher = glob_to_regex(pattern)?;

        if !root.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let matches = tokio::task::spawn_blocking(move || search(root, matcher))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_files".into(),
                reason: e.to_string(),
            })?;

        let count = matches.len();
        Ok(ToolResult::ok(matches.join("\n")).with_metadata("count", count))
    }
}
