//! Pure text-to-structure parsers for model output.
//!
//! Nothing here touches the gateway, the store or the filesystem, so every
//! heuristic can be exercised directly in tests.

use forgeloop_core::error::ParseError;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::plan::{Complexity, Task};

/// Description of the single task synthesized when a narrative has no numbered lines.
pub const FALLBACK_TASK: &str = "Execute plan as described";

/// Split a numbered line (`12. do thing`) into its remainder, or `None`.
fn strip_number_marker(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix('.').map(str::trim_start)
}

/// Parse a plan narrative into its ordered task list.
///
/// A line is a task when, after trimming, it starts with an integer and a
/// period. Ids are `task_N` in parse order. Never returns an empty list.
pub fn parse_subtasks(narrative: &str) -> Vec<Task> {
    let mut tasks: Vec<Task> = narrative
        .lines()
        .filter_map(|line| strip_number_marker(line.trim()))
        .enumerate()
        .map(|(i, description)| {
            Task::new(
                format!("task_{}", i + 1),
                description,
                infer_complexity(description),
            )
        })
        .collect();

    if tasks.is_empty() {
        tasks.push(Task::new("task_1", FALLBACK_TASK, Complexity::High));
    }
    tasks
}

/// An explicit `(complexity: low|medium|high)` annotation, if present.
fn annotated_complexity(text: &str) -> Option<Complexity> {
    let re = Regex::new(r"(?i)\(\s*complexity\s*:\s*(low|medium|high)\s*\)").ok()?;
    let caps = re.captures(text)?;
    match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "low" => Some(Complexity::Low),
        "medium" => Some(Complexity::Medium),
        "high" => Some(Complexity::High),
        _ => None,
    }
}

/// Infer a task's complexity.
///
/// The planner is asked to annotate every task, so an explicit annotation
/// wins. Otherwise keywords decide: "complex", "system" or "integration"
/// mean high; "implement" or "create" mean medium; anything else is low.
pub fn infer_complexity(description: &str) -> Complexity {
    if let Some(annotated) = annotated_complexity(description) {
        return annotated;
    }

    let lower = description.to_lowercase();
    if ["complex", "system", "integration"].iter().any(|k| lower.contains(k)) {
        Complexity::High
    } else if ["implement", "create"].iter().any(|k| lower.contains(k)) {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

/// Map a free-text description to a stored pattern type tag.
pub fn infer_pattern_type(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    if lower.contains("api") || lower.contains("endpoint") {
        "api_endpoint"
    } else if lower.contains("model") {
        "data_model"
    } else if lower.contains("test") {
        "test"
    } else if lower.contains("component") || lower.contains("ui") {
        "ui_component"
    } else {
        "general_code"
    }
}

/// Lines whose first non-whitespace character is a digit, trimmed, in order.
pub fn extract_numbered_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(String::from)
        .collect()
}

/// One reusable pattern the learning pass pulled out of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPattern {
    #[serde(rename = "type", default = "default_pattern_type")]
    pub pattern_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
}

fn default_pattern_type() -> String {
    "general_code".into()
}

/// The structured answer to a pattern-extraction prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSet {
    pub patterns: Vec<ExtractedPattern>,
}

impl PatternSet {
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Pull the JSON object out of a reply that may wrap it in a fence or prose.
fn json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// Parse a pattern-extraction reply: `{"patterns": [{type, code, description, complexity}]}`.
pub fn parse_pattern_set(text: &str) -> Result<PatternSet, ParseError> {
    let value: serde_json::Value = serde_json::from_str(json_payload(text))
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let patterns = value
        .get("patterns")
        .cloned()
        .ok_or_else(|| ParseError::MissingField("patterns".into()))?;

    let patterns: Vec<ExtractedPattern> =
        serde_json::from_value(patterns).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    Ok(PatternSet { patterns })
}

/// A file the coding model asked to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

/// Find `FILE: <path>` lines each followed by a fenced code block.
///
/// A marker without a closed fence is ignored.
pub fn parse_file_blocks(text: &str) -> Vec<FileBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(path) = line.trim().strip_prefix("FILE:").map(str::trim) else {
            continue;
        };
        if path.is_empty() {
            continue;
        }

        // Skip blank lines between the marker and the opening fence
        while lines.peek().is_some_and(|l| l.trim().is_empty()) {
            lines.next();
        }
        if !lines.peek().is_some_and(|l| l.trim_start().starts_with("```")) {
            continue;
        }
        lines.next();

        let mut body = Vec::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if inner.trim_start().starts_with("```") {
                closed = true;
                break;
            }
            body.push(inner);
        }

        if closed {
            let mut content = body.join("\n");
            content.push('\n');
            blocks.push(FileBlock {
                path: path.to_string(),
                content,
            });
        }
    }

    blocks
}
