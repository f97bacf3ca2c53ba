//! Knowledge store trait: durable, success-weighted memory of what worked.
//!
//! Three record kinds live here. Code patterns and solutions carry a usage
//! count and a score that is maintained as a running mean of observed
//! outcomes; user preferences carry a fixed confidence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Initial success rate / effectiveness of a fresh record.
pub const INITIAL_SCORE: f64 = 1.0;

/// Confidence given to a preference when the caller does not pick one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Fold one boolean observation into a running mean.
///
/// `count` is the number of observations already folded into `rate`. With
/// `count == 0` the previous rate carries no weight and the result is just the
/// observation. Clamped to `[0, 1]`.
pub fn running_mean(rate: f64, count: u32, observation: bool) -> f64 {
    let hit = if observation { 1.0 } else { 0.0 };
    let n = f64::from(count);
    ((rate * n + hit) / (n + 1.0)).clamp(0.0, 1.0)
}

/// A reusable implementation pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePattern {
    /// Store-assigned identity; 0 until stored
    #[serde(default)]
    pub id: i64,

    /// Type tag (api_endpoint, data_model, test, ui_component, general_code, ...)
    pub pattern_type: String,

    /// The code or text body
    pub code: String,

    pub description: String,

    /// Where this pattern is useful (e.g. "File: src/api.rs")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default)]
    pub usage_count: u32,

    pub success_rate: f64,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl CodePattern {
    pub fn new(
        pattern_type: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            pattern_type: pattern_type.into(),
            code: code.into(),
            description: description.into(),
            context: None,
            usage_count: 0,
            success_rate: INITIAL_SCORE,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Apply one observed outcome to this record's score and usage count.
    pub fn record_outcome(&mut self, success: bool) {
        self.success_rate = running_mean(self.success_rate, self.usage_count, success);
        self.usage_count += 1;
    }
}

/// A reusable problem to fix mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    #[serde(default)]
    pub id: i64,

    pub problem_type: String,

    pub solution: String,

    pub description: String,

    pub effectiveness_score: f64,

    #[serde(default)]
    pub usage_count: u32,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl Solution {
    pub fn new(
        problem_type: impl Into<String>,
        solution: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            problem_type: problem_type.into(),
            solution: solution.into(),
            description: description.into(),
            effectiveness_score: INITIAL_SCORE,
            usage_count: 0,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn record_outcome(&mut self, helpful: bool) {
        self.effectiveness_score =
            running_mean(self.effectiveness_score, self.usage_count, helpful);
        self.usage_count += 1;
    }
}

/// A learned user bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    #[serde(default)]
    pub id: i64,

    pub preference_type: String,

    pub value: String,

    pub confidence: f64,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl UserPreference {
    pub fn new(preference_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: 0,
            preference_type: preference_type.into(),
            value: value.into(),
            confidence: DEFAULT_CONFIDENCE,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Filter for [`KnowledgeStore::search_patterns`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<String>,

    #[serde(default)]
    pub min_success_rate: f64,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

impl PatternQuery {
    pub fn new() -> Self {
        Self {
            pattern_type: None,
            min_success_rate: 0.0,
            limit: default_limit(),
        }
    }

    pub fn with_type(mut self, pattern_type: impl Into<String>) -> Self {
        self.pattern_type = Some(pattern_type.into());
        self
    }

    pub fn with_min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = rate;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether a pattern passes the type and threshold filters.
    pub fn matches(&self, pattern: &CodePattern) -> bool {
        pattern.success_rate >= self.min_success_rate
            && self
                .pattern_type
                .as_deref()
                .is_none_or(|t| t == pattern.pattern_type)
    }
}

impl Default for PatternQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Record totals, for status displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeCounts {
    pub patterns: usize,
    pub solutions: usize,
    pub preferences: usize,
}

/// The core KnowledgeStore trait.
///
/// Implementations: SQLite, in-memory (for testing).
///
/// Ranking contract: patterns order by success rate descending, then usage
/// count descending, then insertion order. Solutions order the same way on
/// effectiveness. Preferences order by confidence descending, then insertion
/// order. Updating an id that does not exist is a no-op.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Insert a pattern; returns it with its assigned id.
    async fn add_pattern(
        &self,
        pattern: CodePattern,
    ) -> std::result::Result<CodePattern, StoreError>;

    async fn search_patterns(
        &self,
        query: PatternQuery,
    ) -> std::result::Result<Vec<CodePattern>, StoreError>;

    /// Fold one outcome into a pattern's success rate, then bump its usage count.
    async fn update_pattern_success(
        &self,
        id: i64,
        success: bool,
    ) -> std::result::Result<(), StoreError>;

    async fn add_solution(&self, solution: Solution) -> std::result::Result<Solution, StoreError>;

    async fn search_solutions(
        &self,
        problem_type: Option<&str>,
        limit: usize,
    ) -> std::result::Result<Vec<Solution>, StoreError>;

    async fn update_solution_effectiveness(
        &self,
        id: i64,
        helpful: bool,
    ) -> std::result::Result<(), StoreError>;

    async fn set_preference(
        &self,
        preference: UserPreference,
    ) -> std::result::Result<UserPreference, StoreError>;

    async fn get_preferences(
        &self,
        preference_type: Option<&str>,
    ) -> std::result::Result<Vec<UserPreference>, StoreError>;

    async fn counts(&self) -> std::result::Result<KnowledgeCounts, StoreError>;
}
