//! In-memory knowledge store: useful for tests and throwaway sessions.

use async_trait::async_trait;
use forgeloop_core::error::StoreError;
use forgeloop_core::knowledge::{
    CodePattern, KnowledgeCounts, KnowledgeStore, PatternQuery, Solution, UserPreference,
};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Records {
    patterns: Vec<CodePattern>,
    solutions: Vec<Solution>,
    preferences: Vec<UserPreference>,
    next_id: i64,
}

impl Records {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Keeps every record in insertion order inside a `Vec`; ranking uses stable
/// sorts, so equal keys keep that order.
pub struct InMemoryKnowledgeStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Records::default())),
        }
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Higher score first, then higher usage.
fn by_score_then_usage(a: (f64, u32), b: (f64, u32)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.1.cmp(&a.1))
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add_pattern(&self, mut pattern: CodePattern) -> Result<CodePattern, StoreError> {
        let mut records = self.records.write().await;
        pattern.id = records.assign_id();
        records.patterns.push(pattern.clone());
        Ok(pattern)
    }

    async fn search_patterns(&self, query: PatternQuery) -> Result<Vec<CodePattern>, StoreError> {
        let records = self.records.read().await;
        let mut results: Vec<CodePattern> = records
            .patterns
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            by_score_then_usage((a.success_rate, a.usage_count), (b.success_rate, b.usage_count))
        });
        results.truncate(query.limit);
        Ok(results)
    }

    async fn update_pattern_success(&self, id: i64, success: bool) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if let Some(pattern) = records.patterns.iter_mut().find(|p| p.id == id) {
            pattern.record_outcome(success);
        }
        Ok(())
    }

    async fn add_solution(&self, mut solution: Solution) -> Result<Solution, StoreError> {
        let mut records = self.records.write().await;
        solution.id = records.assign_id();
        records.solutions.push(solution.clone());
        Ok(solution)
    }

    async fn search_solutions(
        &self,
        problem_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Solution>, StoreError> {
        let records = self.records.read().await;
        let mut results: Vec<Solution> = records
            .solutions
            .iter()
            .filter(|s| problem_type.is_none_or(|t| t == s.problem_type))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            by_score_then_usage(
                (a.effectiveness_score, a.usage_count),
                (b.effectiveness_score, b.usage_count),
            )
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn update_solution_effectiveness(
        &self,
        id: i64,
        helpful: bool,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if let Some(solution) = records.solutions.iter_mut().find(|s| s.id == id) {
            solution.record_outcome(helpful);
        }
        Ok(())
    }

    async fn set_preference(
        &self,
        mut preference: UserPreference,
    ) -> Result<UserPreference, StoreError> {
        let mut records = self.records.write().await;
        preference.id = records.assign_id();
        records.preferences.push(preference.clone());
        Ok(preference)
    }

    async fn get_preferences(
        &self,
        preference_type: Option<&str>,
    ) -> Result<Vec<UserPreference>, StoreError> {
        let records = self.records.read().await;
        let mut results: Vec<UserPreference> = records
            .preferences
            .iter()
            .filter(|p| preference_type.is_none_or(|t| t == p.preference_type))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));
        Ok(results)
    }

    async fn counts(&self) -> Result<KnowledgeCounts, StoreError> {
        let records = self.records.read().await;
        Ok(KnowledgeCounts {
            patterns: records.patterns.len(),
            solutions: records.solutions.len(),
            preferences: records.preferences.len(),
        })
    }
}
