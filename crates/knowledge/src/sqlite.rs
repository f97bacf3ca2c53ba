//! SQLite knowledge store.
//!
//! One database file, three tables:
//! - `code_patterns`: reusable implementation patterns with a success rate
//! - `solutions`: problem to fix mappings with an effectiveness score
//! - `user_preferences`: learned biases with a confidence
//!
//! Score updates are a single `UPDATE` that reads the old rate and usage
//! count in the same statement, so each observation is applied atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgeloop_core::error::StoreError;
use forgeloop_core::knowledge::{
    CodePattern, KnowledgeCounts, KnowledgeStore, PatternQuery, Solution, UserPreference,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    /// Open (or create) the store at `path`.
    ///
    /// Pass `"sqlite::memory:"` or `":memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to ":memory:" is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite knowledge store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "code_patterns table",
                r#"
                CREATE TABLE IF NOT EXISTS code_patterns (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    pattern_type  TEXT NOT NULL,
                    code          TEXT NOT NULL,
                    description   TEXT NOT NULL DEFAULT '',
                    context       TEXT,
                    usage_count   INTEGER NOT NULL DEFAULT 0,
                    success_rate  REAL NOT NULL DEFAULT 1.0,
                    metadata      TEXT NOT NULL DEFAULT '{}',
                    created_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "solutions table",
                r#"
                CREATE TABLE IF NOT EXISTS solutions (
                    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                    problem_type        TEXT NOT NULL,
                    solution            TEXT NOT NULL,
                    description         TEXT NOT NULL DEFAULT '',
                    effectiveness_score REAL NOT NULL DEFAULT 1.0,
                    usage_count         INTEGER NOT NULL DEFAULT 0,
                    metadata            TEXT NOT NULL DEFAULT '{}',
                    created_at          TEXT NOT NULL
                )
                "#,
            ),
            (
                "user_preferences table",
                r#"
                CREATE TABLE IF NOT EXISTS user_preferences (
                    id               INTEGER PRIMARY KEY AUTOINCREMENT,
                    preference_type  TEXT NOT NULL,
                    value            TEXT NOT NULL,
                    confidence       REAL NOT NULL DEFAULT 0.5,
                    metadata         TEXT NOT NULL DEFAULT '{}',
                    created_at       TEXT NOT NULL
                )
                "#,
            ),
            (
                "pattern_type index",
                "CREATE INDEX IF NOT EXISTS idx_patterns_type ON code_patterns(pattern_type)",
            ),
            (
                "problem_type index",
                "CREATE INDEX IF NOT EXISTS idx_solutions_type ON solutions(problem_type)",
            ),
            (
                "preference_type index",
                "CREATE INDEX IF NOT EXISTS idx_preferences_type ON user_preferences(preference_type)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get(name)
            .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
    }

    fn metadata_from(
        row: &SqliteRow,
    ) -> Result<serde_json::Map<String, serde_json::Value>, StoreError> {
        let raw: String = Self::column(row, "metadata")?;
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, raw = %raw, "Corrupt metadata column; using empty metadata");
            serde_json::Map::new()
        }))
    }

    fn created_at_from(row: &SqliteRow) -> Result<DateTime<Utc>, StoreError> {
        let raw: String = Self::column(row, "created_at")?;
        Ok(DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                warn!(error = %e, raw = %raw, "Corrupt created_at column; using current time");
                Utc::now()
            }))
    }

    fn usage_from(row: &SqliteRow) -> Result<u32, StoreError> {
        let usage: i64 = Self::column(row, "usage_count")?;
        Ok(u32::try_from(usage).unwrap_or(u32::MAX))
    }

    fn row_to_pattern(row: &SqliteRow) -> Result<CodePattern, StoreError> {
        Ok(CodePattern {
            id: Self::column(row, "id")?,
            pattern_type: Self::column(row, "pattern_type")?,
            code: Self::column(row, "code")?,
            description: Self::column(row, "description")?,
            context: Self::column(row, "context")?,
            usage_count: Self::usage_from(row)?,
            success_rate: Self::column(row, "success_rate")?,
            metadata: Self::metadata_from(row)?,
            created_at: Self::created_at_from(row)?,
        })
    }

    fn row_to_solution(row: &SqliteRow) -> Result<Solution, StoreError> {
        Ok(Solution {
            id: Self::column(row, "id")?,
            problem_type: Self::column(row, "problem_type")?,
            solution: Self::column(row, "solution")?,
            description: Self::column(row, "description")?,
            effectiveness_score: Self::column(row, "effectiveness_score")?,
            usage_count: Self::usage_from(row)?,
            metadata: Self::metadata_from(row)?,
            created_at: Self::created_at_from(row)?,
        })
    }

    fn row_to_preference(row: &SqliteRow) -> Result<UserPreference, StoreError> {
        Ok(UserPreference {
            id: Self::column(row, "id")?,
            preference_type: Self::column(row, "preference_type")?,
            value: Self::column(row, "value")?,
            confidence: Self::column(row, "confidence")?,
            metadata: Self::metadata_from(row)?,
            created_at: Self::created_at_from(row)?,
        })
    }

    fn metadata_json(
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError> {
        serde_json::to_string(map)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))
    }

    async fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT {table}: {e}")))?;
        let cnt: i64 = Self::column(&row, "cnt")?;
        Ok(usize::try_from(cnt).unwrap_or(0))
    }
}

/// Running-mean update applied in place. `?1` is the observation (0.0 or 1.0).
const RESCORE_PATTERN: &str = r#"
    UPDATE code_patterns
    SET success_rate = MIN(1.0, MAX(0.0, (success_rate * usage_count + ?1) / (usage_count + 1))),
        usage_count = usage_count + 1
    WHERE id = ?2
"#;

const RESCORE_SOLUTION: &str = r#"
    UPDATE solutions
    SET effectiveness_score = MIN(1.0, MAX(0.0, (effectiveness_score * usage_count + ?1) / (usage_count + 1))),
        usage_count = usage_count + 1
    WHERE id = ?2
"#;

fn observation(hit: bool) -> f64 {
    if hit { 1.0 } else { 0.0 }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add_pattern(&self, mut pattern: CodePattern) -> Result<CodePattern, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO code_patterns
                (pattern_type, code, description, context, usage_count, success_rate, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&pattern.pattern_type)
        .bind(&pattern.code)
        .bind(&pattern.description)
        .bind(&pattern.context)
        .bind(i64::from(pattern.usage_count))
        .bind(pattern.success_rate)
        .bind(Self::metadata_json(&pattern.metadata)?)
        .bind(pattern.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT pattern failed: {e}")))?;

        pattern.id = result.last_insert_rowid();
        debug!(id = pattern.id, pattern_type = %pattern.pattern_type, "Stored pattern");
        Ok(pattern)
    }

    async fn search_patterns(&self, query: PatternQuery) -> Result<Vec<CodePattern>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM code_patterns
            WHERE success_rate >= ?1
              AND (?2 IS NULL OR pattern_type = ?2)
            ORDER BY success_rate DESC, usage_count DESC, id ASC
            LIMIT ?3
            "#,
        )
        .bind(query.min_success_rate)
        .bind(&query.pattern_type)
        .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Pattern search: {e}")))?;

        rows.iter().map(Self::row_to_pattern).collect()
    }

    async fn update_pattern_success(&self, id: i64, success: bool) -> Result<(), StoreError> {
        let result = sqlx::query(RESCORE_PATTERN)
            .bind(observation(success))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE pattern failed: {e}")))?;

        if result.rows_affected() == 0 {
            debug!(id, "Pattern not found; success update skipped");
        }
        Ok(())
    }

    async fn add_solution(&self, mut solution: Solution) -> Result<Solution, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO solutions
                (problem_type, solution, description, effectiveness_score, usage_count, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&solution.problem_type)
        .bind(&solution.solution)
        .bind(&solution.description)
        .bind(solution.effectiveness_score)
        .bind(i64::from(solution.usage_count))
        .bind(Self::metadata_json(&solution.metadata)?)
        .bind(solution.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT solution failed: {e}")))?;

        solution.id = result.last_insert_rowid();
        debug!(id = solution.id, problem_type = %solution.problem_type, "Stored solution");
        Ok(solution)
    }

    async fn search_solutions(
        &self,
        problem_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Solution>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM solutions
            WHERE (?1 IS NULL OR problem_type = ?1)
            ORDER BY effectiveness_score DESC, usage_count DESC, id ASC
            LIMIT ?2
            "#,
        )
        .bind(problem_type)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Solution search: {e}")))?;

        rows.iter().map(Self::row_to_solution).collect()
    }

    async fn update_solution_effectiveness(
        &self,
        id: i64,
        helpful: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(RESCORE_SOLUTION)
            .bind(observation(helpful))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE solution failed: {e}")))?;

        if result.rows_affected() == 0 {
            debug!(id, "Solution not found; effectiveness update skipped");
        }
        Ok(())
    }

    async fn set_preference(
        &self,
        mut preference: UserPreference,
    ) -> Result<UserPreference, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_preferences (preference_type, value, confidence, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&preference.preference_type)
        .bind(&preference.value)
        .bind(preference.confidence)
        .bind(Self::metadata_json(&preference.metadata)?)
        .bind(preference.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT preference failed: {e}")))?;

        preference.id = result.last_insert_rowid();
        Ok(preference)
    }

    async fn get_preferences(
        &self,
        preference_type: Option<&str>,
    ) -> Result<Vec<UserPreference>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM user_preferences
            WHERE (?1 IS NULL OR preference_type = ?1)
            ORDER BY confidence DESC, id ASC
            "#,
        )
        .bind(preference_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Preference lookup: {e}")))?;

        rows.iter().map(Self::row_to_preference).collect()
    }

    async fn counts(&self) -> Result<KnowledgeCounts, StoreError> {
        Ok(KnowledgeCounts {
            patterns: self.count_table("code_patterns").await?,
            solutions: self.count_table("solutions").await?,
            preferences: self.count_table("user_preferences").await?,
        })
    }
}
