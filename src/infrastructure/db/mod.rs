pub mod evaluations;
pub mod memory;
pub mod postgres;
pub mod user_configs;

use crate::domain::error::Result;
use crate::domain::evaluation::{
    DailyBucket, EvaluationFilter, EvaluationRecord, EvaluationSummary, NewEvaluation, ScoreBucket,
};
use crate::domain::user_config::UserConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait UserConfigStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserConfig>>;
    async fn upsert(&self, config: &UserConfig) -> Result<UserConfig>;
}

/// Append-only evaluation storage. Every query is scoped to one user.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn insert(&self, evaluation: NewEvaluation) -> Result<Uuid>;

    /// Records with `start <= created_at < end`.
    async fn count_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;

    /// Newest first, at most `filter.effective_limit()` rows.
    async fn list(&self, user_id: &str, filter: &EvaluationFilter) -> Result<Vec<EvaluationRecord>>;

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<EvaluationRecord>>;

    async fn summary(&self, user_id: &str) -> Result<EvaluationSummary>;

    /// Per-UTC-day aggregates for days in `[start, end)` that have at least one record.
    async fn daily_buckets(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailyBucket>>;

    /// Counts per score bucket, one entry per bucket in order.
    async fn score_buckets(&self, user_id: &str) -> Result<Vec<ScoreBucket>>;
}
