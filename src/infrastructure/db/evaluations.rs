use crate::domain::error::{AppError, Result};
use crate::domain::evaluation::{
    DailyBucket, EvaluationFilter, EvaluationRecord, EvaluationSummary, NewEvaluation, ScoreBucket,
    SCORE_BUCKETS,
};
use crate::infrastructure::db::EvaluationStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, user_id, interaction_id, prompt, response, score, latency_ms, flags, pii_tokens_redacted, created_at";

pub struct PgEvaluationRepository {
    pool: PgPool,
}

impl PgEvaluationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EvaluationStore for PgEvaluationRepository {
    async fn insert(&self, evaluation: NewEvaluation) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO evaluations (id, user_id, interaction_id, prompt, response, score, latency_ms, flags, pii_tokens_redacted, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(&evaluation.user_id)
        .bind(&evaluation.interaction_id)
        .bind(&evaluation.prompt)
        .bind(&evaluation.response)
        .bind(evaluation.score)
        .bind(evaluation.latency_ms)
        .bind(&evaluation.flags)
        .bind(evaluation.pii_tokens_redacted)
        .bind(evaluation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert evaluation: {e}")))?;

        Ok(id)
    }

    async fn count_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM evaluations WHERE user_id = $1 AND created_at >= $2 AND created_at < $3",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count evaluations: {e}")))
    }

    async fn list(&self, user_id: &str, filter: &EvaluationFilter) -> Result<Vec<EvaluationRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM evaluations WHERE user_id = "
        ));
        builder.push_bind(user_id);
        if filter.flagged_only {
            builder.push(" AND cardinality(flags) > 0");
        }
        if let Some(since) = filter.since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            builder.push(" AND created_at < ").push_bind(until);
        }
        if let Some(min) = filter.min_score {
            builder.push(" AND score >= ").push_bind(min);
        }
        if let Some(max) = filter.max_score {
            builder.push(" AND score <= ").push_bind(max);
        }
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.effective_limit());

        let rows = builder
            .build_query_as::<EvaluationEntity>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list evaluations: {e}")))?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<EvaluationRecord>> {
        let row = sqlx::query_as::<_, EvaluationEntity>(&format!(
            "SELECT {RECORD_COLUMNS} FROM evaluations WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch evaluation: {e}")))?;

        Ok(row.map(|row| row.into()))
    }

    async fn summary(&self, user_id: &str) -> Result<EvaluationSummary> {
        let (total, avg_score, avg_latency_ms, pii_tokens_redacted, flagged) =
            sqlx::query_as::<_, (i64, f64, f64, i64, i64)>(
                "SELECT COUNT(*),
                        COALESCE(AVG(score), 0)::DOUBLE PRECISION,
                        COALESCE(AVG(latency_ms), 0)::DOUBLE PRECISION,
                        COALESCE(SUM(pii_tokens_redacted), 0)::BIGINT,
                        COUNT(*) FILTER (WHERE cardinality(flags) > 0)
                 FROM evaluations WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to summarize evaluations: {e}")))?;

        Ok(EvaluationSummary {
            total,
            avg_score,
            avg_latency_ms,
            pii_tokens_redacted,
            flagged,
        })
    }

    async fn daily_buckets(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailyBucket>> {
        let rows = sqlx::query_as::<_, (NaiveDate, i64, f64, f64)>(
            "SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
                    COUNT(*),
                    AVG(score)::DOUBLE PRECISION,
                    AVG(latency_ms)::DOUBLE PRECISION
             FROM evaluations
             WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
             GROUP BY day ORDER BY day",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to aggregate daily trend: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(date, count, avg_score, avg_latency_ms)| DailyBucket {
                date,
                count,
                avg_score,
                avg_latency_ms,
            })
            .collect())
    }

    async fn score_buckets(&self, user_id: &str) -> Result<Vec<ScoreBucket>> {
        let rows = sqlx::query_as::<_, (i32, i64)>(
            "SELECT CASE
                        WHEN score <= 0.2 THEN 0
                        WHEN score <= 0.4 THEN 1
                        WHEN score <= 0.6 THEN 2
                        WHEN score <= 0.8 THEN 3
                        ELSE 4
                    END AS bucket,
                    COUNT(*)
             FROM evaluations WHERE user_id = $1
             GROUP BY bucket",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to aggregate score buckets: {e}")))?;

        let mut buckets: Vec<ScoreBucket> = SCORE_BUCKETS
            .iter()
            .map(|(_, label)| ScoreBucket {
                range: label.to_string(),
                count: 0,
            })
            .collect();
        for (index, count) in rows {
            if let Some(bucket) = usize::try_from(index).ok().and_then(|i| buckets.get_mut(i)) {
                bucket.count = count;
            }
        }
        Ok(buckets)
    }
}

#[derive(sqlx::FromRow)]
struct EvaluationEntity {
    id: Uuid,
    user_id: String,
    interaction_id: String,
    prompt: String,
    response: String,
    score: f64,
    latency_ms: i64,
    flags: Vec<String>,
    pii_tokens_redacted: i32,
    created_at: DateTime<Utc>,
}

impl From<EvaluationEntity> for EvaluationRecord {
    fn from(entity: EvaluationEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            interaction_id: entity.interaction_id,
            prompt: entity.prompt,
            response: entity.response,
            score: entity.score,
            latency_ms: entity.latency_ms,
            flags: entity.flags,
            pii_tokens_redacted: entity.pii_tokens_redacted,
            created_at: entity.created_at,
        }
    }
}
