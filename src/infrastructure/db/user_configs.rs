use crate::domain::error::{AppError, Result};
use crate::domain::user_config::UserConfig;
use crate::infrastructure::db::UserConfigStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PgUserConfigRepository {
    pool: PgPool,
}

impl PgUserConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserConfigStore for PgUserConfigRepository {
    async fn get(&self, user_id: &str) -> Result<Option<UserConfig>> {
        let row = sqlx::query_as::<_, UserConfigEntity>(
            "SELECT user_id, run_policy, sample_rate_pct, obfuscate_pii, max_eval_per_day, created_at, updated_at
             FROM user_configs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user config: {e}")))?;

        row.map(UserConfig::try_from).transpose()
    }

    async fn upsert(&self, config: &UserConfig) -> Result<UserConfig> {
        let row = sqlx::query_as::<_, UserConfigEntity>(
            "INSERT INTO user_configs (user_id, run_policy, sample_rate_pct, obfuscate_pii, max_eval_per_day, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id) DO UPDATE SET
                run_policy = EXCLUDED.run_policy,
                sample_rate_pct = EXCLUDED.sample_rate_pct,
                obfuscate_pii = EXCLUDED.obfuscate_pii,
                max_eval_per_day = EXCLUDED.max_eval_per_day,
                updated_at = EXCLUDED.updated_at
             RETURNING user_id, run_policy, sample_rate_pct, obfuscate_pii, max_eval_per_day, created_at, updated_at",
        )
        .bind(&config.user_id)
        .bind(config.run_policy.as_str())
        .bind(config.sample_rate_pct)
        .bind(config.obfuscate_pii)
        .bind(config.max_eval_per_day)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to save user config: {e}")))?;

        UserConfig::try_from(row)
    }
}

#[derive(sqlx::FromRow)]
struct UserConfigEntity {
    user_id: String,
    run_policy: String,
    sample_rate_pct: i32,
    obfuscate_pii: bool,
    max_eval_per_day: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserConfigEntity> for UserConfig {
    type Error = AppError;

    fn try_from(entity: UserConfigEntity) -> Result<Self> {
        let run_policy = entity
            .run_policy
            .parse()
            .map_err(|e: String| AppError::DatabaseError(format!("Corrupt user config row: {e}")))?;

        Ok(Self {
            user_id: entity.user_id,
            run_policy,
            sample_rate_pct: entity.sample_rate_pct,
            obfuscate_pii: entity.obfuscate_pii,
            max_eval_per_day: entity.max_eval_per_day,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
