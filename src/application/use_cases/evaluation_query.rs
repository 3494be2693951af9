//! Read side of the dashboard: lists, detail, and aggregates.

use crate::application::use_cases::pii_redactor::redact;
use crate::application::use_cases::quota_tracker::utc_day_bounds;
use crate::domain::error::{AppError, Result};
use crate::domain::evaluation::{
    DailyBucket, EvaluationFilter, EvaluationRecord, EvaluationSummary, ScoreBucket,
};
use crate::domain::user_config::DEFAULT_OBFUSCATE_PII;
use crate::infrastructure::db::{EvaluationStore, UserConfigStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_TREND_DAYS: i64 = 7;
pub const MAX_TREND_DAYS: i64 = 90;

pub struct EvaluationQueryService {
    configs: Arc<dyn UserConfigStore>,
    evaluations: Arc<dyn EvaluationStore>,
}

impl EvaluationQueryService {
    pub fn new(configs: Arc<dyn UserConfigStore>, evaluations: Arc<dyn EvaluationStore>) -> Self {
        Self {
            configs,
            evaluations,
        }
    }

    pub async fn list_recent(
        &self,
        user_id: &str,
        filter: &EvaluationFilter,
    ) -> Result<Vec<EvaluationRecord>> {
        if let (Some(min), Some(max)) = (filter.min_score, filter.max_score) {
            if min > max {
                return Err(AppError::ValidationError(
                    "min_score must not exceed max_score".to_string(),
                ));
            }
        }
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return Err(AppError::ValidationError(
                    "since must not be after until".to_string(),
                ));
            }
        }

        let records = self.evaluations.list(user_id, filter).await?;
        self.mask_for(user_id, records).await
    }

    pub async fn get(&self, user_id: &str, id: Uuid) -> Result<EvaluationRecord> {
        let record = self
            .evaluations
            .get(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Evaluation {id} not found")))?;
        let mut masked = self.mask_for(user_id, vec![record]).await?;
        masked
            .pop()
            .ok_or_else(|| AppError::Internal("Masking dropped the record".to_string()))
    }

    pub async fn summary(&self, user_id: &str) -> Result<EvaluationSummary> {
        self.evaluations.summary(user_id).await
    }

    /// One bucket per UTC day, oldest first, ending with the day containing `as_of`.
    pub async fn daily_trend(
        &self,
        user_id: &str,
        days: Option<i64>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DailyBucket>> {
        let days = days.unwrap_or(DEFAULT_TREND_DAYS).clamp(1, MAX_TREND_DAYS);
        let (today_start, end) = utc_day_bounds(as_of)?;
        let start = today_start - Duration::days(days - 1);

        let filled: HashMap<_, _> = self
            .evaluations
            .daily_buckets(user_id, start, end)
            .await?
            .into_iter()
            .map(|bucket| (bucket.date, bucket))
            .collect();

        Ok((0..days)
            .map(|offset| {
                let date = (start + Duration::days(offset)).date_naive();
                filled
                    .get(&date)
                    .cloned()
                    .unwrap_or_else(|| DailyBucket::empty(date))
            })
            .collect())
    }

    pub async fn score_distribution(&self, user_id: &str) -> Result<Vec<ScoreBucket>> {
        self.evaluations.score_buckets(user_id).await
    }

    /// A user without a config reads with the default policy, which masks.
    async fn mask_for(
        &self,
        user_id: &str,
        records: Vec<EvaluationRecord>,
    ) -> Result<Vec<EvaluationRecord>> {
        let obfuscate = self
            .configs
            .get(user_id)
            .await?
            .map(|config| config.obfuscate_pii)
            .unwrap_or(DEFAULT_OBFUSCATE_PII);
        if !obfuscate {
            return Ok(records);
        }
        Ok(records
            .into_iter()
            .map(|record| EvaluationRecord {
                prompt: redact(&record.prompt).masked,
                response: redact(&record.response).masked,
                ..record
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::NewEvaluation;
    use crate::domain::user_config::UserConfig;
    use crate::infrastructure::db::memory::{InMemoryEvaluationStore, InMemoryUserConfigStore};
    use chrono::TimeZone;

    fn new_eval(user_id: &str, prompt: &str, score: f64, created_at: DateTime<Utc>) -> NewEvaluation {
        NewEvaluation {
            user_id: user_id.to_string(),
            interaction_id: "int".to_string(),
            prompt: prompt.to_string(),
            response: "ok".to_string(),
            score,
            latency_ms: 100,
            flags: Vec::new(),
            pii_tokens_redacted: 0,
            created_at,
        }
    }

    fn service(obfuscate: bool) -> (EvaluationQueryService, Arc<InMemoryEvaluationStore>) {
        let config = UserConfig {
            obfuscate_pii: obfuscate,
            ..UserConfig::with_defaults("user-1", Utc::now())
        };
        let evaluations = Arc::new(InMemoryEvaluationStore::new());
        let service = EvaluationQueryService::new(
            Arc::new(InMemoryUserConfigStore::with_config(config)),
            evaluations.clone(),
        );
        (service, evaluations)
    }

    #[tokio::test]
    async fn test_reads_are_masked_when_obfuscation_is_on() {
        let (service, store) = service(true);
        let id = store
            .insert(new_eval("user-1", "mail me at a@b.io", 0.5, Utc::now()))
            .await
            .unwrap();

        let record = service.get("user-1", id).await.unwrap();
        assert_eq!(record.prompt, "mail me at [EMAIL]");
        assert_eq!(record.pii_tokens_redacted, 0);

        let listed = service
            .list_recent("user-1", &EvaluationFilter::default())
            .await
            .unwrap();
        assert_eq!(listed[0].prompt, "mail me at [EMAIL]");
    }

    #[tokio::test]
    async fn test_reads_are_raw_when_obfuscation_is_off() {
        let (service, store) = service(false);
        let id = store
            .insert(new_eval("user-1", "mail me at a@b.io", 0.5, Utc::now()))
            .await
            .unwrap();
        let record = service.get("user-1", id).await.unwrap();
        assert_eq!(record.prompt, "mail me at a@b.io");
    }

    #[tokio::test]
    async fn test_other_users_record_is_not_found() {
        let (service, store) = service(true);
        let id = store
            .insert(new_eval("user-2", "p", 0.5, Utc::now()))
            .await
            .unwrap();
        assert!(matches!(
            service.get("user-1", id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.get("user-1", Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_inverted_score_range_is_rejected() {
        let (service, _) = service(true);
        let filter = EvaluationFilter {
            min_score: Some(0.9),
            max_score: Some(0.1),
            ..Default::default()
        };
        assert!(matches!(
            service.list_recent("user-1", &filter).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_daily_trend_fills_empty_days() {
        let (service, store) = service(true);
        let as_of = Utc.with_ymd_and_hms(2024, 3, 7, 15, 0, 0).unwrap();
        store
            .insert(new_eval("user-1", "p", 0.4, Utc.with_ymd_and_hms(2024, 3, 7, 1, 0, 0).unwrap()))
            .await
            .unwrap();
        store
            .insert(new_eval("user-1", "p", 0.8, Utc.with_ymd_and_hms(2024, 3, 7, 2, 0, 0).unwrap()))
            .await
            .unwrap();
        store
            .insert(new_eval("user-1", "p", 1.0, Utc.with_ymd_and_hms(2024, 3, 3, 9, 0, 0).unwrap()))
            .await
            .unwrap();
        store
            .insert(new_eval("user-1", "p", 1.0, Utc.with_ymd_and_hms(2024, 2, 20, 9, 0, 0).unwrap()))
            .await
            .unwrap();

        let trend = service.daily_trend("user-1", None, as_of).await.unwrap();
        assert_eq!(trend.len(), 7);
        assert_eq!(trend[0].date.to_string(), "2024-03-01");
        assert_eq!(trend[6].date.to_string(), "2024-03-07");
        assert_eq!(trend[2].count, 1);
        assert_eq!(trend[5].count, 0);
        assert_eq!(trend[6].count, 2);
        assert!((trend[6].avg_score - 0.6).abs() < 1e-9);

        assert_eq!(service.daily_trend("user-1", Some(0), as_of).await.unwrap().len(), 1);
        assert_eq!(service.daily_trend("user-1", Some(500), as_of).await.unwrap().len(), 90);
    }

    #[tokio::test]
    async fn test_summary_and_distribution() {
        let (service, store) = service(true);
        for score in [0.1, 0.2, 0.5, 0.95] {
            store
                .insert(new_eval("user-1", "p", score, Utc::now()))
                .await
                .unwrap();
        }

        let summary = service.summary("user-1").await.unwrap();
        assert_eq!(summary.total, 4);
        assert!((summary.avg_latency_ms - 100.0).abs() < 1e-9);

        let buckets = service.score_distribution("user-1").await.unwrap();
        let counts: Vec<i64> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 0, 1, 0, 1]);
        assert_eq!(buckets[4].range, "0.8-1.0");

        let empty = service.summary("nobody").await.unwrap();
        assert_eq!(empty, EvaluationSummary::default());
    }
}
