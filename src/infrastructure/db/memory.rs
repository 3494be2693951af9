//! In-memory stores used by tests and local development without Postgres.

use crate::domain::error::{AppError, Result};
use crate::domain::evaluation::{
    score_bucket_index, DailyBucket, EvaluationFilter, EvaluationRecord, EvaluationSummary,
    NewEvaluation, ScoreBucket, SCORE_BUCKETS,
};
use crate::domain::user_config::UserConfig;
use crate::infrastructure::db::{EvaluationStore, UserConfigStore};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal(format!("{name} lock poisoned")))
}

#[derive(Default)]
pub struct InMemoryUserConfigStore {
    configs: Mutex<HashMap<String, UserConfig>>,
    lookups: AtomicUsize,
}

impl InMemoryUserConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: UserConfig) -> Self {
        let store = Self::default();
        if let Ok(mut configs) = store.configs.lock() {
            configs.insert(config.user_id.clone(), config);
        }
        store
    }

    /// Number of `get` calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserConfigStore for InMemoryUserConfigStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserConfig>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let configs = lock(&self.configs, "user config store")?;
        Ok(configs.get(user_id).cloned())
    }

    async fn upsert(&self, config: &UserConfig) -> Result<UserConfig> {
        let mut configs = lock(&self.configs, "user config store")?;
        let stored = match configs.get(&config.user_id) {
            Some(existing) => UserConfig {
                created_at: existing.created_at,
                ..config.clone()
            },
            None => config.clone(),
        };
        configs.insert(stored.user_id.clone(), stored.clone());
        Ok(stored)
    }
}

#[derive(Default)]
pub struct InMemoryEvaluationStore {
    records: Mutex<Vec<EvaluationRecord>>,
    insert_attempts: AtomicUsize,
    fail_inserts: AtomicBool,
}

impl InMemoryEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent insert fail with a database error.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<EvaluationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    fn user_records(&self, user_id: &str) -> Result<Vec<EvaluationRecord>> {
        let records = lock(&self.records, "evaluation store")?;
        Ok(records
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EvaluationStore for InMemoryEvaluationStore {
    async fn insert(&self, evaluation: NewEvaluation) -> Result<Uuid> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(
                "Failed to insert evaluation: store unavailable".to_string(),
            ));
        }
        let id = Uuid::new_v4();
        let mut records = lock(&self.records, "evaluation store")?;
        records.push(evaluation.into_record(id));
        Ok(id)
    }

    async fn count_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = self
            .user_records(user_id)?
            .iter()
            .filter(|record| record.created_at >= start && record.created_at < end)
            .count();
        Ok(count as i64)
    }

    async fn list(&self, user_id: &str, filter: &EvaluationFilter) -> Result<Vec<EvaluationRecord>> {
        let mut records: Vec<EvaluationRecord> = self
            .user_records(user_id)?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(filter.effective_limit() as usize);
        Ok(records)
    }

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<EvaluationRecord>> {
        Ok(self
            .user_records(user_id)?
            .into_iter()
            .find(|record| record.id == id))
    }

    async fn summary(&self, user_id: &str) -> Result<EvaluationSummary> {
        let records = self.user_records(user_id)?;
        if records.is_empty() {
            return Ok(EvaluationSummary::default());
        }
        let total = records.len() as f64;
        Ok(EvaluationSummary {
            total: records.len() as i64,
            avg_score: records.iter().map(|r| r.score).sum::<f64>() / total,
            avg_latency_ms: records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / total,
            pii_tokens_redacted: records.iter().map(|r| i64::from(r.pii_tokens_redacted)).sum(),
            flagged: records.iter().filter(|r| r.is_flagged()).count() as i64,
        })
    }

    async fn daily_buckets(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailyBucket>> {
        let mut days: BTreeMap<NaiveDate, (i64, f64, f64)> = BTreeMap::new();
        for record in self.user_records(user_id)? {
            if record.created_at < start || record.created_at >= end {
                continue;
            }
            let entry = days
                .entry(record.created_at.date_naive())
                .or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += record.score;
            entry.2 += record.latency_ms as f64;
        }
        Ok(days
            .into_iter()
            .map(|(date, (count, score_sum, latency_sum))| DailyBucket {
                date,
                count,
                avg_score: score_sum / count as f64,
                avg_latency_ms: latency_sum / count as f64,
            })
            .collect())
    }

    async fn score_buckets(&self, user_id: &str) -> Result<Vec<ScoreBucket>> {
        let mut buckets: Vec<ScoreBucket> = SCORE_BUCKETS
            .iter()
            .map(|(_, label)| ScoreBucket {
                range: label.to_string(),
                count: 0,
            })
            .collect();
        for record in self.user_records(user_id)? {
            buckets[score_bucket_index(record.score)].count += 1;
        }
        Ok(buckets)
    }
}
