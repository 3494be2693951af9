//! Daily evaluation quota per user.
//!
//! A day is the half-open UTC interval `[00:00:00, next 00:00:00)`. The count
//! is read from storage on every check, so it is never cached between requests.

use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::EvaluationStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tracing::debug;

/// Start and end of the UTC calendar day containing `as_of`.
pub fn utc_day_bounds(as_of: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = as_of
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::Internal(format!("No UTC midnight for {as_of}")))?;
    let start = Utc.from_utc_datetime(&midnight);
    Ok((start, start + Duration::days(1)))
}

pub struct QuotaTracker {
    evaluations: Arc<dyn EvaluationStore>,
}

impl QuotaTracker {
    pub fn new(evaluations: Arc<dyn EvaluationStore>) -> Self {
        Self { evaluations }
    }

    /// Records the user stored during the UTC day containing `as_of`.
    pub async fn count_today(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<i64> {
        let (start, end) = utc_day_bounds(as_of)?;
        let count = self.evaluations.count_between(user_id, start, end).await?;
        debug!(user_id, count, day = %start.date_naive(), "Daily evaluation count");
        Ok(count)
    }

    pub fn is_exhausted(count: i64, max_per_day: i32) -> bool {
        count >= i64::from(max_per_day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::NewEvaluation;
    use crate::infrastructure::db::memory::InMemoryEvaluationStore;

    fn at(h: u32, m: u32, s: u32, ms: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, m, s).unwrap() + Duration::milliseconds(ms as i64)
    }

    fn eval(created_at: DateTime<Utc>) -> NewEvaluation {
        NewEvaluation {
            user_id: "user-1".to_string(),
            interaction_id: "i".to_string(),
            prompt: "p".to_string(),
            response: "r".to_string(),
            score: 0.5,
            latency_ms: 10,
            flags: Vec::new(),
            pii_tokens_redacted: 0,
            created_at,
        }
    }

    #[test]
    fn test_day_bounds_are_half_open_utc() {
        let (start, end) = utc_day_bounds(at(23, 59, 59, 999, 1)).unwrap();
        assert_eq!(start, at(0, 0, 0, 0, 1));
        assert_eq!(end, at(0, 0, 0, 0, 2));

        let (start, _) = utc_day_bounds(at(0, 0, 0, 0, 2)).unwrap();
        assert_eq!(start, at(0, 0, 0, 0, 2));
    }

    #[tokio::test]
    async fn test_midnight_starts_a_new_day() {
        let store = Arc::new(InMemoryEvaluationStore::new());
        store.insert(eval(at(23, 59, 59, 999, 1))).await.unwrap();
        store.insert(eval(at(0, 0, 0, 0, 2))).await.unwrap();
        let tracker = QuotaTracker::new(store);

        assert_eq!(tracker.count_today("user-1", at(12, 0, 0, 0, 1)).await.unwrap(), 1);
        assert_eq!(tracker.count_today("user-1", at(0, 0, 0, 0, 2)).await.unwrap(), 1);
        assert_eq!(tracker.count_today("user-2", at(12, 0, 0, 0, 1)).await.unwrap(), 0);
    }

    #[test]
    fn test_exhausted_at_limit() {
        assert!(!QuotaTracker::is_exhausted(1, 2));
        assert!(QuotaTracker::is_exhausted(2, 2));
        assert!(QuotaTracker::is_exhausted(3, 2));
    }
}
