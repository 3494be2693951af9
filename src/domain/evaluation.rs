use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 200;

/// Upper bounds (inclusive) and labels of the dashboard score histogram.
pub const SCORE_BUCKETS: [(f64, &str); 5] = [
    (0.2, "0-0.2"),
    (0.4, "0.2-0.4"),
    (0.6, "0.4-0.6"),
    (0.8, "0.6-0.8"),
    (1.0, "0.8-1.0"),
];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub interaction_id: String,
    pub prompt: String,
    pub response: String,
    pub score: f64,
    pub latency_ms: i64,
    pub flags: Vec<String>,
    pub pii_tokens_redacted: i32,
    pub created_at: DateTime<Utc>,
}

impl EvaluationRecord {
    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// A record ready for insertion; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvaluation {
    pub user_id: String,
    pub interaction_id: String,
    pub prompt: String,
    pub response: String,
    pub score: f64,
    pub latency_ms: i64,
    pub flags: Vec<String>,
    pub pii_tokens_redacted: i32,
    pub created_at: DateTime<Utc>,
}

impl NewEvaluation {
    pub fn into_record(self, id: Uuid) -> EvaluationRecord {
        EvaluationRecord {
            id,
            user_id: self.user_id,
            interaction_id: self.interaction_id,
            prompt: self.prompt,
            response: self.response,
            score: self.score,
            latency_ms: self.latency_ms,
            flags: self.flags,
            pii_tokens_redacted: self.pii_tokens_redacted,
            created_at: self.created_at,
        }
    }
}

/// Query parameters accepted by the evaluation list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationFilter {
    pub limit: Option<i64>,
    #[serde(default)]
    pub flagged_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

impl EvaluationFilter {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    /// `since` is inclusive, `until` exclusive.
    pub fn matches(&self, record: &EvaluationRecord) -> bool {
        if self.flagged_only && !record.is_flagged() {
            return false;
        }
        if let Some(since) = self.since {
            if record.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.created_at >= until {
                return false;
            }
        }
        if let Some(min) = self.min_score {
            if record.score < min {
                return false;
            }
        }
        if let Some(max) = self.max_score {
            if record.score > max {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct EvaluationSummary {
    pub total: i64,
    pub avg_score: f64,
    pub avg_latency_ms: f64,
    pub pii_tokens_redacted: i64,
    pub flagged: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub count: i64,
    pub avg_score: f64,
    pub avg_latency_ms: f64,
}

impl DailyBucket {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            count: 0,
            avg_score: 0.0,
            avg_latency_ms: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScoreBucket {
    pub range: String,
    pub count: i64,
}

/// Index into [`SCORE_BUCKETS`] for a score in [0, 1].
pub fn score_bucket_index(score: f64) -> usize {
    SCORE_BUCKETS
        .iter()
        .position(|(upper, _)| score <= *upper)
        .unwrap_or(SCORE_BUCKETS.len() - 1)
}
