use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

pub const DEFAULT_SAMPLE_RATE_PCT: i32 = 100;
pub const DEFAULT_OBFUSCATE_PII: bool = true;
pub const DEFAULT_MAX_EVAL_PER_DAY: i32 = 1000;

/// Whether every event is stored or only a sampled subset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    #[default]
    Always,
    Sampled,
}

impl RunPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPolicy::Always => "always",
            RunPolicy::Sampled => "sampled",
        }
    }
}

impl fmt::Display for RunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "always" => Ok(RunPolicy::Always),
            "sampled" => Ok(RunPolicy::Sampled),
            other => Err(format!("unknown run policy: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserConfig {
    pub user_id: String,
    pub run_policy: RunPolicy,
    pub sample_rate_pct: i32,
    pub obfuscate_pii: bool,
    pub max_eval_per_day: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserConfig {
    pub fn with_defaults(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            run_policy: RunPolicy::default(),
            sample_rate_pct: DEFAULT_SAMPLE_RATE_PCT,
            obfuscate_pii: DEFAULT_OBFUSCATE_PII,
            max_eval_per_day: DEFAULT_MAX_EVAL_PER_DAY,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an already validated update. Fields left as `None` are kept.
    pub fn apply(&mut self, update: &UserConfigUpdate, now: DateTime<Utc>) {
        if let Some(policy) = update.run_policy {
            self.run_policy = policy;
        }
        if let Some(rate) = update.sample_rate_pct {
            self.sample_rate_pct = rate;
        }
        if let Some(obfuscate) = update.obfuscate_pii {
            self.obfuscate_pii = obfuscate;
        }
        if let Some(max) = update.max_eval_per_day {
            self.max_eval_per_day = max;
        }
        self.updated_at = now;
    }
}

/// Partial settings update submitted from the settings form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UserConfigUpdate {
    pub run_policy: Option<RunPolicy>,
    #[validate(range(min = 0, max = 100, message = "sample_rate_pct must be between 0 and 100"))]
    pub sample_rate_pct: Option<i32>,
    pub obfuscate_pii: Option<bool>,
    #[validate(range(min = 1, message = "max_eval_per_day must be at least 1"))]
    pub max_eval_per_day: Option<i32>,
}
