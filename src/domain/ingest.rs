use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload accepted by the ingestion endpoint.
///
/// Required fields are `Option` so that a missing field is reported by name
/// during validation instead of failing deserialization as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    pub interaction_id: Option<String>,
    pub prompt: Option<String>,
    pub response: Option<String>,
    pub score: Option<f64>,
    pub latency_ms: Option<i64>,
    pub flags: Option<Vec<String>>,
    pub pii_tokens_redacted: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A rejected input field with a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputError {
    pub field: String,
    pub message: String,
}

impl InputError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(field, format!("Missing required field: {field}"))
    }
}

impl IngestRequest {
    /// Decodes a JSON body field by field so type errors name the offending field.
    pub fn from_json(body: &[u8]) -> std::result::Result<Self, InputError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| InputError::new("body", format!("Malformed JSON body: {e}")))?;
        let Value::Object(map) = value else {
            return Err(InputError::new("body", "Request body must be a JSON object"));
        };

        Ok(Self {
            interaction_id: field(&map, "interaction_id")?,
            prompt: field(&map, "prompt")?,
            response: field(&map, "response")?,
            score: field(&map, "score")?,
            latency_ms: field(&map, "latency_ms")?,
            flags: field(&map, "flags")?,
            pii_tokens_redacted: field(&map, "pii_tokens_redacted")?,
            created_at: field(&map, "created_at")?,
        })
    }
}

fn field<T: DeserializeOwned>(
    map: &Map<String, Value>,
    name: &str,
) -> std::result::Result<Option<T>, InputError> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| InputError::new(name, format!("Invalid value for {name}: {e}"))),
    }
}

/// Terminal disposition of one ingestion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Stored {
        evaluation_id: Uuid,
        pii_tokens_redacted: i32,
    },
    Skipped,
    Unauthorized,
    InvalidInput(InputError),
    ConfigMissing,
    QuotaExceeded {
        limit: i32,
        count: i64,
    },
    StorageError {
        message: String,
    },
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Stored { .. } => "stored",
            IngestOutcome::Skipped => "skipped",
            IngestOutcome::Unauthorized => "unauthorized",
            IngestOutcome::InvalidInput(_) => "invalid_input",
            IngestOutcome::ConfigMissing => "config_missing",
            IngestOutcome::QuotaExceeded { .. } => "quota_exceeded",
            IngestOutcome::StorageError { .. } => "storage_error",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Stored { .. } | IngestOutcome::Skipped)
    }
}
