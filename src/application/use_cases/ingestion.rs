//! Ingestion pipeline for evaluation events.
//!
//! Stages run in a fixed order and stop at the first rejection:
//! identity, input validation, score range, config lookup, quota, sampling,
//! redaction, persistence. Every request ends in exactly one [`IngestOutcome`].

use crate::application::use_cases::pii_redactor::redact;
use crate::application::use_cases::quota_tracker::QuotaTracker;
use crate::application::use_cases::sampling::SamplingDecider;
use crate::domain::evaluation::NewEvaluation;
use crate::domain::ingest::{IngestOutcome, IngestRequest, InputError};
use crate::infrastructure::auth::IdentityResolver;
use crate::infrastructure::db::{EvaluationStore, UserConfigStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Request body as received. Raw JSON is decoded only after the caller is identified.
pub enum IngestPayload<'a> {
    Json(&'a [u8]),
    Typed(IngestRequest),
}

/// An `IngestRequest` that passed stages 2 and 3.
#[derive(Debug)]
struct ValidatedEvent {
    interaction_id: String,
    prompt: String,
    response: String,
    score: f64,
    latency_ms: i64,
    flags: Vec<String>,
    pii_tokens_redacted: i32,
    created_at: Option<DateTime<Utc>>,
}

pub struct IngestionPipeline {
    identity: Arc<dyn IdentityResolver>,
    configs: Arc<dyn UserConfigStore>,
    evaluations: Arc<dyn EvaluationStore>,
    quota: QuotaTracker,
    sampler: SamplingDecider,
}

impl IngestionPipeline {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        configs: Arc<dyn UserConfigStore>,
        evaluations: Arc<dyn EvaluationStore>,
        sampler: SamplingDecider,
    ) -> Self {
        let quota = QuotaTracker::new(evaluations.clone());
        Self {
            identity,
            configs,
            evaluations,
            quota,
            sampler,
        }
    }

    pub async fn ingest(&self, credential: Option<&str>, request: IngestRequest) -> IngestOutcome {
        self.ingest_at(credential, IngestPayload::Typed(request), Utc::now())
            .await
    }

    pub async fn ingest_json(&self, credential: Option<&str>, body: &[u8]) -> IngestOutcome {
        self.ingest_at(credential, IngestPayload::Json(body), Utc::now())
            .await
    }

    /// Runs every stage with `now` as the pipeline's clock.
    pub async fn ingest_at(
        &self,
        credential: Option<&str>,
        payload: IngestPayload<'_>,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        let user_id = match self.resolve_identity(credential).await {
            Some(user_id) => user_id,
            None => return finish(None, None, IngestOutcome::Unauthorized),
        };

        let request = match payload {
            IngestPayload::Json(body) => match IngestRequest::from_json(body) {
                Ok(request) => request,
                Err(err) => return finish(Some(&user_id), None, IngestOutcome::InvalidInput(err)),
            },
            IngestPayload::Typed(request) => request,
        };
        let interaction_id = request.interaction_id.clone();
        let interaction_id = interaction_id.as_deref();

        let event = match validate(request) {
            Ok(event) => event,
            Err(err) => {
                return finish(Some(&user_id), interaction_id, IngestOutcome::InvalidInput(err))
            }
        };

        let outcome = self.admit_and_store(&user_id, event, now).await;
        finish(Some(&user_id), interaction_id, outcome)
    }

    async fn resolve_identity(&self, credential: Option<&str>) -> Option<String> {
        let credential = credential.map(str::trim).filter(|c| !c.is_empty())?;
        match self.identity.resolve(credential).await {
            Ok(user_id) => user_id,
            Err(err) => {
                warn!(error = %err, "Identity resolution failed");
                None
            }
        }
    }

    /// Stages 4 through 9, for a caller that is identified and input that is valid.
    async fn admit_and_store(
        &self,
        user_id: &str,
        event: ValidatedEvent,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        let config = match self.configs.get(user_id).await {
            Ok(Some(config)) => config,
            Ok(None) => return IngestOutcome::ConfigMissing,
            Err(err) => return storage_error(err),
        };

        let count = match self.quota.count_today(user_id, now).await {
            Ok(count) => count,
            Err(err) => return storage_error(err),
        };
        if QuotaTracker::is_exhausted(count, config.max_eval_per_day) {
            return IngestOutcome::QuotaExceeded {
                limit: config.max_eval_per_day,
                count,
            };
        }

        if !self
            .sampler
            .should_persist(config.run_policy, config.sample_rate_pct)
        {
            return IngestOutcome::Skipped;
        }

        let (prompt, response, pii_tokens_redacted) = if config.obfuscate_pii {
            let prompt = redact(&event.prompt);
            let response = redact(&event.response);
            let total = prompt.count + response.count;
            (
                prompt.masked,
                response.masked,
                i32::try_from(total).unwrap_or(i32::MAX),
            )
        } else {
            (event.prompt, event.response, event.pii_tokens_redacted)
        };

        let record = NewEvaluation {
            user_id: user_id.to_string(),
            interaction_id: event.interaction_id,
            prompt,
            response,
            score: event.score,
            latency_ms: event.latency_ms,
            flags: event.flags,
            pii_tokens_redacted,
            created_at: event.created_at.unwrap_or(now),
        };

        match self.evaluations.insert(record).await {
            Ok(evaluation_id) => IngestOutcome::Stored {
                evaluation_id,
                pii_tokens_redacted,
            },
            Err(err) => storage_error(err),
        }
    }
}

fn storage_error(err: crate::domain::error::AppError) -> IngestOutcome {
    IngestOutcome::StorageError {
        message: err.to_string(),
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, InputError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(InputError::missing(field)),
    }
}

fn validate(request: IngestRequest) -> Result<ValidatedEvent, InputError> {
    let interaction_id = required_text(request.interaction_id, "interaction_id")?;
    let prompt = required_text(request.prompt, "prompt")?;
    let response = required_text(request.response, "response")?;
    let score = request.score.ok_or_else(|| InputError::missing("score"))?;
    let latency_ms = request
        .latency_ms
        .ok_or_else(|| InputError::missing("latency_ms"))?;

    if !score.is_finite() {
        return Err(InputError::new("score", "score must be a finite number"));
    }
    if latency_ms < 0 {
        return Err(InputError::new("latency_ms", "latency_ms must not be negative"));
    }
    let pii_tokens_redacted = request.pii_tokens_redacted.unwrap_or(0);
    if pii_tokens_redacted < 0 {
        return Err(InputError::new(
            "pii_tokens_redacted",
            "pii_tokens_redacted must not be negative",
        ));
    }

    if !(0.0..=1.0).contains(&score) {
        return Err(InputError::new(
            "score",
            format!("score must be between 0 and 1, got {score}"),
        ));
    }

    Ok(ValidatedEvent {
        interaction_id,
        prompt,
        response,
        score,
        latency_ms,
        flags: request.flags.unwrap_or_default(),
        pii_tokens_redacted,
        created_at: request.created_at,
    })
}

fn finish(user_id: Option<&str>, interaction_id: Option<&str>, outcome: IngestOutcome) -> IngestOutcome {
    let user_id = user_id.unwrap_or("-");
    let interaction_id = interaction_id.unwrap_or("-");
    let label = outcome.label();
    match &outcome {
        IngestOutcome::Stored {
            evaluation_id,
            pii_tokens_redacted,
        } => debug!(
            user_id,
            interaction_id,
            outcome = label,
            %evaluation_id,
            pii_tokens_redacted,
            "Evaluation stored"
        ),
        IngestOutcome::Skipped => {
            debug!(user_id, interaction_id, outcome = label, "Evaluation skipped by sampling")
        }
        IngestOutcome::ConfigMissing => {
            info!(user_id, interaction_id, outcome = label, "No configuration for user")
        }
        IngestOutcome::QuotaExceeded { limit, count } => info!(
            user_id,
            interaction_id,
            outcome = label,
            limit,
            count,
            "Daily evaluation quota reached"
        ),
        IngestOutcome::Unauthorized => warn!(outcome = label, "Ingestion rejected"),
        IngestOutcome::InvalidInput(err) => warn!(
            user_id,
            interaction_id,
            outcome = label,
            field = %err.field,
            "{}",
            err.message
        ),
        IngestOutcome::StorageError { message } => error!(
            user_id,
            interaction_id,
            outcome = label,
            error = %message,
            "Evaluation storage failed"
        ),
    }
    outcome
}
