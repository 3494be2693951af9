use std::sync::Arc;

use tracing::{error, info};

use crate::application::{
    EvaluationQueryService, IngestionPipeline, SamplingDecider, SettingsService,
};
use crate::domain::error::Result;
use crate::infrastructure::auth::{IdentityResolver, RemoteIdentityResolver};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::evaluations::PgEvaluationRepository;
use crate::infrastructure::db::postgres::connect;
use crate::infrastructure::db::user_configs::PgUserConfigRepository;
use crate::infrastructure::db::{EvaluationStore, UserConfigStore};
use crate::interfaces::http::HttpState;

/// Connects to Postgres and the auth service and wires every service into the HTTP state.
pub async fn build_state(config: &AppConfig) -> Result<HttpState> {
    let pool = connect(&config.database).await.map_err(|err| {
        error!(error = %err, "Failed to initialize database");
        err
    })?;

    let configs: Arc<dyn UserConfigStore> = Arc::new(PgUserConfigRepository::new(pool.clone()));
    let evaluations: Arc<dyn EvaluationStore> = Arc::new(PgEvaluationRepository::new(pool));
    let identity: Arc<dyn IdentityResolver> = Arc::new(
        RemoteIdentityResolver::new(&config.auth.url, &config.auth.anon_key).map_err(|err| {
            error!(error = %err, auth_url = %config.auth.url, "Failed to build identity resolver");
            err
        })?,
    );

    info!(auth_url = %config.auth.url, "Services initialized");
    Ok(wire(identity, configs, evaluations, SamplingDecider::thread_rng()))
}

pub fn wire(
    identity: Arc<dyn IdentityResolver>,
    configs: Arc<dyn UserConfigStore>,
    evaluations: Arc<dyn EvaluationStore>,
    sampler: SamplingDecider,
) -> HttpState {
    HttpState {
        pipeline: Arc::new(IngestionPipeline::new(
            identity.clone(),
            configs.clone(),
            evaluations.clone(),
            sampler,
        )),
        settings: Arc::new(SettingsService::new(configs.clone())),
        queries: Arc::new(EvaluationQueryService::new(configs, evaluations)),
        identity,
    }
}
