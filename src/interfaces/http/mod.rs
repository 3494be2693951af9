use crate::application::{EvaluationQueryService, IngestionPipeline, SettingsService};
use crate::domain::error::AppError;
use crate::domain::evaluation::EvaluationFilter;
use crate::domain::ingest::IngestOutcome;
use crate::domain::user_config::UserConfigUpdate;
use crate::infrastructure::auth::IdentityResolver;
use crate::infrastructure::config::ServerConfig;
use actix_cors::Cors;
use actix_web::dev::{Server, Service};
use actix_web::http::StatusCode;
use actix_web::{
    get, post, put, web, App, HttpRequest, HttpResponse, HttpServer, Responder, ResponseError,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct HttpState {
    pub pipeline: Arc<IngestionPipeline>,
    pub settings: Arc<SettingsService>,
    pub queries: Arc<EvaluationQueryService>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}

/// Token from `Authorization: Bearer <token>`, if present and non-empty.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

async fn authenticate(req: &HttpRequest, data: &HttpState) -> Result<String, AppError> {
    let rejected = || AppError::Unauthorized("Missing or invalid credentials".to_string());
    let token = bearer_token(req).ok_or_else(rejected)?;
    match data.identity.resolve(token).await {
        Ok(Some(user_id)) => Ok(user_id),
        Ok(None) => Err(rejected()),
        Err(err) => {
            warn!(error = %err, path = %req.path(), "Identity resolution failed");
            Err(rejected())
        }
    }
}

fn outcome_response(outcome: IngestOutcome) -> HttpResponse {
    match outcome {
        IngestOutcome::Stored { .. } => HttpResponse::Created().json(&outcome),
        IngestOutcome::Skipped => HttpResponse::Ok().json(&outcome),
        IngestOutcome::Unauthorized => HttpResponse::Unauthorized().json(json!({
            "error": outcome.label(),
            "message": "Missing or invalid credentials",
        })),
        IngestOutcome::InvalidInput(ref err) => HttpResponse::BadRequest().json(json!({
            "error": outcome.label(),
            "message": err.message,
            "field": err.field,
        })),
        IngestOutcome::ConfigMissing => HttpResponse::NotFound().json(json!({
            "error": outcome.label(),
            "message": "No evaluation settings exist for this account",
        })),
        IngestOutcome::QuotaExceeded { limit, count } => {
            HttpResponse::TooManyRequests().json(json!({
                "error": outcome.label(),
                "message": format!("Daily evaluation limit of {limit} reached"),
                "limit": limit,
                "count": count,
            }))
        }
        IngestOutcome::StorageError { .. } => HttpResponse::InternalServerError().json(json!({
            "error": outcome.label(),
            "message": "Failed to store evaluation",
        })),
    }
}

#[post("/evals/ingest")]
async fn ingest(req: HttpRequest, body: web::Bytes, data: web::Data<HttpState>) -> impl Responder {
    let outcome = data.pipeline.ingest_json(bearer_token(&req), &body).await;
    outcome_response(outcome)
}

#[get("/evals")]
async fn list_evaluations(
    req: HttpRequest,
    filter: web::Query<EvaluationFilter>,
    data: web::Data<HttpState>,
) -> Result<HttpResponse, AppError> {
    let user_id = authenticate(&req, &data).await?;
    let records = data.queries.list_recent(&user_id, &filter).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[get("/evals/summary")]
async fn evaluation_summary(
    req: HttpRequest,
    data: web::Data<HttpState>,
) -> Result<HttpResponse, AppError> {
    let user_id = authenticate(&req, &data).await?;
    Ok(HttpResponse::Ok().json(data.queries.summary(&user_id).await?))
}

#[derive(Deserialize)]
struct TrendQuery {
    days: Option<i64>,
}

#[get("/evals/trend")]
async fn evaluation_trend(
    req: HttpRequest,
    query: web::Query<TrendQuery>,
    data: web::Data<HttpState>,
) -> Result<HttpResponse, AppError> {
    let user_id = authenticate(&req, &data).await?;
    let trend = data
        .queries
        .daily_trend(&user_id, query.days, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(trend))
}

#[get("/evals/distribution")]
async fn score_distribution(
    req: HttpRequest,
    data: web::Data<HttpState>,
) -> Result<HttpResponse, AppError> {
    let user_id = authenticate(&req, &data).await?;
    Ok(HttpResponse::Ok().json(data.queries.score_distribution(&user_id).await?))
}

#[get("/evals/{id}")]
async fn get_evaluation(
    req: HttpRequest,
    path: web::Path<Uuid>,
    data: web::Data<HttpState>,
) -> Result<HttpResponse, AppError> {
    let user_id = authenticate(&req, &data).await?;
    let record = data.queries.get(&user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[get("/settings")]
async fn get_settings(req: HttpRequest, data: web::Data<HttpState>) -> Result<HttpResponse, AppError> {
    let user_id = authenticate(&req, &data).await?;
    Ok(HttpResponse::Ok().json(data.settings.get_or_create(&user_id).await?))
}

#[put("/settings")]
async fn update_settings(
    req: HttpRequest,
    update: web::Json<UserConfigUpdate>,
    data: web::Data<HttpState>,
) -> Result<HttpResponse, AppError> {
    let user_id = authenticate(&req, &data).await?;
    let config = data
        .settings
        .update(&user_id, update.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(config))
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Mounts every route under `/api`. Literal `/evals/*` paths are registered before `/evals/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _| AppError::ValidationError(err.to_string()).into());
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _| AppError::ValidationError(err.to_string()).into());

    cfg.service(
        web::scope("/api")
            .app_data(query_config)
            .app_data(json_config)
            .service(ingest)
            .service(list_evaluations)
            .service(evaluation_summary)
            .service(evaluation_trend)
            .service(score_distribution)
            .service(get_evaluation)
            .service(get_settings)
            .service(update_settings)
            .service(health),
    );
}

pub fn start_server(state: HttpState, config: &ServerConfig) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap_fn(|req, srv| {
                let method = req.method().clone();
                let path = req.path().to_string();
                let fut = srv.call(req);
                async move {
                    let res = fut.await?;
                    debug!(%method, %path, status = res.status().as_u16(), "Handled request");
                    Ok(res)
                }
            })
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    info!(host = %config.host, port = config.port, "HTTP server listening");
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::sampling::{SamplingDecider, SeededSource};
    use crate::domain::evaluation::{EvaluationRecord, NewEvaluation};
    use crate::domain::user_config::UserConfig;
    use crate::infrastructure::auth::StaticIdentityResolver;
    use crate::infrastructure::bootstrap::wire;
    use crate::infrastructure::db::memory::{InMemoryEvaluationStore, InMemoryUserConfigStore};
    use crate::infrastructure::db::EvaluationStore;
    use actix_web::test;
    use serde_json::Value;

    const TOKEN: &str = "token-1";
    const OTHER_TOKEN: &str = "token-2";

    struct Fixture {
        state: web::Data<HttpState>,
        evaluations: Arc<InMemoryEvaluationStore>,
    }

    fn fixture(config: Option<UserConfig>) -> Fixture {
        let configs = Arc::new(match config {
            Some(config) => InMemoryUserConfigStore::with_config(config),
            None => InMemoryUserConfigStore::new(),
        });
        let evaluations = Arc::new(InMemoryEvaluationStore::new());
        let identity = Arc::new(
            StaticIdentityResolver::new()
                .with_token(TOKEN, "user-1")
                .with_token(OTHER_TOKEN, "user-2"),
        );
        let state = wire(
            identity,
            configs,
            evaluations.clone(),
            SamplingDecider::new(Arc::new(SeededSource::new(9))),
        );
        Fixture {
            state: web::Data::new(state),
            evaluations,
        }
    }

    fn user_config(max: i32) -> UserConfig {
        UserConfig {
            max_eval_per_day: max,
            ..UserConfig::with_defaults("user-1", Utc::now())
        }
    }

    fn body(interaction_id: &str) -> Value {
        json!({
            "interaction_id": interaction_id,
            "prompt": "Reach me at sam@example.com",
            "response": "Sure.",
            "score": 0.75,
            "latency_ms": 240,
            "flags": ["slow"],
        })
    }

    macro_rules! app {
        ($fixture:expr) => {
            test::init_service(
                App::new()
                    .app_data($fixture.state.clone())
                    .configure(configure),
            )
            .await
        };
    }

    fn ingest_request(token: Option<&str>, payload: &Value) -> test::TestRequest {
        let req = test::TestRequest::post()
            .uri("/api/evals/ingest")
            .set_json(payload);
        match token {
            Some(token) => req.insert_header(("Authorization", format!("Bearer {token}"))),
            None => req,
        }
    }

    #[actix_web::test]
    async fn test_bearer_token_parsing() {
        let req = test::TestRequest::default()
            .insert_header(("Authorization", "Bearer abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc"));

        let req = test::TestRequest::default()
            .insert_header(("Authorization", "bearer   xyz "))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("xyz"));

        let req = test::TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = test::TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&req), None);
    }

    #[actix_web::test]
    async fn test_ingest_status_codes_follow_outcome() {
        let fixture = fixture(Some(user_config(1)));
        let app = app!(fixture);

        let resp = test::call_service(&app, ingest_request(Some(TOKEN), &body("a")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let stored: Value = test::read_body_json(resp).await;
        assert_eq!(stored["status"], "stored");
        assert!(stored["evaluation_id"].is_string());
        assert_eq!(stored["pii_tokens_redacted"], 1);

        let resp = test::call_service(&app, ingest_request(Some(TOKEN), &body("b")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let rejected: Value = test::read_body_json(resp).await;
        assert_eq!(rejected["error"], "quota_exceeded");
        assert_eq!(rejected["limit"], 1);

        let resp = test::call_service(&app, ingest_request(None, &body("c")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(fixture.evaluations.records().len(), 1);
        assert_eq!(fixture.evaluations.records()[0].prompt, "Reach me at [EMAIL]");
    }

    #[actix_web::test]
    async fn test_ingest_invalid_input_and_missing_config() {
        let fixture = fixture(Some(user_config(10)));
        let app = app!(fixture);

        let mut payload = body("a");
        payload["score"] = json!(1.5);
        let resp = test::call_service(&app, ingest_request(Some(TOKEN), &payload).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: Value = test::read_body_json(resp).await;
        assert_eq!(err["error"], "invalid_input");
        assert_eq!(err["field"], "score");

        let resp = test::call_service(
            &app,
            ingest_request(Some(OTHER_TOKEN), &body("a")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let err: Value = test::read_body_json(resp).await;
        assert_eq!(err["error"], "config_missing");
    }

    #[actix_web::test]
    async fn test_malformed_body_without_credentials_is_unauthorized() {
        let fixture = fixture(Some(user_config(10)));
        let app = app!(fixture);

        let req = test::TestRequest::post()
            .uri("/api/evals/ingest")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{oops")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_storage_failure_is_500() {
        let fixture = fixture(Some(user_config(10)));
        fixture.evaluations.fail_inserts(true);
        let app = app!(fixture);

        let resp = test::call_service(&app, ingest_request(Some(TOKEN), &body("a")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: Value = test::read_body_json(resp).await;
        assert_eq!(err["error"], "storage_error");
    }

    #[actix_web::test]
    async fn test_settings_lifecycle() {
        let fixture = fixture(None);
        let app = app!(fixture);

        let req = test::TestRequest::get()
            .uri("/api/settings")
            .insert_header(("Authorization", format!("Bearer {TOKEN}")))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["run_policy"], "always");
        assert_eq!(created["max_eval_per_day"], 1000);

        let req = test::TestRequest::put()
            .uri("/api/settings")
            .insert_header(("Authorization", format!("Bearer {TOKEN}")))
            .set_json(json!({ "sample_rate_pct": 101 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::put()
            .uri("/api/settings")
            .insert_header(("Authorization", format!("Bearer {TOKEN}")))
            .set_json(json!({ "run_policy": "sampled", "sample_rate_pct": 25 }))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["run_policy"], "sampled");
        assert_eq!(updated["sample_rate_pct"], 25);

        let req = test::TestRequest::get().uri("/api/settings").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let err: Value = test::read_body_json(resp).await;
        assert_eq!(err["error"], "unauthorized");
    }

    async fn seed(store: &InMemoryEvaluationStore, user_id: &str, prompt: &str) -> Uuid {
        store
            .insert(NewEvaluation {
                user_id: user_id.to_string(),
                interaction_id: "int".to_string(),
                prompt: prompt.to_string(),
                response: "ok".to_string(),
                score: 0.3,
                latency_ms: 50,
                flags: Vec::new(),
                pii_tokens_redacted: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn test_query_routes_are_scoped_and_masked() {
        let fixture = fixture(Some(user_config(10)));
        let own = seed(&fixture.evaluations, "user-1", "call 555-123-4567").await;
        let foreign = seed(&fixture.evaluations, "user-2", "p").await;
        let app = app!(fixture);
        let auth = ("Authorization", format!("Bearer {TOKEN}"));

        let req = test::TestRequest::get()
            .uri(&format!("/api/evals/{own}"))
            .insert_header(auth.clone())
            .to_request();
        let record: EvaluationRecord = test::call_and_read_body_json(&app, req).await;
        assert_eq!(record.prompt, "call [PHONE]");

        let req = test::TestRequest::get()
            .uri(&format!("/api/evals/{foreign}"))
            .insert_header(auth.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/evals?limit=5&flagged_only=false")
            .insert_header(auth.clone())
            .to_request();
        let records: Vec<EvaluationRecord> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(records.len(), 1);

        let req = test::TestRequest::get()
            .uri("/api/evals?min_score=abc")
            .insert_header(auth.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/evals/summary")
            .insert_header(auth.clone())
            .to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary["total"], 1);

        let req = test::TestRequest::get()
            .uri("/api/evals/trend?days=3")
            .insert_header(auth.clone())
            .to_request();
        let trend: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[2]["count"], 1);

        let req = test::TestRequest::get()
            .uri("/api/evals/distribution")
            .insert_header(auth)
            .to_request();
        let buckets: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets[1]["count"], 1);
    }

    #[actix_web::test]
    async fn test_health() {
        let fixture = fixture(None);
        let app = app!(fixture);
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
