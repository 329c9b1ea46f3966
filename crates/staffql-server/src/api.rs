//! HTTP endpoints
//!
//! - `GET /` greeting
//! - `POST /query/` raw SQL
//! - `POST /ask/` natural-language question
//! - `GET /schema/`, `GET /health`, `GET /metrics`

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use staffql_duck::{DuckEngine, Record, TableCatalog};
use staffql_sql::LimitPolicy;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::error::ApiError;
use crate::llm::SqlTranslator;
use crate::metrics::{Metrics, Outcome};
use crate::query::{self, QueryError, DISALLOWED_GENERATED_SQL, DISALLOWED_SQL};

pub const GREETING: &str = "API pour interroger les données employés";

/// Row limit applied when a request does not mention one
pub const DEFAULT_LIMIT: i64 = 100;

fn default_limit() -> Option<i64> {
    Some(DEFAULT_LIMIT)
}

/// Body of `POST /query/`
#[derive(Debug, Clone, Deserialize)]
pub struct SqlQuery {
    pub sql: String,
    /// Absent means [`DEFAULT_LIMIT`]; `null` means no limit
    #[serde(default = "default_limit")]
    pub limit: Option<i64>,
}

/// Body of `POST /ask/`
#[derive(Debug, Clone, Deserialize)]
pub struct NlQuery {
    pub question: String,
    /// Absent means [`DEFAULT_LIMIT`]; `null` or 0 means no limit
    #[serde(default = "default_limit")]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub interpreted_sql: String,
    pub data: Vec<Record>,
}

/// Everything a handler needs, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DuckEngine>,
    pub translator: Arc<dyn SqlTranslator>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(engine: Arc<DuckEngine>, translator: Arc<dyn SqlTranslator>) -> prometheus::Result<Self> {
        Ok(Self {
            engine,
            translator,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

/// Any origin, method and header, with credentials
///
/// Origins, methods and headers are mirrored from the request because a
/// literal `*` cannot be combined with credentials.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/query/", post(execute_sql))
        .route("/ask/", post(ask_question))
        .route("/schema/", get(get_schema))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn outcome_of<T>(result: &Result<T, QueryError>) -> Outcome {
    match result {
        Ok(_) => Outcome::Ok,
        Err(e) if e.is_rejection() => Outcome::Rejected,
        Err(_) => Outcome::Failed,
    }
}

async fn read_root() -> Json<serde_json::Value> {
    Json(json!({ "message": GREETING }))
}

async fn execute_sql(
    State(state): State<AppState>,
    Json(query): Json<SqlQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let started = Instant::now();
    let result = run_sql_query(&state, query).await;
    state.metrics.observe("query", outcome_of(&result), started.elapsed());

    result.map(Json).map_err(|e| {
        error!(error = %e, "SQL query failed");
        ApiError::bad_request(e)
    })
}

async fn run_sql_query(state: &AppState, query: SqlQuery) -> Result<Vec<Record>, QueryError> {
    let sql = query::screen(&query.sql, query.limit, LimitPolicy::WhenPresent, DISALLOWED_SQL)?;
    let result = query::run(state.engine.clone(), sql).await?;
    info!(rows = result.row_count, "SQL query answered");
    Ok(result.into_records())
}

async fn ask_question(
    State(state): State<AppState>,
    Json(input): Json<NlQuery>,
) -> Result<Json<AskResponse>, ApiError> {
    let started = Instant::now();
    let result = answer_question(&state, input).await;
    state.metrics.observe("ask", outcome_of(&result), started.elapsed());

    result.map(Json).map_err(|e| {
        error!(error = %e, "Question failed");
        ApiError::internal(e)
    })
}

async fn answer_question(state: &AppState, input: NlQuery) -> Result<AskResponse, QueryError> {
    // Model output is screened exactly like caller SQL
    let candidate = state.translator.translate(&input.question, input.limit).await?;
    info!(question = %input.question, sql = %candidate, "Question translated");

    let sql = query::screen(&candidate, input.limit, LimitPolicy::WhenNonZero, DISALLOWED_GENERATED_SQL)?;
    let result = query::run(state.engine.clone(), sql.clone()).await?;
    info!(rows = result.row_count, "Question answered");

    Ok(AskResponse {
        question: input.question,
        interpreted_sql: sql,
        data: result.into_records(),
    })
}

async fn get_schema(State(state): State<AppState>) -> Result<Json<TableCatalog>, ApiError> {
    let engine = state.engine.clone();
    let catalog = tokio::task::spawn_blocking(move || engine.catalog())
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;
    Ok(Json(catalog))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render().map_err(ApiError::internal)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
