use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::contracts::{
    CounterRecord, CounterStore, Family, FormatConfig, FormatConfigSource, GenerateError,
    GeneratedIdentifier, ReservedSequence, ScopeKey, ScopeKind,
};
use crate::generator::{Clock, IdentifierGenerator, SystemClock};
use crate::metrics::MetricsRegistry;

/// Application state shared across handlers.
pub struct AppState<S, C, K = SystemClock> {
    pub generator: IdentifierGenerator<S, C, K>,
    pub metrics: Arc<MetricsRegistry>,
}

impl<S, C, K> AppState<S, C, K> {
    pub fn new(generator: IdentifierGenerator<S, C, K>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { generator, metrics }
    }
}

/// Request body for issuing an identifier.
#[derive(Debug, Deserialize)]
pub struct NextRequest {
    pub kind: ScopeKind,
    #[serde(default)]
    pub department_code: Option<String>,
}

/// Query parameters for previewing the next identifier.
#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub kind: ScopeKind,
    #[serde(default)]
    pub department_code: Option<String>,
}

/// Request body for rendering a reserved sequence.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub scope: String,
    pub sequence: u64,
    pub year: i32,
}

/// Response for counter listing.
#[derive(Debug, Serialize)]
pub struct CountersResponse {
    pub counters: Vec<CounterRecord>,
    pub count: usize,
}

/// Response for family listing.
#[derive(Debug, Serialize)]
pub struct FamiliesResponse {
    pub families: Vec<Family>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// Set for CONFIG_UNAVAILABLE: the sequence that was consumed but not rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved: Option<ReservedSequence>,
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    Generate(GenerateError),
    BadRequest(String),
}

impl ApiError {
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Generate(GenerateError::StorageUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
            }
            ApiError::Generate(GenerateError::ConfigUnavailable { .. })
            | ApiError::Generate(GenerateError::ConfigSourceUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CONFIG_UNAVAILABLE")
            }
            ApiError::Generate(GenerateError::InvalidConfig(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_CONFIG")
            }
            ApiError::Generate(GenerateError::InvalidRequest(_)) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Generate(GenerateError::UnknownFamily(_)) => {
                (StatusCode::NOT_FOUND, "FAMILY_NOT_FOUND")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.code();
        let error_response = match self {
            ApiError::Generate(GenerateError::ConfigUnavailable { reserved, reason }) => {
                ErrorResponse {
                    error: format!(
                        "Sequence {} in scope {} was reserved but not rendered: {}",
                        reserved.sequence, reserved.scope, reason
                    ),
                    code: code.into(),
                    reserved: Some(reserved),
                }
            }
            ApiError::Generate(e) => ErrorResponse {
                error: e.to_string(),
                code: code.into(),
                reserved: None,
            },
            ApiError::BadRequest(msg) => ErrorResponse {
                error: msg,
                code: code.into(),
                reserved: None,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        ApiError::Generate(e)
    }
}

impl<S, C, K> AppState<S, C, K> {
    /// Counts a failed request and converts the error.
    fn fail(&self, e: GenerateError) -> ApiError {
        self.metrics.http.record_error();
        self.metrics.generation.record_error(&e);
        ApiError::Generate(e)
    }

    fn bad_request(&self, msg: String) -> ApiError {
        self.metrics.http.record_error();
        ApiError::BadRequest(msg)
    }
}

/// POST /families/{family}/next
/// Issues the next identifier for a family.
pub async fn next_identifier<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
    Path(family): Path<String>,
    body: Bytes,
) -> Result<Json<GeneratedIdentifier>, ApiError>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    let start = Instant::now();
    state.metrics.http.record_request();

    let request: NextRequest = serde_json::from_slice(&body)
        .map_err(|e| state.bad_request(format!("Invalid JSON: {}", e)))?;

    let issued = state
        .generator
        .next(&family, request.kind, request.department_code.as_deref())
        .await
        .map_err(|e| state.fail(e))?;

    state
        .metrics
        .generation
        .record_issued(&family, request.kind, start.elapsed());

    Ok(Json(issued))
}

/// GET /families/{family}/preview
/// Shows the identifier the next call would issue, without consuming it.
pub async fn preview_identifier<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
    Path(family): Path<String>,
    query: Result<Query<PreviewQuery>, QueryRejection>,
) -> Result<Json<GeneratedIdentifier>, ApiError>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    state.metrics.http.record_request();
    let Query(query) = query.map_err(|e| state.bad_request(e.body_text()))?;

    let preview = state
        .generator
        .preview(&family, query.kind, query.department_code.as_deref())
        .await
        .map_err(|e| state.fail(e))?;

    Ok(Json(preview))
}

/// POST /families/{family}/render
/// Renders a sequence reserved by a call that failed with CONFIG_UNAVAILABLE.
/// Sequences the scope never committed are rejected with BAD_REQUEST.
pub async fn render_reserved<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
    Path(family): Path<String>,
    body: Bytes,
) -> Result<Json<GeneratedIdentifier>, ApiError>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    state.metrics.http.record_request();

    let request: RenderRequest = serde_json::from_slice(&body)
        .map_err(|e| state.bad_request(format!("Invalid JSON: {}", e)))?;

    let reserved = ReservedSequence {
        family,
        scope: ScopeKey::from_raw(request.scope),
        sequence: request.sequence,
        year: request.year,
    };
    let formatted = state
        .generator
        .render(&reserved)
        .await
        .map_err(|e| state.fail(e))?;
    state.metrics.generation.record_render();

    Ok(Json(GeneratedIdentifier {
        scope: reserved.scope,
        sequence: reserved.sequence,
        formatted,
    }))
}

/// GET /families/{family}/config
pub async fn get_config<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
    Path(family): Path<String>,
) -> Result<Json<FormatConfig>, ApiError>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    state.metrics.http.record_request();
    let config = state
        .generator
        .config(&family)
        .map_err(|e| state.fail(e))?;
    Ok(Json(config))
}

/// PUT /families/{family}/config
/// Replaces a family's format configuration. Invalid configs are rejected here,
/// never at format time.
pub async fn put_config<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
    Path(family): Path<String>,
    body: Bytes,
) -> Result<Json<FormatConfig>, ApiError>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    state.metrics.http.record_request();

    let config: FormatConfig = serde_json::from_slice(&body)
        .map_err(|e| state.bad_request(format!("Invalid JSON: {}", e)))?;

    state
        .generator
        .update_config(&family, config.clone())
        .map_err(|e| state.fail(e))?;
    state.metrics.generation.record_config_update();

    Ok(Json(config))
}

/// GET /families
pub async fn list_families<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
) -> Json<FamiliesResponse>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    state.metrics.http.record_request();
    Json(FamiliesResponse {
        families: state.generator.families().cloned().collect(),
    })
}

/// GET /counters
/// Lists committed counters so operators can reconcile gaps.
pub async fn list_counters<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
) -> Result<Json<CountersResponse>, ApiError>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    state.metrics.http.record_request();
    let counters = state
        .generator
        .records()
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(CountersResponse {
        count: counters.len(),
        counters,
    }))
}

/// GET /health
/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// GET /health/live
/// Liveness check; OK whenever the server answers.
pub async fn health_live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Response for readiness endpoint.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub counter_store: ComponentHealth,
}

/// Health status for a single component.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health/ready
/// Readiness check; fails while the counter store is unreachable.
pub async fn health_ready<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)>
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    match state.generator.ping().await {
        Ok(()) => Ok(Json(ReadinessResponse {
            status: "ready".into(),
            counter_store: ComponentHealth {
                status: "ok".into(),
                error: None,
            },
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready".into(),
                    counter_store: ComponentHealth {
                        status: "error".into(),
                        error: Some(e.to_string()),
                    },
                }),
            ))
        }
    }
}

/// Response for stats endpoint.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: f64,
    pub requests_total: u64,
    pub errors_total: u64,
    pub identifiers: IdentifierStats,
}

#[derive(Debug, Serialize)]
pub struct IdentifierStats {
    pub issued_total: u64,
    pub storage_errors_total: u64,
    pub config_unavailable_total: u64,
    pub invalid_requests_total: u64,
    pub renders_total: u64,
    pub avg_latency_us: f64,
}

/// GET /stats
/// Server statistics.
pub async fn get_stats<S, C, K>(
    State(state): State<Arc<AppState<S, C, K>>>,
) -> impl IntoResponse
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    let http = &state.metrics.http;
    let generation = &state.metrics.generation;

    Json(StatsResponse {
        uptime_secs: http.uptime_secs(),
        requests_total: http.requests_total.load(Ordering::Relaxed),
        errors_total: http.errors_total.load(Ordering::Relaxed),
        identifiers: IdentifierStats {
            issued_total: generation.issued_total(),
            storage_errors_total: generation.storage_errors_total.load(Ordering::Relaxed),
            config_unavailable_total: generation
                .config_unavailable_total
                .load(Ordering::Relaxed),
            invalid_requests_total: generation.invalid_requests_total.load(Ordering::Relaxed),
            renders_total: generation.renders_total.load(Ordering::Relaxed),
            avg_latency_us: generation.next_latency.mean_us(),
        },
    })
}

/// GET /metrics
/// Returns metrics in Prometheus text exposition format.
pub async fn metrics<S, C, K>(State(state): State<Arc<AppState<S, C, K>>>) -> impl IntoResponse
where
    S: CounterStore + 'static,
    C: FormatConfigSource + 'static,
    K: Clock + 'static,
{
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.format_prometheus(),
    )
}
