// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Scans are serialised: a second
// `POST /scan` while one is running gets 409 instead of queueing.
//
// CORS is configured permissively for development; tighten `allow_origin`
// in production.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::apgar;
use crate::app_state::AppState;
use crate::cache::CacheStats;
use crate::error::ScanError;
use crate::scanner::universe::normalize;
use crate::scanner::{presets, ProgressSnapshot, ScanRequest};
use crate::types::Side;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/scan", post(run_scan))
        .route("/api/v1/scan/status", get(scan_status))
        .route("/api/v1/scan/latest", get(scan_latest))
        .route("/api/v1/presets", get(list_presets))
        .route("/api/v1/universes", get(list_universes))
        .route("/api/v1/quote/:symbol", get(quote))
        .route("/api/v1/apgar/:symbol", get(apgar_score))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

/// JSON error body with a status chosen from the error kind.
fn error_response(err: &ScanError) -> Response {
    let status = match err {
        e if e.is_request_error() => StatusCode::BAD_REQUEST,
        ScanError::DataUnavailable(_) | ScanError::InsufficientHistory { .. } => StatusCode::NOT_FOUND,
        ScanError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = serde_json::json!({ "error": err.to_string(), "kind": err.kind() });
    (status, Json(body)).into_response()
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
    row_cache: CacheStats,
    quote_cache: CacheStats,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        row_cache: state.scanner.row_cache().stats(),
        quote_cache: state.quotes.cache().stats(),
    })
}

// =============================================================================
// Scan
// =============================================================================

/// A scan request, optionally naming a preset whose filters are used when
/// the request carries none of its own.
#[derive(Debug, Default, Deserialize)]
struct ScanBody {
    #[serde(default)]
    preset: Option<String>,
    #[serde(flatten)]
    request: ScanRequest,
}

async fn run_scan(State(state): State<Arc<AppState>>, Json(body): Json<ScanBody>) -> Response {
    let mut request = body.request;
    if let Some(name) = body.preset.as_deref() {
        match presets::lookup(name) {
            Some(filters) if request.filters.is_empty() => request.filters = filters,
            Some(_) => {}
            None => return error_response(&ScanError::InvalidFilter(format!("unknown preset `{name}`"))),
        }
    }

    let Ok(guard) = Arc::clone(&state.scan_lock).try_lock_owned() else {
        let body = serde_json::json!({ "error": "a scan is already running" });
        return (StatusCode::CONFLICT, Json(body)).into_response();
    };

    // The batch runs on its own task so a client that hangs up does not
    // abort it; the outcome is still published.
    let worker = Arc::clone(&state);
    let task = tokio::spawn(async move {
        let _guard = guard;
        let outcome = Arc::new(worker.scanner.scan(request).await?);
        info!(scan_id = %outcome.scan_id, rows = outcome.rows.len(), "scan published");
        worker.publish(Arc::clone(&outcome));
        Ok::<_, ScanError>(outcome)
    });

    match task.await {
        Ok(Ok(outcome)) => Json(outcome.as_ref()).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, kind = e.kind(), "scan rejected");
            error_response(&e)
        }
        Err(e) => {
            error!(error = %e, "scan task failed");
            error_response(&ScanError::ComputationError("scan task failed".into()))
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    progress: ProgressSnapshot,
    latest_scan_id: Option<String>,
}

async fn scan_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        progress: state.scanner.progress().snapshot(),
        latest_scan_id: state.latest().map(|o| o.scan_id.clone()),
    })
}

async fn scan_latest(State(state): State<Arc<AppState>>) -> Response {
    match state.latest() {
        Some(outcome) => Json(outcome.as_ref()).into_response(),
        None => {
            let body = serde_json::json!({ "error": "no scan has completed yet" });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

// =============================================================================
// Catalogue
// =============================================================================

async fn list_presets() -> impl IntoResponse {
    Json(presets::all())
}

async fn list_universes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counts: BTreeMap<String, usize> = state
        .config
        .universes
        .iter()
        .map(|(name, symbols)| (name.clone(), symbols.len()))
        .collect();
    Json(counts)
}

// =============================================================================
// Per-symbol
// =============================================================================

async fn quote(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> Response {
    match state.quotes.quote(&symbol).await {
        Ok(q) => Json(q).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct ApgarQuery {
    #[serde(default)]
    side: Side,
}

/// Failures come back as a zero score with `error` set, never as an HTTP
/// error.
async fn apgar_score(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<ApgarQuery>,
) -> impl IntoResponse {
    let symbol = normalize(&symbol);
    let score = apgar::score(state.provider.as_ref(), &symbol, query.side, &state.config).await;
    Json(serde_json::json!({ "symbol": symbol, "side": query.side, "score": score }))
}
