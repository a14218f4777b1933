// Expense Audit - Web Server
// REST API with Axum over one shared ExpenseLedger

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use expense_audit::{
    AuditConfig, AuditEngine, AuditPass, Config, ExpenseLedger, MutationError, RecordFields,
    RecordId, RecordPatch,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Parser)]
#[command(name = "expense-audit-server", version, about = "Expense audit REST API")]
struct Args {
    /// Expense dataset (CSV)
    csv: PathBuf,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1:5001")]
    addr: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    ledger: Arc<ExpenseLedger>,
    audit: Arc<AuditConfig>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

fn mutation_error(e: MutationError) -> Response {
    match &e {
        MutationError::Validation(v) => {
            let body = serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "field": v.field,
            });
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
        MutationError::NotFound(_) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        MutationError::IdsExhausted { .. } => error_response(StatusCode::CONFLICT, e.to_string()),
        MutationError::Persistence(_) => {
            tracing::error!(error = %e, "failed to save dataset");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save dataset")
        }
    }
}

/// Per-request overrides of the configured audit options
#[derive(Debug, Default, Deserialize)]
struct AuditQuery {
    window: Option<u32>,
    limit: Option<Decimal>,
    buffer: Option<Decimal>,
    threshold: Option<f64>,
    tolerance: Option<Decimal>,
    /// Comma-separated keyword list
    keywords: Option<String>,
}

impl AuditQuery {
    fn apply(self, base: &AuditConfig) -> Result<AuditConfig, String> {
        let mut config = base.clone();
        if let Some(w) = self.window {
            config.duplicate_window_days = w;
        }
        if let Some(l) = self.limit {
            config.high_value_limit = l;
        }
        if let Some(b) = self.buffer {
            config.near_limit_buffer = b;
        }
        if let Some(t) = self.threshold {
            config.benford_deviation_threshold = t;
        }
        if let Some(t) = self.tolerance {
            config.discrepancy_tolerance = t;
        }
        if let Some(k) = self.keywords {
            config.keyword_list = k.split(',').map(str::to_string).collect();
        }
        config.validated().map_err(|e| e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_page_limit")]
    limit: usize,
}

fn default_page_limit() -> usize {
    100
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/summary - Record count, totals, date range
async fn get_summary(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.ledger.snapshot().summary())
}

/// GET /api/records?offset&limit - Paginated records
async fn list_records(State(state): State<AppState>, Query(q): Query<PageQuery>) -> Response {
    ApiResponse::ok(state.ledger.snapshot().page(q.offset, q.limit))
}

/// GET /api/records/:id
async fn get_record(State(state): State<AppState>, Path(id): Path<RecordId>) -> Response {
    match state.ledger.get(id) {
        Some(record) => ApiResponse::ok(record),
        None => error_response(StatusCode::NOT_FOUND, format!("record {} not found", id)),
    }
}

/// GET /api/audit - Every pass
async fn run_all(State(state): State<AppState>, Query(q): Query<AuditQuery>) -> Response {
    let config = match q.apply(&state.audit) {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let snapshot = state.ledger.snapshot();
    ApiResponse::ok(AuditEngine::new(config).run_all(&snapshot))
}

/// GET /api/audit/:pass - One pass
async fn run_pass(
    State(state): State<AppState>,
    Path(pass): Path<String>,
    Query(q): Query<AuditQuery>,
) -> Response {
    let pass: AuditPass = match pass.parse() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e),
    };
    let config = match q.apply(&state.audit) {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let snapshot = state.ledger.snapshot();
    ApiResponse::ok(AuditEngine::new(config).run(pass, &snapshot))
}

/// GET /api/audit/:pass/csv - Findings as a CSV download (same overrides)
async fn download_pass(
    State(state): State<AppState>,
    Path(pass): Path<String>,
    Query(q): Query<AuditQuery>,
) -> Response {
    let pass: AuditPass = match pass.parse() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e),
    };
    let config = match q.apply(&state.audit) {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let snapshot = state.ledger.snapshot();
    let report = AuditEngine::new(config).run(pass, &snapshot);

    match report.to_csv() {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"expenses_audit_{}.csv\"", pass.code()),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/records - Add
async fn add_record(State(state): State<AppState>, Json(fields): Json<RecordFields>) -> Response {
    let ledger = state.ledger.clone();
    match tokio::task::spawn_blocking(move || ledger.add(&fields)).await {
        Ok(Ok(record)) => (
            StatusCode::CREATED,
            Json(ApiResponse {
                success: true,
                data: Some(record),
                error: None,
            }),
        )
            .into_response(),
        Ok(Err(e)) => mutation_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// PUT /api/records/:id - Update (omitted fields keep their value)
async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(patch): Json<RecordPatch>,
) -> Response {
    let ledger = state.ledger.clone();
    match tokio::task::spawn_blocking(move || ledger.update(id, &patch)).await {
        Ok(Ok(record)) => ApiResponse::ok(record),
        Ok(Err(e)) => mutation_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /api/records/:id
async fn delete_record(State(state): State<AppState>, Path(id): Path<RecordId>) -> Response {
    let ledger = state.ledger.clone();
    match tokio::task::spawn_blocking(move || ledger.delete(id)).await {
        Ok(Ok(record)) => ApiResponse::ok(record),
        Ok(Err(e)) => mutation_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/summary", get(get_summary))
        .route("/records", get(list_records).post(add_record))
        .route(
            "/records/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/audit", get(run_all))
        .route("/audit/:pass", get(run_pass))
        .route("/audit/:pass/csv", get(download_pass))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    expense_audit::init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default().validated()?,
    };

    let ledger = ExpenseLedger::open(&args.csv, config.dataset.clone())
        .with_context(|| format!("could not load {}", args.csv.display()))?;
    println!("✓ Loaded {} records from {}", ledger.snapshot().len(), args.csv.display());

    let state = AppState {
        ledger: Arc::new(ledger),
        audit: Arc::new(config.audit),
    };

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;

    println!("\n🚀 Server running on http://{}", args.addr);
    println!("   API: http://{}/api/audit", args.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
