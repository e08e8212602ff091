use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    error::{Error, Result},
    jobs::JobQueue,
    query::{CheckResponse, ErrorBody, QueryService},
};

#[derive(Clone)]
pub struct AppState {
    query: QueryService,
    jobs: Option<Arc<JobQueue>>, // None when the continuous path is disabled
}

impl AppState {
    pub fn new(query: QueryService, jobs: Option<Arc<JobQueue>>) -> Self {
        Self { query, jobs }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub continuous: bool,
    pub queued: usize,
    pub queued_macs: Vec<String>,
    pub concurrency: usize,
    pub timeout_ms: u64,
}

/// Build the API router, nested under `base` (e.g. `/portscan`).
pub fn router(state: AppState, base: &str) -> Router {
    let api = Router::new()
        .route("/{ip}/{port}/json", get(immediate_check))
        .route("/ips/{min_ip}/{max_ip}/{port}/json", get(range_by_ips))
        .route("/ports/{ip}/{min_port}/{max_port}/json", get(range_by_ports))
        .route("/hosts/json", get(list_hosts))
        .route("/hosts/{mac}/json", get(cached_host))
        .route("/status/json", get(status))
        .with_state(state);

    let base = normalize_base(base);
    let app = if base.is_empty() {
        api
    } else {
        Router::new().nest(&base, api)
    };
    app.layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` fires.
pub async fn serve(bind: &str, base: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, base, "query interface listening");
    axum::serve(listener, router(state, base))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

fn normalize_base(base: &str) -> String {
    let trimmed = base.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn error_response(e: Error) -> Response {
    let code = if e.is_invalid_input() {
        StatusCode::BAD_REQUEST
    } else {
        error!("request failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(ErrorBody::new(e.to_string()))).into_response()
}

async fn immediate_check(
    State(app): State<AppState>,
    Path((ip, port)): Path<(String, String)>,
) -> Response {
    match app.query.immediate_check(&ip, &port).await {
        Ok(res) => (StatusCode::OK, Json(CheckResponse::from(res))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn range_by_ips(
    State(app): State<AppState>,
    Path((min_ip, max_ip, port)): Path<(String, String, String)>,
) -> Response {
    match app.query.range_scan_by_ips(&min_ip, &max_ip, &port).await {
        Ok(res) => (StatusCode::OK, Json(res)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn range_by_ports(
    State(app): State<AppState>,
    Path((ip, min_port, max_port)): Path<(String, String, String)>,
) -> Response {
    match app.query.range_scan_by_ports(&ip, &min_port, &max_port).await {
        Ok(res) => (StatusCode::OK, Json(res)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn cached_host(State(app): State<AppState>, Path(mac): Path<String>) -> Response {
    match app.query.get_cached_result(&mac) {
        Ok(Some(rec)) => (StatusCode::OK, Json(rec)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(ErrorBody::host_not_found())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_hosts(State(app): State<AppState>) -> Response {
    match app.query.list_cached_hosts() {
        Ok(hosts) => (StatusCode::OK, Json(hosts)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn status(State(app): State<AppState>) -> impl IntoResponse {
    let settings = app.query.settings();
    let out = Status {
        continuous: app.jobs.is_some(),
        queued: app.jobs.as_ref().map_or(0, |j| j.len()),
        queued_macs: app.jobs.as_ref().map(|j| j.queued_macs()).unwrap_or_default(),
        concurrency: settings.concurrency,
        timeout_ms: settings.timeout.as_millis() as u64,
    };
    (StatusCode::OK, Json(out))
}
