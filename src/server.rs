use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    config::ScanConfig,
    error::{ScanError, ValidationError},
    netdetect,
    portlist::PortList,
    prober::Prober,
    scanner::ScanController,
    types::{Protocol, ProtocolPorts, ScanPhase, ScanReport, Verdict},
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // port list, scan gate and last results
}

#[derive(Debug)]
struct ServerState {
    ports: PortList,
    controller: ScanController,
    // Set from start until the finished report has been stored.
    scan_in_progress: bool,
    results: Option<ScanReport>,
    config: ScanConfig,
    prober: Prober,
}

impl AppState {
    pub fn new(ports: PortList, config: ScanConfig) -> Self {
        let prober = Prober::new(config.probe.clone());
        Self {
            inner: Arc::new(RwLock::new(ServerState {
                ports,
                controller: ScanController::new(),
                scan_in_progress: false,
                results: None,
                config,
                prober,
            })),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowState {
    Pending,
    Checking,
    Open,
    Closed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowStatus {
    pub protocol: Protocol,
    pub port: u16,
    pub status: RowState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub state: ScanPhase,
    pub launched: u64,
    pub resolved: u64,
    pub rows: Vec<RowStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AddPortRequest {
    pub protocol: String,
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub host: Option<String>,
}

/// Build the `/api` router around `state`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/interfaces", get(get_interfaces))
        .route("/ports", get(get_ports).post(post_port))
        .route("/ports/{protocol}/{port}", delete(delete_port))
        .route("/scan", post(post_scan))
        .route("/stop", post(post_stop))
        .route("/status", get(get_status))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, state: AppState) -> Result<()> {
    info!("Serving control API on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, router(state)).await?;
    Ok(())
}

fn error_response(code: StatusCode, msg: impl ToString) -> Response {
    (code, Json(json!({ "error": msg.to_string() }))).into_response()
}

fn busy() -> Response {
    error_response(StatusCode::CONFLICT, ScanError::AlreadyRunning)
}

async fn get_interfaces() -> impl IntoResponse {
    match netdetect::local_ipv4_addrs() {
        Ok(ips) => (StatusCode::OK, Json(ips)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn get_ports(State(app): State<AppState>) -> Json<ProtocolPorts> {
    let s = app.inner.read().await;
    Json(s.ports.ports().clone())
}

async fn post_port(State(app): State<AppState>, Json(req): Json<AddPortRequest>) -> Response {
    let mut s = app.inner.write().await;
    if s.scan_in_progress {
        warn!("Attempted to add port while a scan is running.");
        return busy();
    }
    let protocol = match req.protocol.parse::<Protocol>() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, e),
    };
    let max_range = s.config.max_range;
    match s.ports.add_input(protocol, &req.input, max_range) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            warn!("Rejected {protocol} {:?}: {e}", req.input);
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e)
        }
    }
}

async fn delete_port(
    State(app): State<AppState>,
    Path((protocol, port)): Path<(String, u16)>,
) -> Response {
    let mut s = app.inner.write().await;
    if s.scan_in_progress {
        warn!("Attempted to remove port while a scan is running.");
        return busy();
    }
    let protocol = match protocol.parse::<Protocol>() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, e),
    };
    match s.ports.remove(protocol, port) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ ValidationError::NotFound { .. }) => {
            error!("{e}");
            error_response(StatusCode::NOT_FOUND, e)
        }
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e),
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let host = match req.host.as_deref() {
        Some(h) => match netdetect::parse_host(h) {
            Ok(ip) => ip,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e:#}")),
        },
        None => netdetect::default_host(),
    };

    let handle = {
        let mut s = app.inner.write().await;
        if s.scan_in_progress {
            return busy();
        }
        let snapshot = s.ports.snapshot();
        let config = s.config.clone();
        let prober = s.prober.clone();
        match s.controller.start(snapshot, host, config, prober) {
            Ok(handle) => {
                s.scan_in_progress = true;
                s.results = None;
                handle
            }
            Err(e) => return error_response(StatusCode::CONFLICT, e),
        }
    };

    // Store the report once the completion signal fires.
    let app2 = app.clone();
    tokio::spawn(async move {
        let res = handle.finished().await;
        let mut s = app2.inner.write().await;
        s.scan_in_progress = false;
        match res {
            Ok(report) => {
                info!("Port checking process completed.");
                s.results = Some(report);
            }
            Err(e) => error!("scan error: {e}"),
        }
    });

    let s = app.inner.read().await;
    (StatusCode::ACCEPTED, Json(status_of(&s))).into_response()
}

async fn post_stop(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if s.controller.stop() {
        info!("Stop requested.");
        StatusCode::ACCEPTED
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn get_status(State(app): State<AppState>) -> Json<Status> {
    let s = app.inner.read().await;
    Json(status_of(&s))
}

async fn get_results(State(app): State<AppState>) -> Response {
    let s = app.inner.read().await;
    match s.results.as_ref() {
        Some(res) => (StatusCode::OK, Json(res.clone())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn status_of(s: &ServerState) -> Status {
    let (state, launched, resolved) = match s.controller.progress() {
        Some(p) => (
            p.phase(),
            p.launched.load(std::sync::atomic::Ordering::Relaxed),
            p.resolved.load(std::sync::atomic::Ordering::Relaxed),
        ),
        None => (ScanPhase::Idle, 0, 0),
    };
    let rows = s
        .ports
        .ports()
        .iter()
        .map(|(protocol, port)| {
            let status = if s.scan_in_progress {
                RowState::Checking
            } else {
                match s.results.as_ref() {
                    None => RowState::Pending,
                    Some(r) => match r.verdict_of(protocol, port) {
                        Some(Verdict::Open) => RowState::Open,
                        Some(Verdict::Closed) => RowState::Closed,
                        None => RowState::Unknown,
                    },
                }
            };
            RowStatus { protocol, port, status }
        })
        .collect();
    Status {
        state,
        launched,
        resolved,
        rows,
    }
}
