#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Router,
};
use port_reach_rs::config::{ProbeConfig, ScanConfig};

/// Scripted stand-in for the reachability service.
#[derive(Clone)]
struct MockState {
    respond: fn(&str, u16) -> u16,
    delay: Duration,
    hits: Arc<AtomicUsize>,
}

pub struct MockService {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockService {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Scan config pointing at this service, with short listener timeouts.
    pub fn scan_config(&self) -> ScanConfig {
        let mut cfg = ScanConfig::new(
            ProbeConfig::new(self.addr.to_string(), "check").with_timeout(Duration::from_secs(5)),
        );
        cfg.listen_timeout = Duration::from_millis(200);
        cfg
    }
}

async fn check(
    State(state): State<MockState>,
    Path((protocol, port)): Path<(String, u16)>,
) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    StatusCode::from_u16((state.respond)(&protocol, port)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serve `GET /check/{protocol}/{port}` answering with `respond(protocol, port)`.
pub async fn spawn_mock_service(respond: fn(&str, u16) -> u16) -> MockService {
    spawn_mock_service_with_delay(respond, Duration::ZERO).await
}

pub async fn spawn_mock_service_with_delay(
    respond: fn(&str, u16) -> u16,
    delay: Duration,
) -> MockService {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = MockState {
        respond,
        delay,
        hits: hits.clone(),
    };
    let app = Router::new()
        .route("/check/{protocol}/{port}", get(check))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockService { addr, hits }
}
