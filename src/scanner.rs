use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::listener;
use crate::portlist::PortList;
use crate::prober::Prober;
use crate::types::{ProbeOutcome, Protocol, ScanPhase, ScanReport, Verdict};

/// Scan every port of `ports` on `host` and return the finished report.
///
/// For each (protocol, port) one listener task and one prober task are spawned,
/// unpaired and without pooling. All probers are joined before any listener.
/// Every launched pair appears in exactly one of `open`/`closed` in the result.
pub async fn scan_ports(
    ports: &PortList,
    host: Ipv4Addr,
    config: &ScanConfig,
    prober: &Prober,
) -> ScanReport {
    scan_ports_internal(ports, host, config, prober, CancellationToken::new(), SharedProgress::new()).await
}

/// Live view of a running scan.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub launched: Arc<AtomicU64>,
    pub resolved: Arc<AtomicU64>,
    phase: Arc<watch::Sender<ScanPhase>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ScanPhase::Idle);
        Self {
            launched: Arc::new(AtomicU64::new(0)),
            resolved: Arc::new(AtomicU64::new(0)),
            phase: Arc::new(phase),
        }
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: ScanPhase) {
        self.phase.send_replace(phase);
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Variant that reports into `shared` and accepts a `CancellationToken` acting
/// as the inverted "keep running" flag. The token is only consulted between
/// protocol groups while launching; tasks already in flight always run to
/// completion or timeout.
pub async fn scan_ports_with_shared(
    ports: &PortList,
    host: Ipv4Addr,
    config: &ScanConfig,
    prober: &Prober,
    cancel: CancellationToken,
    shared: SharedProgress,
) -> ScanReport {
    scan_ports_internal(ports, host, config, prober, cancel, shared).await
}

async fn scan_ports_internal(
    ports: &PortList,
    host: Ipv4Addr,
    config: &ScanConfig,
    prober: &Prober,
    cancel: CancellationToken,
    progress: SharedProgress,
) -> ScanReport {
    info!("Worker started.");
    let started_at = now_rfc3339();
    progress.set_phase(ScanPhase::Launching);

    // The collector task owns the report; probers only send outcomes.
    let (tx, rx) = mpsc::channel::<ProbeOutcome>(ports.len().max(1));
    let collector = tokio::spawn(collect_outcomes(rx, progress.resolved.clone()));

    let mut listeners = JoinSet::new();
    let mut probers = JoinSet::new();
    let mut launched: Vec<(Protocol, u16)> = Vec::with_capacity(ports.len());

    for protocol in Protocol::ALL {
        if cancel.is_cancelled() {
            info!("Stop requested; not launching remaining protocols.");
            break;
        }
        for &port in ports.ports().get(protocol) {
            listeners.spawn(listener::listen_once(protocol, host, port, config.listen_timeout));

            let prober = prober.clone();
            let tx = tx.clone();
            probers.spawn(async move {
                let outcome = prober.probe(protocol, port).await;
                if tx.send(outcome).await.is_err() {
                    error!("Dropped outcome for port {port} ({protocol}): collector gone");
                }
            });

            launched.push((protocol, port));
            progress.launched.fetch_add(1, Ordering::Relaxed);
        }
    }
    drop(tx);

    progress.set_phase(ScanPhase::AwaitingProbers);
    while let Some(res) = probers.join_next().await {
        if let Err(e) = res {
            error!("Prober task failed: {e}");
        }
    }
    let mut report = match collector.await {
        Ok(report) => report,
        Err(e) => {
            error!("Outcome collector failed: {e}");
            ScanReport::default()
        }
    };

    progress.set_phase(ScanPhase::AwaitingListeners);
    while let Some(res) = listeners.join_next().await {
        if let Err(e) = res {
            error!("Listener task failed: {e}");
        }
    }

    // A pair whose prober died without reporting defaults to closed.
    for (protocol, port) in launched {
        if report.verdict_of(protocol, port).is_none() {
            warn!("No verdict recorded for port {port} ({protocol}); marking closed");
            report.record(ProbeOutcome {
                protocol,
                port,
                verdict: Verdict::Closed,
            });
            progress.resolved.fetch_add(1, Ordering::Relaxed);
        }
    }

    report.host = host.to_string();
    report.started_at = started_at;
    report.finished_at = now_rfc3339();
    progress.set_phase(ScanPhase::Completed);
    info!(
        "Worker finished: {} open, {} closed.",
        report.open.len(),
        report.closed.len()
    );
    report
}

async fn collect_outcomes(
    mut rx: mpsc::Receiver<ProbeOutcome>,
    resolved: Arc<AtomicU64>,
) -> ScanReport {
    let mut report = ScanReport::default();
    while let Some(outcome) = rx.recv().await {
        if report.record(outcome) {
            resolved.fetch_add(1, Ordering::Relaxed);
        }
    }
    report
}

/// A scan running on its own task.
#[derive(Debug)]
pub struct ScanHandle {
    cancel: CancellationToken,
    progress: SharedProgress,
    done: oneshot::Receiver<ScanReport>,
}

impl ScanHandle {
    /// Lower the keep-running flag. Already launched tasks still finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> &SharedProgress {
        &self.progress
    }

    pub fn phase(&self) -> ScanPhase {
        self.progress.phase()
    }

    /// The completion signal: resolves once, with the final report.
    pub async fn finished(self) -> Result<ScanReport, ScanError> {
        self.done.await.map_err(|_| ScanError::Aborted)
    }
}

/// Spawn a scan over `ports` (a snapshot) and return its handle.
pub fn spawn_scan(ports: PortList, host: Ipv4Addr, config: ScanConfig, prober: Prober) -> ScanHandle {
    let cancel = CancellationToken::new();
    let progress = SharedProgress::new();
    // Visible as active before the task gets scheduled.
    progress.set_phase(ScanPhase::Launching);

    let (done_tx, done) = oneshot::channel();
    let task_cancel = cancel.clone();
    let task_progress = progress.clone();
    tokio::spawn(async move {
        let report =
            scan_ports_internal(&ports, host, &config, &prober, task_cancel, task_progress).await;
        if done_tx.send(report).is_err() {
            warn!("Scan finished but nobody is waiting for the report");
        }
    });

    ScanHandle {
        cancel,
        progress,
        done,
    }
}

/// Allows one scan at a time.
#[derive(Debug, Default)]
pub struct ScanController {
    current: Option<(CancellationToken, SharedProgress)>,
}

impl ScanController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a scan; rejected while the previous one has not completed.
    pub fn start(
        &mut self,
        ports: PortList,
        host: Ipv4Addr,
        config: ScanConfig,
        prober: Prober,
    ) -> Result<ScanHandle, ScanError> {
        if self.is_running() {
            warn!("Attempted to start port checking while a scan is running.");
            return Err(ScanError::AlreadyRunning);
        }
        let handle = spawn_scan(ports, host, config, prober);
        self.current = Some((handle.stop_token(), handle.progress().clone()));
        info!("Started port checking process.");
        Ok(handle)
    }

    /// Request early stop of the current scan. Returns false when idle.
    pub fn stop(&self) -> bool {
        match &self.current {
            Some((cancel, progress)) if progress.phase().is_active() => {
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|(_, progress)| progress.phase().is_active())
    }

    pub fn progress(&self) -> Option<&SharedProgress> {
        self.current.as_ref().map(|(_, p)| p)
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
