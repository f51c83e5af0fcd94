use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use ureq::Agent;

use crate::config::ProbeConfig;
use crate::types::{ProbeOutcome, Protocol, Verdict};

/// Map the reachability service's status code to a verdict: only 200 is open.
pub fn classify_status(code: u16) -> Verdict {
    if code == 200 {
        Verdict::Open
    } else {
        Verdict::Closed
    }
}

/// Asks the external reachability service about one port at a time.
///
/// Cheap to clone; clones share one HTTP agent.
#[derive(Clone)]
pub struct Prober {
    config: Arc<ProbeConfig>,
    agent: Agent,
}

impl fmt::Debug for Prober {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prober").field("config", &self.config).finish()
    }
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(config.probe_timeout))
            .http_status_as_error(false)
            .build();
        let agent = Agent::new_with_config(agent_config);
        Self {
            config: Arc::new(config),
            agent,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn url_for(&self, protocol: Protocol, port: u16) -> String {
        let host = self.config.service_host.trim().trim_end_matches('/');
        let path = self.config.service_path.trim().trim_matches('/');
        if path.is_empty() {
            format!("http://{host}/{protocol}/{port}")
        } else {
            format!("http://{host}/{path}/{protocol}/{port}")
        }
    }

    /// Issue the request on the blocking pool and produce exactly one outcome.
    pub async fn probe(&self, protocol: Protocol, port: u16) -> ProbeOutcome {
        let this = self.clone();
        let verdict = match tokio::task::spawn_blocking(move || this.probe_blocking(protocol, port)).await {
            Ok(v) => v,
            Err(e) => {
                error!("Probe task for port {port} ({protocol}) failed: {e}");
                Verdict::Closed
            }
        };
        match verdict {
            Verdict::Open => info!("Port {port} ({protocol}) is open"),
            Verdict::Closed => info!("Port {port} ({protocol}) is closed"),
        }
        ProbeOutcome {
            protocol,
            port,
            verdict,
        }
    }

    /// One GET; every failure mode maps to [`Verdict::Closed`].
    pub fn probe_blocking(&self, protocol: Protocol, port: u16) -> Verdict {
        let url = self.url_for(protocol, port);
        info!("Sending request to {url}");

        let code = match self.agent.get(url.as_str()).call() {
            Ok(res) => res.status().as_u16(),
            Err(ureq::Error::Timeout(t)) => {
                error!("Request timeout ({t:?}) when checking port {port} ({protocol})");
                return Verdict::Closed;
            }
            Err(ureq::Error::Io(e)) => {
                error!("Connection error when checking port {port} ({protocol}): {e}");
                return Verdict::Closed;
            }
            Err(e) => {
                error!("Unexpected error when checking port {port} ({protocol}): {e}");
                return Verdict::Closed;
            }
        };
        debug!("{url} answered {code}");

        match code {
            200 => info!("Port {port} ({protocol}) is open according to API response"),
            400 => warn!("Bad request for port {port} ({protocol})"),
            404 | 444 => warn!("Port {port} ({protocol}) is closed or unreachable"),
            408 => warn!("Request timeout for port {port} ({protocol})"),
            500 => error!("Server error (500) for port {port} ({protocol})"),
            other => warn!("Unexpected status code {other} for port {port} ({protocol})"),
        }
        classify_status(code)
    }
}
