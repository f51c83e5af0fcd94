use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a listener waits for its one peer interaction.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(3);
/// Bound on one reachability request. Expiry counts as `Closed`.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Total ports across both protocols, and therefore the concurrency ceiling.
pub const DEFAULT_MAX_PORTS: usize = 128;
/// Largest `end - start` a single range add may span.
pub const DEFAULT_MAX_RANGE: usize = 128;

pub const ENV_SERVICE_HOST: &str = "API_IP";
pub const ENV_SERVICE_PATH: &str = "API_PATH";
pub const ENV_DEBUG: &str = "DEBUG";

/// Where the external reachability service lives.
///
/// Requests go to `http://{service_host}/{service_path}/{protocol}/{port}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub service_host: String,
    pub service_path: String,
    pub probe_timeout: Duration,
}

impl ProbeConfig {
    pub fn new(service_host: impl Into<String>, service_path: impl Into<String>) -> Self {
        Self {
            service_host: service_host.into(),
            service_path: service_path.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Read `API_IP` / `API_PATH`; unset variables become empty strings.
    pub fn from_env() -> Self {
        Self::new(
            env::var(ENV_SERVICE_HOST).unwrap_or_default(),
            env::var(ENV_SERVICE_PATH).unwrap_or_default(),
        )
    }

    pub fn is_configured(&self) -> bool {
        !self.service_host.trim().is_empty()
    }
}

/// Load `KEY=value` pairs from a `.env` file in the working directory or one
/// of its parents. Variables already set in the environment are kept.
///
/// Runs before logging is set up, so problems go to stderr. Returns the file
/// that was read, if any.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            eprintln!("Ignoring unreadable .env file: {e}");
            None
        }
    }
}

/// Same as [`load_dotenv`] for an explicit file.
pub fn load_env_file(path: &Path) -> anyhow::Result<()> {
    dotenvy::from_path(path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub listen_timeout: Duration,
    pub max_ports: usize,
    pub max_range: usize,
    pub probe: ProbeConfig,
}

impl ScanConfig {
    pub fn new(probe: ProbeConfig) -> Self {
        Self {
            listen_timeout: DEFAULT_LISTEN_TIMEOUT,
            max_ports: DEFAULT_MAX_PORTS,
            max_range: DEFAULT_MAX_RANGE,
            probe,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(ProbeConfig::from_env())
    }
}
