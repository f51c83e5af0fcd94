//! One-shot listener/prober pair used to make the OS firewall ask for permission
//! before the first real scan.

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::listener;
use crate::prober::Prober;
use crate::types::{Protocol, ProtocolPorts};

/// IANA dynamic/private port range.
pub const EPHEMERAL_PORTS: RangeInclusive<u16> = 49152..=65535;
pub const MAX_PORT_ATTEMPTS: usize = 10;

/// Pick a random ephemeral port that is free on all interfaces and not in
/// `listed` under either protocol.
pub fn pick_random_port(max_attempts: usize, listed: &ProtocolPorts) -> Option<u16> {
    let mut rng = rand::thread_rng();
    for attempt in 0..max_attempts {
        let port = rng.gen_range(EPHEMERAL_PORTS);
        if Protocol::ALL.iter().any(|&p| listed.contains(p, port)) {
            debug!("Port {port} is on the scan list, trying another.");
            continue;
        }
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(_) => {
                info!("Port {port} is available.");
                return Some(port);
            }
            Err(_) => warn!(
                "Port {port} is in use, trying another ({} attempts left).",
                max_attempts - attempt - 1
            ),
        }
    }
    error!("Exceeded maximum attempts to find an available port.");
    None
}

/// Fire and forget: tcp and udp listeners plus tcp and udp probes on one random
/// port outside `listed`. Must be called from within a tokio runtime. Returns
/// the chosen port.
pub fn trigger_firewall_prompt(
    config: &ScanConfig,
    prober: &Prober,
    listed: &ProtocolPorts,
) -> Option<u16> {
    let Some(port) = pick_random_port(MAX_PORT_ATTEMPTS, listed) else {
        warn!("Error triggering firewall prompt: no free port found");
        return None;
    };
    info!("Randomly selected port: {port}");

    for protocol in Protocol::ALL {
        tokio::spawn(listener::listen_once(
            protocol,
            Ipv4Addr::UNSPECIFIED,
            port,
            config.listen_timeout,
        ));
        let prober = prober.clone();
        tokio::spawn(async move {
            prober.probe(protocol, port).await;
        });
    }
    Some(port)
}
