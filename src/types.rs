use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Transport protocol a port is checked for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Every supported protocol, in probing/display order.
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ValidationError;

    /// Case-insensitive: the picker shows `TCP`/`UDP`, the wire uses `tcp`/`udp`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(ValidationError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Verdict for one (protocol, port) pair.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Open,
    Closed,
}

/// The single, never revised, result of one prober task.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub protocol: Protocol,
    pub port: u16,
    pub verdict: Verdict,
}

/// Ports grouped by protocol, each group kept in insertion order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolPorts {
    pub tcp: Vec<u16>,
    pub udp: Vec<u16>,
}

impl ProtocolPorts {
    pub fn get(&self, protocol: Protocol) -> &[u16] {
        match protocol {
            Protocol::Tcp => &self.tcp,
            Protocol::Udp => &self.udp,
        }
    }

    pub fn get_mut(&mut self, protocol: Protocol) -> &mut Vec<u16> {
        match protocol {
            Protocol::Tcp => &mut self.tcp,
            Protocol::Udp => &mut self.udp,
        }
    }

    pub fn contains(&self, protocol: Protocol, port: u16) -> bool {
        self.get(protocol).contains(&port)
    }

    pub fn len(&self) -> usize {
        self.tcp.len() + self.udp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(protocol, port)` pairs, tcp first.
    pub fn iter(&self) -> impl Iterator<Item = (Protocol, u16)> + '_ {
        Protocol::ALL
            .into_iter()
            .flat_map(move |p| self.get(p).iter().map(move |&port| (p, port)))
    }
}

/// Aggregate open/closed verdicts for one completed scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub open: ProtocolPorts,
    pub closed: ProtocolPorts,
    pub host: String,
    pub started_at: String,
    pub finished_at: String,
}

impl ScanReport {
    /// Record an outcome. Outcomes for a pair that already has a verdict are ignored.
    pub fn record(&mut self, outcome: ProbeOutcome) -> bool {
        if self.verdict_of(outcome.protocol, outcome.port).is_some() {
            return false;
        }
        let bucket = match outcome.verdict {
            Verdict::Open => &mut self.open,
            Verdict::Closed => &mut self.closed,
        };
        bucket.get_mut(outcome.protocol).push(outcome.port);
        true
    }

    pub fn verdict_of(&self, protocol: Protocol, port: u16) -> Option<Verdict> {
        if self.open.contains(protocol, port) {
            Some(Verdict::Open)
        } else if self.closed.contains(protocol, port) {
            Some(Verdict::Closed)
        } else {
            None
        }
    }

    /// Number of pairs with a verdict.
    pub fn resolved(&self) -> usize {
        self.open.len() + self.closed.len()
    }
}

/// Coordinator state over one scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Launching,
    AwaitingProbers,
    AwaitingListeners,
    Completed,
}

impl ScanPhase {
    pub fn is_active(&self) -> bool {
        !matches!(self, ScanPhase::Idle | ScanPhase::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parse_is_case_insensitive() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!(" udp ".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert!(matches!(
            "sctp".parse::<Protocol>(),
            Err(ValidationError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn report_records_each_pair_once() {
        let mut report = ScanReport::default();
        assert!(report.record(ProbeOutcome { protocol: Protocol::Tcp, port: 80, verdict: Verdict::Open }));
        assert!(!report.record(ProbeOutcome { protocol: Protocol::Tcp, port: 80, verdict: Verdict::Closed }));
        assert!(report.record(ProbeOutcome { protocol: Protocol::Udp, port: 80, verdict: Verdict::Closed }));
        assert_eq!(report.open.tcp, vec![80]);
        assert_eq!(report.closed.udp, vec![80]);
        assert!(report.closed.tcp.is_empty());
        assert_eq!(report.resolved(), 2);
    }

    #[test]
    fn report_serializes_as_protocol_maps() {
        let mut report = ScanReport::default();
        report.record(ProbeOutcome { protocol: Protocol::Tcp, port: 8080, verdict: Verdict::Open });
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["open"]["tcp"], serde_json::json!([8080]));
        assert_eq!(v["closed"]["udp"], serde_json::json!([]));
    }

    #[test]
    fn protocol_ports_iterates_tcp_first() {
        let ports = ProtocolPorts { tcp: vec![22, 80], udp: vec![53] };
        let pairs: Vec<_> = ports.iter().collect();
        assert_eq!(
            pairs,
            vec![(Protocol::Tcp, 22), (Protocol::Tcp, 80), (Protocol::Udp, 53)]
        );
    }
}
