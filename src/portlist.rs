//! The user's port list: unique ports per protocol under a total-count ceiling.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ValidationError;
use crate::ports::{check_acceptable, expand_range, parse_port, parse_range};
use crate::types::{Protocol, ProtocolPorts};

/// Ordered, de-duplicated ports per protocol, bounded by `max_ports` in total.
///
/// Every mutation goes through the validator in [`crate::ports`], so the
/// invariants hold at all times: values in 1..=65535, no duplicate within a
/// protocol, `len() <= max_ports`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortList {
    ports: ProtocolPorts,
    max_ports: usize,
}

/// What a port-or-range add actually did.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AddSummary {
    pub added: Vec<u16>,
    pub skipped: Vec<u16>,
}

impl PortList {
    pub fn new(max_ports: usize) -> Self {
        Self {
            ports: ProtocolPorts::default(),
            max_ports,
        }
    }

    pub fn ports(&self) -> &ProtocolPorts {
        &self.ports
    }

    pub fn max_ports(&self) -> usize {
        self.max_ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_ports
    }

    /// Append one port. The list is unchanged on error.
    pub fn insert(&mut self, protocol: Protocol, port: u32) -> Result<(), ValidationError> {
        let port = check_acceptable(protocol, port, &self.ports)?;
        if self.is_full() {
            return Err(ValidationError::CapacityExceeded { max: self.max_ports });
        }
        self.ports.get_mut(protocol).push(port);
        Ok(())
    }

    pub fn remove(&mut self, protocol: Protocol, port: u16) -> Result<(), ValidationError> {
        let ports = self.ports.get_mut(protocol);
        match ports.iter().position(|&p| p == port) {
            Some(idx) => {
                ports.remove(idx);
                info!("Removed port {port} for protocol {protocol}.");
                Ok(())
            }
            None => Err(ValidationError::NotFound { protocol, port }),
        }
    }

    /// Immutable copy handed to a scan.
    pub fn snapshot(&self) -> PortList {
        self.clone()
    }

    /// Add a single port or a `start-end` range typed by the user.
    pub fn add_input(
        &mut self,
        protocol: Protocol,
        raw: &str,
        max_range: usize,
    ) -> Result<AddSummary, ValidationError> {
        if self.is_full() {
            warn!("Maximum allowed port in the table reached ({}).", self.max_ports);
            return Err(ValidationError::CapacityExceeded { max: self.max_ports });
        }
        let raw = raw.trim();
        match parse_range(raw)? {
            Some((start, end)) => self.add_range(protocol, start, end, max_range),
            None => {
                let port = parse_port(raw)?;
                self.insert(protocol, u32::from(port))?;
                info!("Added port {port} for protocol {protocol}.");
                Ok(AddSummary {
                    added: vec![port],
                    skipped: Vec::new(),
                })
            }
        }
    }

    /// Insert every port of `start..=end` that is still acceptable. Ports that
    /// are already listed, or that no longer fit, are skipped individually.
    pub fn add_range(
        &mut self,
        protocol: Protocol,
        start: u16,
        end: u16,
        max_range: usize,
    ) -> Result<AddSummary, ValidationError> {
        let candidates = expand_range(start, end, max_range).inspect_err(|e| warn!("{e}"))?;
        info!(
            "Adding port range from {start} to {end} for protocol {protocol} ({} ports).",
            candidates.len()
        );
        let mut summary = AddSummary::default();
        for port in candidates {
            match self.insert(protocol, u32::from(port)) {
                Ok(()) => summary.added.push(port),
                Err(e) => {
                    warn!("Skipping port {port}: {e}");
                    summary.skipped.push(port);
                }
            }
        }
        Ok(summary)
    }
}

impl Default for PortList {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_PORTS)
    }
}
