use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::ValidationError;
use crate::portlist::PortList;
use crate::types::{Protocol, ProtocolPorts};

/// Highest valid port number. Inclusive everywhere.
pub const MAX_PORT: u32 = 65535;

/// Parse a bare port: decimal digits only, 1..=65535.
pub fn parse_port(raw: &str) -> Result<u16, ValidationError> {
    let invalid = || ValidationError::InvalidPort(raw.to_string());
    if !is_decimal(raw) {
        return Err(invalid());
    }
    let val: u32 = raw.parse().map_err(|_| invalid())?;
    if !(1..=MAX_PORT).contains(&val) {
        return Err(invalid());
    }
    Ok(val as u16)
}

/// Parse an inclusive `start-end` range.
///
/// Returns `Ok(None)` when `raw` has no `-` at all. Anything containing `-` must
/// be exactly two decimal numbers with `1 <= start < end <= 65535`; every other
/// shape is an [`ValidationError::InvalidRange`], never a fallthrough to
/// single-port parsing.
pub fn parse_range(raw: &str) -> Result<Option<(u16, u16)>, ValidationError> {
    if !raw.contains('-') {
        return Ok(None);
    }
    let invalid = || ValidationError::InvalidRange(raw.to_string());
    let mut parts = raw.split('-');
    let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if !is_decimal(a) || !is_decimal(b) {
        return Err(invalid());
    }
    let start: u32 = a.parse().map_err(|_| invalid())?;
    let end: u32 = b.parse().map_err(|_| invalid())?;
    if start < 1 || end > MAX_PORT || start >= end {
        return Err(invalid());
    }
    Ok(Some((start as u16, end as u16)))
}

/// Expand a validated range into its ports, ascending.
///
/// Rejects ranges where `end - start > max_range`. The caller re-validates and
/// inserts each port individually, so a range may be only partially accepted.
pub fn expand_range(start: u16, end: u16, max_range: usize) -> Result<Vec<u16>, ValidationError> {
    if start == 0 || start > end {
        return Err(ValidationError::InvalidRange(format!("{start}-{end}")));
    }
    if usize::from(end - start) > max_range {
        return Err(ValidationError::RangeTooLarge { start, end, max: max_range });
    }
    Ok((start..=end).collect())
}

/// Check that `port` may be added for `protocol`: in range and not already listed.
pub fn check_acceptable(
    protocol: Protocol,
    port: u32,
    list: &ProtocolPorts,
) -> Result<u16, ValidationError> {
    if !(1..=MAX_PORT).contains(&port) {
        return Err(ValidationError::OutOfRange(port));
    }
    let port = port as u16;
    if list.contains(protocol, port) {
        return Err(ValidationError::Duplicate { protocol, port });
    }
    Ok(port)
}

/// Predicate form of [`check_acceptable`] taking a raw protocol tag.
pub fn is_acceptable(protocol: &str, port: u32, list: &ProtocolPorts) -> bool {
    match protocol.parse::<Protocol>() {
        // Tags are lowercase on the wire; `TCP` is a picker label, not a tag.
        Ok(p) if p.as_str() == protocol => check_acceptable(p, port, list).is_ok(),
        _ => false,
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a `--port` argument: `[tcp:|udp:]<port-or-range>`, defaulting to tcp.
pub fn parse_port_arg(arg: &str) -> Result<(Protocol, &str), ValidationError> {
    match arg.split_once(':') {
        Some((proto, spec)) => Ok((proto.parse()?, spec.trim())),
        None => Ok((Protocol::Tcp, arg.trim())),
    }
}

/// Parse ports file content into `list`.
///
/// Supported formats per line:
/// - `80` or `8000-8010` (tcp)
/// - `udp 53`, `tcp 22-25`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// Syntax errors abort with the line number. Duplicates and a full list only
/// skip the affected entry.
pub fn parse_ports_str(s: &str, list: &mut PortList, max_range: usize) -> Result<()> {
    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (protocol, spec) = match fields.as_slice() {
            [spec] => (Protocol::Tcp, *spec),
            [proto, spec] => (
                proto
                    .parse::<Protocol>()
                    .with_context(|| format!("line {line_no}: invalid protocol: {proto}"))?,
                *spec,
            ),
            _ => bail!("line {line_no}: expected `[tcp|udp] <port-or-range>`, got: {line}"),
        };

        match list.add_input(protocol, spec, max_range) {
            Ok(_) => {}
            Err(e @ (ValidationError::Duplicate { .. } | ValidationError::CapacityExceeded { .. })) => {
                warn!("line {line_no}: skipping {protocol} {spec}: {e}");
            }
            Err(e) => bail!("line {line_no}: {e}"),
        }
    }
    Ok(())
}

/// Load a ports file into `list`. Errors if the file cannot be read or parsed.
pub fn load_ports_from_path(
    path: impl AsRef<Path>,
    list: &mut PortList,
    max_range: usize,
) -> Result<()> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content, list, max_range)
}
