use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

use crate::error::{Error, Result};
use crate::types::Target;

/// Every TCP port a full scan covers.
pub const FULL_RANGE: RangeInclusive<u16> = 1..=65535;

/// Parse a caller-supplied TCP port (1..=65535).
pub fn parse_port(s: &str) -> Result<u16> {
    let val: u32 = s
        .trim()
        .parse()
        .map_err(|_| Error::InvalidPort(s.to_string()))?;
    if val == 0 || val > 65535 {
        return Err(Error::InvalidPort(s.to_string()));
    }
    Ok(val as u16)
}

/// Parse a dotted-quad IPv4 address. All four octets are required.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| Error::InvalidIp(s.to_string()))
}

/// Targets for one host across an inclusive port range given as strings.
pub fn targets_for_ports(host: &str, min_port: &str, max_port: &str) -> Result<Vec<Target>> {
    let ip = parse_ipv4(host)?;
    let start = parse_port(min_port)?;
    let end = parse_port(max_port)?;
    if start > end {
        return Err(Error::InvalidRange(format!(
            "min port {start} is greater than max port {end}"
        )));
    }
    Ok((start..=end).map(|p| Target::new(ip, p)).collect())
}

/// Targets for one port across the last octet of an IPv4 range.
///
/// `min_ip` supplies the network prefix; `max_ip` must share the first three
/// octets. Both ends are inclusive.
pub fn targets_for_ips(min_ip: &str, max_ip: &str, port: &str) -> Result<Vec<Target>> {
    let port = parse_port(port)?;
    let lo = parse_ipv4(min_ip)?.octets();
    let hi = parse_ipv4(max_ip)?.octets();
    if lo[..3] != hi[..3] {
        return Err(Error::InvalidRange(format!(
            "{min_ip} and {max_ip} must share the first three octets"
        )));
    }
    if lo[3] > hi[3] {
        return Err(Error::InvalidRange(format!(
            "{min_ip} is greater than {max_ip}"
        )));
    }
    Ok((lo[3]..=hi[3])
        .map(|last| Target::new(Ipv4Addr::new(lo[0], lo[1], lo[2], last), port))
        .collect())
}

/// Targets for every port of one host.
pub fn full_range_targets(host: Ipv4Addr, ports: RangeInclusive<u16>) -> Vec<Target> {
    ports.map(|p| Target::new(host, p)).collect()
}
