//! Single TCP connect attempts and their classified outcomes.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::{self, TcpStream};
use tokio::time;
use tracing::trace;

use crate::types::Target;

/// Outcome of one probe. Every variant is terminal; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The peer accepted the connection.
    Open(Target),
    /// The peer is reachable but nothing listens on the port.
    Refused,
    ResolutionFailed { host: String },
    /// Socket-level failure: timeout, unreachable, reset and friends.
    ConnectError { code: Option<i32>, reason: String },
    Unexpected { detail: String },
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Open(t) => write!(f, "{}:{} is open.", t.host, t.port),
            ProbeResult::Refused => f.write_str("Connection refused (no listener or too busy)."),
            ProbeResult::ResolutionFailed { host } => {
                write!(f, "Unable to resolve host \"{host}\".")
            }
            ProbeResult::ConnectError {
                code: Some(code),
                reason,
            } => write!(f, "Connect returned {code} ({reason})."),
            ProbeResult::ConnectError { code: None, reason } => {
                write!(f, "Unable to connect ({reason}).")
            }
            ProbeResult::Unexpected { detail } => write!(f, "Received error: {detail}"),
        }
    }
}

/// Probe an already-resolved target. Never blocks longer than `timeout`.
pub async fn probe_target(target: Target, timeout: Duration) -> ProbeResult {
    time::timeout(timeout, connect(target))
        .await
        .unwrap_or_else(|_| timed_out(timeout))
}

/// Resolve `host` (literal IPv4 or name) and probe its first IPv4 address.
///
/// Resolution and connect share one `timeout` budget.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    time::timeout(timeout, resolve_and_connect(host, port))
        .await
        .unwrap_or_else(|_| timed_out(timeout))
}

async fn resolve_and_connect(host: &str, port: u16) -> ProbeResult {
    let resolved = match net::lookup_host((host, port)).await {
        Ok(addrs) => addrs,
        Err(_) => {
            return ProbeResult::ResolutionFailed {
                host: host.to_string(),
            }
        }
    };
    let v4 = resolved.into_iter().find_map(|a| match a.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    });
    match v4 {
        Some(ip) => connect(Target::new(ip, port)).await,
        None => ProbeResult::Unexpected {
            detail: format!("\"{host}\" has no IPv4 address"),
        },
    }
}

async fn connect(target: Target) -> ProbeResult {
    let addr = SocketAddr::new(IpAddr::V4(target.host), target.port);
    let result = match TcpStream::connect(addr).await {
        // The stream is dropped, and the socket closed, right here.
        Ok(_stream) => ProbeResult::Open(target),
        Err(e) => classify_io_error(&e),
    };
    trace!(host = %target.host, port = target.port, outcome = %result, "probe");
    result
}

fn timed_out(timeout: Duration) -> ProbeResult {
    ProbeResult::ConnectError {
        code: None,
        reason: format!("timed out after {}ms", timeout.as_millis()),
    }
}

fn classify_io_error(e: &io::Error) -> ProbeResult {
    if e.kind() == io::ErrorKind::ConnectionRefused {
        return ProbeResult::Refused;
    }
    match e.raw_os_error() {
        Some(code) => ProbeResult::ConnectError {
            code: Some(code),
            reason: e.kind().to_string(),
        },
        None => ProbeResult::Unexpected {
            detail: e.to_string(),
        },
    }
}
