//! Host reachability probes.
//!
//! [`TcpProbe`] checks liveness the way an echo-port ping does: it opens a
//! TCP connection to a well-known port on the host. A completed handshake
//! and an active refusal both prove the host is up; silence, an unknown
//! name, or an unreachable route do not.

use std::io;
use std::time::Duration;

use tokio::net::{TcpStream, lookup_host};
use tracing::debug;

use crate::core::{ECHO_PORT, Reachability, ReachabilityProbe};

/// TCP connect probe against a fixed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpProbe {
    port: u16,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpProbe {
    /// Probe the echo port.
    pub fn new() -> Self {
        Self { port: ECHO_PORT }
    }

    /// Probe a specific port instead of the echo port.
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }

    /// Port this probe connects to.
    pub fn port(&self) -> u16 {
        self.port
    }

    async fn check(&self, host: &str) -> Reachability {
        let addrs = match lookup_host((host, self.port)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(host, error = %e, "probe: name resolution failed");
                return Reachability::Unreachable;
            }
        };

        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(_) => return Reachability::Reachable,
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    return Reachability::Reachable;
                }
                Err(e) => debug!(%addr, error = %e, "probe: connect failed"),
            }
        }

        Reachability::Unreachable
    }
}

impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, host: &str, timeout: Duration) -> Reachability {
        match tokio::time::timeout(timeout, self.check(host)).await {
            Ok(reachability) => reachability,
            Err(_) => {
                debug!(host, ?timeout, "probe timed out");
                Reachability::Unreachable
            }
        }
    }
}

/// Probe that always reports the host as reachable.
///
/// Skips the liveness check; the connect attempt alone decides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssumeReachable;

impl ReachabilityProbe for AssumeReachable {
    async fn probe(&self, _host: &str, _timeout: Duration) -> Reachability {
        Reachability::Reachable
    }
}
