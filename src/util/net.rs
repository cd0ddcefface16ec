//! Network reachability probe.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// True when any probe address accepts a TCP connection within the timeout.
///
/// Probes are plain `host:port` socket addresses (DNS resolvers by
/// default), tried in order; the first success short-circuits. Malformed
/// probe entries are skipped with a warning rather than failing the check.
pub fn probe_online(probes: &[String], timeout: Duration) -> bool {
    for probe in probes {
        let addr: SocketAddr = match probe.parse() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(probe = %probe, error = %e, "skipping malformed connectivity probe");
                continue;
            }
        };
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}
