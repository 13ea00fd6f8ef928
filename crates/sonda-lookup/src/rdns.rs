//! Reverse-DNS hostname lookup with a short timeout.

use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;
use tracing::trace;

/// PTR lookup for one address. Returns the first name with the trailing
/// root dot trimmed; `None` on failure or timeout so the caller's flow is
/// never blocked for long.
pub async fn lookup(
    resolver: &TokioAsyncResolver,
    addr: IpAddr,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, resolver.reverse_lookup(addr)).await {
        Ok(Ok(names)) => names
            .iter()
            .next()
            .map(|name| name.to_string().trim_end_matches('.').to_string()),
        Ok(Err(e)) => {
            trace!(%addr, "reverse lookup failed: {}", e);
            None
        }
        Err(_) => {
            trace!(%addr, "reverse lookup timed out");
            None
        }
    }
}
