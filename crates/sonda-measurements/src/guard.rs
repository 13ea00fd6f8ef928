//! Private-destination filter.
//!
//! Runs after validation and before any tool is spawned. IP literals are
//! checked directly; hostnames are resolved through the system resolver and
//! the first resolved address is checked. Checking only the first address
//! is a deliberate, known gap for multi-homed hostnames.

use hickory_resolver::TokioAsyncResolver;
use sonda_common::{is_private_ip, Error, Result};
use std::net::IpAddr;

/// Resolve and vet a measurement target. Returns the address the
/// measurement is allowed to contact.
pub async fn ensure_public_target(target: &str, resolver: &TokioAsyncResolver) -> Result<IpAddr> {
    if let Ok(addr) = target.parse::<IpAddr>() {
        return vet(addr);
    }

    let lookup = resolver
        .lookup_ip(target)
        .await
        .map_err(|e| Error::Lookup(format!("could not resolve {}: {}", target, e)))?;

    let addr = lookup
        .iter()
        .next()
        .ok_or_else(|| Error::Lookup(format!("no addresses found for {}", target)))?;

    vet(addr)
}

fn vet(addr: IpAddr) -> Result<IpAddr> {
    if is_private_ip(addr) {
        Err(Error::PrivateDestination)
    } else {
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vet_rejects_private_literals() {
        assert!(matches!(
            vet("10.0.0.1".parse().unwrap()),
            Err(Error::PrivateDestination)
        ));
        assert!(matches!(
            vet("127.0.0.1".parse().unwrap()),
            Err(Error::PrivateDestination)
        ));
        assert!(matches!(
            vet("fe80::1".parse().unwrap()),
            Err(Error::PrivateDestination)
        ));
    }

    #[test]
    fn test_vet_accepts_public_literals() {
        assert!(vet("8.8.8.8".parse().unwrap()).is_ok());
        assert!(vet("2606:4700:4700::1111".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_rejection_renders_fixed_text() {
        let err = vet("192.168.1.1".parse().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "Private IP ranges are not allowed");
    }
}
