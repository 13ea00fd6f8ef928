//! Enrichment lookups: Team Cymru ASN origin queries and reverse DNS.
//!
//! All lookups are best-effort. A failed or slow query leaves the affected
//! field empty and is never allowed to fail the measurement that asked
//! for it.

pub mod asn;
pub mod rdns;

pub use asn::{parse_origin_txt, reverse_origin_name};

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use sonda_common::LookupSettings;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

/// Shared enrichment client over the system resolver.
#[derive(Clone)]
pub struct Enricher {
    resolver: Arc<TokioAsyncResolver>,
    settings: LookupSettings,
}

impl Enricher {
    /// Build an enricher over the system resolver configuration, falling
    /// back to the library defaults when no system configuration exists.
    pub fn from_system(settings: LookupSettings) -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!("system resolver config unavailable ({}), using defaults", e);
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self {
            resolver: Arc::new(resolver),
            settings,
        }
    }

    pub fn resolver(&self) -> &TokioAsyncResolver {
        &self.resolver
    }

    /// ASN list for one address; empty on any failure or private address.
    pub async fn asn_for(&self, addr: IpAddr) -> Vec<u32> {
        asn::lookup(&self.resolver, addr, self.settings.asn_timeout()).await
    }

    /// Reverse-DNS hostname with a short timeout; `None` on any failure.
    pub async fn reverse(&self, addr: IpAddr) -> Option<String> {
        rdns::lookup(&self.resolver, addr, self.settings.rdns_timeout()).await
    }

    /// Concurrent ASN lookups for a batch of addresses, fanned out at most
    /// as wide as the batch itself. Results come back keyed by address;
    /// failed lookups simply produce empty lists.
    pub async fn asn_batch(
        &self,
        addresses: Vec<String>,
    ) -> std::collections::BTreeMap<String, Vec<u32>> {
        use futures::stream::{self, StreamExt};

        let fanout = addresses.len().max(1);
        stream::iter(addresses)
            .map(|address| {
                let enricher = self.clone();
                async move {
                    let asn = match address.parse::<IpAddr>() {
                        Ok(ip) => enricher.asn_for(ip).await,
                        Err(_) => Vec::new(),
                    };
                    (address, asn)
                }
            })
            .buffer_unordered(fanout)
            .collect()
            .await
    }
}
