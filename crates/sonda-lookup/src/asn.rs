//! ASN origin lookup via the Team Cymru `origin.asn.cymru.com` TXT zone.

use hickory_resolver::TokioAsyncResolver;
use sonda_common::is_private_ip;
use std::net::IpAddr;
use std::time::Duration;
use tracing::trace;

/// Reverse the IPv4 octets into the Cymru origin query name:
/// `1.2.3.4` -> `4.3.2.1.origin.asn.cymru.com.`
pub fn reverse_origin_name(addr: std::net::Ipv4Addr) -> String {
    let [a, b, c, d] = addr.octets();
    format!("{}.{}.{}.{}.origin.asn.cymru.com.", d, c, b, a)
}

/// Parse a Cymru origin TXT value. The record is pipe-separated and its
/// first segment is a space-delimited ASN list:
/// `"13335 | 104.16.0.0/12 | US | arin | 2014-03-28"` -> `[13335]`.
/// Any token that fails integer parsing empties the whole list.
pub fn parse_origin_txt(txt: &str) -> Vec<u32> {
    let Some(first) = txt.split('|').next() else {
        return Vec::new();
    };
    let parsed: Option<Vec<u32>> = first
        .split_whitespace()
        .map(|token| token.parse::<u32>().ok())
        .collect();
    parsed.unwrap_or_default()
}

/// Look up the ASN list for one address. Private addresses, IPv6, timeouts
/// and malformed records all yield an empty list; enrichment failures stay
/// silent.
pub async fn lookup(resolver: &TokioAsyncResolver, addr: IpAddr, timeout: Duration) -> Vec<u32> {
    if is_private_ip(addr) {
        return Vec::new();
    }
    let IpAddr::V4(v4) = addr else {
        return Vec::new();
    };

    let name = reverse_origin_name(v4);
    let lookup = match tokio::time::timeout(timeout, resolver.txt_lookup(name)).await {
        Ok(Ok(lookup)) => lookup,
        Ok(Err(e)) => {
            trace!(%addr, "ASN lookup failed: {}", e);
            return Vec::new();
        }
        Err(_) => {
            trace!(%addr, "ASN lookup timed out");
            return Vec::new();
        }
    };

    lookup
        .iter()
        .next()
        .map(|txt| {
            let value = txt
                .txt_data()
                .iter()
                .map(|bytes| String::from_utf8_lossy(bytes))
                .collect::<String>();
            parse_origin_txt(&value)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_origin_name() {
        let addr: std::net::Ipv4Addr = "104.16.132.229".parse().unwrap();
        assert_eq!(
            reverse_origin_name(addr),
            "229.132.16.104.origin.asn.cymru.com."
        );
    }

    #[test]
    fn test_parse_single_asn() {
        assert_eq!(
            parse_origin_txt("13335 | 104.16.0.0/12 | US | arin | 2014-03-28"),
            vec![13335]
        );
    }

    #[test]
    fn test_parse_multiple_asns() {
        assert_eq!(
            parse_origin_txt("64512 64513 | 198.41.0.0/24 | US | arin |"),
            vec![64512, 64513]
        );
    }

    #[test]
    fn test_parse_failure_yields_empty() {
        assert_eq!(parse_origin_txt("NA | something"), Vec::<u32>::new());
        assert_eq!(parse_origin_txt(""), Vec::<u32>::new());
    }

    #[test]
    fn test_round_trip_through_txt_format() {
        let asns = vec![13335u32, 209242];
        let txt = format!(
            "{} | 104.16.0.0/12 | US | arin | 2014-03-28",
            asns.iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );
        assert_eq!(parse_origin_txt(&txt), asns);
    }
}
