//! Option validation and normalization.
//!
//! Each kind gets a tight whitelist of enumerated values, numeric bounds
//! and defaults. Failures name the offending field and abort the
//! measurement before any network activity.

use serde::de::DeserializeOwned;
use sonda_common::{
    DnsOptions, Error, HttpOptions, MtrOptions, PingOptions, Result, TracerouteOptions,
};

const DNS_RECORD_TYPES: &[&str] = &[
    "A", "AAAA", "ANY", "CNAME", "DNSKEY", "DS", "HTTPS", "MX", "NS", "NSEC", "PTR", "RRSIG",
    "SOA", "SRV", "TXT",
];

const ROUTE_PROTOCOLS: &[&str] = &["icmp", "tcp", "udp"];
const DNS_PROTOCOLS: &[&str] = &["udp", "tcp"];
const HTTP_METHODS: &[&str] = &["get", "head", "options"];
const HTTP_PROTOCOLS: &[&str] = &["http", "https", "http2"];

pub const MIN_PACKETS: u32 = 1;
pub const MAX_PACKETS: u32 = 16;
pub const DEFAULT_PACKETS: u32 = 3;

fn parse<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::invalid_option("measurement", e.to_string()))
}

/// Targets end up on a subprocess argv; reject anything that is not a
/// plausible hostname or IP literal, in particular leading dashes.
fn check_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(Error::invalid_option("target", "must not be empty"));
    }
    if target.starts_with('-') {
        return Err(Error::invalid_option("target", "must not start with a dash"));
    }
    if !target
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
    {
        return Err(Error::invalid_option(
            "target",
            "contains characters not allowed in a hostname or IP",
        ));
    }
    Ok(())
}

fn whitelist(field: &str, value: &mut Option<String>, default: &str, allowed: &[&str]) -> Result<()> {
    let normalized = value
        .as_deref()
        .map(|v| v.to_lowercase())
        .unwrap_or_else(|| default.to_string());
    if !allowed.contains(&normalized.as_str()) {
        return Err(Error::invalid_option(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }
    *value = Some(normalized);
    Ok(())
}

fn check_packets(field: &str, value: &mut Option<u32>) -> Result<()> {
    let packets = value.unwrap_or(DEFAULT_PACKETS);
    if !(MIN_PACKETS..=MAX_PACKETS).contains(&packets) {
        return Err(Error::invalid_option(
            field,
            format!("must be between {} and {}", MIN_PACKETS, MAX_PACKETS),
        ));
    }
    *value = Some(packets);
    Ok(())
}

pub fn dns(value: &serde_json::Value) -> Result<DnsOptions> {
    let mut opts: DnsOptions = parse(value)?;
    check_target(&opts.target)?;

    let record_type = opts
        .query
        .record_type
        .as_deref()
        .map(|t| t.to_uppercase())
        .unwrap_or_else(|| "A".to_string());
    if !DNS_RECORD_TYPES.contains(&record_type.as_str()) {
        return Err(Error::invalid_option(
            "query.type",
            format!("must be one of: {}", DNS_RECORD_TYPES.join(", ")),
        ));
    }
    opts.query.record_type = Some(record_type);

    whitelist("query.protocol", &mut opts.query.protocol, "udp", DNS_PROTOCOLS)?;
    opts.query.port.get_or_insert(53);

    if let Some(resolver) = &opts.query.resolver {
        check_target(resolver).map_err(|_| {
            Error::invalid_option("query.resolver", "must be a hostname or IP literal")
        })?;
    }

    Ok(opts)
}

pub fn ping(value: &serde_json::Value) -> Result<PingOptions> {
    let mut opts: PingOptions = parse(value)?;
    check_target(&opts.target)?;
    check_packets("packets", &mut opts.packets)?;
    Ok(opts)
}

pub fn traceroute(value: &serde_json::Value) -> Result<TracerouteOptions> {
    let mut opts: TracerouteOptions = parse(value)?;
    check_target(&opts.target)?;
    whitelist("protocol", &mut opts.protocol, "icmp", ROUTE_PROTOCOLS)?;
    opts.port.get_or_insert(80);
    Ok(opts)
}

pub fn mtr(value: &serde_json::Value) -> Result<MtrOptions> {
    let mut opts: MtrOptions = parse(value)?;
    check_target(&opts.target)?;
    whitelist("protocol", &mut opts.protocol, "icmp", ROUTE_PROTOCOLS)?;
    opts.port.get_or_insert(80);
    check_packets("packets", &mut opts.packets)?;
    Ok(opts)
}

pub fn http(value: &serde_json::Value) -> Result<HttpOptions> {
    let mut opts: HttpOptions = parse(value)?;
    check_target(&opts.target)?;

    whitelist("query.method", &mut opts.query.method, "head", HTTP_METHODS)?;
    whitelist("query.protocol", &mut opts.query.protocol, "https", HTTP_PROTOCOLS)?;

    let path = opts.query.path.take().unwrap_or_else(|| "/".to_string());
    opts.query.path = Some(if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    });

    if let Some(query) = opts.query.query.take() {
        opts.query.query = Some(query.trim_start_matches('?').to_string());
    }

    let default_port = match opts.query.protocol.as_deref() {
        Some("http") => 80,
        _ => 443,
    };
    opts.port.get_or_insert(default_port);

    if let Some(resolver) = &opts.query.resolver {
        check_target(resolver).map_err(|_| {
            Error::invalid_option("query.resolver", "must be a hostname or IP literal")
        })?;
    }

    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dns_defaults_and_normalization() {
        let opts = dns(&json!({
            "type": "dns",
            "target": "example.com",
            "query": {"type": "mx", "protocol": "TCP"}
        }))
        .unwrap();
        assert_eq!(opts.query.record_type.as_deref(), Some("MX"));
        assert_eq!(opts.query.protocol.as_deref(), Some("tcp"));
        assert_eq!(opts.query.port, Some(53));
        assert!(!opts.trace);
    }

    #[test]
    fn test_dns_rejects_unknown_record_type() {
        let err = dns(&json!({"type": "dns", "target": "example.com", "query": {"type": "AXFR"}}))
            .unwrap_err();
        assert!(err.to_string().contains("query.type"));
    }

    #[test]
    fn test_ping_packet_bounds() {
        let opts = ping(&json!({"type": "ping", "target": "example.com"})).unwrap();
        assert_eq!(opts.packets, Some(3));

        let err =
            ping(&json!({"type": "ping", "target": "example.com", "packets": 17})).unwrap_err();
        assert!(err.to_string().contains("packets"));
        assert!(err.to_string().contains("between 1 and 16"));

        let err = ping(&json!({"type": "ping", "target": "example.com", "packets": 0})).unwrap_err();
        assert!(err.to_string().contains("packets"));
    }

    #[test]
    fn test_traceroute_protocol_whitelist() {
        let opts = traceroute(&json!({"type": "traceroute", "target": "example.com", "protocol": "ICMP"}))
            .unwrap();
        assert_eq!(opts.protocol.as_deref(), Some("icmp"));
        assert_eq!(opts.port, Some(80));

        let err = traceroute(&json!({"type": "traceroute", "target": "example.com", "protocol": "sctp"}))
            .unwrap_err();
        assert!(err.to_string().contains("protocol"));
    }

    #[test]
    fn test_mtr_defaults() {
        let opts = mtr(&json!({"type": "mtr", "target": "example.com"})).unwrap();
        assert_eq!(opts.protocol.as_deref(), Some("icmp"));
        assert_eq!(opts.packets, Some(3));
        assert_eq!(opts.port, Some(80));
    }

    #[test]
    fn test_http_defaults() {
        let opts = http(&json!({"type": "http", "target": "example.com", "query": {}})).unwrap();
        assert_eq!(opts.query.method.as_deref(), Some("head"));
        assert_eq!(opts.query.protocol.as_deref(), Some("https"));
        assert_eq!(opts.query.path.as_deref(), Some("/"));
        assert_eq!(opts.port, Some(443));
    }

    #[test]
    fn test_http_path_and_query_normalization() {
        let opts = http(&json!({
            "type": "http",
            "target": "example.com",
            "query": {"method": "GET", "protocol": "http", "path": "status", "query": "?a=1"}
        }))
        .unwrap();
        assert_eq!(opts.query.method.as_deref(), Some("get"));
        assert_eq!(opts.query.path.as_deref(), Some("/status"));
        assert_eq!(opts.query.query.as_deref(), Some("a=1"));
        assert_eq!(opts.port, Some(80));
    }

    #[test]
    fn test_http_rejects_unknown_method() {
        let err = http(&json!({"type": "http", "target": "example.com", "query": {"method": "post"}}))
            .unwrap_err();
        assert!(err.to_string().contains("query.method"));
    }

    #[test]
    fn test_target_injection_rejected() {
        for bad in ["", "-badflag", "a b", "host;rm"] {
            assert!(ping(&json!({"type": "ping", "target": bad})).is_err(), "{bad}");
        }
    }
}
