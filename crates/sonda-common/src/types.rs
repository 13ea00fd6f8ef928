//! Wire types for measurement requests, options and result bodies.
//!
//! Everything here serializes with camelCase field names; these structs are
//! the single source of truth for the control-channel payload shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Measurement kind tag carried in the `type` field of the options bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    Dns,
    Ping,
    Traceroute,
    Mtr,
    Http,
}

impl MeasurementKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "dns" => Some(Self::Dns),
            "ping" => Some(Self::Ping),
            "traceroute" => Some(Self::Traceroute),
            "mtr" => Some(Self::Mtr),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementKind::Dns => write!(f, "dns"),
            MeasurementKind::Ping => write!(f, "ping"),
            MeasurementKind::Traceroute => write!(f, "traceroute"),
            MeasurementKind::Mtr => write!(f, "mtr"),
            MeasurementKind::Http => write!(f, "http"),
        }
    }
}

/// Inbound `probe:measurement:request` payload.
///
/// `measurement` stays an untyped value until the responsible handler parses
/// it; a malformed bundle must still produce a terminal result carrying the
/// ids, so deserialization of the options cannot be allowed to reject the
/// whole envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub measurement_id: String,
    pub test_id: String,
    pub measurement: serde_json::Value,
}

impl RequestEnvelope {
    /// The `type` tag of the options bundle, if present.
    pub fn kind_tag(&self) -> Option<&str> {
        self.measurement.get("type").and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Options bundles (one per kind)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsOptions {
    pub target: String,
    #[serde(default)]
    pub query: DnsQuery,
    #[serde(default)]
    pub trace: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsQuery {
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub resolver: Option<String>,
    pub protocol: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingOptions {
    pub target: String,
    pub packets: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteOptions {
    pub target: String,
    pub protocol: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtrOptions {
    pub target: String,
    pub protocol: Option<String>,
    pub port: Option<u16>,
    pub packets: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOptions {
    pub target: String,
    pub port: Option<u16>,
    #[serde(default)]
    pub query: HttpQuery,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpQuery {
    pub method: Option<String>,
    pub protocol: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub resolver: Option<String>,
}

// ---------------------------------------------------------------------------
// Result bodies
// ---------------------------------------------------------------------------

/// The `result` field of a terminal `probe:measurement:result` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementBody {
    Dns(DnsResultBody),
    Ping(PingResultBody),
    Route(RouteResultBody),
    Http(HttpResultBody),
    Generic(GenericResultBody),
}

impl MeasurementBody {
    /// `rawOutput` is present on every body shape.
    pub fn raw_output(&self) -> &str {
        match self {
            MeasurementBody::Dns(b) => &b.raw_output,
            MeasurementBody::Ping(b) => &b.raw_output,
            MeasurementBody::Route(b) => &b.raw_output,
            MeasurementBody::Http(b) => &b.raw_output,
            MeasurementBody::Generic(b) => &b.raw_output,
        }
    }
}

/// Minimal body used for unsupported kinds and the dispatcher's last-resort
/// error funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResultBody {
    pub raw_output: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsResultBody {
    pub answers: Vec<DnsAnswer>,
    pub resolver: String,
    pub timings: DnsTimings,
    pub raw_output: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsTimings {
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsAnswer {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u32,
    pub class: String,
    pub value: DnsValue,
}

/// Record-type specific rendering of the answer value. MX answers carry a
/// structured priority/server pair; everything else is textual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DnsValue {
    Mx { priority: u32, server: String },
    Text(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResultBody {
    pub resolved_address: String,
    pub resolved_hostname: String,
    pub loss: f64,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub times: Vec<PingTiming>,
    pub raw_output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PingTiming {
    pub rtt: f64,
}

/// Shared body for traceroute and MTR results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResultBody {
    pub resolved_address: String,
    pub resolved_hostname: String,
    pub hops: Vec<Hop>,
    pub raw_output: String,
}

/// One router on the path, indexed from the probe outward starting at 1.
/// The hops array is dense; silent hops keep a placeholder entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hop {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_hostname: Option<String>,
    pub asn: Vec<u32>,
    pub timings: Vec<HopTiming>,
    pub stats: HopStats,
    pub duplicate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HopTiming {
    pub rtt: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HopStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    #[serde(rename = "stDev")]
    pub st_dev: f64,
    #[serde(rename = "jAvg")]
    pub j_avg: f64,
    pub loss: f64,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResultBody {
    pub resolved_address: String,
    pub status_code: u16,
    pub http_version: String,
    pub headers: BTreeMap<String, String>,
    pub raw_headers: String,
    pub raw_body: String,
    pub timings: HttpTimings,
    pub tls: TlsCertificateView,
    pub raw_output: String,
}

/// Per-phase request timings in milliseconds. Phases that never completed
/// stay absent (partial timings survive the error path).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTimings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_byte: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Peer-certificate view attached to HTTPS/HTTP2 results.
///
/// Serializes to `{}` when the response socket carried no certificate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertificateView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<CertificateName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<CertificateSubject>,
}

impl TlsCertificateView {
    pub fn is_empty(&self) -> bool {
        self.authorized.is_none() && self.subject.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateName {
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateSubject {
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
    /// Raw `subjectAltName` extension rendering.
    pub alt: String,
}

/// Partial result carried by a `probe:measurement:progress` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hops: Option<Vec<Hop>>,
}

impl ProgressBody {
    pub fn output(chunk: impl Into<String>) -> Self {
        Self {
            raw_output: Some(chunk.into()),
            hops: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope_wire_names() {
        let json = r#"{
            "measurementId": "m1",
            "testId": "t1",
            "measurement": {"type": "ping", "target": "example.com"}
        }"#;
        let req: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(req.measurement_id, "m1");
        assert_eq!(req.test_id, "t1");
        assert_eq!(req.kind_tag(), Some("ping"));
    }

    #[test]
    fn test_kind_round_trip() {
        for tag in ["dns", "ping", "traceroute", "mtr", "http"] {
            let kind = MeasurementKind::parse(tag).unwrap();
            assert_eq!(kind.to_string(), tag);
        }
        assert!(MeasurementKind::parse("ntp").is_none());
    }

    #[test]
    fn test_tls_view_serializes_empty() {
        let view = TlsCertificateView::default();
        assert!(view.is_empty());
        let json = serde_json::to_string(&view).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_hop_stats_wire_names() {
        let stats = HopStats {
            min: 1.0,
            avg: 2.0,
            max: 3.0,
            st_dev: 0.5,
            j_avg: 0.25,
            loss: 0.0,
            count: 3,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("stDev").is_some());
        assert!(json.get("jAvg").is_some());
    }

    #[test]
    fn test_mx_value_shape() {
        let answer = DnsAnswer {
            name: "example.com.".to_string(),
            record_type: "MX".to_string(),
            ttl: 3600,
            class: "IN".to_string(),
            value: DnsValue::Mx {
                priority: 10,
                server: "mail.example.com.".to_string(),
            },
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["value"]["priority"], 10);
        assert_eq!(json["value"]["server"], "mail.example.com.");
    }

    #[test]
    fn test_http_timings_skip_missing_phases() {
        let timings = HttpTimings {
            dns: Some(3),
            total: Some(20),
            ..Default::default()
        };
        let json = serde_json::to_value(&timings).unwrap();
        assert_eq!(json["dns"], 3);
        assert!(json.get("tls").is_none());
        assert!(json.get("firstByte").is_none());
    }
}
