//! TLS session plumbing for the HTTP handler: a verdict-recording
//! certificate verifier and the peer-certificate view.
//!
//! The probe reports on broken certificates instead of refusing to talk to
//! them, so verification failures are recorded and the handshake proceeds;
//! the verdict surfaces as `authorized`/`authorizationError` in the result.

use chrono::SecondsFormat;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sonda_common::{CertificateName, CertificateSubject, TlsCertificateView};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};

/// Web-PKI verifier that records the first verification failure instead of
/// aborting the handshake.
#[derive(Debug)]
pub struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    error: Mutex<Option<String>>,
}

impl RecordingVerifier {
    pub fn new() -> Result<Arc<Self>, rustls::Error> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.into(),
        };
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        Ok(Arc::new(Self {
            inner,
            error: Mutex::new(None),
        }))
    }

    /// The recorded verification failure, if any.
    pub fn verification_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|guard| guard.clone())
    }

    fn record(&self, err: rustls::Error) {
        if let Ok(mut guard) = self.error.lock() {
            guard.get_or_insert(err.to_string());
        }
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(verified) => Ok(verified),
            Err(e) => {
                self.record(e);
                Ok(ServerCertVerified::assertion())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        match self.inner.verify_tls12_signature(message, cert, dss) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                self.record(e);
                Ok(HandshakeSignatureValid::assertion())
            }
        }
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        match self.inner.verify_tls13_signature(message, cert, dss) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                self.record(e);
                Ok(HandshakeSignatureValid::assertion())
            }
        }
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Client config with the recording verifier and the given ALPN protocols.
pub fn client_config(verifier: Arc<RecordingVerifier>, alpn: Vec<Vec<u8>>) -> ClientConfig {
    let mut config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    config.alpn_protocols = alpn;
    config
}

/// Build the certificate view from the peer's end-entity certificate.
pub fn certificate_view(der: &[u8], verification_error: Option<String>) -> TlsCertificateView {
    let Ok((_, cert)) = X509Certificate::from_der(der) else {
        return TlsCertificateView::default();
    };

    TlsCertificateView {
        authorized: Some(verification_error.is_none()),
        authorization_error: verification_error,
        created_at: iso_utc(cert.validity().not_before.timestamp()),
        expires_at: iso_utc(cert.validity().not_after.timestamp()),
        issuer: Some(CertificateName {
            attributes: name_attributes(cert.issuer()),
        }),
        subject: Some(CertificateSubject {
            attributes: name_attributes(cert.subject()),
            alt: subject_alt(&cert),
        }),
    }
}

fn name_attributes(name: &X509Name<'_>) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut put = |key: &str, value: Option<&str>| {
        if let Some(value) = value {
            attributes.insert(key.to_string(), value.to_string());
        }
    };
    put("CN", name.iter_common_name().next().and_then(|a| a.as_str().ok()));
    put("O", name.iter_organization().next().and_then(|a| a.as_str().ok()));
    put(
        "OU",
        name.iter_organizational_unit()
            .next()
            .and_then(|a| a.as_str().ok()),
    );
    put("C", name.iter_country().next().and_then(|a| a.as_str().ok()));
    put(
        "ST",
        name.iter_state_or_province()
            .next()
            .and_then(|a| a.as_str().ok()),
    );
    put("L", name.iter_locality().next().and_then(|a| a.as_str().ok()));
    attributes
}

/// Raw `subjectAltName` rendering: `DNS:a.example, DNS:*.a.example`.
fn subject_alt(cert: &X509Certificate<'_>) -> String {
    cert.subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .map(render_general_name)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn render_general_name(name: &GeneralName<'_>) -> String {
    match name {
        GeneralName::DNSName(dns) => format!("DNS:{}", dns),
        GeneralName::IPAddress(bytes) => format!("IP Address:{}", render_ip(bytes)),
        GeneralName::RFC822Name(email) => format!("email:{}", email),
        GeneralName::URI(uri) => format!("URI:{}", uri),
        other => format!("{:?}", other),
    }
}

fn render_ip(bytes: &[u8]) -> String {
    match bytes.len() {
        4 => std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string(),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            std::net::Ipv6Addr::from(octets).to_string()
        }
        _ => "invalid".to_string(),
    }
}

fn iso_utc(timestamp: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_utc() {
        assert_eq!(iso_utc(0).as_deref(), Some("1970-01-01T00:00:00Z"));
        assert_eq!(iso_utc(1767225600).as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_render_ip() {
        assert_eq!(render_ip(&[1, 2, 3, 4]), "1.2.3.4");
        assert_eq!(render_ip(&[0, 1]), "invalid");
    }

    #[test]
    fn test_view_from_garbage_der_is_empty() {
        let view = certificate_view(b"not a certificate", None);
        assert!(view.is_empty());
    }
}
