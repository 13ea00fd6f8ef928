//! HTTP wire driver: resolve, connect, optional TLS, then a hyper
//! http1/http2 exchange over the hand-established stream. Doing the stream
//! setup by hand is what makes the remote address, per-phase timings and
//! peer certificate observable.

use super::tls::{self, RecordingVerifier};
use bytes::Bytes;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use sonda_common::{is_private_ip, HttpTimings, MeasurementSettings, TlsCertificateView};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    Http,
    Https,
    Http2,
}

/// A normalized request, ready to go on the wire.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub host: String,
    pub port: u16,
    pub protocol: WireProtocol,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub resolver: Option<String>,
}

impl RequestPlan {
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }

    fn default_port(&self) -> u16 {
        match self.protocol {
            WireProtocol::Http => 80,
            _ => 443,
        }
    }

    fn host_header(&self) -> String {
        if self.port == self.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Failure carrying whatever phase data had accumulated when it hit.
#[derive(Debug)]
pub struct HttpFailure {
    pub message: String,
    pub code: String,
    pub timings: HttpTimings,
    pub tls: TlsCertificateView,
}

/// Response data before result-body shaping.
#[derive(Debug)]
pub struct WireResponse {
    pub resolved_address: String,
    pub status_code: u16,
    pub http_version: String,
    /// Header lines in received order, names as emitted by the peer.
    pub header_lines: Vec<(String, String)>,
    /// Body text, capped at the configured limit.
    pub body: String,
    pub timings: HttpTimings,
    pub tls: TlsCertificateView,
}

enum Sender {
    H1(hyper::client::conn::http1::SendRequest<Empty<Bytes>>),
    H2(hyper::client::conn::http2::SendRequest<Empty<Bytes>>),
}

impl Sender {
    async fn send(
        &mut self,
        request: Request<Empty<Bytes>>,
    ) -> hyper::Result<hyper::Response<hyper::body::Incoming>> {
        match self {
            Sender::H1(sender) => sender.send_request(request).await,
            Sender::H2(sender) => sender.send_request(request).await,
        }
    }
}

fn failure(
    message: impl Into<String>,
    code: &str,
    timings: HttpTimings,
    tls: &TlsCertificateView,
) -> Box<HttpFailure> {
    Box::new(HttpFailure {
        message: message.into(),
        code: code.to_string(),
        timings,
        tls: tls.clone(),
    })
}

fn io_code(e: &std::io::Error) -> &'static str {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::ConnectionRefused => "ECONNREFUSED",
        ErrorKind::ConnectionReset => "ECONNRESET",
        ErrorKind::ConnectionAborted => "ECONNABORTED",
        ErrorKind::TimedOut => "ETIMEDOUT",
        ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        ErrorKind::NotConnected => "ENOTCONN",
        _ => "EUNKNOWN",
    }
}

fn hyper_code(e: &hyper::Error) -> &'static str {
    if e.is_timeout() {
        "ETIMEDOUT"
    } else if e.is_incomplete_message() {
        "ECONNRESET"
    } else {
        "EPROTO"
    }
}

fn version_label(version: hyper::Version) -> &'static str {
    match version {
        hyper::Version::HTTP_09 => "0.9",
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        hyper::Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

fn ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Execute the request. Body chunks are handed to `on_body_chunk` as they
/// arrive (already capped), so the caller can stream them as progress.
pub async fn execute<F>(
    plan: &RequestPlan,
    system_resolver: &TokioAsyncResolver,
    settings: &MeasurementSettings,
    mut on_body_chunk: F,
) -> Result<WireResponse, Box<HttpFailure>>
where
    F: FnMut(&str),
{
    let started = Instant::now();
    let deadline = started + settings.http_timeout();
    let mut timings = HttpTimings::default();
    let mut tls_view = TlsCertificateView::default();

    // Phase: resolve
    let address = match plan.host.parse::<IpAddr>() {
        Ok(ip) => {
            timings.dns = Some(0);
            ip
        }
        Err(_) => {
            let resolve_started = Instant::now();
            let lookup = match &plan.resolver {
                Some(ns) => {
                    let resolver = resolver_for(ns)
                        .ok_or_else(|| failure("invalid resolver", "EINVAL", timings, &tls_view))?;
                    tokio::time::timeout_at(deadline, resolver.lookup_ip(plan.host.as_str())).await
                }
                None => {
                    tokio::time::timeout_at(deadline, system_resolver.lookup_ip(plan.host.as_str()))
                        .await
                }
            };
            let addr = match lookup {
                Ok(Ok(lookup)) => lookup.iter().next(),
                Ok(Err(e)) => {
                    return Err(failure(
                        format!("ENOTFOUND {}: {}", plan.host, e),
                        "ENOTFOUND",
                        timings,
                        &tls_view,
                    ))
                }
                Err(_) => {
                    return Err(failure("request timed out", "ETIMEDOUT", timings, &tls_view))
                }
            };
            let Some(addr) = addr else {
                return Err(failure(
                    format!("ENOTFOUND {}", plan.host),
                    "ENOTFOUND",
                    timings,
                    &tls_view,
                ));
            };
            timings.dns = Some(ms(resolve_started));
            addr
        }
    };

    if is_private_ip(address) {
        return Err(failure(
            "Private IP ranges are not allowed",
            "EACCES",
            timings,
            &tls_view,
        ));
    }

    // Phase: connect
    let tcp_started = Instant::now();
    let stream = match tokio::time::timeout_at(deadline, TcpStream::connect((address, plan.port)))
        .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(failure(
                format!("connect {}:{} failed: {}", address, plan.port, e),
                io_code(&e),
                timings,
                &tls_view,
            ))
        }
        Err(_) => return Err(failure("request timed out", "ETIMEDOUT", timings, &tls_view)),
    };
    timings.tcp = Some(ms(tcp_started));
    let resolved_address = address.to_string();

    // Phase: TLS (https/http2) and protocol handshake
    let mut sender = match plan.protocol {
        WireProtocol::Http => {
            let io = TokioIo::new(stream);
            let (sender, conn) =
                match tokio::time::timeout_at(deadline, hyper::client::conn::http1::handshake(io))
                    .await
                {
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => {
                        return Err(failure(e.to_string(), hyper_code(&e), timings, &tls_view))
                    }
                    Err(_) => {
                        return Err(failure("request timed out", "ETIMEDOUT", timings, &tls_view))
                    }
                };
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!("http connection ended: {}", e);
                }
            });
            Sender::H1(sender)
        }
        WireProtocol::Https | WireProtocol::Http2 => {
            let verifier = RecordingVerifier::new()
                .map_err(|e| failure(e.to_string(), "EPROTO", timings, &tls_view))?;
            let alpn: Vec<Vec<u8>> = match plan.protocol {
                WireProtocol::Http2 => vec![b"h2".to_vec()],
                _ => vec![b"http/1.1".to_vec()],
            };
            let config = tls::client_config(verifier.clone(), alpn);
            let connector = TlsConnector::from(Arc::new(config));
            let server_name = ServerName::try_from(plan.host.clone())
                .map_err(|_| failure("invalid server name", "EINVAL", timings, &tls_view))?;

            let tls_started = Instant::now();
            let stream =
                match tokio::time::timeout_at(deadline, connector.connect(server_name, stream))
                    .await
                {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        return Err(failure(e.to_string(), io_code(&e), timings, &tls_view))
                    }
                    Err(_) => {
                        return Err(failure("request timed out", "ETIMEDOUT", timings, &tls_view))
                    }
                };
            timings.tls = Some(ms(tls_started));

            {
                let (_, session) = stream.get_ref();
                if let Some(end_entity) = session.peer_certificates().and_then(|c| c.first()) {
                    tls_view =
                        tls::certificate_view(end_entity.as_ref(), verifier.verification_error());
                }
            }

            let io = TokioIo::new(stream);
            if plan.protocol == WireProtocol::Http2 {
                let handshake = hyper::client::conn::http2::handshake(TokioExecutor::new(), io);
                let (sender, conn) = match tokio::time::timeout_at(deadline, handshake).await {
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => {
                        return Err(failure(e.to_string(), hyper_code(&e), timings, &tls_view))
                    }
                    Err(_) => {
                        return Err(failure("request timed out", "ETIMEDOUT", timings, &tls_view))
                    }
                };
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!("http2 connection ended: {}", e);
                    }
                });
                Sender::H2(sender)
            } else {
                let (sender, conn) =
                    match tokio::time::timeout_at(deadline, hyper::client::conn::http1::handshake(io))
                        .await
                    {
                        Ok(Ok(pair)) => pair,
                        Ok(Err(e)) => {
                            return Err(failure(e.to_string(), hyper_code(&e), timings, &tls_view))
                        }
                        Err(_) => {
                            return Err(failure(
                                "request timed out",
                                "ETIMEDOUT",
                                timings,
                                &tls_view,
                            ))
                        }
                    };
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!("https connection ended: {}", e);
                    }
                });
                Sender::H1(sender)
            }
        }
    };

    // Phase: request/response head
    let method = hyper::Method::from_bytes(plan.method.to_uppercase().as_bytes())
        .map_err(|e| failure(e.to_string(), "EINVAL", timings, &tls_view))?;
    let uri = match plan.protocol {
        // HTTP/2 pseudo-headers derive from the full URI
        WireProtocol::Http2 => format!("https://{}{}", plan.host_header(), plan.path_and_query()),
        _ => plan.path_and_query(),
    };
    let mut builder = Request::builder().method(method).uri(uri);
    if plan.protocol != WireProtocol::Http2 {
        builder = builder.header(hyper::header::HOST, plan.host_header());
    }
    for (name, value) in &plan.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let request = builder
        .body(Empty::<Bytes>::new())
        .map_err(|e| failure(e.to_string(), "EINVAL", timings, &tls_view))?;

    let send_started = Instant::now();
    let mut response = match tokio::time::timeout_at(deadline, sender.send(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(failure(e.to_string(), hyper_code(&e), timings, &tls_view)),
        Err(_) => return Err(failure("request timed out", "ETIMEDOUT", timings, &tls_view)),
    };
    timings.first_byte = Some(ms(send_started));

    let status_code = response.status().as_u16();
    let http_version = version_label(response.version()).to_string();
    let header_lines: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();

    // Phase: body download, capped
    let download_started = Instant::now();
    let limit = settings.http_body_limit;
    let mut body = String::new();
    loop {
        let frame = match tokio::time::timeout_at(deadline, response.body_mut().frame()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                timings.download = Some(ms(download_started));
                return Err(failure(e.to_string(), hyper_code(&e), timings, &tls_view));
            }
            Ok(None) => break,
            Err(_) => {
                timings.download = Some(ms(download_started));
                return Err(failure("request timed out", "ETIMEDOUT", timings, &tls_view));
            }
        };
        if let Some(data) = frame.data_ref() {
            let text = String::from_utf8_lossy(data);
            let keep = limit.saturating_sub(body.len());
            if keep == 0 {
                continue; // past the cap: keep draining, drop the bytes
            }
            let kept: String = if text.len() <= keep {
                text.into_owned()
            } else {
                text.chars()
                    .scan(0usize, |taken, c| {
                        *taken += c.len_utf8();
                        (*taken <= keep).then_some(c)
                    })
                    .collect()
            };
            if !kept.is_empty() {
                on_body_chunk(&kept);
                body.push_str(&kept);
            }
        }
    }
    timings.download = Some(ms(download_started));
    timings.total = Some(ms(started));

    Ok(WireResponse {
        resolved_address,
        status_code,
        http_version,
        header_lines,
        body,
        timings,
        tls: tls_view,
    })
}

/// Resolver pinned to the requested nameserver; `None` when the override is
/// not an IP literal.
fn resolver_for(nameserver: &str) -> Option<TokioAsyncResolver> {
    let ip: IpAddr = nameserver.parse().ok()?;
    let group = NameServerConfigGroup::from_ips_clear(&[ip], 53, true);
    let config = ResolverConfig::from_parts(None, vec![], group);
    Some(TokioAsyncResolver::tokio(config, ResolverOpts::default()))
}
