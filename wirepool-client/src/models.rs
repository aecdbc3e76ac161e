use std::fmt;

use crate::body::{Body, BodyReader};
use crate::error::Error;

pub use wirepool_net::Header;

/// A structurally-split request URL. No normalization is applied beyond
/// separating the four components; the target is kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub target: Vec<u8>,
}

impl Url {
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        target: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            target: target.into(),
        }
    }

    pub fn parse(url: &str) -> Result<Self, Error> {
        let (scheme, rest) = url.split_once("://").ok_or_else(|| {
            Error::UnsupportedProtocol(
                "Request URL is missing an 'http://' or 'https://' protocol.".to_string(),
            )
        })?;

        let (authority, target) = match rest.find(['/', '?']) {
            Some(idx) => (&rest[..idx], rest[idx..].as_bytes().to_vec()),
            None => (rest, b"/".to_vec()),
        };

        let (host, port) = if let Some(bracket_end) = authority.find(']') {
            // IPv6 literal, e.g. [::1]:8080
            let host = &authority[..bracket_end + 1];
            let port = match authority[bracket_end + 1..].strip_prefix(':') {
                Some(raw) => Some(parse_port(raw)?),
                None => None,
            };
            (host, port)
        } else {
            match authority.split_once(':') {
                Some((host, raw)) => (host, Some(parse_port(raw)?)),
                None => (authority, None),
            }
        };

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            target,
        })
    }

    /// The pool key for this URL, with the port defaulted from the
    /// scheme when absent.
    pub fn origin(&self) -> Origin {
        let port = self.port.unwrap_or(match self.scheme.as_str() {
            "https" => 443,
            _ => 80,
        });
        Origin {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port,
        }
    }

    /// The absolute-form bytes of this URL, used as the request target
    /// when forwarding through a proxy.
    pub fn to_absolute_form(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(self.scheme.as_bytes());
        bytes.extend_from_slice(b"://");
        bytes.extend_from_slice(self.host.as_bytes());
        if let Some(port) = self.port {
            bytes.extend_from_slice(format!(":{port}").as_bytes());
        }
        bytes.extend_from_slice(&self.target);
        bytes
    }
}

fn parse_port(raw: &str) -> Result<u16, Error> {
    raw.parse::<u16>()
        .map_err(|_| Error::LocalProtocol(format!("invalid port in URL: {raw:?}")))
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{}", String::from_utf8_lossy(&self.target))
    }
}

/// The (scheme, host, port) tuple identifying a server endpoint. Two
/// origins are equal iff all three components are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Per-operation timeouts, carried on request extensions. `None` means
/// wait indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Option<std::time::Duration>,
    pub read: Option<std::time::Duration>,
    pub write: Option<std::time::Duration>,
    pub pool: Option<std::time::Duration>,
}

#[derive(Debug, Default)]
pub struct Extensions {
    pub timeouts: Timeouts,
    /// Overrides the TLS SNI hostname; defaults to the request host.
    pub sni_hostname: Option<String>,
    /// Forces (`Some(true)`) or forbids (`Some(false)`) HTTP/2 for this
    /// request. `None` defers to ALPN negotiation.
    pub http2: Option<bool>,
}

pub struct Request {
    pub method: String,
    pub url: Url,
    pub headers: Vec<Header>,
    pub body: Body,
    pub extensions: Extensions,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
            headers: Vec::new(),
            body: Body::Empty,
            extensions: Extensions::default(),
        }
    }

    pub fn get(url: &str) -> Result<Self, Error> {
        Ok(Self::new("GET", Url::parse(url)?))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ResponseExtensions {
    pub http_version: Vec<u8>,
    pub reason_phrase: Vec<u8>,
    /// The underlying network stream, exposed only for CONNECT requests
    /// and successful upgrades.
    pub network_stream: Option<crate::backend::NetworkStream>,
}

pub struct Response {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: BodyReader,
    pub extensions: ResponseExtensions,
}

impl Response {
    /// Read the entire body and release the underlying connection.
    pub async fn read(&mut self) -> Result<Vec<u8>, Error> {
        let mut content = Vec::new();
        let result = loop {
            match self.body.chunk().await {
                Ok(Some(chunk)) => content.extend_from_slice(&chunk),
                Ok(None) => break Ok(content),
                Err(err) => break Err(err),
            }
        };
        self.body.close().await;
        result
    }

    /// Release the body without consuming it. Idempotent.
    pub async fn close(&mut self) {
        self.body.close().await;
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

/// The host header value for a URL: the port is elided when it matches
/// the scheme default.
pub(crate) fn host_header_value(url: &Url) -> Vec<u8> {
    let default_port = match url.scheme.as_str() {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    };
    match url.port {
        Some(port) if default_port != Some(port) => {
            format!("{}:{}", url.host, port).into_bytes()
        }
        _ => url.host.as_bytes().to_vec(),
    }
}

/// Synthesize the framing headers a well-formed request requires: a
/// `Host` header when absent, and `Content-Length` or
/// `Transfer-Encoding: chunked` when the body needs them.
pub(crate) fn prepare_headers(headers: &[Header], url: &Url, body: &Body) -> Vec<Header> {
    let mut prepared = Vec::with_capacity(headers.len() + 2);

    let has_host = headers.iter().any(|header| header.is("host"));
    if !has_host {
        prepared.push(Header::new("Host", host_header_value(url)));
    }
    prepared.extend_from_slice(headers);

    let has_framing = headers
        .iter()
        .any(|header| header.is("content-length") || header.is("transfer-encoding"));
    if !has_framing {
        match body {
            Body::Empty => {}
            Body::Bytes(bytes) => {
                prepared.push(Header::new("Content-Length", bytes.len().to_string()));
            }
            Body::Stream(_) => {
                prepared.push(Header::new("Transfer-Encoding", "chunked"));
            }
        }
    }

    prepared
}

/// Append `override_headers` to `default_headers`, dropping defaults
/// that the overrides redefine.
pub(crate) fn merge_headers(
    default_headers: &[Header],
    override_headers: &[Header],
) -> Vec<Header> {
    let mut merged: Vec<Header> = default_headers
        .iter()
        .filter(|default| {
            !override_headers
                .iter()
                .any(|header| header.name.eq_ignore_ascii_case(&default.name))
        })
        .cloned()
        .collect();
    merged.extend_from_slice(override_headers);
    merged
}

#[cfg(test)]
mod tests {
    use super::{merge_headers, prepare_headers, Header, Origin, Url};
    use crate::body::Body;

    #[test]
    fn parses_url_components() {
        let url = Url::parse("https://example.com:8443/path?q=1").unwrap();
        assert_eq!(url.scheme, "https");
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, Some(8443));
        assert_eq!(url.target, b"/path?q=1");
    }

    #[test]
    fn default_target_is_root() {
        let url = Url::parse("http://example.com").unwrap();
        assert_eq!(url.target, b"/");
    }

    #[test]
    fn origin_defaults_port_from_scheme() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(url.origin(), Origin::new("https", "example.com", 443));
        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(url.origin(), Origin::new("http", "example.com", 80));
    }

    #[test]
    fn origin_round_trips_through_display() {
        let url = Url::parse("https://example.com:444/a/b").unwrap();
        let rendered = url.to_string();
        let reparsed = Url::parse(&rendered).unwrap();
        assert_eq!(reparsed.origin(), url.origin());
    }

    #[test]
    fn parses_ipv6_authority() {
        let url = Url::parse("http://[::1]:8080/").unwrap();
        assert_eq!(url.host, "[::1]");
        assert_eq!(url.port, Some(8080));
    }

    #[test]
    fn missing_scheme_is_rejected() {
        assert!(Url::parse("example.com/").is_err());
    }

    #[test]
    fn host_header_elides_default_port() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(super::host_header_value(&url), b"example.com");
        let url = Url::parse("https://example.com:8443/").unwrap();
        assert_eq!(super::host_header_value(&url), b"example.com:8443");
    }

    #[test]
    fn prepare_headers_injects_host_and_content_length() {
        let url = Url::parse("http://example.com/").unwrap();
        let headers = prepare_headers(&[], &url, &Body::Bytes(b"hello".to_vec()));
        assert_eq!(headers[0], Header::new("Host", "example.com"));
        assert_eq!(headers[1], Header::new("Content-Length", "5"));
    }

    #[test]
    fn prepare_headers_respects_existing_host() {
        let url = Url::parse("http://example.com/").unwrap();
        let given = vec![Header::new("host", "other.example")];
        let headers = prepare_headers(&given, &url, &Body::Empty);
        assert_eq!(headers, given);
    }

    #[test]
    fn merge_headers_prefers_overrides() {
        let merged = merge_headers(
            &[
                Header::new("Proxy-Authorization", "secret"),
                Header::new("Via", "proxy"),
            ],
            &[Header::new("via", "direct")],
        );
        assert_eq!(
            merged,
            vec![
                Header::new("Proxy-Authorization", "secret"),
                Header::new("via", "direct"),
            ]
        );
    }

    #[test]
    fn absolute_form_preserves_explicit_port() {
        let url = Url::parse("http://example.com:8080/path").unwrap();
        assert_eq!(url.to_absolute_form(), b"http://example.com:8080/path");
    }
}
