use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::backend::{NetworkBackend, NetworkStream, SocketOption, TlsParams};
use crate::error::Error;
use crate::http11::Http11Connection;
use crate::http2::Http2Connection;
use crate::models::{Extensions, Origin, Request, Response};

const RETRY_BACKOFF_FACTOR: f64 = 0.5;

/// Everything needed to dial an origin. Shared by every connection a
/// pool creates.
#[derive(Clone)]
pub(crate) struct ConnectConfig {
    pub backend: Arc<dyn NetworkBackend>,
    pub keepalive_expiry: Option<Duration>,
    pub http1: bool,
    pub http2: bool,
    pub retries: u32,
    pub local_address: Option<String>,
    pub uds: Option<String>,
    pub socket_options: Vec<SocketOption>,
}

/// The negotiated per-socket protocol engine.
#[derive(Clone)]
pub(crate) enum ProtocolConnection {
    H1(Http11Connection),
    H2(Http2Connection),
}

impl ProtocolConnection {
    pub(crate) async fn handle_request(&self, request: &mut Request) -> Result<Response, Error> {
        match self {
            ProtocolConnection::H1(conn) => conn.handle_request(request).await,
            ProtocolConnection::H2(conn) => conn.handle_request(request).await,
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        match self {
            ProtocolConnection::H1(conn) => conn.is_available(),
            ProtocolConnection::H2(conn) => conn.is_available(),
        }
    }

    pub(crate) fn has_expired(&self) -> bool {
        match self {
            ProtocolConnection::H1(conn) => conn.has_expired(),
            ProtocolConnection::H2(conn) => conn.has_expired(),
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        match self {
            ProtocolConnection::H1(conn) => conn.is_idle(),
            ProtocolConnection::H2(conn) => conn.is_idle(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        match self {
            ProtocolConnection::H1(conn) => conn.is_closed(),
            ProtocolConnection::H2(conn) => conn.is_closed(),
        }
    }

    pub(crate) fn close(&self) {
        match self {
            ProtocolConnection::H1(conn) => conn.close(),
            ProtocolConnection::H2(conn) => conn.close(),
        }
    }

    pub(crate) fn attempt_close(&self) -> bool {
        match self {
            ProtocolConnection::H1(conn) => conn.attempt_close(),
            ProtocolConnection::H2(conn) => conn.attempt_close(),
        }
    }

    pub(crate) fn info(&self) -> String {
        match self {
            ProtocolConnection::H1(conn) => conn.info(),
            ProtocolConnection::H2(conn) => conn.info(),
        }
    }
}

/// A pool-managed connection. The protocol engine is created lazily on
/// the first request, once the socket is open and ALPN has settled the
/// protocol choice.
#[derive(Clone)]
pub(crate) struct HttpConnection {
    shared: Arc<Shared>,
}

struct Shared {
    origin: Origin,
    config: ConnectConfig,
    request_lock: AsyncMutex<()>,
    state: StdMutex<ConnState>,
}

#[derive(Default)]
struct ConnState {
    proto: Option<ProtocolConnection>,
    connect_failed: bool,
    closed: bool,
}

impl HttpConnection {
    pub(crate) fn new(origin: Origin, config: ConnectConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                origin,
                config,
                request_lock: AsyncMutex::new(()),
                state: StdMutex::new(ConnState::default()),
            }),
        }
    }

    pub(crate) fn origin(&self) -> &Origin {
        &self.shared.origin
    }

    pub(crate) async fn handle_request(&self, request: &mut Request) -> Result<Response, Error> {
        let origin = request.url.origin();
        if origin != self.shared.origin {
            return Err(Error::Runtime(format!(
                "Attempted to send request to {origin} on connection to {}",
                self.shared.origin
            )));
        }

        let proto = {
            let _guard = self.shared.request_lock.lock().await;
            let existing = self.shared.state.lock().unwrap().proto.clone();
            match existing {
                Some(proto) => {
                    if !proto.is_available() {
                        return Err(Error::ConnectionNotAvailable);
                    }
                    proto
                }
                None => {
                    if self.shared.state.lock().unwrap().closed {
                        return Err(Error::ConnectionNotAvailable);
                    }
                    match self.dial(&request.extensions).await {
                        Ok(proto) => {
                            self.shared.state.lock().unwrap().proto = Some(proto.clone());
                            proto
                        }
                        Err(err) => {
                            self.shared.state.lock().unwrap().connect_failed = true;
                            return Err(err);
                        }
                    }
                }
            }
        };

        proto.handle_request(request).await
    }

    /// Open the transport and pick the protocol engine. Connect-class
    /// failures are retried with exponential backoff.
    async fn dial(&self, extensions: &Extensions) -> Result<ProtocolConnection, Error> {
        let config = &self.shared.config;
        let mut attempt = 0u32;

        let stream = loop {
            match self.connect_once(extensions).await {
                Ok(stream) => break stream,
                Err(err) if err.is_connect() && attempt < config.retries => {
                    attempt += 1;
                    if attempt > 1 {
                        let delay = RETRY_BACKOFF_FACTOR * 2f64.powi(attempt as i32 - 2);
                        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    }
                    debug!(
                        origin = %self.shared.origin,
                        attempt,
                        "retrying connect"
                    );
                }
                Err(err) => return Err(err),
            }
        };

        let forced_h2 = extensions.http2 == Some(true);
        let use_h2 = if self.shared.origin.scheme == "https" {
            forced_h2 || stream.negotiated_alpn() == Some(b"h2")
        } else {
            // Plaintext HTTP/2 requires prior knowledge.
            forced_h2 || (config.http2 && !config.http1)
        };

        debug!(
            origin = %self.shared.origin,
            http2 = use_h2,
            "connection established"
        );

        if use_h2 {
            let conn = Http2Connection::new(
                self.shared.origin.clone(),
                stream,
                config.keepalive_expiry,
                extensions.timeouts.connect,
            )
            .await?;
            Ok(ProtocolConnection::H2(conn))
        } else {
            Ok(ProtocolConnection::H1(Http11Connection::new(
                self.shared.origin.clone(),
                stream,
                config.keepalive_expiry,
            )))
        }
    }

    async fn connect_once(&self, extensions: &Extensions) -> Result<NetworkStream, Error> {
        let config = &self.shared.config;
        let origin = &self.shared.origin;
        let timeout = extensions.timeouts.connect;

        let stream = match &config.uds {
            Some(path) => config.backend.connect_unix_socket(path, timeout).await?,
            None => {
                config
                    .backend
                    .connect_tcp(
                        &origin.host,
                        origin.port,
                        timeout,
                        config.local_address.as_deref(),
                        &config.socket_options,
                    )
                    .await?
            }
        };

        if origin.scheme != "https" {
            return Ok(stream);
        }

        let server_hostname = extensions
            .sni_hostname
            .clone()
            .unwrap_or_else(|| origin.host.clone());
        let alpn_protocols = alpn_offer(config, extensions);
        stream
            .start_tls(TlsParams {
                server_hostname,
                alpn_protocols,
                timeout,
            })
            .await
    }

    pub(crate) fn can_handle(&self, origin: &Origin) -> bool {
        *origin == self.shared.origin
    }

    pub(crate) fn is_available(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        match &state.proto {
            Some(proto) => proto.is_available(),
            None => !state.closed && !state.connect_failed,
        }
    }

    pub(crate) fn has_expired(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        state
            .proto
            .as_ref()
            .map_or(false, |proto| proto.has_expired())
    }

    pub(crate) fn is_idle(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        state.proto.as_ref().map_or(false, |proto| proto.is_idle())
    }

    pub(crate) fn is_closed(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        if state.closed || state.connect_failed {
            return true;
        }
        state
            .proto
            .as_ref()
            .map_or(false, |proto| proto.is_closed())
    }

    pub(crate) fn close(&self) {
        let proto = {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
            state.proto.clone()
        };
        if let Some(proto) = proto {
            proto.close();
        }
    }

    pub(crate) fn attempt_close(&self) -> bool {
        let proto = self.shared.state.lock().unwrap().proto.clone();
        match proto {
            Some(proto) => proto.attempt_close(),
            None => false,
        }
    }

    pub(crate) fn info(&self) -> String {
        let state = self.shared.state.lock().unwrap();
        match &state.proto {
            Some(proto) => proto.info(),
            None => "CONNECTING".to_string(),
        }
    }
}

/// The ALPN protocols to offer, honoring the pool's protocol switches
/// and the per-request override.
fn alpn_offer(config: &ConnectConfig, extensions: &Extensions) -> Vec<Vec<u8>> {
    match extensions.http2 {
        Some(true) => vec![b"h2".to_vec()],
        Some(false) => vec![b"http/1.1".to_vec()],
        None => {
            let mut protocols: Vec<Vec<u8>> = Vec::new();
            if config.http2 {
                protocols.push(b"h2".to_vec());
            }
            if config.http1 {
                protocols.push(b"http/1.1".to_vec());
            }
            if protocols.is_empty() {
                protocols.push(b"http/1.1".to_vec());
            }
            protocols
        }
    }
}
