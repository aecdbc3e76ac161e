use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::backend::{NetworkBackend, TlsParams, TokioBackend};
use crate::body::Body;
use crate::connection::{ConnectConfig, HttpConnection, ProtocolConnection};
use crate::error::Error;
use crate::http11::Http11Connection;
use crate::http2::Http2Connection;
use crate::models::{
    host_header_value, merge_headers, Extensions, Header, Origin, Request, Response, Url,
};
use crate::pool::{ConnectionPool, PoolConfig, PoolMode};

/// A connection pool that routes every request through an HTTP proxy:
/// plain-http targets are forwarded in absolute form, https targets are
/// tunnelled with CONNECT.
pub struct ProxyPool {
    pool: ConnectionPool,
}

impl ProxyPool {
    pub fn new(proxy_url: &str, config: PoolConfig) -> Result<Self, Error> {
        Self::with_backend(proxy_url, Vec::new(), config, Arc::new(TokioBackend))
    }

    pub fn with_backend(
        proxy_url: &str,
        proxy_headers: Vec<Header>,
        config: PoolConfig,
        backend: Arc<dyn NetworkBackend>,
    ) -> Result<Self, Error> {
        let proxy_origin = Url::parse(proxy_url)?.origin();
        Ok(Self {
            pool: ConnectionPool::with_mode(
                config,
                backend,
                PoolMode::Proxy {
                    proxy_origin,
                    proxy_headers,
                },
            ),
        })
    }

    pub async fn handle_request(&self, request: Request) -> Result<Response, Error> {
        self.pool.handle_request(request).await
    }

    pub fn connection_info(&self) -> Vec<String> {
        self.pool.connection_info()
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

/// A connection to a forwarding proxy. One connection serves any
/// plain-http target origin; requests are rewritten to absolute form.
#[derive(Clone)]
pub(crate) struct ForwardConnection {
    inner: HttpConnection,
    proxy_headers: Vec<Header>,
}

impl ForwardConnection {
    pub(crate) fn new(
        proxy_origin: Origin,
        proxy_headers: Vec<Header>,
        connect: ConnectConfig,
    ) -> Self {
        Self {
            inner: HttpConnection::new(proxy_origin, connect),
            proxy_headers,
        }
    }

    pub(crate) async fn handle_request(&self, request: &mut Request) -> Result<Response, Error> {
        let proxy_origin = self.inner.origin();
        let url = Url::new(
            proxy_origin.scheme.clone(),
            proxy_origin.host.clone(),
            Some(proxy_origin.port),
            request.url.to_absolute_form(),
        );
        // The Host header names the target, not the proxy.
        let mut headers = merge_headers(&self.proxy_headers, &request.headers);
        if !headers.iter().any(|header| header.is("host")) {
            headers.insert(0, Header::new("Host", host_header_value(&request.url)));
        }
        let mut proxy_request = Request {
            method: request.method.clone(),
            url,
            headers,
            body: std::mem::take(&mut request.body),
            extensions: std::mem::take(&mut request.extensions),
        };

        let result = self.inner.handle_request(&mut proxy_request).await;
        if result.is_err() {
            // Hand the consumable parts back for a pool-level retry.
            request.body = std::mem::take(&mut proxy_request.body);
            request.extensions = std::mem::take(&mut proxy_request.extensions);
        }
        result
    }

    pub(crate) fn can_handle(&self, origin: &Origin) -> bool {
        origin.scheme == "http"
    }

    pub(crate) fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    pub(crate) fn has_expired(&self) -> bool {
        self.inner.has_expired()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub(crate) fn close(&self) {
        self.inner.close();
    }

    pub(crate) fn attempt_close(&self) -> bool {
        self.inner.attempt_close()
    }

    pub(crate) fn info(&self) -> String {
        self.inner.info()
    }
}

/// A tunnelled connection to one https target origin through a proxy.
/// The CONNECT handshake runs at most once, serialized by the connect
/// lock; afterwards the connection behaves like a direct one to the
/// target.
#[derive(Clone)]
pub(crate) struct TunnelConnection {
    shared: Arc<TunnelShared>,
}

struct TunnelShared {
    proxy_origin: Origin,
    target_origin: Origin,
    proxy_headers: Vec<Header>,
    connect: ConnectConfig,
    connect_lock: AsyncMutex<()>,
    state: StdMutex<TunnelState>,
}

struct TunnelState {
    proxy_conn: Option<HttpConnection>,
    proto: Option<ProtocolConnection>,
    closed: bool,
}

impl TunnelConnection {
    pub(crate) fn new(
        proxy_origin: Origin,
        target_origin: Origin,
        proxy_headers: Vec<Header>,
        connect: ConnectConfig,
    ) -> Self {
        // The CONNECT hop itself is always HTTP/1.1.
        let mut proxy_connect = connect.clone();
        proxy_connect.http2 = false;
        let proxy_conn = HttpConnection::new(proxy_origin.clone(), proxy_connect);
        Self {
            shared: Arc::new(TunnelShared {
                proxy_origin,
                target_origin,
                proxy_headers,
                connect,
                connect_lock: AsyncMutex::new(()),
                state: StdMutex::new(TunnelState {
                    proxy_conn: Some(proxy_conn),
                    proto: None,
                    closed: false,
                }),
            }),
        }
    }

    pub(crate) async fn handle_request(&self, request: &mut Request) -> Result<Response, Error> {
        let proto = {
            let _guard = self.shared.connect_lock.lock().await;
            let existing = {
                let state = self.shared.state.lock().unwrap();
                if state.closed {
                    return Err(Error::ConnectionNotAvailable);
                }
                state.proto.clone()
            };
            match existing {
                Some(proto) => proto,
                None => match self.establish_tunnel(request).await {
                    Ok(proto) => {
                        let mut state = self.shared.state.lock().unwrap();
                        state.proto = Some(proto.clone());
                        state.proxy_conn = None;
                        proto
                    }
                    Err(err) => {
                        let mut state = self.shared.state.lock().unwrap();
                        state.closed = true;
                        if let Some(proxy_conn) = state.proxy_conn.take() {
                            proxy_conn.close();
                        }
                        return Err(err);
                    }
                },
            }
        };

        proto.handle_request(request).await
    }

    async fn establish_tunnel(&self, request: &Request) -> Result<ProtocolConnection, Error> {
        let shared = &self.shared;
        let timeouts = request.extensions.timeouts;
        let proxy_conn = shared
            .state
            .lock()
            .unwrap()
            .proxy_conn
            .clone()
            .ok_or(Error::ConnectionNotAvailable)?;

        let target = format!("{}:{}", shared.target_origin.host, shared.target_origin.port);
        let connect_headers = merge_headers(
            &[
                Header::new("Host", target.clone()),
                Header::new("Accept", "*/*"),
            ],
            &shared.proxy_headers,
        );
        let mut connect_request = Request {
            method: "CONNECT".to_string(),
            url: Url::new(
                shared.proxy_origin.scheme.clone(),
                shared.proxy_origin.host.clone(),
                Some(shared.proxy_origin.port),
                target.into_bytes(),
            ),
            headers: connect_headers,
            body: Body::Empty,
            extensions: Extensions {
                timeouts,
                ..Default::default()
            },
        };

        let mut response = proxy_conn.handle_request(&mut connect_request).await?;
        if !(200..300).contains(&response.status) {
            let reason = String::from_utf8_lossy(&response.extensions.reason_phrase);
            let message = format!("{} {}", response.status, reason);
            return Err(Error::Proxy(message.trim_end().to_string()));
        }

        let stream = response
            .extensions
            .network_stream
            .take()
            .ok_or_else(|| {
                Error::Runtime("CONNECT response did not expose the network stream".to_string())
            })?;

        let server_hostname = request
            .extensions
            .sni_hostname
            .clone()
            .unwrap_or_else(|| shared.target_origin.host.clone());
        let forced_h2 = request.extensions.http2 == Some(true);
        let alpn_protocols: Vec<Vec<u8>> = if forced_h2 {
            vec![b"h2".to_vec()]
        } else if shared.connect.http2 && request.extensions.http2 != Some(false) {
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        } else {
            vec![b"http/1.1".to_vec()]
        };

        debug!(
            proxy = %shared.proxy_origin,
            target = %shared.target_origin,
            "establishing tunnel"
        );
        let stream = stream
            .start_tls(TlsParams {
                server_hostname,
                alpn_protocols,
                timeout: timeouts.connect,
            })
            .await?;

        if forced_h2 || stream.negotiated_alpn() == Some(b"h2") {
            let conn = Http2Connection::new(
                shared.target_origin.clone(),
                stream,
                shared.connect.keepalive_expiry,
                timeouts.connect,
            )
            .await?;
            Ok(ProtocolConnection::H2(conn))
        } else {
            Ok(ProtocolConnection::H1(Http11Connection::new(
                shared.target_origin.clone(),
                stream,
                shared.connect.keepalive_expiry,
            )))
        }
    }

    pub(crate) fn can_handle(&self, origin: &Origin) -> bool {
        *origin == self.shared.target_origin
    }

    pub(crate) fn is_available(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        if state.closed {
            return false;
        }
        match &state.proto {
            Some(proto) => proto.is_available(),
            None => true,
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
        if state.closed {
            return true;
        }
        state
            .proto
            .as_ref()
            .map_or(false, |proto| proto.is_closed())
    }

    pub(crate) fn close(&self) {
        let (proxy_conn, proto) = {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
            (state.proxy_conn.take(), state.proto.clone())
        };
        if let Some(proxy_conn) = proxy_conn {
            proxy_conn.close();
        }
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
            None => match &state.proxy_conn {
                Some(proxy_conn) => proxy_conn.info(),
                None => "CLOSED".to_string(),
            },
        }
    }
}
