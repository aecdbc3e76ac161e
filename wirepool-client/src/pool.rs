use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::backend::{NetworkBackend, SocketOption, TokioBackend};
use crate::connection::{ConnectConfig, HttpConnection};
use crate::error::Error;
use crate::models::{Header, Origin, Request, Response};
use crate::proxy::{ForwardConnection, TunnelConnection};

/// Bounded transparent retries when a selected connection turns out to
/// be unusable between the availability check and the request.
const MAX_CONNECTION_ATTEMPTS: usize = 3;

/// Pool configuration. Plain data; construct one, adjust fields, hand
/// it to the pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Hard cap on live connections.
    pub max_connections: usize,
    /// Cap on idle connections kept for reuse. Clamped to
    /// `max_connections`; `None` means equal to it.
    pub max_keepalive_connections: Option<usize>,
    /// How long an idle connection may live unused.
    pub keepalive_expiry: Option<Duration>,
    /// Offer HTTP/1.1 during ALPN.
    pub http1: bool,
    /// Offer HTTP/2 during ALPN.
    pub http2: bool,
    /// Connect-phase retries.
    pub retries: u32,
    /// Local address to bind before connecting.
    pub local_address: Option<String>,
    /// Dial a unix domain socket instead of TCP.
    pub uds: Option<String>,
    pub socket_options: Vec<SocketOption>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_keepalive_connections: None,
            keepalive_expiry: Some(Duration::from_secs(5)),
            http1: true,
            http2: false,
            retries: 0,
            local_address: None,
            uds: None,
            socket_options: Vec::new(),
        }
    }
}

/// How the pool turns an origin into a connection.
pub(crate) enum PoolMode {
    Direct,
    Proxy {
        proxy_origin: Origin,
        proxy_headers: Vec<Header>,
    },
}

/// A pool slot: direct, forwarding, or tunnelling.
#[derive(Clone)]
pub(crate) enum PoolMember {
    Direct(HttpConnection),
    Forward(ForwardConnection),
    Tunnel(TunnelConnection),
}

impl PoolMember {
    pub(crate) async fn handle_request(&self, request: &mut Request) -> Result<Response, Error> {
        match self {
            PoolMember::Direct(conn) => conn.handle_request(request).await,
            PoolMember::Forward(conn) => conn.handle_request(request).await,
            PoolMember::Tunnel(conn) => conn.handle_request(request).await,
        }
    }

    fn can_handle(&self, origin: &Origin) -> bool {
        match self {
            PoolMember::Direct(conn) => conn.can_handle(origin),
            PoolMember::Forward(conn) => conn.can_handle(origin),
            PoolMember::Tunnel(conn) => conn.can_handle(origin),
        }
    }

    fn is_available(&self) -> bool {
        match self {
            PoolMember::Direct(conn) => conn.is_available(),
            PoolMember::Forward(conn) => conn.is_available(),
            PoolMember::Tunnel(conn) => conn.is_available(),
        }
    }

    fn has_expired(&self) -> bool {
        match self {
            PoolMember::Direct(conn) => conn.has_expired(),
            PoolMember::Forward(conn) => conn.has_expired(),
            PoolMember::Tunnel(conn) => conn.has_expired(),
        }
    }

    fn is_idle(&self) -> bool {
        match self {
            PoolMember::Direct(conn) => conn.is_idle(),
            PoolMember::Forward(conn) => conn.is_idle(),
            PoolMember::Tunnel(conn) => conn.is_idle(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        match self {
            PoolMember::Direct(conn) => conn.is_closed(),
            PoolMember::Forward(conn) => conn.is_closed(),
            PoolMember::Tunnel(conn) => conn.is_closed(),
        }
    }

    fn close(&self) {
        match self {
            PoolMember::Direct(conn) => conn.close(),
            PoolMember::Forward(conn) => conn.close(),
            PoolMember::Tunnel(conn) => conn.close(),
        }
    }

    fn attempt_close(&self) -> bool {
        match self {
            PoolMember::Direct(conn) => conn.attempt_close(),
            PoolMember::Forward(conn) => conn.attempt_close(),
            PoolMember::Tunnel(conn) => conn.attempt_close(),
        }
    }

    fn info(&self) -> String {
        match self {
            PoolMember::Direct(conn) => conn.info(),
            PoolMember::Forward(conn) => conn.info(),
            PoolMember::Tunnel(conn) => conn.info(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct PoolEntry {
    pub(crate) id: u64,
    pub(crate) member: PoolMember,
}

struct Waiter {
    id: u64,
    sender: Option<oneshot::Sender<()>>,
}

struct PoolState {
    connections: Vec<PoolEntry>,
    waiters: VecDeque<Waiter>,
    closed: bool,
    next_id: u64,
}

impl PoolState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn wake_front_waiter(&mut self) {
        if let Some(waiter) = self.waiters.front_mut() {
            if let Some(sender) = waiter.sender.take() {
                let _ = sender.send(());
            }
        }
    }
}

/// A connection pool for making HTTP requests.
///
/// Connections are kept most-recently-used first. Capacity is bounded
/// by `max_connections`; callers beyond capacity wait in strict FIFO
/// order.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_backend(config, Arc::new(TokioBackend))
    }

    pub fn with_backend(config: PoolConfig, backend: Arc<dyn NetworkBackend>) -> Self {
        Self::with_mode(config, backend, PoolMode::Direct)
    }

    pub(crate) fn with_mode(
        config: PoolConfig,
        backend: Arc<dyn NetworkBackend>,
        mode: PoolMode,
    ) -> Self {
        let max_keepalive = config
            .max_keepalive_connections
            .unwrap_or(config.max_connections)
            .min(config.max_connections);
        let connect = ConnectConfig {
            backend,
            keepalive_expiry: config.keepalive_expiry,
            http1: config.http1,
            http2: config.http2,
            retries: config.retries,
            local_address: config.local_address.clone(),
            uds: config.uds.clone(),
            socket_options: config.socket_options.clone(),
        };
        Self {
            inner: Arc::new(PoolInner {
                config,
                max_keepalive,
                connect,
                mode,
                state: StdMutex::new(PoolState {
                    connections: Vec::new(),
                    waiters: VecDeque::new(),
                    closed: false,
                    next_id: 0,
                }),
            }),
        }
    }

    /// Send a request over a pooled connection and return the streaming
    /// response. The connection is returned to the pool once the
    /// response body is consumed or closed.
    pub async fn handle_request(&self, mut request: Request) -> Result<Response, Error> {
        let scheme = request.url.scheme.as_str();
        if scheme.is_empty() {
            return Err(Error::UnsupportedProtocol(
                "Request URL is missing an 'http://' or 'https://' protocol.".to_string(),
            ));
        }
        if scheme != "http" && scheme != "https" {
            return Err(Error::UnsupportedProtocol(format!(
                "Request URL has an unsupported protocol '{scheme}://'."
            )));
        }

        let origin = request.url.origin();
        let pool_timeout = request.extensions.timeouts.pool;
        let mut attempts = 0;

        loop {
            let entry = self.inner.acquire(&origin, pool_timeout).await?;
            match entry.member.handle_request(&mut request).await {
                Ok(mut response) => {
                    response.body.set_release(PoolRelease {
                        inner: Arc::clone(&self.inner),
                        entry_id: entry.id,
                        member: entry.member.clone(),
                    });
                    return Ok(response);
                }
                Err(err) => {
                    self.inner.request_failed(&entry);
                    if matches!(err, Error::ConnectionNotAvailable) {
                        if attempts < MAX_CONNECTION_ATTEMPTS {
                            attempts += 1;
                            debug!(%origin, attempts, "connection unavailable, re-acquiring");
                            continue;
                        }
                        // The internal signal never surfaces to callers.
                        return Err(Error::Connect(
                            "exceeded maximum attempts on busy connections".to_string(),
                        ));
                    }
                    return Err(err);
                }
            }
        }
    }

    /// A snapshot of the pooled connections' state descriptions,
    /// most-recently-used first.
    pub fn connection_info(&self) -> Vec<String> {
        let state = self.inner.state.lock().unwrap();
        state
            .connections
            .iter()
            .map(|entry| entry.member.info())
            .collect()
    }

    /// Close every connection and fail all waiters. Requests after this
    /// fail immediately.
    pub fn close(&self) {
        self.inner.close();
    }
}

pub(crate) struct PoolInner {
    config: PoolConfig,
    max_keepalive: usize,
    connect: ConnectConfig,
    mode: PoolMode,
    state: StdMutex<PoolState>,
}

impl PoolInner {
    async fn acquire(
        self: &Arc<Self>,
        origin: &Origin,
        pool_timeout: Option<Duration>,
    ) -> Result<PoolEntry, Error> {
        let deadline = pool_timeout.map(|timeout| tokio::time::Instant::now() + timeout);
        let mut guard = WaiterGuard {
            inner: self,
            waiter_id: None,
            acquired: false,
        };

        let result = loop {
            let receiver = {
                let mut state = self.state.lock().unwrap();
                if state.closed {
                    break Err(if guard.waiter_id.is_some() {
                        Error::Runtime(
                            "The connection pool was closed while the request was waiting \
                             for a connection."
                                .to_string(),
                        )
                    } else {
                        Error::Runtime("The connection pool is closed.".to_string())
                    });
                }

                self.prune_locked(&mut state);

                let eligible = match guard.waiter_id {
                    None => state.waiters.is_empty(),
                    Some(id) => state.waiters.front().map(|waiter| waiter.id) == Some(id),
                };
                if eligible {
                    if let Some(entry) = self.try_acquire_locked(&mut state, origin) {
                        guard.acquired = true;
                        break Ok(entry);
                    }
                }

                let (sender, receiver) = oneshot::channel();
                match guard.waiter_id {
                    None => {
                        let id = state.alloc_id();
                        state.waiters.push_back(Waiter {
                            id,
                            sender: Some(sender),
                        });
                        guard.waiter_id = Some(id);
                    }
                    Some(id) => {
                        if let Some(waiter) =
                            state.waiters.iter_mut().find(|waiter| waiter.id == id)
                        {
                            waiter.sender = Some(sender);
                        }
                    }
                }
                receiver
            };

            let outcome = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, receiver)
                    .await
                    .map_err(|_| Error::PoolTimeout),
                None => Ok(receiver.await),
            };
            match outcome {
                // Signalled, or the pool dropped our sender during
                // shutdown; loop to re-evaluate under the lock.
                Ok(_) => continue,
                Err(err) => break Err(err),
            }
        };

        drop(guard);
        result
    }

    /// Steps 2-4 of the acquisition algorithm, under the pool lock:
    /// reuse, make room by evicting the oldest idle connection, create.
    fn try_acquire_locked(
        self: &Arc<Self>,
        state: &mut PoolState,
        origin: &Origin,
    ) -> Option<PoolEntry> {
        if let Some(idx) = state
            .connections
            .iter()
            .position(|entry| entry.member.can_handle(origin) && entry.member.is_available())
        {
            let entry = state.connections.remove(idx);
            state.connections.insert(0, entry.clone());
            debug!(%origin, "reusing pooled connection");
            return Some(entry);
        }

        while state.connections.len() >= self.config.max_connections {
            match state
                .connections
                .iter()
                .rposition(|entry| entry.member.is_idle())
            {
                Some(idx) => {
                    let entry = state.connections.remove(idx);
                    entry.member.close();
                    debug!(%origin, "evicted idle connection to make room");
                }
                None => break,
            }
        }

        if state.connections.len() >= self.config.max_connections {
            return None;
        }

        let member = self.create_member(origin);
        let entry = PoolEntry {
            id: state.alloc_id(),
            member,
        };
        state.connections.insert(0, entry.clone());
        debug!(%origin, "created connection");
        Some(entry)
    }

    fn create_member(self: &Arc<Self>, origin: &Origin) -> PoolMember {
        match &self.mode {
            PoolMode::Direct => {
                PoolMember::Direct(HttpConnection::new(origin.clone(), self.connect.clone()))
            }
            PoolMode::Proxy {
                proxy_origin,
                proxy_headers,
            } => {
                if origin.scheme == "http" {
                    PoolMember::Forward(ForwardConnection::new(
                        proxy_origin.clone(),
                        proxy_headers.clone(),
                        self.connect.clone(),
                    ))
                } else {
                    PoolMember::Tunnel(TunnelConnection::new(
                        proxy_origin.clone(),
                        origin.clone(),
                        proxy_headers.clone(),
                        self.connect.clone(),
                    ))
                }
            }
        }
    }

    /// Step 1 of the acquisition algorithm: drop connections that have
    /// expired their keepalive or closed underneath us.
    fn prune_locked(&self, state: &mut PoolState) {
        state.connections.retain(|entry| {
            if entry.member.has_expired() || entry.member.is_closed() {
                entry.member.close();
                debug!("pruned expired or closed connection");
                false
            } else {
                true
            }
        });
    }

    /// Callback once a response body is released. Wakes the front
    /// waiter and re-asserts the keepalive cap.
    pub(crate) fn response_closed(&self, entry_id: u64, member: &PoolMember) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        if member.is_closed() {
            state.connections.retain(|entry| entry.id != entry_id);
        }
        state.wake_front_waiter();
        self.prune_locked(&mut state);
        self.enforce_keepalive_locked(&mut state);
    }

    /// A request on this connection failed; run the same housekeeping
    /// as a release, after a graceful close attempt.
    fn request_failed(&self, entry: &PoolEntry) {
        entry.member.attempt_close();
        self.response_closed(entry.id, &entry.member);
    }

    fn enforce_keepalive_locked(&self, state: &mut PoolState) {
        let mut idle: Vec<u64> = state
            .connections
            .iter()
            .filter(|entry| entry.member.is_idle())
            .map(|entry| entry.id)
            .collect();
        while idle.len() > self.max_keepalive {
            // The list is MRU-first, so the last idle entry is oldest.
            let Some(oldest) = idle.pop() else { break };
            if let Some(idx) = state.connections.iter().position(|e| e.id == oldest) {
                let entry = state.connections.remove(idx);
                entry.member.close();
                debug!("closed idle connection beyond keepalive cap");
            }
        }
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        for entry in state.connections.drain(..) {
            entry.member.close();
        }
        for mut waiter in state.waiters.drain(..) {
            if let Some(sender) = waiter.sender.take() {
                let _ = sender.send(());
            }
        }
        debug!("connection pool closed");
    }
}

/// Removes the waiter entry when an acquisition ends for any reason,
/// including cancellation mid-wait. If the waiter had already been
/// signalled but never used the capacity, the signal is passed on.
struct WaiterGuard<'a> {
    inner: &'a Arc<PoolInner>,
    waiter_id: Option<u64>,
    acquired: bool,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let Some(id) = self.waiter_id else { return };
        let mut state = self.inner.state.lock().unwrap();
        let mut was_signalled = false;
        if let Some(idx) = state.waiters.iter().position(|waiter| waiter.id == id) {
            let waiter = state.waiters.remove(idx);
            was_signalled = waiter.map_or(false, |waiter| waiter.sender.is_none());
        }
        if was_signalled && !self.acquired {
            state.wake_front_waiter();
        }
    }
}

/// Handed to the response body so the pool hears about release exactly
/// once, whether the body is closed explicitly or dropped.
pub(crate) struct PoolRelease {
    inner: Arc<PoolInner>,
    entry_id: u64,
    member: PoolMember,
}

impl PoolRelease {
    pub(crate) fn release(self) {
        self.inner.response_closed(self.entry_id, &self.member);
    }
}
