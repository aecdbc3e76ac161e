//! A minimal, low-level HTTP client built around pooled, reused
//! connections.
//!
//! The pool hands each request to a connection matching the request's
//! origin, creating, recycling, or evicting connections as capacity
//! allows, and parking callers in FIFO order when it does not. Per
//! connection, an HTTP/1.1 or HTTP/2 state machine (selected by ALPN)
//! drives the wire protocol from `wirepool-net`. Proxy pools layer
//! absolute-form forwarding and CONNECT tunnelling on the same
//! scheduler.
//!
//! There is deliberately no redirect handling, no auth, no cookies, no
//! content decoding: requests go out, responses stream back, and
//! connections get reused.
//!
//! ```no_run
//! use wirepool_client::{ConnectionPool, PoolConfig, Request};
//!
//! # async fn example() -> Result<(), wirepool_client::Error> {
//! let pool = ConnectionPool::new(PoolConfig::default());
//! let mut response = pool.handle_request(Request::get("https://example.com/")?).await?;
//! let body = response.read().await?;
//! assert_eq!(response.status, 200);
//! # Ok(())
//! # }
//! ```

mod backend;
pub mod blocking;
mod body;
mod connection;
mod error;
mod http11;
mod http2;
mod models;
mod pool;
mod proxy;

pub use backend::{MockBackend, NetworkBackend, NetworkStream, SocketOption, TlsParams, TokioBackend};
pub use body::{Body, BodyReader};
pub use error::{Error, ErrorKind, Result};
pub use http11::Http11Connection;
pub use http2::Http2Connection;
pub use models::{
    Extensions, Header, Origin, Request, Response, ResponseExtensions, Timeouts, Url,
};
pub use pool::{ConnectionPool, PoolConfig};
pub use proxy::ProxyPool;

#[cfg(test)]
mod connection_test;
#[cfg(test)]
mod http11_test;
#[cfg(test)]
mod http2_test;
#[cfg(test)]
mod proxy_test;
