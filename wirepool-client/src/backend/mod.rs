mod mock;
mod tcp;

pub use mock::MockBackend;
pub use tcp::TokioBackend;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::error::Error;

/// The byte-duplex object a backend hands out. Everything that can be
/// driven as a tokio stream qualifies.
pub trait AsyncIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncIo for T {}

/// Socket-level options applied while dialing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketOption {
    NoDelay(bool),
    ReuseAddress(bool),
}

/// Parameters for upgrading a plaintext stream to TLS.
#[derive(Debug, Clone)]
pub struct TlsParams {
    pub server_hostname: String,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// Opens transport streams. Backends are interchangeable; the tokio
/// backend talks to real sockets and the mock backend plays a script.
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    async fn connect_tcp(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
        local_address: Option<&str>,
        socket_options: &[SocketOption],
    ) -> Result<NetworkStream, Error>;

    async fn connect_unix_socket(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<NetworkStream, Error> {
        let _ = (path, timeout);
        Err(Error::Runtime(
            "unix domain sockets are not supported by this backend".to_string(),
        ))
    }
}

/// How a stream performs its TLS upgrade. Installed by the backend that
/// created the stream, so mock streams can script the handshake.
#[async_trait]
pub(crate) trait TlsUpgrader: Send + Sync {
    async fn upgrade(
        &self,
        io: Box<dyn AsyncIo>,
        params: &TlsParams,
    ) -> Result<(Box<dyn AsyncIo>, Option<Vec<u8>>), Error>;
}

/// An open byte-duplex connection with timeout-bearing reads and writes
/// and an optional TLS upgrade path.
pub struct NetworkStream {
    io: Box<dyn AsyncIo>,
    upgrader: Option<Arc<dyn TlsUpgrader>>,
    alpn: Option<Vec<u8>>,
    closed: bool,
}

const MAX_READ_BUF: usize = 64 * 1024;

impl NetworkStream {
    pub(crate) fn new(io: Box<dyn AsyncIo>, upgrader: Option<Arc<dyn TlsUpgrader>>) -> Self {
        Self {
            io,
            upgrader,
            alpn: None,
            closed: false,
        }
    }

    /// Read up to `max_bytes`. An empty result signals EOF.
    pub async fn read(
        &mut self,
        max_bytes: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, Error> {
        if self.closed {
            return Err(Error::Read("stream is closed".to_string()));
        }
        let mut buf = vec![0u8; max_bytes.min(MAX_READ_BUF)];
        let read = self.io.read(&mut buf);
        let count = with_timeout(timeout, read, || Error::ReadTimeout)
            .await?
            .map_err(|err| Error::Read(err.to_string()))?;
        buf.truncate(count);
        Ok(buf)
    }

    pub async fn write_all(
        &mut self,
        buffer: &[u8],
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Write("stream is closed".to_string()));
        }
        let write = self.io.write_all(buffer);
        with_timeout(timeout, write, || Error::WriteTimeout)
            .await?
            .map_err(|err| Error::Write(err.to_string()))
    }

    /// Graceful shutdown. Idempotent; dropping the stream also closes
    /// the underlying socket.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.io.shutdown().await;
    }

    /// Consume the plaintext stream and yield a TLS stream over the
    /// same transport.
    pub async fn start_tls(self, params: TlsParams) -> Result<NetworkStream, Error> {
        let Some(upgrader) = self.upgrader.clone() else {
            return Err(Error::Runtime(
                "TLS is not supported on this stream".to_string(),
            ));
        };
        let (io, alpn) = upgrader.upgrade(self.io, &params).await?;
        Ok(NetworkStream {
            io,
            upgrader: Some(upgrader),
            alpn,
            closed: false,
        })
    }

    /// The ALPN protocol negotiated during `start_tls`, if any.
    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        self.alpn.as_deref()
    }

    pub(crate) fn into_split(
        self,
    ) -> (ReadHalf<Box<dyn AsyncIo>>, WriteHalf<Box<dyn AsyncIo>>) {
        tokio::io::split(self.io)
    }
}

pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    future: impl Future<Output = T>,
    on_timeout: impl FnOnce() -> Error,
) -> Result<T, Error> {
    match timeout {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| on_timeout()),
        None => Ok(future.await),
    }
}
