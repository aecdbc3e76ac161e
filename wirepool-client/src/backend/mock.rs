use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::{AsyncIo, NetworkBackend, NetworkStream, SocketOption, TlsParams, TlsUpgrader};
use crate::error::Error;

/// A backend that records writes and plays scripted reads.
///
/// Every connection replays the same script, so a reused connection
/// serves the script again for its next request, mirroring how a live
/// server would answer each request. An empty chunk in the script
/// signals EOF to the reader.
#[derive(Clone)]
pub struct MockBackend {
    script: Vec<Vec<u8>>,
    alpn: Option<Vec<u8>>,
    pause_after: Option<usize>,
    shared: Arc<Mutex<MockShared>>,
}

#[derive(Default)]
struct MockShared {
    written: Vec<Vec<u8>>,
    connect_count: usize,
    remaining_connect_failures: usize,
    tls_hostnames: Vec<String>,
    paused: bool,
    wakers: Vec<Waker>,
}

impl MockBackend {
    pub fn new(script: Vec<Vec<u8>>) -> Self {
        Self {
            script,
            alpn: None,
            pause_after: None,
            shared: Arc::new(Mutex::new(MockShared::default())),
        }
    }

    /// Script the ALPN protocol that `start_tls` will report.
    pub fn with_alpn(script: Vec<Vec<u8>>, alpn: &[u8]) -> Self {
        let mut backend = Self::new(script);
        backend.alpn = Some(alpn.to_vec());
        backend
    }

    /// Stall reads once `chunks` script entries have been served, until
    /// `resume` is called.
    pub fn paused_after(mut self, chunks: usize) -> Self {
        self.pause_after = Some(chunks);
        self.shared.lock().unwrap().paused = true;
        self
    }

    /// Fail the next `count` connect attempts.
    pub fn failing_connects(mut self, count: usize) -> Self {
        self.shared.lock().unwrap().remaining_connect_failures = count;
        self
    }

    pub fn resume(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.paused = false;
        for waker in shared.wakers.drain(..) {
            waker.wake();
        }
    }

    /// Every buffer written to any stream, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.lock().unwrap().written.clone()
    }

    pub fn written_concat(&self) -> Vec<u8> {
        self.shared.lock().unwrap().written.concat()
    }

    pub fn connect_count(&self) -> usize {
        self.shared.lock().unwrap().connect_count
    }

    /// Hostnames passed to `start_tls`, in handshake order.
    pub fn tls_hostnames(&self) -> Vec<String> {
        self.shared.lock().unwrap().tls_hostnames.clone()
    }
}

#[async_trait]
impl NetworkBackend for MockBackend {
    async fn connect_tcp(
        &self,
        _host: &str,
        _port: u16,
        _timeout: Option<Duration>,
        _local_address: Option<&str>,
        _socket_options: &[SocketOption],
    ) -> Result<NetworkStream, Error> {
        {
            let mut shared = self.shared.lock().unwrap();
            shared.connect_count += 1;
            if shared.remaining_connect_failures > 0 {
                shared.remaining_connect_failures -= 1;
                return Err(Error::Connect("mock connect refused".to_string()));
            }
        }
        let io = MockIo {
            script: self.script.clone(),
            queue: self.script.iter().cloned().collect(),
            served: 0,
            pause_after: self.pause_after,
            shared: Arc::clone(&self.shared),
        };
        let upgrader = MockUpgrader {
            alpn: self.alpn.clone(),
            shared: Arc::clone(&self.shared),
        };
        Ok(NetworkStream::new(Box::new(io), Some(Arc::new(upgrader))))
    }

    async fn connect_unix_socket(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<NetworkStream, Error> {
        self.connect_tcp(path, 0, timeout, None, &[]).await
    }
}

struct MockIo {
    script: Vec<Vec<u8>>,
    queue: VecDeque<Vec<u8>>,
    served: usize,
    pause_after: Option<usize>,
    shared: Arc<Mutex<MockShared>>,
}

impl AsyncRead for MockIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Some(limit) = this.pause_after {
            let mut shared = this.shared.lock().unwrap();
            if shared.paused && this.served >= limit {
                shared.wakers.push(cx.waker().clone());
                return Poll::Pending;
            }
        }

        if this.queue.is_empty() {
            // Replay the script for the next request on this connection.
            this.queue = this.script.iter().cloned().collect();
            if this.queue.is_empty() {
                return Poll::Ready(Ok(()));
            }
        }

        let mut chunk = this.queue.pop_front().expect("queue is non-empty");
        if chunk.is_empty() {
            // Scripted EOF.
            this.served += 1;
            return Poll::Ready(Ok(()));
        }

        let count = chunk.len().min(buf.remaining());
        buf.put_slice(&chunk[..count]);
        if count < chunk.len() {
            this.queue.push_front(chunk.split_off(count));
        } else {
            this.served += 1;
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockIo {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.shared.lock().unwrap().written.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct MockUpgrader {
    alpn: Option<Vec<u8>>,
    shared: Arc<Mutex<MockShared>>,
}

#[async_trait]
impl TlsUpgrader for MockUpgrader {
    async fn upgrade(
        &self,
        io: Box<dyn AsyncIo>,
        params: &TlsParams,
    ) -> Result<(Box<dyn AsyncIo>, Option<Vec<u8>>), Error> {
        self.shared
            .lock()
            .unwrap()
            .tls_hostnames
            .push(params.server_hostname.clone());
        Ok((io, self.alpn.clone()))
    }
}
