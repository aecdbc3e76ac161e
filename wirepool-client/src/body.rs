use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::Error;
use crate::http11::Http11Connection;
use crate::http2::{Http2Connection, StreamEvent};
use crate::pool::PoolRelease;

/// A request body: empty, in-memory bytes, or a stream of chunks with
/// no known length (sent chunked on HTTP/1.1).
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Stream(UnboundedReceiver<Vec<u8>>),
}

impl Body {
    /// A streaming body plus the sender that feeds it.
    pub fn channel() -> (UnboundedSender<Vec<u8>>, Body) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (sender, Body::Stream(receiver))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body::Bytes(bytes.to_vec())
    }
}

/// The streaming response body. It borrows the owning connection: the
/// connection is not returned to the pool until the body is fully
/// consumed or closed, and dropping an unconsumed body closes the
/// connection outright.
pub struct BodyReader {
    source: BodySource,
    release: Option<PoolRelease>,
    done: bool,
    closed: bool,
}

pub(crate) enum BodySource {
    Empty,
    Http11 {
        conn: Http11Connection,
        read_timeout: Option<Duration>,
    },
    Http2 {
        conn: Http2Connection,
        stream_id: u32,
        receiver: UnboundedReceiver<StreamEvent>,
        read_timeout: Option<Duration>,
    },
}

impl BodyReader {
    pub(crate) fn new(source: BodySource) -> Self {
        let done = matches!(source, BodySource::Empty);
        Self {
            source,
            release: None,
            done,
            closed: false,
        }
    }

    pub(crate) fn set_release(&mut self, release: PoolRelease) {
        self.release = Some(release);
    }

    /// The next chunk of the body, or `None` once complete.
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if self.done {
            return Ok(None);
        }
        let chunk = match &mut self.source {
            BodySource::Empty => None,
            BodySource::Http11 { conn, read_timeout } => {
                conn.next_chunk(*read_timeout).await?
            }
            BodySource::Http2 {
                conn,
                stream_id,
                receiver,
                read_timeout,
            } => {
                conn.next_stream_chunk(*stream_id, receiver, *read_timeout)
                    .await?
            }
        };
        if chunk.is_none() {
            self.done = true;
        }
        Ok(chunk)
    }

    /// Release the body. Returns the connection to the pool, recycling
    /// it when the response completed cleanly. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match &mut self.source {
            BodySource::Empty => {}
            BodySource::Http11 { conn, .. } => {
                if self.done {
                    conn.response_closed().await;
                } else {
                    conn.close();
                }
            }
            BodySource::Http2 {
                conn, stream_id, ..
            } => {
                conn.stream_closed(*stream_id, self.done).await;
            }
        }
        if let Some(release) = self.release.take() {
            release.release();
        }
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader")
            .field("done", &self.done)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for BodyReader {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Dropped without an explicit close: the connection cannot be
        // recycled safely unless the body was fully consumed.
        match &self.source {
            BodySource::Empty => {}
            BodySource::Http11 { conn, .. } => {
                if self.done {
                    let conn = conn.clone();
                    if let Ok(handle) = tokio::runtime::Handle::try_current() {
                        handle.spawn(async move { conn.response_closed().await });
                    } else {
                        conn.close();
                    }
                } else {
                    conn.close();
                }
            }
            BodySource::Http2 {
                conn, stream_id, ..
            } => {
                conn.stream_abandoned(*stream_id);
            }
        }
        if let Some(release) = self.release.take() {
            release.release();
        }
    }
}
