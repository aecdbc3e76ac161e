use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::trace;

use wirepool_net::{
    serialize_chunk, serialize_request_head, ParseError, ResponseEvent, ResponseStreamParser,
    FINAL_CHUNK,
};

use crate::backend::NetworkStream;
use crate::body::{Body, BodyReader, BodySource};
use crate::error::Error;
use crate::models::{prepare_headers, Origin, Request, Response, ResponseExtensions};

const READ_NUM_BYTES: usize = 64 * 1024;

/// One HTTP/1.1 connection: a single in-flight request at a time over
/// an exclusively owned network stream.
#[derive(Clone)]
pub struct Http11Connection {
    shared: Arc<Shared>,
}

struct Shared {
    origin: Origin,
    keepalive_expiry: Option<Duration>,
    meta: StdMutex<Meta>,
    io: AsyncMutex<Io>,
}

struct Meta {
    state: State,
    expire_at: Option<Instant>,
    request_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Active,
    Idle,
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::New => "NEW",
            State::Active => "ACTIVE",
            State::Idle => "IDLE",
            State::Closed => "CLOSED",
        }
    }
}

struct Io {
    stream: Option<NetworkStream>,
    parser: ResponseStreamParser,
    events: VecDeque<ResponseEvent>,
    body_done: bool,
    response_close: bool,
}

impl Http11Connection {
    pub fn new(
        origin: Origin,
        stream: NetworkStream,
        keepalive_expiry: Option<Duration>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                origin,
                keepalive_expiry,
                meta: StdMutex::new(Meta {
                    state: State::New,
                    expire_at: None,
                    request_count: 0,
                }),
                io: AsyncMutex::new(Io {
                    stream: Some(stream),
                    parser: ResponseStreamParser::new(),
                    events: VecDeque::new(),
                    body_done: false,
                    response_close: false,
                }),
            }),
        }
    }

    pub async fn handle_request(&self, request: &mut Request) -> Result<Response, Error> {
        if request.url.origin() != self.shared.origin {
            return Err(Error::ConnectionNotAvailable);
        }

        {
            let mut meta = self.shared.meta.lock().unwrap();
            match meta.state {
                State::New | State::Idle => {
                    meta.state = State::Active;
                    meta.request_count += 1;
                    meta.expire_at = None;
                }
                _ => return Err(Error::ConnectionNotAvailable),
            }
        }

        match self.run_request(request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    async fn run_request(&self, request: &mut Request) -> Result<Response, Error> {
        let timeouts = request.extensions.timeouts;
        let mut io = self.shared.io.lock().await;
        let io = &mut *io;

        io.parser.prepare(request.method.as_bytes());
        io.events.clear();
        io.body_done = false;
        io.response_close = false;

        let stream = io
            .stream
            .as_mut()
            .ok_or(Error::ConnectionNotAvailable)?;

        let headers = prepare_headers(&request.headers, &request.url, &request.body);
        let head_bytes = serialize_request_head(
            request.method.as_bytes(),
            &request.url.target,
            &headers,
        );
        stream.write_all(&head_bytes, timeouts.write).await?;

        match &mut request.body {
            Body::Empty => {}
            Body::Bytes(bytes) => {
                stream.write_all(bytes, timeouts.write).await?;
            }
            Body::Stream(receiver) => {
                while let Some(chunk) = receiver.recv().await {
                    stream
                        .write_all(&serialize_chunk(&chunk), timeouts.write)
                        .await?;
                }
                stream.write_all(FINAL_CHUNK, timeouts.write).await?;
            }
        }

        let head = loop {
            if let Some(event) = io.events.pop_front() {
                match event {
                    ResponseEvent::Head(head) => break head,
                    ResponseEvent::End => {
                        io.body_done = true;
                        continue;
                    }
                    ResponseEvent::Data(_) => {
                        return Err(Error::RemoteProtocol(
                            "response body before response head".to_string(),
                        ))
                    }
                }
            }

            let data = stream.read(READ_NUM_BYTES, timeouts.read).await?;
            let events = if data.is_empty() {
                io.parser.push_eof().map_err(disconnect_error)?
            } else {
                io.parser.push(&data).map_err(parse_error)?
            };
            io.events.extend(events);
            if data.is_empty() && io.events.is_empty() {
                return Err(Error::RemoteProtocol(
                    "server disconnected without sending a response".to_string(),
                ));
            }
        };

        io.response_close = head.connection_close;
        trace!(
            origin = %self.shared.origin,
            status = head.status,
            "received response head"
        );

        let mut extensions = ResponseExtensions {
            http_version: head.version.as_bytes().to_vec(),
            reason_phrase: head.reason.clone(),
            network_stream: None,
        };

        let is_connect = request.method.eq_ignore_ascii_case("CONNECT");
        let tunnel_established = is_connect && (200..300).contains(&head.status);
        let upgraded = head.status == 101;

        let source = if tunnel_established || upgraded {
            // The transport now belongs to the caller; this connection
            // is spent.
            extensions.network_stream = io.stream.take();
            io.events.clear();
            self.shared.meta.lock().unwrap().state = State::Closed;
            BodySource::Empty
        } else {
            // Drain any body events already parsed alongside the head.
            BodySource::Http11 {
                conn: self.clone(),
                read_timeout: timeouts.read,
            }
        };

        Ok(Response {
            status: head.status,
            headers: head.headers,
            body: BodyReader::new(source),
            extensions,
        })
    }

    /// Pull the next body chunk, reading from the stream as needed.
    /// Returns `None` once the message is complete.
    pub(crate) async fn next_chunk(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, Error> {
        if self.is_closed() {
            return Err(Error::Read(
                "connection closed while reading the response body".to_string(),
            ));
        }
        let mut io = self.shared.io.lock().await;
        let io = &mut *io;

        loop {
            match io.events.pop_front() {
                Some(ResponseEvent::Data(data)) => return Ok(Some(data)),
                Some(ResponseEvent::End) => {
                    io.body_done = true;
                    return Ok(None);
                }
                Some(ResponseEvent::Head(_)) => {
                    self.fail(io);
                    return Err(Error::RemoteProtocol(
                        "unexpected response while reading a body".to_string(),
                    ));
                }
                None => {}
            }

            if io.body_done {
                return Ok(None);
            }

            let Some(stream) = io.stream.as_mut() else {
                return Err(Error::Read(
                    "connection closed while reading the response body".to_string(),
                ));
            };
            let data = match stream.read(READ_NUM_BYTES, timeout).await {
                Ok(data) => data,
                Err(err) => {
                    self.fail(io);
                    return Err(err);
                }
            };
            let events = if data.is_empty() {
                io.parser.push_eof()
            } else {
                io.parser.push(&data)
            };
            match events {
                Ok(events) => io.events.extend(events),
                Err(err) => {
                    self.fail(io);
                    return Err(parse_error(err));
                }
            }
        }
    }

    fn fail(&self, io: &mut Io) {
        io.stream = None;
        self.shared.meta.lock().unwrap().state = State::Closed;
    }

    /// Callback from the body reader once the response is released.
    /// Returns the connection to IDLE when the cycle completed cleanly,
    /// otherwise closes it.
    pub(crate) async fn response_closed(&self) {
        let mut io = self.shared.io.lock().await;
        let still_active = self.shared.meta.lock().unwrap().state == State::Active;
        let clean = still_active
            && io.body_done
            && !io.response_close
            && io.stream.is_some()
            && !io.parser.has_buffered_data();

        if clean {
            io.parser.start_next_cycle();
            io.events.clear();
            io.body_done = false;
            let mut meta = self.shared.meta.lock().unwrap();
            meta.state = State::Idle;
            meta.expire_at = self
                .shared
                .keepalive_expiry
                .map(|expiry| Instant::now() + expiry);
        } else {
            self.fail(&mut io);
        }
    }

    /// Unilateral close. Safe from any holder; an in-flight reader will
    /// observe the closed state on its next operation.
    pub(crate) fn close(&self) {
        self.shared.meta.lock().unwrap().state = State::Closed;
        if let Ok(mut io) = self.shared.io.try_lock() {
            io.stream = None;
        }
    }

    /// Graceful close: only shuts the connection down when no request
    /// is in flight.
    pub(crate) fn attempt_close(&self) -> bool {
        let should_close = {
            let meta = self.shared.meta.lock().unwrap();
            matches!(meta.state, State::New | State::Idle)
        };
        if should_close {
            self.close();
        }
        should_close
    }

    pub(crate) fn is_available(&self) -> bool {
        self.shared.meta.lock().unwrap().state == State::Idle
    }

    pub(crate) fn has_expired(&self) -> bool {
        let meta = self.shared.meta.lock().unwrap();
        meta.expire_at
            .map_or(false, |expire_at| Instant::now() > expire_at)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.shared.meta.lock().unwrap().state == State::Idle
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.meta.lock().unwrap().state == State::Closed
    }

    pub(crate) fn info(&self) -> String {
        let meta = self.shared.meta.lock().unwrap();
        format!(
            "'{}', HTTP/1.1, {}, Request Count: {}",
            self.shared.origin,
            meta.state.name(),
            meta.request_count
        )
    }
}

fn parse_error(err: ParseError) -> Error {
    Error::RemoteProtocol(format!("{:?} at offset {}", err.kind, err.offset))
}

fn disconnect_error(_err: ParseError) -> Error {
    Error::RemoteProtocol("server disconnected without sending a response".to_string())
}
