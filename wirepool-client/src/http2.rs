use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use wirepool_net::{
    encode_headers_from_fields, encode_ping_frame, encode_raw_frame, encode_rst_stream_frame,
    encode_settings_frame, encode_window_update_frame, FramePayload, FrameType, HeaderField,
    HpackEncoder, Http2FrameParser, Http2ParseStatus, PingFrame, RstStreamFrame, SettingsFrame,
    WindowUpdateFrame, CLIENT_PREFACE, DEFAULT_MAX_FRAME_SIZE, ERROR_CANCEL,
    ERROR_REFUSED_STREAM, SETTINGS_ENABLE_PUSH, SETTINGS_INITIAL_WINDOW_SIZE,
    SETTINGS_MAX_CONCURRENT_STREAMS, SETTINGS_MAX_FRAME_SIZE,
};

use crate::backend::{with_timeout, AsyncIo, NetworkStream};
use crate::body::{Body, BodyReader, BodySource};
use crate::error::Error;
use crate::models::{prepare_headers, Header, Origin, Request, Response, ResponseExtensions};

const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = 100;
const DEFAULT_WINDOW_SIZE: u32 = 65_535;

/// Events dispatched from the connection's reader task to a stream.
pub(crate) enum StreamEvent {
    Headers {
        status: u16,
        headers: Vec<Header>,
    },
    Data(Vec<u8>),
    End,
    Failed(Error),
}

/// One HTTP/2 connection: a single transport multiplexing many
/// streams. A dedicated reader task demultiplexes incoming frames to
/// per-stream channels; outgoing writes are serialized by the send
/// lock.
#[derive(Clone)]
pub struct Http2Connection {
    shared: Arc<Shared>,
}

struct Shared {
    origin: Origin,
    keepalive_expiry: Option<Duration>,
    meta: StdMutex<Meta>,
    send: AsyncMutex<SendHalf>,
    streams: StdMutex<HashMap<u32, UnboundedSender<StreamEvent>>>,
    window: Notify,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

struct Meta {
    state: State,
    request_count: u64,
    expire_at: Option<Instant>,
    next_stream_id: u32,
    open_streams: usize,
    max_concurrent_streams: u32,
    max_frame_size: usize,
    initial_window_size: u32,
    connection_send_window: i64,
    stream_send_windows: HashMap<u32, i64>,
    goaway_received: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Closed,
}

struct SendHalf {
    writer: Option<WriteHalf<Box<dyn AsyncIo>>>,
    hpack: HpackEncoder,
}

impl Http2Connection {
    /// Establish the HTTP/2 connection layer over an open stream:
    /// write the client preface and our settings, then start the frame
    /// reader.
    pub async fn new(
        origin: Origin,
        stream: NetworkStream,
        keepalive_expiry: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let (read_half, mut write_half) = stream.into_split();

        let mut preface = CLIENT_PREFACE.to_vec();
        preface.extend_from_slice(&encode_settings_frame(&SettingsFrame {
            settings: vec![
                (SETTINGS_ENABLE_PUSH, 0),
                (SETTINGS_INITIAL_WINDOW_SIZE, DEFAULT_WINDOW_SIZE),
            ],
            ack: false,
        }));
        write_frame(&mut write_half, &preface, timeout).await?;

        let shared = Arc::new(Shared {
            origin,
            keepalive_expiry,
            meta: StdMutex::new(Meta {
                state: State::Active,
                request_count: 0,
                expire_at: None,
                next_stream_id: 1,
                open_streams: 0,
                max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
                max_frame_size: DEFAULT_MAX_FRAME_SIZE,
                initial_window_size: DEFAULT_WINDOW_SIZE,
                connection_send_window: DEFAULT_WINDOW_SIZE as i64,
                stream_send_windows: HashMap::new(),
                goaway_received: false,
            }),
            send: AsyncMutex::new(SendHalf {
                writer: Some(write_half),
                hpack: HpackEncoder::new(),
            }),
            streams: StdMutex::new(HashMap::new()),
            window: Notify::new(),
            reader: StdMutex::new(None),
        });

        let task = tokio::spawn(reader_loop(Arc::clone(&shared), read_half));
        *shared.reader.lock().unwrap() = Some(task);

        Ok(Self { shared })
    }

    pub async fn handle_request(&self, request: &mut Request) -> Result<Response, Error> {
        if request.url.origin() != self.shared.origin {
            return Err(Error::ConnectionNotAvailable);
        }

        let stream_id = {
            let mut meta = self.shared.meta.lock().unwrap();
            if meta.state != State::Active || meta.goaway_received {
                return Err(Error::ConnectionNotAvailable);
            }
            if meta.open_streams >= meta.max_concurrent_streams as usize {
                return Err(Error::ConnectionNotAvailable);
            }
            meta.request_count += 1;
            meta.open_streams += 1;
            meta.expire_at = None;
            let id = meta.next_stream_id;
            meta.next_stream_id += 2;
            let window = meta.initial_window_size as i64;
            meta.stream_send_windows.insert(id, window);
            id
        };

        let (sender, receiver) = unbounded_channel();
        self.shared.streams.lock().unwrap().insert(stream_id, sender);
        trace!(origin = %self.shared.origin, stream_id, "opened stream");

        match self.run_request(request, stream_id, receiver).await {
            Ok(response) => Ok(response),
            Err(err) => {
                // Per-connection failure policy: any error while driving
                // a request invalidates the transport.
                self.close();
                Err(err)
            }
        }
    }

    async fn run_request(
        &self,
        request: &mut Request,
        stream_id: u32,
        mut receiver: UnboundedReceiver<StreamEvent>,
    ) -> Result<Response, Error> {
        let timeouts = request.extensions.timeouts;

        let fields = request_header_fields(request);
        let end_stream = matches!(request.body, Body::Empty);
        let max_frame_size = self.shared.meta.lock().unwrap().max_frame_size;

        {
            let mut send = self.shared.send.lock().await;
            let send = &mut *send;
            let writer = send
                .writer
                .as_mut()
                .ok_or(Error::ConnectionNotAvailable)?;
            let frames = encode_headers_from_fields(
                stream_id,
                end_stream,
                &fields,
                &mut send.hpack,
                max_frame_size,
            );
            for frame in frames {
                write_frame(writer, &frame, timeouts.write).await?;
            }
        }

        match std::mem::take(&mut request.body) {
            Body::Empty => {}
            Body::Bytes(bytes) => {
                self.send_data(stream_id, &bytes, true, timeouts.write).await?;
            }
            Body::Stream(mut chunks) => {
                while let Some(chunk) = chunks.recv().await {
                    self.send_data(stream_id, &chunk, false, timeouts.write).await?;
                }
                self.send_data(stream_id, &[], true, timeouts.write).await?;
            }
        }

        // Await the response head, skipping informational responses.
        let (status, headers) = loop {
            let event = with_timeout(timeouts.read, receiver.recv(), || Error::ReadTimeout)
                .await?;
            match event {
                Some(StreamEvent::Headers { status, headers }) => {
                    if (100..200).contains(&status) {
                        continue;
                    }
                    break (status, headers);
                }
                Some(StreamEvent::Failed(err)) => return Err(err),
                Some(StreamEvent::Data(_)) | Some(StreamEvent::End) => {
                    return Err(Error::RemoteProtocol(
                        "response data before response headers".to_string(),
                    ))
                }
                None => {
                    return Err(Error::RemoteProtocol(
                        "connection terminated before response headers".to_string(),
                    ))
                }
            }
        };

        Ok(Response {
            status,
            headers,
            body: BodyReader::new(BodySource::Http2 {
                conn: self.clone(),
                stream_id,
                receiver,
                read_timeout: timeouts.read,
            }),
            extensions: ResponseExtensions {
                http_version: b"HTTP/2".to_vec(),
                reason_phrase: Vec::new(),
                network_stream: None,
            },
        })
    }

    /// Write a DATA payload, chunked to the peer's frame size limit and
    /// throttled by the connection and stream flow-control windows.
    async fn send_data(
        &self,
        stream_id: u32,
        data: &[u8],
        end_stream: bool,
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        if data.is_empty() {
            if end_stream {
                let frame = encode_raw_frame(FrameType::Data, 0x1, stream_id, &[]);
                let mut send = self.shared.send.lock().await;
                let writer = send
                    .writer
                    .as_mut()
                    .ok_or_else(|| Error::Write("connection closed".to_string()))?;
                write_frame(writer, &frame, timeout).await?;
            }
            return Ok(());
        }

        let mut offset = 0;
        while offset < data.len() {
            let allowance = match self.allowance(stream_id, data.len() - offset)? {
                Some(allowance) => allowance,
                None => {
                    let mut notified = std::pin::pin!(self.shared.window.notified());
                    notified.as_mut().enable();
                    // Re-check after registering to avoid a lost wakeup.
                    match self.allowance(stream_id, data.len() - offset)? {
                        Some(allowance) => allowance,
                        None => {
                            with_timeout(timeout, notified, || Error::WriteTimeout).await?;
                            continue;
                        }
                    }
                }
            };

            let end = offset + allowance;
            let is_last = end == data.len();
            let flags = if end_stream && is_last { 0x1 } else { 0x0 };
            let frame =
                encode_raw_frame(FrameType::Data, flags, stream_id, &data[offset..end]);

            {
                let mut send = self.shared.send.lock().await;
                let writer = send
                    .writer
                    .as_mut()
                    .ok_or_else(|| Error::Write("connection closed".to_string()))?;
                write_frame(writer, &frame, timeout).await?;
            }
            {
                let mut meta = self.shared.meta.lock().unwrap();
                meta.connection_send_window -= allowance as i64;
                if let Some(window) = meta.stream_send_windows.get_mut(&stream_id) {
                    *window -= allowance as i64;
                }
            }
            offset = end;
        }

        Ok(())
    }

    /// How many bytes may be sent right now, or `None` when a window is
    /// exhausted.
    fn allowance(&self, stream_id: u32, remaining: usize) -> Result<Option<usize>, Error> {
        let meta = self.shared.meta.lock().unwrap();
        if meta.state != State::Active {
            return Err(Error::Write("connection closed".to_string()));
        }
        let stream_window = meta
            .stream_send_windows
            .get(&stream_id)
            .copied()
            .unwrap_or(0);
        let available = stream_window
            .min(meta.connection_send_window)
            .min(meta.max_frame_size as i64);
        if available <= 0 {
            return Ok(None);
        }
        Ok(Some((available as usize).min(remaining)))
    }

    /// Pull the next body chunk for a stream.
    pub(crate) async fn next_stream_chunk(
        &self,
        stream_id: u32,
        receiver: &mut UnboundedReceiver<StreamEvent>,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, Error> {
        loop {
            let event = with_timeout(timeout, receiver.recv(), || Error::ReadTimeout).await?;
            match event {
                Some(StreamEvent::Data(data)) => {
                    self.replenish(stream_id, data.len()).await;
                    return Ok(Some(data));
                }
                Some(StreamEvent::End) => return Ok(None),
                Some(StreamEvent::Failed(err)) => return Err(err),
                // Trailing header blocks are dropped.
                Some(StreamEvent::Headers { .. }) => continue,
                None => {
                    return Err(Error::RemoteProtocol(
                        "stream closed unexpectedly".to_string(),
                    ))
                }
            }
        }
    }

    /// Grant the peer fresh window for consumed body bytes.
    async fn replenish(&self, stream_id: u32, amount: usize) {
        if amount == 0 {
            return;
        }
        let connection_update = encode_window_update_frame(&WindowUpdateFrame {
            stream_id: 0,
            increment: amount as u32,
        });
        let stream_update = encode_window_update_frame(&WindowUpdateFrame {
            stream_id,
            increment: amount as u32,
        });
        let mut send = self.shared.send.lock().await;
        if let Some(writer) = send.writer.as_mut() {
            let _ = write_frame(writer, &connection_update, None).await;
            let _ = write_frame(writer, &stream_update, None).await;
        }
    }

    /// Body released before the stream completed: reset it so the peer
    /// stops sending.
    pub(crate) async fn stream_closed(&self, stream_id: u32, done: bool) {
        let removed = self
            .shared
            .streams
            .lock()
            .unwrap()
            .remove(&stream_id)
            .is_some();
        if removed {
            self.stream_finished(stream_id);
        }
        if removed && !done {
            self.send_rst(stream_id, ERROR_CANCEL).await;
        }
    }

    /// Synchronous variant for drop paths. The reset frame is sent from
    /// a spawned task when a runtime is available.
    pub(crate) fn stream_abandoned(&self, stream_id: u32) {
        let removed = self
            .shared
            .streams
            .lock()
            .unwrap()
            .remove(&stream_id)
            .is_some();
        if removed {
            self.stream_finished(stream_id);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let conn = self.clone();
                handle.spawn(async move {
                    conn.send_rst(stream_id, ERROR_CANCEL).await;
                });
            }
        }
    }

    async fn send_rst(&self, stream_id: u32, error_code: u32) {
        let frame = encode_rst_stream_frame(stream_id, &RstStreamFrame { error_code });
        let mut send = self.shared.send.lock().await;
        if let Some(writer) = send.writer.as_mut() {
            let _ = write_frame(writer, &frame, None).await;
        }
    }

    fn stream_finished(&self, stream_id: u32) {
        stream_finished_inner(&self.shared, stream_id);
    }

    pub(crate) fn close(&self) {
        {
            let mut meta = self.shared.meta.lock().unwrap();
            if meta.state == State::Closed {
                return;
            }
            meta.state = State::Closed;
        }
        if let Some(task) = self.shared.reader.lock().unwrap().take() {
            task.abort();
        }
        if let Ok(mut send) = self.shared.send.try_lock() {
            send.writer = None;
        }
        let senders: Vec<_> = self
            .shared
            .streams
            .lock()
            .unwrap()
            .drain()
            .map(|(_, sender)| sender)
            .collect();
        for sender in senders {
            let _ = sender.send(StreamEvent::Failed(Error::RemoteProtocol(
                "connection closed".to_string(),
            )));
        }
        self.shared.window.notify_waiters();
        debug!(origin = %self.shared.origin, "closed HTTP/2 connection");
    }

    pub(crate) fn attempt_close(&self) -> bool {
        if self.is_idle() {
            self.close();
            return true;
        }
        false
    }

    pub(crate) fn is_available(&self) -> bool {
        let meta = self.shared.meta.lock().unwrap();
        meta.state == State::Active
            && !meta.goaway_received
            && meta.open_streams < meta.max_concurrent_streams as usize
    }

    pub(crate) fn has_expired(&self) -> bool {
        let meta = self.shared.meta.lock().unwrap();
        meta.expire_at
            .map_or(false, |expire_at| Instant::now() > expire_at)
    }

    pub(crate) fn is_idle(&self) -> bool {
        let meta = self.shared.meta.lock().unwrap();
        meta.state == State::Active && meta.open_streams == 0
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.meta.lock().unwrap().state == State::Closed
    }

    pub(crate) fn info(&self) -> String {
        let meta = self.shared.meta.lock().unwrap();
        let state = match meta.state {
            State::Active if meta.open_streams == 0 => "IDLE",
            State::Active => "ACTIVE",
            State::Closed => "CLOSED",
        };
        format!(
            "'{}', HTTP/2, {}, Request Count: {}",
            self.shared.origin, state, meta.request_count
        )
    }
}

/// Translate the request into h2 header fields: pseudo-headers first,
/// then the regular headers minus the connection-specific ones.
fn request_header_fields(request: &Request) -> Vec<HeaderField> {
    let prepared = prepare_headers(&request.headers, &request.url, &request.body);
    let authority = crate::models::host_header_value(&request.url);

    let mut fields = vec![
        HeaderField {
            name: b":method".to_vec(),
            value: request.method.as_bytes().to_vec(),
        },
        HeaderField {
            name: b":authority".to_vec(),
            value: authority,
        },
        HeaderField {
            name: b":scheme".to_vec(),
            value: request.url.scheme.as_bytes().to_vec(),
        },
        HeaderField {
            name: b":path".to_vec(),
            value: request.url.target.clone(),
        },
    ];

    for header in prepared {
        let name = header.name.to_ascii_lowercase();
        if matches!(
            name.as_slice(),
            b"host"
                | b"connection"
                | b"proxy-connection"
                | b"keep-alive"
                | b"transfer-encoding"
                | b"upgrade"
        ) {
            continue;
        }
        fields.push(HeaderField {
            name,
            value: header.value,
        });
    }

    fields
}

async fn write_frame(
    writer: &mut WriteHalf<Box<dyn AsyncIo>>,
    frame: &[u8],
    timeout: Option<Duration>,
) -> Result<(), Error> {
    let write = writer.write_all(frame);
    with_timeout(timeout, write, || Error::WriteTimeout)
        .await?
        .map_err(|err| Error::Write(err.to_string()))
}

async fn reader_loop(shared: Arc<Shared>, mut read_half: ReadHalf<Box<dyn AsyncIo>>) {
    let mut parser = Http2FrameParser::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let count = match read_half.read(&mut buf).await {
            Ok(0) => {
                fail_connection(&shared, "connection closed by peer".to_string());
                return;
            }
            Ok(count) => count,
            Err(err) => {
                fail_connection(&shared, format!("read failed: {err}"));
                return;
            }
        };
        parser.push(&buf[..count]);

        loop {
            match parser.next() {
                Http2ParseStatus::NeedMore => break,
                Http2ParseStatus::Error { error } => {
                    fail_connection(&shared, format!("invalid frame: {:?}", error.kind));
                    return;
                }
                Http2ParseStatus::Complete { frame } => {
                    if handle_frame(&shared, frame).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

async fn handle_frame(shared: &Arc<Shared>, frame: wirepool_net::Frame) -> Result<(), ()> {
    let stream_id = frame.header.stream_id;
    match frame.payload {
        FramePayload::Headers(headers) => {
            let (status, fields) = split_response_headers(headers.headers);
            send_stream_event(shared, stream_id, StreamEvent::Headers {
                status,
                headers: fields,
            });
            if headers.end_stream {
                end_stream(shared, stream_id);
            }
        }
        FramePayload::Data(data) => {
            let end = data.end_stream;
            send_stream_event(shared, stream_id, StreamEvent::Data(data.payload));
            if end {
                end_stream(shared, stream_id);
            }
        }
        FramePayload::Settings(settings) => {
            if !settings.ack {
                apply_settings(shared, &settings);
                let ack = encode_settings_frame(&SettingsFrame {
                    settings: Vec::new(),
                    ack: true,
                });
                if write_control_frame(shared, &ack).await.is_err() {
                    fail_connection(shared, "settings ack failed".to_string());
                    return Err(());
                }
            }
        }
        FramePayload::Ping(ping) => {
            if !ping.ack {
                let ack = encode_ping_frame(&PingFrame {
                    opaque_data: ping.opaque_data,
                    ack: true,
                });
                if write_control_frame(shared, &ack).await.is_err() {
                    fail_connection(shared, "ping ack failed".to_string());
                    return Err(());
                }
            }
        }
        FramePayload::GoAway(goaway) => {
            shared.meta.lock().unwrap().goaway_received = true;
            fail_connection(
                shared,
                format!("received GOAWAY with error code {}", goaway.error_code),
            );
            return Err(());
        }
        FramePayload::RstStream(rst) => {
            let sender = shared.streams.lock().unwrap().remove(&stream_id);
            if let Some(sender) = sender {
                stream_finished_inner(shared, stream_id);
                let _ = sender.send(StreamEvent::Failed(Error::RemoteProtocol(format!(
                    "stream reset by peer with error code {}",
                    rst.error_code
                ))));
            }
        }
        FramePayload::WindowUpdate(update) => {
            {
                let mut meta = shared.meta.lock().unwrap();
                if update.stream_id == 0 {
                    meta.connection_send_window += update.increment as i64;
                } else if let Some(window) =
                    meta.stream_send_windows.get_mut(&update.stream_id)
                {
                    *window += update.increment as i64;
                }
            }
            shared.window.notify_waiters();
        }
        FramePayload::PushPromise(push) => {
            // Server push is refused outright.
            let rst = encode_rst_stream_frame(
                push.promised_stream_id,
                &RstStreamFrame {
                    error_code: ERROR_REFUSED_STREAM,
                },
            );
            if write_control_frame(shared, &rst).await.is_err() {
                fail_connection(shared, "push refusal failed".to_string());
                return Err(());
            }
        }
        FramePayload::Continuation(_) | FramePayload::Raw(_) => {}
    }
    Ok(())
}

fn apply_settings(shared: &Arc<Shared>, settings: &SettingsFrame) {
    let mut meta = shared.meta.lock().unwrap();
    for (id, value) in &settings.settings {
        match *id {
            SETTINGS_MAX_CONCURRENT_STREAMS => meta.max_concurrent_streams = *value,
            SETTINGS_MAX_FRAME_SIZE => meta.max_frame_size = *value as usize,
            SETTINGS_INITIAL_WINDOW_SIZE => {
                let delta = *value as i64 - meta.initial_window_size as i64;
                meta.initial_window_size = *value;
                for window in meta.stream_send_windows.values_mut() {
                    *window += delta;
                }
            }
            _ => {}
        }
    }
    drop(meta);
    shared.window.notify_waiters();
}

fn split_response_headers(fields: Vec<HeaderField>) -> (u16, Vec<Header>) {
    let mut status = 0;
    let mut headers = Vec::new();
    for field in fields {
        if field.name.starts_with(b":") {
            if field.name == b":status" {
                status = std::str::from_utf8(&field.value)
                    .ok()
                    .and_then(|raw| raw.parse::<u16>().ok())
                    .unwrap_or(0);
            }
        } else {
            headers.push(Header {
                name: field.name,
                value: field.value,
            });
        }
    }
    (status, headers)
}

fn send_stream_event(shared: &Arc<Shared>, stream_id: u32, event: StreamEvent) {
    let streams = shared.streams.lock().unwrap();
    if let Some(sender) = streams.get(&stream_id) {
        let _ = sender.send(event);
    }
}

fn end_stream(shared: &Arc<Shared>, stream_id: u32) {
    let sender = shared.streams.lock().unwrap().remove(&stream_id);
    if let Some(sender) = sender {
        let _ = sender.send(StreamEvent::End);
        stream_finished_inner(shared, stream_id);
    }
}

fn stream_finished_inner(shared: &Arc<Shared>, stream_id: u32) {
    let mut meta = shared.meta.lock().unwrap();
    meta.stream_send_windows.remove(&stream_id);
    meta.open_streams = meta.open_streams.saturating_sub(1);
    if meta.open_streams == 0 && meta.state == State::Active {
        meta.expire_at = shared
            .keepalive_expiry
            .map(|expiry| Instant::now() + expiry);
    }
}

async fn write_control_frame(shared: &Arc<Shared>, frame: &[u8]) -> Result<(), Error> {
    let mut send = shared.send.lock().await;
    let writer = send
        .writer
        .as_mut()
        .ok_or_else(|| Error::Write("connection closed".to_string()))?;
    write_frame(writer, frame, None).await
}

/// Fail every outstanding stream and mark the connection closed. Used
/// by the reader task, which cannot abort itself through `close`.
fn fail_connection(shared: &Arc<Shared>, message: String) {
    {
        let mut meta = shared.meta.lock().unwrap();
        if meta.state == State::Closed {
            return;
        }
        meta.state = State::Closed;
    }
    let senders: Vec<_> = shared
        .streams
        .lock()
        .unwrap()
        .drain()
        .map(|(_, sender)| sender)
        .collect();
    for sender in senders {
        let _ = sender.send(StreamEvent::Failed(Error::RemoteProtocol(message.clone())));
    }
    if let Ok(mut send) = shared.send.try_lock() {
        send.writer = None;
    }
    shared.window.notify_waiters();
    debug!(message, "HTTP/2 connection failed");
}
