use super::types::{
    trim_ascii, BodyMode, Header, HttpVersion, Limits, ParseError, ParseErrorKind, ResponseHead,
};

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Head(ResponseHead),
    Data(Vec<u8>),
    End,
}

/// Incremental parser for one client-side HTTP/1.1 response cycle.
///
/// Feed socket reads through `push`; the parser emits the response head
/// once the header block is complete, then body data until the message
/// ends. Informational responses other than 101 are swallowed. Call
/// `prepare` before each request so HEAD and CONNECT framing rules
/// apply, and `start_next_cycle` once a keepalive response has been
/// fully consumed.
pub struct ResponseStreamParser {
    state: MessageState,
    buffer: Vec<u8>,
    limits: Limits,
    chunk_state: ChunkState,
    remaining: u64,
    body_mode: BodyMode,
    head_request: bool,
    connect_request: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageState {
    Headers,
    Body,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChunkState {
    Size { line: Vec<u8> },
    Data { remaining: u64 },
    DataCrlf { remaining: usize },
    Trailer { line: Vec<u8> },
    None,
}

impl Default for ResponseStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseStreamParser {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            state: MessageState::Headers,
            buffer: Vec::new(),
            limits,
            chunk_state: ChunkState::None,
            remaining: 0,
            body_mode: BodyMode::NoBody,
            head_request: false,
            connect_request: false,
        }
    }

    /// Record the request method for the upcoming cycle. HEAD responses
    /// and 2xx CONNECT responses carry no body regardless of framing
    /// headers.
    pub fn prepare(&mut self, method: &[u8]) {
        self.head_request = method.eq_ignore_ascii_case(b"HEAD");
        self.connect_request = method.eq_ignore_ascii_case(b"CONNECT");
    }

    pub fn is_done(&self) -> bool {
        self.state == MessageState::Done
    }

    /// Bytes received beyond the end of the current message. A peer that
    /// sends data outside a response cycle is misbehaving and the
    /// connection should not be reused.
    pub fn has_buffered_data(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Reset for the next keepalive request on the same connection.
    pub fn start_next_cycle(&mut self) {
        self.state = MessageState::Headers;
        self.chunk_state = ChunkState::None;
        self.remaining = 0;
        self.body_mode = BodyMode::NoBody;
        self.head_request = false;
        self.connect_request = false;
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<ResponseEvent>, ParseError> {
        let mut events = Vec::new();
        let mut input = bytes;

        loop {
            match self.state {
                MessageState::Headers => {
                    self.buffer.extend_from_slice(input);
                    input = &[];
                    if self.buffer.len() > self.limits.max_header_bytes {
                        return Err(ParseError {
                            kind: ParseErrorKind::HeaderTooLarge,
                            offset: self.limits.max_header_bytes,
                        });
                    }
                    let Some(header_end) = find_header_end(&self.buffer) else {
                        break;
                    };
                    let header_bytes = self.buffer[..header_end].to_vec();
                    let body_start = header_end + HEADER_TERMINATOR.len();
                    let leftover = self.buffer[body_start..].to_vec();
                    self.buffer.clear();

                    let (head, body_mode) = parse_response_head(
                        &header_bytes,
                        self.head_request,
                        self.connect_request,
                    )?;

                    // Informational responses other than a 101 upgrade
                    // are transparently skipped.
                    if head.status / 100 == 1 && head.status != 101 {
                        self.buffer = leftover;
                        continue;
                    }

                    self.body_mode = body_mode;
                    let content_length = head.content_length;
                    events.push(ResponseEvent::Head(head));

                    match body_mode {
                        BodyMode::NoBody => {
                            events.push(ResponseEvent::End);
                            self.state = MessageState::Done;
                            self.buffer = leftover;
                            break;
                        }
                        BodyMode::ContentLength => {
                            self.remaining = content_length.unwrap_or(0);
                            self.chunk_state = ChunkState::None;
                            self.state = MessageState::Body;
                        }
                        BodyMode::Chunked => {
                            self.chunk_state = ChunkState::Size { line: Vec::new() };
                            self.state = MessageState::Body;
                        }
                        BodyMode::CloseDelimited => {
                            self.chunk_state = ChunkState::None;
                            self.state = MessageState::Body;
                        }
                    }

                    if leftover.is_empty() {
                        break;
                    }
                    let body_events = self.consume_body(&leftover)?;
                    events.extend(body_events);
                    break;
                }
                MessageState::Body => {
                    let body_events = self.consume_body(input)?;
                    events.extend(body_events);
                    break;
                }
                MessageState::Done => {
                    self.buffer.extend_from_slice(input);
                    break;
                }
            }
        }

        Ok(events)
    }

    /// Signal end-of-stream from the peer.
    pub fn push_eof(&mut self) -> Result<Vec<ResponseEvent>, ParseError> {
        if self.state == MessageState::Body && self.body_mode == BodyMode::CloseDelimited {
            self.state = MessageState::Done;
            return Ok(vec![ResponseEvent::End]);
        }

        if self.state != MessageState::Done {
            return Err(ParseError {
                kind: ParseErrorKind::UnexpectedEof,
                offset: 0,
            });
        }

        Ok(Vec::new())
    }

    fn consume_body(&mut self, bytes: &[u8]) -> Result<Vec<ResponseEvent>, ParseError> {
        match self.body_mode {
            BodyMode::ContentLength => self.consume_content_length(bytes),
            BodyMode::CloseDelimited => {
                if bytes.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![ResponseEvent::Data(bytes.to_vec())])
            }
            BodyMode::Chunked => self.consume_chunked(bytes),
            BodyMode::NoBody => Ok(Vec::new()),
        }
    }

    fn consume_content_length(
        &mut self,
        bytes: &[u8],
    ) -> Result<Vec<ResponseEvent>, ParseError> {
        let mut events = Vec::new();
        let take = self.remaining.min(bytes.len() as u64) as usize;
        if take > 0 {
            events.push(ResponseEvent::Data(bytes[..take].to_vec()));
            self.remaining -= take as u64;
        }
        if self.remaining == 0 {
            events.push(ResponseEvent::End);
            self.state = MessageState::Done;
            if take < bytes.len() {
                self.buffer.extend_from_slice(&bytes[take..]);
            }
        }
        Ok(events)
    }

    fn consume_chunked(&mut self, bytes: &[u8]) -> Result<Vec<ResponseEvent>, ParseError> {
        let mut events = Vec::new();
        let mut cursor = 0;

        while cursor < bytes.len() {
            match &mut self.chunk_state {
                ChunkState::Size { line } => {
                    line.push(bytes[cursor]);
                    cursor += 1;
                    if line.len() >= 2 && line[line.len() - 2..] == *CRLF {
                        let line_bytes = line[..line.len() - 2].to_vec();
                        line.clear();
                        let size_str = std::str::from_utf8(&line_bytes).map_err(|_| {
                            ParseError {
                                kind: ParseErrorKind::InvalidChunkSize,
                                offset: 0,
                            }
                        })?;
                        let size_str =
                            size_str.split(';').next().unwrap_or("").trim();
                        if size_str.is_empty() {
                            continue;
                        }
                        let size =
                            u64::from_str_radix(size_str, 16).map_err(|_| ParseError {
                                kind: ParseErrorKind::InvalidChunkSize,
                                offset: 0,
                            })?;
                        if size == 0 {
                            self.chunk_state = ChunkState::Trailer { line: Vec::new() };
                        } else {
                            self.chunk_state = ChunkState::Data { remaining: size };
                        }
                    }
                }
                ChunkState::Data { remaining } => {
                    let take = (*remaining).min((bytes.len() - cursor) as u64) as usize;
                    events.push(ResponseEvent::Data(bytes[cursor..cursor + take].to_vec()));
                    *remaining -= take as u64;
                    cursor += take;
                    if *remaining == 0 {
                        self.chunk_state = ChunkState::DataCrlf { remaining: 2 };
                    }
                }
                ChunkState::DataCrlf { remaining } => {
                    let byte = bytes[cursor];
                    cursor += 1;
                    if *remaining == 2 && byte != b'\r' {
                        return Err(ParseError {
                            kind: ParseErrorKind::InvalidChunkTerminator,
                            offset: 0,
                        });
                    }
                    if *remaining == 1 && byte != b'\n' {
                        return Err(ParseError {
                            kind: ParseErrorKind::InvalidChunkTerminator,
                            offset: 0,
                        });
                    }
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.chunk_state = ChunkState::Size { line: Vec::new() };
                    }
                }
                ChunkState::Trailer { line } => {
                    line.push(bytes[cursor]);
                    cursor += 1;
                    if line.len() >= 2 && line[line.len() - 2..] == *CRLF {
                        let finished = line.len() == 2;
                        line.clear();
                        if finished {
                            self.chunk_state = ChunkState::None;
                            self.state = MessageState::Done;
                            events.push(ResponseEvent::End);
                            if cursor < bytes.len() {
                                self.buffer.extend_from_slice(&bytes[cursor..]);
                            }
                            return Ok(events);
                        }
                    }
                }
                ChunkState::None => break,
            }
        }

        Ok(events)
    }
}

pub fn serialize_request_head(method: &[u8], target: &[u8], headers: &[Header]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(64 + headers.len() * 32);
    bytes.extend_from_slice(method);
    bytes.push(b' ');
    bytes.extend_from_slice(target);
    bytes.extend_from_slice(b" HTTP/1.1\r\n");
    for header in headers {
        bytes.extend_from_slice(&header.name);
        bytes.extend_from_slice(b": ");
        bytes.extend_from_slice(&header.value);
        bytes.extend_from_slice(CRLF);
    }
    bytes.extend_from_slice(CRLF);
    bytes
}

pub fn serialize_chunk(data: &[u8]) -> Vec<u8> {
    let mut bytes = format!("{:x}\r\n", data.len()).into_bytes();
    bytes.extend_from_slice(data);
    bytes.extend_from_slice(CRLF);
    bytes
}

pub const FINAL_CHUNK: &[u8] = b"0\r\n\r\n";

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn parse_response_head(
    bytes: &[u8],
    head_request: bool,
    connect_request: bool,
) -> Result<(ResponseHead, BodyMode), ParseError> {
    let mut lines = bytes.split_str_crlf();
    let status_line = lines.next().unwrap_or(b"");
    let (version, status, reason) = parse_status_line(status_line)?;
    let headers = parse_headers(lines)?;

    let content_length = parse_content_length(&headers)?;
    let chunked = headers
        .iter()
        .any(|header| header.is("transfer-encoding") && header.has_token("chunked"));
    let connection_close = should_close(version, &headers);

    let no_body = status_has_no_body(status)
        || head_request
        || (connect_request && (200..300).contains(&status));
    let close_delimited = !no_body && !chunked && content_length.is_none();

    let head = ResponseHead {
        version,
        status,
        reason,
        headers,
        content_length,
        chunked,
        close_delimited,
        connection_close,
    };

    let body_mode = if no_body || content_length == Some(0) {
        BodyMode::NoBody
    } else if chunked {
        BodyMode::Chunked
    } else if content_length.is_some() {
        BodyMode::ContentLength
    } else {
        BodyMode::CloseDelimited
    };

    Ok((head, body_mode))
}

fn parse_status_line(line: &[u8]) -> Result<(HttpVersion, u16, Vec<u8>), ParseError> {
    let invalid = ParseError {
        kind: ParseErrorKind::InvalidStatusLine,
        offset: 0,
    };

    let mut parts = line.splitn(3, |byte| *byte == b' ');
    let version_raw = parts.next().ok_or(invalid.clone())?;
    let status_raw = parts.next().ok_or(invalid.clone())?;
    let reason = parts.next().unwrap_or(b"").to_vec();

    let version = match version_raw {
        b"HTTP/1.0" => HttpVersion::Http10,
        b"HTTP/1.1" => HttpVersion::Http11,
        _ => return Err(invalid),
    };
    let status = std::str::from_utf8(status_raw)
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .ok_or(invalid)?;

    Ok((version, status, reason))
}

fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a [u8]>,
) -> Result<Vec<Header>, ParseError> {
    let mut headers: Vec<Header> = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        // Obsolete line folding: a continuation extends the previous value.
        if line[0] == b' ' || line[0] == b'\t' {
            let Some(last) = headers.last_mut() else {
                return Err(ParseError {
                    kind: ParseErrorKind::InvalidHeaderLine,
                    offset: 0,
                });
            };
            last.value.push(b' ');
            last.value.extend_from_slice(trim_ascii(line));
            continue;
        }

        let split = line
            .iter()
            .position(|byte| *byte == b':')
            .ok_or(ParseError {
                kind: ParseErrorKind::InvalidHeaderLine,
                offset: 0,
            })?;
        headers.push(Header {
            name: trim_ascii(&line[..split]).to_vec(),
            value: trim_ascii(&line[split + 1..]).to_vec(),
        });
    }

    Ok(headers)
}

fn parse_content_length(headers: &[Header]) -> Result<Option<u64>, ParseError> {
    for header in headers {
        if header.is("content-length") {
            let value = std::str::from_utf8(trim_ascii(&header.value))
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .ok_or(ParseError {
                    kind: ParseErrorKind::InvalidContentLength,
                    offset: 0,
                })?;
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn should_close(version: HttpVersion, headers: &[Header]) -> bool {
    let has_token = |token: &str| {
        headers
            .iter()
            .any(|header| header.is("connection") && header.has_token(token))
    };
    match version {
        HttpVersion::Http10 => !has_token("keep-alive"),
        HttpVersion::Http11 => has_token("close"),
    }
}

fn status_has_no_body(status: u16) -> bool {
    status / 100 == 1 || status == 204 || status == 304
}

trait SplitCrlf {
    fn split_str_crlf(&self) -> CrlfLines<'_>;
}

impl SplitCrlf for [u8] {
    fn split_str_crlf(&self) -> CrlfLines<'_> {
        CrlfLines { rest: Some(self) }
    }
}

struct CrlfLines<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> Iterator for CrlfLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let rest = self.rest?;
        match rest.windows(2).position(|window| window == CRLF) {
            Some(idx) => {
                self.rest = Some(&rest[idx + 2..]);
                Some(&rest[..idx])
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResponseEvent, ResponseStreamParser};

    fn collect_body(events: &[ResponseEvent]) -> Vec<u8> {
        let mut body = Vec::new();
        for event in events {
            if let ResponseEvent::Data(data) = event {
                body.extend_from_slice(data);
            }
        }
        body
    }

    #[test]
    fn parses_content_length_response() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        let events = parser
            .push(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap();

        match &events[0] {
            ResponseEvent::Head(head) => {
                assert_eq!(head.status, 200);
                assert_eq!(head.reason, b"OK");
                assert_eq!(head.content_length, Some(5));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(collect_body(&events), b"hello");
        assert_eq!(events.last(), Some(&ResponseEvent::End));
        assert!(parser.is_done());
    }

    #[test]
    fn parses_chunked_response_across_pushes() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        let events = parser
            .push(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel")
            .unwrap();
        assert_eq!(collect_body(&events), b"hel");

        let events = parser.push(b"lo\r\n3\r\nabc\r\n0\r\n\r\n").unwrap();
        assert_eq!(collect_body(&events), b"loabc");
        assert_eq!(events.last(), Some(&ResponseEvent::End));
    }

    #[test]
    fn close_delimited_body_ends_on_eof() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        let events = parser.push(b"HTTP/1.1 200 OK\r\n\r\npartial").unwrap();
        assert_eq!(collect_body(&events), b"partial");
        assert!(!parser.is_done());

        let events = parser.push_eof().unwrap();
        assert_eq!(events, vec![ResponseEvent::End]);
    }

    #[test]
    fn eof_inside_content_length_body_is_an_error() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        parser
            .push(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
            .unwrap();
        assert!(parser.push_eof().is_err());
    }

    #[test]
    fn skips_informational_responses() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        let events = parser
            .push(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .unwrap();
        match &events[0] {
            ResponseEvent::Head(head) => assert_eq!(head.status, 200),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn head_request_has_no_body() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"HEAD");
        let events = parser
            .push(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
            .unwrap();
        assert_eq!(events.last(), Some(&ResponseEvent::End));
        assert!(parser.is_done());
    }

    #[test]
    fn connect_2xx_has_no_body() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"CONNECT");
        let events = parser
            .push(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .unwrap();
        assert_eq!(events.last(), Some(&ResponseEvent::End));
    }

    #[test]
    fn keepalive_cycle_resets_for_next_response() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        parser
            .push(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .unwrap();
        assert!(parser.is_done());
        assert!(!parser.has_buffered_data());

        parser.start_next_cycle();
        parser.prepare(b"GET");
        let events = parser
            .push(b"HTTP/1.1 204 No Content\r\n\r\n")
            .unwrap();
        match &events[0] {
            ResponseEvent::Head(head) => assert_eq!(head.status, 204),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn connection_close_detected() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        let events = parser
            .push(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        match &events[0] {
            ResponseEvent::Head(head) => {
                assert!(head.connection_close);
                assert_eq!(head.content_length, Some(0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn http10_defaults_to_close_delimited() {
        let mut parser = ResponseStreamParser::new();
        parser.prepare(b"GET");
        let events = parser.push(b"HTTP/1.0 200 OK\r\n\r\nbody").unwrap();
        match &events[0] {
            ResponseEvent::Head(head) => {
                assert!(head.connection_close);
                assert!(head.close_delimited);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
