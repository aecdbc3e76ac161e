use super::hpack::HpackDecoder;
use super::types::{
    DataFrame, Frame, FrameHeader, FramePayload, FrameType, GoAwayFrame, HeadersFrame,
    Http2Error, Http2ErrorKind, PingFrame, PushPromiseFrame, RstStreamFrame, SettingsFrame,
    WindowUpdateFrame,
};

const FRAME_HEADER_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Http2ParseStatus {
    NeedMore,
    Complete { frame: Frame },
    Error { error: Http2Error },
}

/// Client-side HTTP/2 frame parser.
///
/// The client sends the connection preface, so parsing starts directly
/// at a frame boundary. HEADERS and PUSH_PROMISE blocks are assembled
/// across CONTINUATION frames and HPACK-decoded before the frame is
/// surfaced.
pub struct Http2FrameParser {
    buffer: Vec<u8>,
    max_frame_size: usize,
    hpack: HpackDecoder,
    header_block: Option<HeaderBlockBuffer>,
}

#[derive(Debug)]
struct HeaderBlockBuffer {
    stream_id: u32,
    end_stream: bool,
    kind: BlockKind,
    fragments: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Headers,
    PushPromise { promised_stream_id: u32 },
}

impl Default for Http2FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Http2FrameParser {
    pub fn new() -> Self {
        let mut hpack = HpackDecoder::new();
        hpack.set_max_table_size(65_536);
        Self {
            buffer: Vec::new(),
            max_frame_size: super::encoder::DEFAULT_MAX_FRAME_SIZE,
            hpack,
            header_block: None,
        }
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    /// Append raw bytes from the transport. Drain completed frames with
    /// `next`.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next(&mut self) -> Http2ParseStatus {
        loop {
            let (frame, consumed) = match parse_frame(&self.buffer, self.max_frame_size) {
                Ok(Some((frame, consumed))) => (frame, consumed),
                Ok(None) => return Http2ParseStatus::NeedMore,
                Err(error) => return Http2ParseStatus::Error { error },
            };
            self.buffer.drain(..consumed);

            match self.attach_header_block(frame) {
                Ok(Some(frame)) => return Http2ParseStatus::Complete { frame },
                Ok(None) => continue,
                Err(error) => return Http2ParseStatus::Error { error },
            }
        }
    }

    fn attach_header_block(&mut self, frame: Frame) -> Result<Option<Frame>, Http2Error> {
        match frame.payload {
            FramePayload::Headers(headers) => {
                let block = HeaderBlockBuffer {
                    stream_id: frame.header.stream_id,
                    end_stream: headers.end_stream,
                    kind: BlockKind::Headers,
                    fragments: headers.header_block,
                };
                if headers.end_headers {
                    return self.finish_block(frame.header, block);
                }
                self.header_block = Some(block);
                Ok(None)
            }
            FramePayload::PushPromise(push) => {
                let block = HeaderBlockBuffer {
                    stream_id: frame.header.stream_id,
                    end_stream: false,
                    kind: BlockKind::PushPromise {
                        promised_stream_id: push.promised_stream_id,
                    },
                    fragments: push.header_block,
                };
                if frame.header.flags & 0x4 != 0 {
                    return self.finish_block(frame.header, block);
                }
                self.header_block = Some(block);
                Ok(None)
            }
            FramePayload::Continuation(fragment) => {
                let Some(mut pending) = self.header_block.take() else {
                    return Err(Http2Error {
                        kind: Http2ErrorKind::ContinuationMismatch,
                        offset: 0,
                    });
                };
                if pending.stream_id != frame.header.stream_id {
                    return Err(Http2Error {
                        kind: Http2ErrorKind::ContinuationMismatch,
                        offset: 0,
                    });
                }
                pending.fragments.extend_from_slice(&fragment);
                if frame.header.flags & 0x4 == 0 {
                    self.header_block = Some(pending);
                    return Ok(None);
                }
                self.finish_block(frame.header, pending)
            }
            _ => Ok(Some(frame)),
        }
    }

    fn finish_block(
        &mut self,
        header: FrameHeader,
        block: HeaderBlockBuffer,
    ) -> Result<Option<Frame>, Http2Error> {
        // Decode even for refused push promises so the shared HPACK
        // table stays consistent.
        let decoded = self.hpack.decode(&block.fragments)?;
        let frame = match block.kind {
            BlockKind::Headers => Frame {
                header: FrameHeader {
                    length: block.fragments.len(),
                    frame_type: FrameType::Headers,
                    flags: header.flags,
                    stream_id: block.stream_id,
                },
                payload: FramePayload::Headers(HeadersFrame {
                    end_stream: block.end_stream,
                    end_headers: true,
                    header_block: block.fragments,
                    headers: decoded,
                }),
            },
            BlockKind::PushPromise { promised_stream_id } => Frame {
                header: FrameHeader {
                    length: block.fragments.len(),
                    frame_type: FrameType::PushPromise,
                    flags: header.flags,
                    stream_id: block.stream_id,
                },
                payload: FramePayload::PushPromise(PushPromiseFrame {
                    promised_stream_id,
                    header_block: block.fragments,
                }),
            },
        };
        Ok(Some(frame))
    }
}

fn parse_frame(
    buffer: &[u8],
    max_frame_size: usize,
) -> Result<Option<(Frame, usize)>, Http2Error> {
    if buffer.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let length =
        ((buffer[0] as usize) << 16) | ((buffer[1] as usize) << 8) | buffer[2] as usize;
    let frame_type = buffer[3];
    let flags = buffer[4];
    let stream_id = u32::from_be_bytes([buffer[5], buffer[6], buffer[7], buffer[8]])
        & 0x7FFF_FFFF;

    if length > max_frame_size {
        return Err(Http2Error {
            kind: Http2ErrorKind::FrameTooLarge {
                declared: length,
                max: max_frame_size,
            },
            offset: 0,
        });
    }

    let total_len = FRAME_HEADER_LEN + length;
    if buffer.len() < total_len {
        return Ok(None);
    }

    let payload = &buffer[FRAME_HEADER_LEN..total_len];
    let frame_type = match frame_type {
        0x0 => FrameType::Data,
        0x1 => FrameType::Headers,
        0x2 => FrameType::Priority,
        0x3 => FrameType::RstStream,
        0x4 => FrameType::Settings,
        0x5 => FrameType::PushPromise,
        0x6 => FrameType::Ping,
        0x7 => FrameType::GoAway,
        0x8 => FrameType::WindowUpdate,
        0x9 => FrameType::Continuation,
        other => FrameType::Unknown(other),
    };

    let header = FrameHeader {
        length,
        frame_type: frame_type.clone(),
        flags,
        stream_id,
    };
    let payload = decode_payload(frame_type, flags, stream_id, payload)?;

    Ok(Some((Frame { header, payload }, total_len)))
}

fn decode_payload(
    frame_type: FrameType,
    flags: u8,
    stream_id: u32,
    payload: &[u8],
) -> Result<FramePayload, Http2Error> {
    match frame_type {
        FrameType::Data => {
            let data = strip_padding(payload, flags)?;
            Ok(FramePayload::Data(DataFrame {
                end_stream: flags & 0x1 != 0,
                payload: data,
            }))
        }
        FrameType::Headers => {
            let header_block = extract_header_block(payload, flags)?;
            Ok(FramePayload::Headers(HeadersFrame {
                end_stream: flags & 0x1 != 0,
                end_headers: flags & 0x4 != 0,
                header_block,
                headers: Vec::new(),
            }))
        }
        FrameType::RstStream => {
            if payload.len() < 4 {
                return Err(Http2Error {
                    kind: Http2ErrorKind::IncompleteFrame,
                    offset: 0,
                });
            }
            let error_code =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Ok(FramePayload::RstStream(RstStreamFrame { error_code }))
        }
        FrameType::Settings => {
            let ack = flags & 0x1 != 0;
            if ack {
                return Ok(FramePayload::Settings(SettingsFrame {
                    settings: Vec::new(),
                    ack: true,
                }));
            }
            if payload.len() % 6 != 0 {
                return Err(Http2Error {
                    kind: Http2ErrorKind::InvalidFrameHeader,
                    offset: 0,
                });
            }
            let mut settings = Vec::new();
            for chunk in payload.chunks(6) {
                let id = u16::from_be_bytes([chunk[0], chunk[1]]);
                let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
                settings.push((id, value));
            }
            Ok(FramePayload::Settings(SettingsFrame {
                settings,
                ack: false,
            }))
        }
        FrameType::PushPromise => {
            let block = strip_padding(payload, flags)?;
            if block.len() < 4 {
                return Err(Http2Error {
                    kind: Http2ErrorKind::IncompleteFrame,
                    offset: 0,
                });
            }
            let promised_stream_id =
                u32::from_be_bytes([block[0], block[1], block[2], block[3]]) & 0x7FFF_FFFF;
            Ok(FramePayload::PushPromise(PushPromiseFrame {
                promised_stream_id,
                header_block: block[4..].to_vec(),
            }))
        }
        FrameType::Ping => {
            if payload.len() != 8 {
                return Err(Http2Error {
                    kind: Http2ErrorKind::InvalidFrameHeader,
                    offset: 0,
                });
            }
            let mut opaque_data = [0u8; 8];
            opaque_data.copy_from_slice(payload);
            Ok(FramePayload::Ping(PingFrame {
                opaque_data,
                ack: flags & 0x1 != 0,
            }))
        }
        FrameType::GoAway => {
            if payload.len() < 8 {
                return Err(Http2Error {
                    kind: Http2ErrorKind::IncompleteFrame,
                    offset: 0,
                });
            }
            let last_stream_id =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                    & 0x7FFF_FFFF;
            let error_code =
                u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
            Ok(FramePayload::GoAway(GoAwayFrame {
                last_stream_id,
                error_code,
                debug_data: payload[8..].to_vec(),
            }))
        }
        FrameType::WindowUpdate => {
            if payload.len() < 4 {
                return Err(Http2Error {
                    kind: Http2ErrorKind::IncompleteFrame,
                    offset: 0,
                });
            }
            let increment =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                    & 0x7FFF_FFFF;
            Ok(FramePayload::WindowUpdate(WindowUpdateFrame {
                stream_id,
                increment,
            }))
        }
        FrameType::Continuation => Ok(FramePayload::Continuation(payload.to_vec())),
        FrameType::Priority | FrameType::Unknown(_) => {
            Ok(FramePayload::Raw(payload.to_vec()))
        }
    }
}

fn strip_padding(payload: &[u8], flags: u8) -> Result<Vec<u8>, Http2Error> {
    if flags & 0x8 == 0 {
        return Ok(payload.to_vec());
    }
    if payload.is_empty() {
        return Err(Http2Error {
            kind: Http2ErrorKind::IncompleteFrame,
            offset: 0,
        });
    }
    let pad_len = payload[0] as usize;
    let data = &payload[1..];
    if data.len() < pad_len {
        return Err(Http2Error {
            kind: Http2ErrorKind::IncompleteFrame,
            offset: 0,
        });
    }
    Ok(data[..data.len() - pad_len].to_vec())
}

fn extract_header_block(payload: &[u8], flags: u8) -> Result<Vec<u8>, Http2Error> {
    let mut offset = 0;
    let mut pad_len = 0usize;

    if flags & 0x8 != 0 {
        if payload.is_empty() {
            return Err(Http2Error {
                kind: Http2ErrorKind::IncompleteFrame,
                offset: 0,
            });
        }
        pad_len = payload[0] as usize;
        offset = 1;
    }

    // A priority block precedes the header fragment when the flag is set.
    if flags & 0x20 != 0 {
        if payload.len() < offset + 5 {
            return Err(Http2Error {
                kind: Http2ErrorKind::IncompleteFrame,
                offset: 0,
            });
        }
        offset += 5;
    }

    if payload.len() < offset + pad_len {
        return Err(Http2Error {
            kind: Http2ErrorKind::IncompleteFrame,
            offset: 0,
        });
    }

    let end = payload.len() - pad_len;
    if end < offset {
        return Err(Http2Error {
            kind: Http2ErrorKind::IncompleteFrame,
            offset: 0,
        });
    }

    Ok(payload[offset..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::super::encoder::{
        encode_data_frames, encode_headers_from_fields, encode_settings_frame,
        DEFAULT_MAX_FRAME_SIZE,
    };
    use super::super::hpack::HpackEncoder;
    use super::super::types::{FramePayload, HeaderField, SettingsFrame};
    use super::{Http2FrameParser, Http2ParseStatus};

    #[test]
    fn parses_settings_frame() {
        let mut parser = Http2FrameParser::new();
        let frame = encode_settings_frame(&SettingsFrame {
            settings: vec![(0x3, 100)],
            ack: false,
        });
        parser.push(&frame);

        match parser.next() {
            Http2ParseStatus::Complete { frame } => match frame.payload {
                FramePayload::Settings(settings) => {
                    assert_eq!(settings.settings, vec![(0x3, 100)]);
                    assert!(!settings.ack);
                }
                other => panic!("unexpected payload {other:?}"),
            },
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(parser.next(), Http2ParseStatus::NeedMore);
    }

    #[test]
    fn parses_data_frame_split_across_pushes() {
        let mut parser = Http2FrameParser::new();
        let frames = encode_data_frames(1, true, b"hello", DEFAULT_MAX_FRAME_SIZE);
        let bytes = frames.concat();
        parser.push(&bytes[..4]);
        assert_eq!(parser.next(), Http2ParseStatus::NeedMore);
        parser.push(&bytes[4..]);

        match parser.next() {
            Http2ParseStatus::Complete { frame } => match frame.payload {
                FramePayload::Data(data) => {
                    assert!(data.end_stream);
                    assert_eq!(data.payload, b"hello");
                }
                other => panic!("unexpected payload {other:?}"),
            },
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn decodes_headers_frame() {
        let mut parser = Http2FrameParser::new();
        let mut encoder = HpackEncoder::new();
        let headers = vec![
            HeaderField {
                name: b":status".to_vec(),
                value: b"200".to_vec(),
            },
            HeaderField {
                name: b"server".to_vec(),
                value: b"mock".to_vec(),
            },
        ];
        let frames =
            encode_headers_from_fields(3, true, &headers, &mut encoder, DEFAULT_MAX_FRAME_SIZE);
        for frame in frames {
            parser.push(&frame);
        }

        match parser.next() {
            Http2ParseStatus::Complete { frame } => {
                assert_eq!(frame.header.stream_id, 3);
                match frame.payload {
                    FramePayload::Headers(parsed) => {
                        assert!(parsed.end_stream);
                        assert_eq!(parsed.headers, headers);
                    }
                    other => panic!("unexpected payload {other:?}"),
                }
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn continuation_assembles_header_block() {
        let mut parser = Http2FrameParser::new();
        let mut encoder = HpackEncoder::new();
        let headers = vec![HeaderField {
            name: b":status".to_vec(),
            value: b"200".to_vec(),
        }];
        // A tiny max frame size forces HEADERS + CONTINUATION.
        let frames = encode_headers_from_fields(5, false, &headers, &mut encoder, 1);
        assert!(frames.len() > 1);
        for frame in frames {
            parser.push(&frame);
        }

        match parser.next() {
            Http2ParseStatus::Complete { frame } => match frame.payload {
                FramePayload::Headers(parsed) => assert_eq!(parsed.headers, headers),
                other => panic!("unexpected payload {other:?}"),
            },
            other => panic!("unexpected status {other:?}"),
        }
    }
}
