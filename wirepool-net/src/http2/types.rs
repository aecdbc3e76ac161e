pub const CLIENT_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const SETTINGS_ENABLE_PUSH: u16 = 0x2;
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;

pub const ERROR_NO_ERROR: u32 = 0x0;
pub const ERROR_CANCEL: u32 = 0x8;
pub const ERROR_REFUSED_STREAM: u32 = 0x7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: usize,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: FramePayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Data(DataFrame),
    Headers(HeadersFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    PushPromise(PushPromiseFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    WindowUpdate(WindowUpdateFrame),
    Continuation(Vec<u8>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub end_stream: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub end_stream: bool,
    pub end_headers: bool,
    pub header_block: Vec<u8>,
    pub headers: Vec<HeaderField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub error_code: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub settings: Vec<(u16, u32)>,
    pub ack: bool,
}

/// A server-initiated stream announcement. The client engine refuses
/// these; the promised stream id is carried so it can be reset. The
/// header block is still HPACK-decoded (and discarded) to keep the
/// shared dynamic table consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromiseFrame {
    pub promised_stream_id: u32,
    pub header_block: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingFrame {
    pub opaque_data: [u8; 8],
    pub ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_stream_id: u32,
    pub error_code: u32,
    pub debug_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: u32,
    pub increment: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http2Error {
    pub kind: Http2ErrorKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Http2ErrorKind {
    InvalidFrameHeader,
    IncompleteFrame,
    FrameTooLarge { declared: usize, max: usize },
    HpackDecode,
    ContinuationMismatch,
}
