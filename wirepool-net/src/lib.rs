mod http1;
mod http2;
mod tls;

pub use http1::{
    BodyMode, Header, HttpVersion, Limits, ParseError, ParseErrorKind, ResponseEvent,
    ResponseHead, ResponseStreamParser, serialize_chunk, serialize_request_head, FINAL_CHUNK,
};

pub use http2::{
    encode_data_frames, encode_goaway_frame, encode_headers_from_fields, encode_ping_frame,
    encode_raw_frame, encode_rst_stream_frame, encode_settings_frame,
    encode_window_update_frame, DataFrame, Frame, FrameHeader, FramePayload, FrameType,
    GoAwayFrame, HeaderField, HeadersFrame, HpackDecoder, HpackEncoder, Http2Error,
    Http2ErrorKind, Http2FrameParser, Http2ParseStatus, PingFrame, PushPromiseFrame,
    RstStreamFrame, SettingsFrame, WindowUpdateFrame, CLIENT_PREFACE,
    DEFAULT_MAX_FRAME_SIZE, ERROR_CANCEL, ERROR_NO_ERROR, ERROR_REFUSED_STREAM,
    SETTINGS_ENABLE_PUSH, SETTINGS_INITIAL_WINDOW_SIZE, SETTINGS_MAX_CONCURRENT_STREAMS,
    SETTINGS_MAX_FRAME_SIZE,
};

pub use tls::{build_connector, encode_alpn_protocols, TlsClientConfig, TlsError};
