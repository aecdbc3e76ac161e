mod encoder;
mod hpack;
mod parser;
mod types;

pub use encoder::{
    encode_data_frames, encode_goaway_frame, encode_headers_from_fields, encode_ping_frame,
    encode_raw_frame, encode_rst_stream_frame, encode_settings_frame,
    encode_window_update_frame, DEFAULT_MAX_FRAME_SIZE,
};
pub use hpack::{HpackDecoder, HpackEncoder};
pub use parser::{Http2FrameParser, Http2ParseStatus};
pub use types::{
    DataFrame, Frame, FrameHeader, FramePayload, FrameType, GoAwayFrame, HeaderField,
    HeadersFrame, Http2Error, Http2ErrorKind, PingFrame, PushPromiseFrame, RstStreamFrame,
    SettingsFrame, WindowUpdateFrame, CLIENT_PREFACE, ERROR_CANCEL, ERROR_NO_ERROR,
    ERROR_REFUSED_STREAM, SETTINGS_ENABLE_PUSH, SETTINGS_INITIAL_WINDOW_SIZE,
    SETTINGS_MAX_CONCURRENT_STREAMS, SETTINGS_MAX_FRAME_SIZE,
};
