mod stream;
mod types;

pub use stream::{
    serialize_chunk, serialize_request_head, ResponseEvent, ResponseStreamParser, FINAL_CHUNK,
};
pub use types::{
    BodyMode, Header, HttpVersion, Limits, ParseError, ParseErrorKind, ResponseHead,
};
