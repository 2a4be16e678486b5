pub mod headers;
pub mod message;

pub use headers::HeaderMap;
pub use message::{
    normalize_crlf, validate_replacement_header_block, HttpMessage, MessageKind, Method, StartLine,
};
