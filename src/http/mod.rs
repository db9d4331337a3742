//! Incremental HTTP/1.x codec.
//!
//! This module provides streaming HTTP message processing over the frame
//! buffer: resumable finite-state-machine parsing on the way in, plain
//! field-sequence serialization on the way out.
//!
//! - Decoding:
//!   - [`RequestDecoder`] / [`ResponseDecoder`]: full-message facades
//!   - Start-line parsing via [`start_line`]
//!   - Header-block parsing via [`header`]
//!   - Body framing via [`body`]
//! - Encoding:
//!   - [`RequestEncoder`]: head plus payload items
//!   - [`encode_request_line`] / [`encode_status_line`]: start-lines alone
//!
//! Every decoder in this module observes the same discipline: `Ok(None)`
//! means "need more input", the recorded scan position never moves
//! backward, and resuming after more bytes arrive never re-examines bytes
//! already scanned.

pub mod body;
pub mod header;
pub(crate) mod parse;
pub mod start_line;

mod encoder;
mod request_decoder;
mod response_decoder;

pub use encoder::{RequestEncoder, encode_header_block, encode_request_line, encode_status_line};
pub use request_decoder::RequestDecoder;
pub use response_decoder::ResponseDecoder;
