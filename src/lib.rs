//! An incremental, resumable codec for HTTP/1.x and AJP/1.3.
//!
//! This crate is the parsing and framing engine of a servlet-container
//! connector: bytes arrive from the transport in arbitrary fragments, and
//! every decoder advances as far as the buffered input allows, returning
//! "need more input" instead of blocking and resuming later from the exact
//! recorded position. Nothing is ever re-scanned.
//!
//! # Features
//!
//! - A growable [`FrameBuffer`](buffer::FrameBuffer) with explicit
//!   consumption markers and an O(unconsumed) growth policy
//! - Resumable HTTP/1.x request and response parsing
//!   ([`http::RequestDecoder`], [`http::ResponseDecoder`]) plus start-line
//!   and header serialization
//! - AJP/1.3 packet framing, forward-request decoding and turn-taking body
//!   flow control ([`ajp::AjpFramer`])
//! - Pooled, pre-resolved completion handles
//!   ([`completion::Completion`]) for the dispatch layer's fast path
//! - Zero-copy parsed units: paths, header values and body chunks are
//!   [`bytes::Bytes`] slices of the wire input
//!
//! # Example
//!
//! ```
//! use ajp_codec::http::RequestDecoder;
//! use ajp_codec::protocol::Message;
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut input = BytesMut::from("GET /x?y=1 HTTP/1.1\r\n\r\n");
//!
//! let item = decoder.decode(&mut input).unwrap().unwrap();
//! let Message::Header((head, _payload_size)) = item else { unreachable!() };
//! assert_eq!(head.line.path_str(), Some("/x"));
//! assert_eq!(head.line.query_str(), Some("y=1"));
//! ```

pub mod ajp;
pub mod buffer;
pub mod completion;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;

mod utils;

pub use buffer::{ByteSource, FillResult, FrameBuffer, ReadSource};
pub use completion::{Completion, CompletionError, CompletionPool, Poolable};
pub use config::AjpConfig;
pub use error::{AjpError, BufferError, ParseError, SendError};
pub use protocol::{Message, PayloadItem, PayloadSize, RequestHead, RequestLine, ResponseHead, StatusLine};
