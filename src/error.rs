//! Error taxonomy for the codec.
//!
//! Three distinct situations are kept strictly apart:
//!
//! - *Incomplete input* is not an error at all; decoders report it as
//!   `Ok(None)` (or [`FillResult::NeedMore`]) and resume later from the
//!   exact recorded position.
//! - *Malformed units* (bad magic, oversized declared length, mismatched
//!   data-packet length, invalid start-line tokens) are fatal to the
//!   connection and are never retried.
//! - *Policy violations* (oversized header section, secret mismatch) are
//!   likewise fatal but stem from configuration limits rather than broken
//!   wire data.
//!
//! [`FillResult::NeedMore`]: crate::buffer::FillResult::NeedMore

use std::io;
use thiserror::Error;

/// Errors raised by the [`FrameBuffer`](crate::buffer::FrameBuffer) itself.
#[derive(Error, Debug)]
pub enum BufferError {
    /// A single structural unit would need more bytes than policy allows.
    ///
    /// Distinct from "need more input": the unit can never fit, so the
    /// connection must be aborted.
    #[error("unit of {requested} bytes exceeds the maximum unit size {max}")]
    UnitTooLarge { requested: usize, max: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Errors produced while parsing HTTP start-lines, headers and bodies.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(String),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http status code")]
    InvalidStatus,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// The stream ended cleanly in the middle of a structural unit.
    #[error("stream truncated inside a protocol unit")]
    TruncatedStream,

    #[error("buffer error: {source}")]
    Buffer {
        #[from]
        source: BufferError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn invalid_version<S: ToString>(token: S) -> Self {
        Self::InvalidVersion(token.to_string())
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors produced while serializing outgoing messages.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }
}

/// Errors produced by the AJP binary framer.
///
/// AJP has no mid-packet resync strategy, so every variant except
/// [`AjpError::Parse`]'s recoverable cases is fatal to the connection.
#[derive(Error, Debug)]
pub enum AjpError {
    #[error("invalid packet magic number: {found:#06x}")]
    BadMagic { found: u16 },

    #[error("packet of {size} bytes exceeds the maximum packet size {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("expected packet type {expected:?}, found {found:?}")]
    UnexpectedPacketType { expected: &'static str, found: String },

    #[error("unknown packet type byte {0:#04x}")]
    UnknownPacketType(u8),

    #[error("data packet length {declared} disagrees with the packet header ({actual})")]
    DataLengthMismatch { declared: usize, actual: usize },

    #[error("malformed forward request: {reason}")]
    MalformedForwardRequest { reason: String },

    #[error("request secret doesn't match")]
    SecretMismatch,

    /// The stream ended cleanly in the middle of a packet.
    #[error("stream truncated inside an ajp packet")]
    TruncatedStream,

    #[error("buffer error: {source}")]
    Buffer {
        #[from]
        source: BufferError,
    },

    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl AjpError {
    pub fn bad_magic(found: u16) -> Self {
        Self::BadMagic { found }
    }

    pub fn packet_too_large(size: usize, max: usize) -> Self {
        Self::PacketTooLarge { size, max }
    }

    pub fn unexpected_type<S: ToString>(expected: &'static str, found: S) -> Self {
        Self::UnexpectedPacketType { expected, found: found.to_string() }
    }

    pub fn malformed_forward_request<S: ToString>(reason: S) -> Self {
        Self::MalformedForwardRequest { reason: reason.to_string() }
    }
}
