//! Protocol data model shared by the HTTP and AJP sides.
//!
//! Parsed units reference byte ranges inside the frozen frame-buffer unit
//! ([`Bytes`] slices) instead of copied strings, so a decoded start-line or
//! header set is a zero-copy view over the bytes that arrived from the
//! wire.

use bytes::{Buf, Bytes};
use http::{HeaderMap, Method, StatusCode, Version};

/// One structural unit emitted by a decoder: either a parsed head or a
/// piece of body payload.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// The parsed head (start-line plus header set) of a message.
    Header(T),
    /// A chunk of body payload, or the end-of-body marker.
    Payload(PayloadItem<Data>),
}

/// An item in a message's payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data.
    Chunk(Data),
    /// Marks the end of the payload stream.
    Eof,
}

/// How a message's body is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Exactly this many content bytes follow.
    Length(u64),
    /// Chunked transfer encoding.
    Chunked,
    /// No body is expected.
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// The payload item, if this is a payload message.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(item) => Some(item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// A parsed request start-line.
///
/// `path` and `query` are zero-copy slices of the line as it arrived; the
/// query string is framed separately from the path at the first `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub path: Bytes,
    pub query: Option<Bytes>,
    pub version: Version,
}

impl RequestLine {
    /// The path as UTF-8, when valid.
    pub fn path_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.path).ok()
    }

    /// The query string as UTF-8, when present and valid.
    pub fn query_str(&self) -> Option<&str> {
        self.query.as_deref().and_then(|q| std::str::from_utf8(q).ok())
    }
}

/// A parsed response start-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: StatusCode,
    pub reason: Bytes,
}

/// A fully parsed request head: start-line plus header set.
#[derive(Debug)]
pub struct RequestHead {
    pub line: RequestLine,
    pub headers: HeaderMap,
}

/// A fully parsed response head: start-line plus header set.
#[derive(Debug)]
pub struct ResponseHead {
    pub line: StatusLine,
    pub headers: HeaderMap,
}
