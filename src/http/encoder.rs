//! Serialization of outgoing HTTP messages.
//!
//! Unlike the decode side, encoding needs no state machine: a start-line is
//! a fixed sequence of field writes and always completes synchronously
//! given a fully-populated head. The [`RequestEncoder`] facade still tracks
//! one piece of state, the in-flight payload encoder, so that a head sent
//! while a previous body is unfinished is rejected as contract misuse.

use std::io::{self, ErrorKind, Write};

use bytes::{Buf, BufMut, BytesMut};
use http::{HeaderMap, HeaderValue, Version, header};
use tokio_util::codec::Encoder;
use tracing::{error, warn};

use crate::error::SendError;
use crate::protocol::{Message, PayloadItem, PayloadSize, RequestHead, RequestLine, StatusLine};

/// Initial buffer size reserved for head serialization.
const INIT_HEADER_SIZE: usize = 4 * 1024;

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_10 => Ok("HTTP/1.0"),
        Version::HTTP_11 => Ok("HTTP/1.1"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(io::Error::from(ErrorKind::Unsupported).into())
        }
    }
}

/// Writes `METHOD SP path[?query] SP version CRLF`.
pub fn encode_request_line(line: &RequestLine, dst: &mut BytesMut) -> Result<(), SendError> {
    dst.put_slice(line.method.as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(&line.path);
    if let Some(query) = &line.query {
        dst.put_u8(b'?');
        dst.put_slice(query);
    }
    dst.put_u8(b' ');
    dst.put_slice(version_str(line.version)?.as_bytes());
    dst.put_slice(b"\r\n");
    Ok(())
}

/// Writes `version SP status SP reason CRLF`.
pub fn encode_status_line(line: &StatusLine, dst: &mut BytesMut) -> Result<(), SendError> {
    write!(FastWrite(dst), "{} {} ", version_str(line.version)?, line.status.as_str())?;
    if line.reason.is_empty() {
        if let Some(reason) = line.status.canonical_reason() {
            dst.put_slice(reason.as_bytes());
        }
    } else {
        dst.put_slice(&line.reason);
    }
    dst.put_slice(b"\r\n");
    Ok(())
}

/// Writes the header lines and the terminating empty line, forcing the
/// body-framing header to agree with `payload_size`.
pub fn encode_header_block(
    headers: &mut HeaderMap,
    payload_size: PayloadSize,
    dst: &mut BytesMut,
) -> Result<(), SendError> {
    match payload_size {
        PayloadSize::Length(n) => match headers.get_mut(header::CONTENT_LENGTH) {
            Some(value) => *value = n.into(),
            None => {
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
        },
        PayloadSize::Chunked => match headers.get_mut(header::TRANSFER_ENCODING) {
            Some(value) => *value = HeaderValue::from_static("chunked"),
            None => {
                headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
        },
        PayloadSize::Empty => {
            headers.remove(header::TRANSFER_ENCODING);
            match headers.get_mut(header::CONTENT_LENGTH) {
                Some(value) => *value = 0.into(),
                None => {
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
                }
            }
        }
    }

    for (header_name, header_value) in headers.iter() {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LengthEncoder {
    remaining: u64,
}

impl LengthEncoder {
    fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    fn is_finish(&self) -> bool {
        self.remaining == 0
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                let len = bytes.remaining() as u64;
                if len == 0 {
                    return Ok(());
                }
                if len > self.remaining {
                    return Err(SendError::invalid_body(format!(
                        "chunk of {len} bytes exceeds the {} remaining declared bytes",
                        self.remaining
                    )));
                }
                dst.extend_from_slice(bytes.chunk());
                self.remaining -= len;
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    warn!(remaining = self.remaining, "eof before declared length was written");
                    return Err(SendError::invalid_body("body shorter than declared content-length"));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    fn new() -> Self {
        Self { eof: false }
    }

    fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(FastWrite(dst), "{:X}\r\n", bytes.remaining())?;
                dst.reserve(bytes.remaining() + 2);
                dst.extend_from_slice(bytes.chunk());
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    NoBody,
}

impl PayloadEncoder {
    fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::NoBody => true,
        }
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(size: PayloadSize) -> Self {
        let kind = match size {
            PayloadSize::Length(n) => Kind::Length(LengthEncoder::new(n)),
            PayloadSize::Chunked => Kind::Chunked(ChunkedEncoder::new()),
            PayloadSize::Empty => Kind::NoBody,
        };
        Self { kind }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::NoBody => Ok(()),
        }
    }
}

/// Serializes outgoing requests: head first, then payload items until Eof.
#[derive(Debug)]
pub struct RequestEncoder {
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestEncoder {
    fn default() -> Self {
        Self { payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(RequestHead, PayloadSize), D>> for RequestEncoder {
    type Error = SendError;

    fn encode(
        &mut self,
        item: Message<(RequestHead, PayloadSize), D>,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        match item {
            Message::Header((mut head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive request head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                dst.reserve(INIT_HEADER_SIZE);
                encode_request_line(&head.line, dst)?;
                encode_header_block(&mut head.headers, payload_size, dst)?;

                self.payload_encoder = Some(payload_size.into());
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect request head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

/// Fast writer over `BytesMut`; space is reserved up front so the usual
/// io::Write bookkeeping is pure overhead.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
