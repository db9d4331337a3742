//! Body transfer strategies built atop the frame buffer.
//!
//! The strategy is selected from the parsed head by [`request_payload_size`]
//! / [`response_payload_size`] and then driven incrementally: fixed-length
//! bodies hand out whatever bytes are buffered (never more than declared),
//! chunked bodies run a byte-at-a-time state machine, and no-body messages
//! report end-of-payload immediately.

use std::cmp;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::error::ParseError;
use crate::protocol::{PayloadItem, PayloadSize};

use ChunkedState::*;

/// Selects the body framing for a request from its header set.
///
/// Per RFC 9112: chunked transfer-encoding (as the final coding) wins,
/// otherwise Content-Length, otherwise no body. Both headers present at
/// once is a parse error.
pub fn request_payload_size(headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    let te_header = headers.get(http::header::TRANSFER_ENCODING);
    let cl_header = headers.get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (None, Some(cl_value)) => {
            let length = parse_content_length(cl_value)?;
            if length == 0 { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
        }
    }
}

/// Selects the body framing for a response.
///
/// Status codes 204, 205 and 304 never carry a body, regardless of any
/// Content-Length or Transfer-Encoding header present.
pub fn response_payload_size(status: StatusCode, headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    match status.as_u16() {
        204 | 205 | 304 => Ok(PayloadSize::Empty),
        _ => request_payload_size(headers),
    }
}

fn parse_content_length(value: &HeaderValue) -> Result<u64, ParseError> {
    let s = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
    s.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {s} is not u64")))
}

/// True when chunked is the final coding in the Transfer-Encoding value.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value
        && let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next()
    {
        return bytes.trim_ascii() == CHUNKED;
    }
    false
}

/// Decoder for a body with a known content length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    /// Hands out buffered bytes up to the declared length.
    pub fn decode(&mut self, buf: &mut FrameBuffer) -> Result<Option<PayloadItem>, ParseError> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if buf.available() == 0 {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, buf.available() as u64) as usize;
        let bytes = buf.take_bytes(len);
        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

/// Decoder for chunked transfer encoding.
///
/// Each chunk is a hex size line (with optional extensions), the data, and
/// a CRLF; a zero-size chunk followed by optional trailers ends the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex.
    Size,
    /// Whitespace after the size.
    SizeLws,
    /// Skip chunk extensions.
    Extension,
    /// LF after the chunk size line.
    SizeLf,
    /// Chunk data.
    Body,
    /// CR after chunk data.
    BodyCr,
    /// LF after chunk data.
    BodyLf,
    /// Optional trailer fields after the last chunk.
    Trailer,
    /// LF after a trailer line.
    TrailerLf,
    /// Final CR.
    EndCr,
    /// Final LF.
    EndLf,
    /// The body is fully read.
    End,
}

impl ChunkedDecoder {
    pub fn decode(&mut self, buf: &mut FrameBuffer) -> Result<Option<PayloadItem>, ParseError> {
        loop {
            if self.state == End {
                trace!("finished reading chunked body");
                return Ok(Some(PayloadItem::Eof));
            }

            if buf.available() == 0 {
                return Ok(None);
            }

            let mut out = None;
            self.state = match self.state.step(buf, &mut self.remaining_size, &mut out)? {
                Some(next) => next,
                None => return Ok(None),
            };

            if let Some(bytes) = out {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($buf:ident) => {{
        match $buf.get_u8() {
            Some(b) => b,
            None => return Ok(None),
        }
    }};
}

impl ChunkedState {
    /// One step of the chunked state machine. `Ok(None)` means the input
    /// ran dry mid-step; resumption re-enters the same state.
    fn step(
        self,
        buf: &mut FrameBuffer,
        remaining_size: &mut u64,
        out: &mut Option<Bytes>,
    ) -> Result<Option<ChunkedState>, ParseError> {
        match self {
            Size => Self::read_size(buf, remaining_size),
            SizeLws => Self::read_size_lws(buf),
            Extension => Self::read_extension(buf),
            SizeLf => Self::read_size_lf(buf, remaining_size),
            Body => Self::read_body(buf, remaining_size, out),
            BodyCr => Self::expect(buf, b'\r', BodyLf, "invalid chunk body CR"),
            BodyLf => Self::expect(buf, b'\n', Size, "invalid chunk body LF"),
            Trailer => Self::read_trailer(buf),
            TrailerLf => Self::expect(buf, b'\n', EndCr, "invalid trailer end LF"),
            EndCr => Self::read_end_cr(buf),
            EndLf => Self::expect(buf, b'\n', End, "invalid chunk end LF"),
            End => Ok(Some(End)),
        }
    }

    fn expect(
        buf: &mut FrameBuffer,
        byte: u8,
        next: ChunkedState,
        reason: &'static str,
    ) -> Result<Option<ChunkedState>, ParseError> {
        if try_next_byte!(buf) == byte { Ok(Some(next)) } else { Err(ParseError::invalid_body(reason)) }
    }

    fn read_size(buf: &mut FrameBuffer, size: &mut u64) -> Result<Option<ChunkedState>, ParseError> {
        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(val) => val,
                    None => return Err(ParseError::invalid_body("chunked length overflow")),
                }
            };
        }

        let radix = 16;
        match try_next_byte!(buf) {
            b @ b'0'..=b'9' => {
                *size = or_overflow!(size.checked_mul(radix));
                *size = or_overflow!(size.checked_add(u64::from(b - b'0')));
            }
            b @ b'a'..=b'f' => {
                *size = or_overflow!(size.checked_mul(radix));
                *size = or_overflow!(size.checked_add(u64::from(b + 10 - b'a')));
            }
            b @ b'A'..=b'F' => {
                *size = or_overflow!(size.checked_mul(radix));
                *size = or_overflow!(size.checked_add(u64::from(b + 10 - b'A')));
            }
            b'\t' | b' ' => return Ok(Some(SizeLws)),
            b';' => return Ok(Some(Extension)),
            b'\r' => return Ok(Some(SizeLf)),
            _ => return Err(ParseError::invalid_body("invalid chunk size line")),
        }

        Ok(Some(Size))
    }

    fn read_size_lws(buf: &mut FrameBuffer) -> Result<Option<ChunkedState>, ParseError> {
        match try_next_byte!(buf) {
            b'\t' | b' ' => Ok(Some(SizeLws)),
            b';' => Ok(Some(Extension)),
            b'\r' => Ok(Some(SizeLf)),
            _ => Err(ParseError::invalid_body("invalid chunk size linear white space")),
        }
    }

    fn read_extension(buf: &mut FrameBuffer) -> Result<Option<ChunkedState>, ParseError> {
        // Extensions are ignored; they end at CRLF. A bare LF inside an
        // extension is rejected.
        match try_next_byte!(buf) {
            b'\r' => Ok(Some(SizeLf)),
            b'\n' => Err(ParseError::invalid_body("chunk extension contains newline")),
            _ => Ok(Some(Extension)),
        }
    }

    fn read_size_lf(buf: &mut FrameBuffer, size: &mut u64) -> Result<Option<ChunkedState>, ParseError> {
        match try_next_byte!(buf) {
            b'\n' => {
                if *size == 0 {
                    Ok(Some(EndCr))
                } else {
                    Ok(Some(Body))
                }
            }
            _ => Err(ParseError::invalid_body("invalid chunk size LF")),
        }
    }

    fn read_body(
        buf: &mut FrameBuffer,
        size: &mut u64,
        out: &mut Option<Bytes>,
    ) -> Result<Option<ChunkedState>, ParseError> {
        if buf.available() == 0 {
            return Ok(Some(Body));
        }

        if *size == 0 {
            return Ok(Some(BodyCr));
        }

        let remaining = cmp::min(*size, usize::MAX as u64) as usize;
        let read_size = cmp::min(remaining, buf.available());

        *size -= read_size as u64;
        *out = Some(buf.take_bytes(read_size));

        if *size > 0 { Ok(Some(Body)) } else { Ok(Some(BodyCr)) }
    }

    fn read_trailer(buf: &mut FrameBuffer) -> Result<Option<ChunkedState>, ParseError> {
        match try_next_byte!(buf) {
            b'\r' => Ok(Some(TrailerLf)),
            _ => Ok(Some(Trailer)),
        }
    }

    fn read_end_cr(buf: &mut FrameBuffer) -> Result<Option<ChunkedState>, ParseError> {
        match try_next_byte!(buf) {
            b'\r' => Ok(Some(EndLf)),
            _ => Ok(Some(Trailer)),
        }
    }
}

/// A unified decoder over the three body framings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn decode(&mut self, buf: &mut FrameBuffer) -> Result<Option<PayloadItem>, ParseError> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(buf),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(buf),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(n) => PayloadDecoder::fix_length(n),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(bytes: &[u8]) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(64 * 1024);
        buffer.feed(bytes);
        buffer
    }

    #[test]
    fn length_decoder_stops_at_declared_length() {
        let mut buffer = buffer_with(b"1012345678rest");
        let mut decoder = LengthDecoder::new(10);

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"1012345678");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(buffer.window(), b"rest");
    }

    #[test]
    fn length_decoder_across_partial_reads() {
        let mut buffer = buffer_with(b"abc");
        let mut decoder = LengthDecoder::new(6);

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"abc");
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.feed(b"def");
        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"def");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn chunked_basic() {
        let mut buffer = buffer_with(b"10\r\n1234567890abcdef\r\n0\r\n\r\n");
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"1234567890abcdef");

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn chunked_with_extension_and_trailers() {
        let mut buffer = buffer_with(b"5;ext=v\r\nhello\r\n0\r\nTrailer: x\r\n\r\n");
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"hello");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn chunked_split_mid_chunk_resumes() {
        let mut buffer = buffer_with(b"5\r\nhel");
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"hel");

        buffer.feed(b"lo\r\n0\r\n\r\n");
        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"lo");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn chunked_invalid_size_is_malformed() {
        let mut buffer = buffer_with(b"xyz\r\n");
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn chunked_missing_crlf_is_malformed() {
        let mut buffer = buffer_with(b"5\r\nhelloXX");
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"hello");
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn no_body_statuses_override_content_length() {
        for status in [StatusCode::NO_CONTENT, StatusCode::RESET_CONTENT, StatusCode::NOT_MODIFIED] {
            let mut headers = HeaderMap::new();
            headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("42"));
            let size = response_payload_size(status, &headers).unwrap();
            assert!(size.is_empty(), "status {status}");
        }
    }

    #[test]
    fn response_with_length_has_body() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        let size = response_payload_size(StatusCode::OK, &headers).unwrap();
        assert_eq!(size, PayloadSize::Length(42));
    }

    #[test]
    fn chunked_must_be_final_coding() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("gzip, chunked"));
        assert_eq!(request_payload_size(&headers).unwrap(), PayloadSize::Chunked);

        let mut headers = HeaderMap::new();
        headers.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked, gzip"));
        assert_eq!(request_payload_size(&headers).unwrap(), PayloadSize::Empty);
    }

    #[test]
    fn both_framing_headers_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert!(request_payload_size(&headers).is_err());
    }

    #[test]
    fn zero_or_absent_content_length_means_no_body() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(request_payload_size(&headers).unwrap().is_empty());
        assert!(request_payload_size(&HeaderMap::new()).unwrap().is_empty());
    }
}
