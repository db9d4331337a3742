//! HTTP request decoder facade.
//!
//! Couples the resumable start-line, header-block and body decoders into a
//! single [`Decoder`] so the dispatch layer can drive a connection with a
//! `FramedRead`-style loop. Incoming bytes are moved into the connection's
//! [`FrameBuffer`] (the one copy at the boundary crossing) and the phase
//! machine advances as far as they allow.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::config::DEFAULT_MAX_HEADER_BYTES;
use crate::error::ParseError;
use crate::http::body::{PayloadDecoder, request_payload_size};
use crate::http::header::HeaderBlockDecoder;
use crate::http::start_line::RequestLineDecoder;
use crate::protocol::{Message, PayloadItem, PayloadSize, RequestHead, RequestLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    StartLine,
    Headers,
    Payload,
}

/// Decodes HTTP/1.x requests incrementally.
///
/// Emits `Message::Header((head, payload_size))` once per request, followed
/// by zero or more `Message::Payload(Chunk)` items and a final
/// `Message::Payload(Eof)`, after which the decoder is ready for the next
/// pipelined request on the same connection.
#[derive(Debug)]
pub struct RequestDecoder {
    buffer: FrameBuffer,
    phase: Phase,
    line_decoder: RequestLineDecoder,
    header_decoder: HeaderBlockDecoder,
    payload_decoder: Option<PayloadDecoder>,
    line: Option<RequestLine>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::with_max_header_size(DEFAULT_MAX_HEADER_BYTES)
    }

    pub fn with_max_header_size(max_header_size: usize) -> Self {
        Self {
            buffer: FrameBuffer::new(max_header_size.max(DEFAULT_MAX_HEADER_BYTES)),
            phase: Phase::StartLine,
            line_decoder: RequestLineDecoder::new(max_header_size),
            header_decoder: HeaderBlockDecoder::new(max_header_size),
            payload_decoder: None,
            line: None,
        }
    }

    fn advance(&mut self) -> Result<Option<Message<(RequestHead, PayloadSize)>>, ParseError> {
        loop {
            match self.phase {
                Phase::StartLine => match self.line_decoder.decode(&mut self.buffer)? {
                    Some(line) => {
                        self.line = Some(line);
                        self.phase = Phase::Headers;
                    }
                    None => return Ok(None),
                },

                Phase::Headers => match self.header_decoder.decode(&mut self.buffer)? {
                    Some(headers) => {
                        let payload_size = request_payload_size(&headers)?;
                        trace!(?payload_size, "request head complete");

                        self.payload_decoder = Some(payload_size.into());
                        self.phase = Phase::Payload;

                        let line = self.line.take().expect("start line precedes headers");
                        let head = RequestHead { line, headers };
                        return Ok(Some(Message::Header((head, payload_size))));
                    }
                    None => return Ok(None),
                },

                Phase::Payload => {
                    let decoder = self.payload_decoder.as_mut().expect("payload phase has a decoder");
                    return match decoder.decode(&mut self.buffer)? {
                        Some(item @ PayloadItem::Chunk(_)) => Ok(Some(Message::Payload(item))),
                        Some(item @ PayloadItem::Eof) => {
                            self.payload_decoder = None;
                            self.phase = Phase::StartLine;
                            self.buffer.recycle();
                            Ok(Some(Message::Payload(item)))
                        }
                        None => Ok(None),
                    };
                }
            }
        }
    }

    fn mid_unit(&self) -> bool {
        self.phase != Phase::StartLine || self.buffer.available() > 0
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            self.buffer.feed(&src.split_to(src.len()));
        }

        self.advance()
    }

    /// Distinguishes a clean connection close between requests from a
    /// stream truncated inside one.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.buffer.feed_eof();
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => {
                if self.mid_unit() {
                    return Err(ParseError::TruncatedStream);
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    fn decode_all(decoder: &mut RequestDecoder, src: &mut BytesMut) -> Vec<Message<(RequestHead, PayloadSize)>> {
        let mut items = Vec::new();
        while let Some(item) = decoder.decode(src).unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn request_without_body() {
        let raw = indoc! {"
            GET /index.html HTTP/1.1\r
            Host: 127.0.0.1:8080\r
            Accept: */*\r
            \r
        "};

        let mut decoder = RequestDecoder::new();
        let mut src = BytesMut::from(raw);
        let items = decode_all(&mut decoder, &mut src);

        assert_eq!(items.len(), 2);
        let Message::Header((head, payload_size)) = &items[0] else {
            panic!("expected header first");
        };
        assert_eq!(head.line.method, Method::GET);
        assert_eq!(head.line.path_str(), Some("/index.html"));
        assert_eq!(head.headers.len(), 2);
        assert!(payload_size.is_empty());

        assert!(items[1].is_payload());
    }

    #[test]
    fn request_with_content_length_body() {
        let mut decoder = RequestDecoder::new();
        let mut src = BytesMut::from("POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        let items = decode_all(&mut decoder, &mut src);

        assert_eq!(items.len(), 3);
        let Message::Header((_, payload_size)) = &items[0] else { panic!("expected header") };
        assert_eq!(*payload_size, PayloadSize::Length(5));

        let chunk = items[1].is_payload();
        assert!(chunk);
        assert!(items[2].is_payload());
    }

    #[test]
    fn split_feed_resumes_without_losing_position() {
        let mut decoder = RequestDecoder::new();

        let mut src = BytesMut::from("GET /x");
        assert!(decoder.decode(&mut src).unwrap().is_none());

        let mut src = BytesMut::from("?y=1 HTTP/1.1\r\n\r\n");
        let item = decoder.decode(&mut src).unwrap().unwrap();
        let Message::Header((head, _)) = item else { panic!("expected header") };
        assert_eq!(head.line.path_str(), Some("/x"));
        assert_eq!(head.line.query_str(), Some("y=1"));
    }

    #[test]
    fn pipelined_requests_do_not_leak_state() {
        let mut decoder = RequestDecoder::new();
        let mut src = BytesMut::from("GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n");

        let items = decode_all(&mut decoder, &mut src);
        let heads: Vec<_> = items
            .iter()
            .filter_map(|m| match m {
                Message::Header((head, _)) => Some(head.line.path_str().unwrap().to_string()),
                Message::Payload(_) => None,
            })
            .collect();
        assert_eq!(heads, ["/a", "/b"]);
    }

    #[test]
    fn eof_mid_request_is_truncated_stream() {
        let mut decoder = RequestDecoder::new();
        let mut src = BytesMut::from("GET /partial HTT");
        assert!(decoder.decode(&mut src).unwrap().is_none());

        let mut empty = BytesMut::new();
        assert!(matches!(decoder.decode_eof(&mut empty), Err(ParseError::TruncatedStream)));
    }

    #[test]
    fn eof_between_requests_is_clean() {
        let mut decoder = RequestDecoder::new();
        let mut src = BytesMut::from("GET / HTTP/1.1\r\n\r\n");
        let _ = decode_all(&mut decoder, &mut src);

        let mut empty = BytesMut::new();
        assert!(decoder.decode_eof(&mut empty).unwrap().is_none());
    }
}
