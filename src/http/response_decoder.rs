//! HTTP response decoder facade, the client-side counterpart of
//! [`RequestDecoder`](crate::http::RequestDecoder).
//!
//! Identical phase machine, but the start-line is a status-line and body
//! framing follows response rules: 204, 205 and 304 never carry a body no
//! matter what the headers declare.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::config::DEFAULT_MAX_HEADER_BYTES;
use crate::error::ParseError;
use crate::http::body::{PayloadDecoder, response_payload_size};
use crate::http::header::HeaderBlockDecoder;
use crate::http::start_line::StatusLineDecoder;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, StatusLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    StatusLine,
    Headers,
    Payload,
}

/// Decodes HTTP/1.x responses incrementally.
#[derive(Debug)]
pub struct ResponseDecoder {
    buffer: FrameBuffer,
    phase: Phase,
    line_decoder: StatusLineDecoder,
    header_decoder: HeaderBlockDecoder,
    payload_decoder: Option<PayloadDecoder>,
    line: Option<StatusLine>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::with_max_header_size(DEFAULT_MAX_HEADER_BYTES)
    }

    pub fn with_max_header_size(max_header_size: usize) -> Self {
        Self {
            buffer: FrameBuffer::new(max_header_size.max(DEFAULT_MAX_HEADER_BYTES)),
            phase: Phase::StatusLine,
            line_decoder: StatusLineDecoder::new(max_header_size),
            header_decoder: HeaderBlockDecoder::new(max_header_size),
            payload_decoder: None,
            line: None,
        }
    }

    fn advance(&mut self) -> Result<Option<Message<(ResponseHead, PayloadSize)>>, ParseError> {
        loop {
            match self.phase {
                Phase::StatusLine => match self.line_decoder.decode(&mut self.buffer)? {
                    Some(line) => {
                        self.line = Some(line);
                        self.phase = Phase::Headers;
                    }
                    None => return Ok(None),
                },

                Phase::Headers => match self.header_decoder.decode(&mut self.buffer)? {
                    Some(headers) => {
                        let line = self.line.take().expect("status line precedes headers");
                        let payload_size = response_payload_size(line.status, &headers)?;
                        trace!(status = %line.status, ?payload_size, "response head complete");

                        self.payload_decoder = Some(payload_size.into());
                        self.phase = Phase::Payload;

                        let head = ResponseHead { line, headers };
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
                            self.phase = Phase::StatusLine;
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
        self.phase != Phase::StatusLine || self.buffer.available() > 0
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            self.buffer.feed(&src.split_to(src.len()));
        }

        self.advance()
    }

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
