//! Resumable decoder for an HTTP header block.
//!
//! Header lines are scanned with the same resumable discipline as the
//! start-line: each line's name and value are recorded as byte ranges, and
//! nothing is materialized until the terminating empty line arrives. At
//! that point the whole block is frozen out of the frame buffer and the
//! [`HeaderMap`] is built from zero-copy slices of it (header values share
//! the block's storage via [`HeaderValue::from_maybe_shared`]).
//!
//! The configured maximum header size bounds the entire block; exceeding it
//! is a fatal policy violation, distinct from ordinary "need more input".

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::error::ParseError;
use crate::http::parse::{ParseState, find_delimiter, find_eol, skip_spaces};
use crate::utils::ensure;

/// Maximum number of headers allowed in one block.
pub const MAX_HEADER_NUM: usize = 64;

/// Byte ranges of one header's name and value within the block.
#[derive(Debug, Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStep {
    /// At the start of a line: an empty line completes the block.
    LineStart,
    /// Scanning for the colon ending the header name.
    Name,
    /// Skipping whitespace before the value.
    ValueStart,
    /// Scanning to end-of-line for the value.
    ValueEnd,
}

/// Incremental decoder for `name: value` lines terminated by an empty line.
#[derive(Debug)]
pub struct HeaderBlockDecoder {
    step: HeaderStep,
    state: ParseState,
    indices: Vec<HeaderIndex>,
    name: (usize, usize),
}

impl HeaderBlockDecoder {
    /// `max_header_size` bounds the whole block in bytes.
    pub fn new(max_header_size: usize) -> Self {
        Self {
            step: HeaderStep::LineStart,
            state: ParseState::new(max_header_size),
            indices: Vec::new(),
            name: (0, 0),
        }
    }

    /// Advances header parsing as far as the buffered bytes allow.
    ///
    /// Returns `Ok(None)` when more input is needed. On completion the
    /// block is consumed from the buffer and the header map is returned.
    pub fn decode(&mut self, buf: &mut FrameBuffer) -> Result<Option<HeaderMap>, ParseError> {
        loop {
            match self.step {
                HeaderStep::LineStart => {
                    let window = buf.window();
                    let Some(&first) = window.get(self.state.offset) else {
                        ensure!(
                            self.state.offset < self.state.packet_limit,
                            ParseError::too_large_header(self.state.offset, self.state.packet_limit)
                        );
                        return Ok(None);
                    };

                    match first {
                        b'\n' => {
                            self.state.offset += 1;
                            return self.finish(buf).map(Some);
                        }
                        b'\r' => match window.get(self.state.offset + 1) {
                            None => return Ok(None),
                            Some(b'\n') => {
                                self.state.offset += 2;
                                return self.finish(buf).map(Some);
                            }
                            Some(_) => {
                                return Err(ParseError::invalid_header("bare CR at start of header line"));
                            }
                        },
                        _ => {
                            ensure!(
                                self.indices.len() < MAX_HEADER_NUM,
                                ParseError::TooManyHeaders { max_num: MAX_HEADER_NUM }
                            );
                            self.state.start = self.state.offset;
                            self.step = HeaderStep::Name;
                        }
                    }
                }

                HeaderStep::Name => {
                    let Some(delim) =
                        find_delimiter(buf.window(), &mut self.state, |b| b == b':' || b == b'\n')?
                    else {
                        return Ok(None);
                    };
                    ensure!(
                        buf.window()[delim] == b':' && delim > self.state.start,
                        ParseError::invalid_header("header line without a name-value separator")
                    );

                    self.name = (self.state.start, delim);
                    self.state.offset = delim + 1;
                    self.step = HeaderStep::ValueStart;
                }

                HeaderStep::ValueStart => {
                    let Some(value_start) = skip_spaces(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.state.start = value_start;
                    self.step = HeaderStep::ValueEnd;
                }

                HeaderStep::ValueEnd => {
                    let Some(content_end) = find_eol(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };

                    let window = buf.window();
                    let value_start = self.state.start.min(content_end);
                    let mut value_end = content_end;
                    while value_end > value_start && (window[value_end - 1] == b' ' || window[value_end - 1] == b'\t')
                    {
                        value_end -= 1;
                    }

                    self.indices.push(HeaderIndex { name: self.name, value: (value_start, value_end) });
                    self.step = HeaderStep::LineStart;
                }
            }
        }
    }

    /// Freezes the block and materializes the header map, then resets for
    /// the next block.
    fn finish(&mut self, buf: &mut FrameBuffer) -> Result<HeaderMap, ParseError> {
        let block: Bytes = buf.take_bytes(self.state.offset);

        let mut headers = HeaderMap::with_capacity(self.indices.len());
        for index in &self.indices {
            let name = HeaderName::from_bytes(&block[index.name.0..index.name.1])
                .map_err(|e| ParseError::invalid_header(e))?;
            let value = HeaderValue::from_maybe_shared(block.slice(index.value.0..index.value.1))
                .map_err(|e| ParseError::invalid_header(e))?;
            headers.append(name, value);
        }

        trace!(count = headers.len(), bytes = block.len(), "parsed header block");

        self.step = HeaderStep::LineStart;
        self.state.reset();
        self.indices.clear();
        Ok(headers)
    }
}
