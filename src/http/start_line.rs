//! Resumable start-line decoders.
//!
//! Each decoder is a small explicit state machine whose steps mirror the
//! structure of the line: scan a token, skip the separating whitespace,
//! scan the next token, finish at end-of-line. Every step is re-entrant
//! across partial input — running out of bytes records the resume point and
//! returns `Ok(None)` without mutating already-committed token ranges, so a
//! later feed continues from the exact byte where scanning stopped.
//!
//! Token ranges are recorded window-relative and materialized as zero-copy
//! slices of the frozen line once the unit completes.

use bytes::Bytes;
use http::{Method, StatusCode, Version};
use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::error::ParseError;
use crate::http::parse::{ParseState, find_eol, find_space, find_space_or_eol, skip_spaces};
use crate::protocol::{RequestLine, StatusLine};

fn parse_version(token: &[u8]) -> Result<Version, ParseError> {
    match token.trim_ascii_end() {
        b"HTTP/1.1" => Ok(Version::HTTP_11),
        b"HTTP/1.0" => Ok(Version::HTTP_10),
        other => Err(ParseError::invalid_version(String::from_utf8_lossy(other))),
    }
}

/// Steps of the request-line state machine. Advances monotonically within
/// one line and resets when the line commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestLineStep {
    /// Scan for the whitespace ending the method token.
    Method,
    /// Skip consecutive whitespace after the method.
    SpaceAfterMethod,
    /// Scan for the whitespace ending the URI token.
    Uri,
    /// Skip consecutive whitespace after the URI.
    SpaceAfterUri,
    /// Scan to end-of-line for the protocol version; completes the unit.
    Version,
}

/// Incremental decoder for `METHOD SP request-target SP version CRLF`.
///
/// The request-target is split at the first `?` into path and query, which
/// are framed separately in the emitted [`RequestLine`].
#[derive(Debug)]
pub struct RequestLineDecoder {
    step: RequestLineStep,
    state: ParseState,
    method: (usize, usize),
    uri: (usize, usize),
}

impl RequestLineDecoder {
    /// `packet_limit` bounds how many bytes the line may span; exceeding it
    /// is a fatal policy violation.
    pub fn new(packet_limit: usize) -> Self {
        Self {
            step: RequestLineStep::Method,
            state: ParseState::new(packet_limit),
            method: (0, 0),
            uri: (0, 0),
        }
    }

    /// Advances the state machine as far as the buffered bytes allow.
    ///
    /// Returns `Ok(None)` when more input is needed; the cursor never moves
    /// backward across calls.
    pub fn decode(&mut self, buf: &mut FrameBuffer) -> Result<Option<RequestLine>, ParseError> {
        loop {
            match self.step {
                RequestLineStep::Method => {
                    let Some(space) = find_space(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.method = (self.state.start, space);
                    self.step = RequestLineStep::SpaceAfterMethod;
                }

                RequestLineStep::SpaceAfterMethod => {
                    let Some(token_start) = skip_spaces(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.state.start = token_start;
                    self.step = RequestLineStep::Uri;
                }

                RequestLineStep::Uri => {
                    let Some(space) = find_space(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.uri = (self.state.start, space);
                    self.step = RequestLineStep::SpaceAfterUri;
                }

                RequestLineStep::SpaceAfterUri => {
                    let Some(token_start) = skip_spaces(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.state.start = token_start;
                    self.step = RequestLineStep::Version;
                }

                RequestLineStep::Version => {
                    let Some(content_end) = find_eol(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };

                    let line_len = self.state.offset;
                    let version_range = (self.state.start, content_end);
                    let line = buf.take_bytes(line_len);

                    let parsed = self.finish(&line, version_range)?;
                    trace!(method = %parsed.method, "parsed request line");

                    self.step = RequestLineStep::Method;
                    self.state.reset();
                    return Ok(Some(parsed));
                }
            }
        }
    }

    fn finish(&self, line: &Bytes, version_range: (usize, usize)) -> Result<RequestLine, ParseError> {
        let method =
            Method::from_bytes(&line[self.method.0..self.method.1]).map_err(|_| ParseError::InvalidMethod)?;

        let (uri_start, uri_end) = self.uri;
        if uri_start >= uri_end {
            return Err(ParseError::InvalidUri);
        }

        let question = line[uri_start..uri_end].iter().position(|&b| b == b'?');
        let (path, query) = match question {
            Some(rel) => {
                let q = uri_start + rel;
                (line.slice(uri_start..q), Some(line.slice(q + 1..uri_end)))
            }
            None => (line.slice(uri_start..uri_end), None),
        };

        let version = parse_version(&line[version_range.0..version_range.1])?;

        Ok(RequestLine { method, path, query, version })
    }
}

/// Steps of the status-line state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusLineStep {
    /// Scan for the whitespace ending the protocol token.
    Protocol,
    /// Skip consecutive whitespace after the protocol.
    SpaceAfterProtocol,
    /// Scan for the delimiter ending the status code (which may be the
    /// line terminator itself when no reason phrase follows).
    Status,
    /// Skip consecutive whitespace after the status code.
    SpaceAfterStatus,
    /// Scan to end-of-line for the reason phrase; completes the unit.
    Reason,
}

/// Incremental decoder for `version SP status-code [SP reason] CRLF`.
#[derive(Debug)]
pub struct StatusLineDecoder {
    step: StatusLineStep,
    state: ParseState,
    protocol: (usize, usize),
    status: (usize, usize),
}

impl StatusLineDecoder {
    pub fn new(packet_limit: usize) -> Self {
        Self {
            step: StatusLineStep::Protocol,
            state: ParseState::new(packet_limit),
            protocol: (0, 0),
            status: (0, 0),
        }
    }

    /// Advances the state machine as far as the buffered bytes allow.
    pub fn decode(&mut self, buf: &mut FrameBuffer) -> Result<Option<StatusLine>, ParseError> {
        loop {
            match self.step {
                StatusLineStep::Protocol => {
                    let Some(space) = find_space(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.protocol = (self.state.start, space);
                    self.step = StatusLineStep::SpaceAfterProtocol;
                }

                StatusLineStep::SpaceAfterProtocol => {
                    let Some(token_start) = skip_spaces(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.state.start = token_start;
                    self.step = StatusLineStep::Status;
                }

                StatusLineStep::Status => {
                    let Some(delim) = find_space_or_eol(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.status = (self.state.start, delim);
                    self.step = StatusLineStep::SpaceAfterStatus;
                }

                StatusLineStep::SpaceAfterStatus => {
                    let Some(token_start) = skip_spaces(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };
                    self.state.start = token_start;
                    self.step = StatusLineStep::Reason;
                }

                StatusLineStep::Reason => {
                    let Some(content_end) = find_eol(buf.window(), &mut self.state)? else {
                        return Ok(None);
                    };

                    let line_len = self.state.offset;
                    let reason_range = (self.state.start.min(content_end), content_end);
                    let line = buf.take_bytes(line_len);

                    let version = parse_version(&line[self.protocol.0..self.protocol.1])?;
                    let status = StatusCode::from_bytes(&line[self.status.0..self.status.1])
                        .map_err(|_| ParseError::InvalidStatus)?;
                    let reason = line.slice(reason_range.0..reason_range.1);
                    trace!(status = %status, "parsed status line");

                    self.step = StatusLineStep::Protocol;
                    self.state.reset();
                    return Ok(Some(StatusLine { version, status, reason }));
                }
            }
        }
    }
}
