//! Resumable scan primitives shared by the start-line and header decoders.
//!
//! All offsets are window-relative: they index into
//! [`FrameBuffer::window`](crate::buffer::FrameBuffer::window), whose origin
//! is stable while a unit is in progress. The [`ParseState`] cursor is owned
//! by exactly one decoder and passed into pure per-step functions, so no
//! marker is ever shared across parser layers.
//!
//! Every scan obeys the resumability discipline: when input runs out
//! mid-scan the function records exactly where it stopped in
//! `state.offset` and reports "need more input" without touching committed
//! fields. Feeding more bytes later resumes from that byte; the cursor
//! never moves backward, so consumed input is never re-scanned.

use crate::error::ParseError;

/// Cursor values scoped to the structural unit currently being parsed.
///
/// `start` marks the beginning of the token in progress, `offset` the next
/// byte to examine. `packet_limit` bounds how many bytes the unit may span;
/// exceeding it is a fatal policy violation, distinct from needing more
/// input.
#[derive(Debug, Clone)]
pub(crate) struct ParseState {
    pub start: usize,
    pub offset: usize,
    pub packet_limit: usize,
}

impl ParseState {
    pub(crate) fn new(packet_limit: usize) -> Self {
        Self { start: 0, offset: 0, packet_limit }
    }

    /// Resets the cursors for the next structural unit.
    pub(crate) fn reset(&mut self) {
        self.start = 0;
        self.offset = 0;
    }

    fn check_limit(&self, scanned: usize) -> Result<(), ParseError> {
        if scanned >= self.packet_limit {
            return Err(ParseError::too_large_header(scanned, self.packet_limit));
        }
        Ok(())
    }
}

/// Scans from `state.offset` for the next space or tab delimiter.
///
/// `Ok(Some(idx))` positions `offset` at the delimiter; `Ok(None)` means
/// more input is needed and `offset` records the resume point.
pub(crate) fn find_space(window: &[u8], state: &mut ParseState) -> Result<Option<usize>, ParseError> {
    find_delimiter(window, state, |b| b == b' ' || b == b'\t')
}

/// Scans for a space/tab delimiter or the start of the line terminator,
/// whichever comes first. Used for tokens that may end the line directly,
/// like a status code with no reason phrase.
pub(crate) fn find_space_or_eol(window: &[u8], state: &mut ParseState) -> Result<Option<usize>, ParseError> {
    find_delimiter(window, state, |b| b == b' ' || b == b'\t' || b == b'\r' || b == b'\n')
}

pub(crate) fn find_delimiter(
    window: &[u8],
    state: &mut ParseState,
    pred: impl Fn(u8) -> bool,
) -> Result<Option<usize>, ParseError> {
    let scan_to = window.len().min(state.packet_limit);
    for idx in state.offset..scan_to {
        if pred(window[idx]) {
            state.offset = idx;
            return Ok(Some(idx));
        }
    }

    state.check_limit(window.len())?;
    state.offset = window.len();
    Ok(None)
}

/// Skips consecutive spaces/tabs from `state.offset`, returning the index
/// of the first non-whitespace byte.
pub(crate) fn skip_spaces(window: &[u8], state: &mut ParseState) -> Result<Option<usize>, ParseError> {
    let scan_to = window.len().min(state.packet_limit);
    for idx in state.offset..scan_to {
        if window[idx] != b' ' && window[idx] != b'\t' {
            state.offset = idx;
            return Ok(Some(idx));
        }
    }

    state.check_limit(window.len())?;
    state.offset = window.len();
    Ok(None)
}

/// Scans from `state.offset` for end-of-line.
///
/// Tolerates bare LF as well as CRLF. On success the returned content end
/// excludes the line terminator and `state.offset` points past it.
pub(crate) fn find_eol(window: &[u8], state: &mut ParseState) -> Result<Option<usize>, ParseError> {
    let scan_to = window.len().min(state.packet_limit);
    for idx in state.offset..scan_to {
        if window[idx] == b'\n' {
            let content_end = if idx > state.start && window[idx - 1] == b'\r' { idx - 1 } else { idx };
            state.offset = idx + 1;
            return Ok(Some(content_end));
        }
    }

    state.check_limit(window.len())?;
    state.offset = window.len();
    Ok(None)
}
