//! Growable frame buffer shared by every decoder in the crate.
//!
//! A [`FrameBuffer`] is a byte window over a connection's input. Decoders
//! consume from `position`, freshly read bytes land at `limit` (the end of
//! the backing [`BytesMut`]), and an optional `end` marker records the
//! logical end of the structural unit currently being parsed. The consumed
//! prefix before `position` can be reclaimed at any time; bytes in
//! `[position, limit)` are valid unconsumed input.
//!
//! The buffer never blocks. Pulling from the transport happens only inside
//! [`FrameBuffer::ensure_available`], and "not enough bytes yet" is a
//! [`FillResult`] value rather than an error or a suspension.
//!
//! Growth policy: when a requested span does not fit behind `position`, the
//! consumed prefix is discarded first so the next reservation can reuse that
//! region in place; only if the span still does not fit is new storage
//! reserved, sized at least `max(current capacity, 2 × max unit size)`.
//! Only unconsumed bytes are ever copied, so the copy cost stays
//! O(unconsumed) per growth.

use std::cmp;
use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::error::BufferError;

/// Outcome of [`FrameBuffer::ensure_available`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillResult {
    /// At least the requested number of unconsumed bytes is present.
    Ready,
    /// The source has no bytes right now; retry after the next readiness
    /// event. Not an error, and no cursor has moved.
    NeedMore,
    /// The source reported clean end-of-stream before the requested bytes
    /// arrived. Whether this is benign depends on whether the caller was
    /// mid-unit.
    Eof,
}

/// The transport boundary: "read whatever bytes are available into the
/// buffer".
///
/// `Ok(None)` signals clean end-of-stream; `Ok(Some(0))` signals that no
/// bytes are available right now (a non-blocking source would block). The
/// codec calls this only from within [`FrameBuffer::ensure_available`],
/// never proactively.
pub trait ByteSource {
    fn read_available(&mut self, dst: &mut BytesMut) -> io::Result<Option<usize>>;
}

/// A slice is a source that yields all its bytes at once, then EOF.
impl ByteSource for &[u8] {
    fn read_available(&mut self, dst: &mut BytesMut) -> io::Result<Option<usize>> {
        if self.is_empty() {
            return Ok(None);
        }

        dst.extend_from_slice(self);
        let n = self.len();
        *self = &[];
        Ok(Some(n))
    }
}

/// Adapter turning any [`std::io::Read`] into a [`ByteSource`].
///
/// `read` returning `0` is mapped to clean end-of-stream.
#[derive(Debug)]
pub struct ReadSource<R> {
    inner: R,
}

impl<R: io::Read> ReadSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: io::Read> ByteSource for ReadSource<R> {
    fn read_available(&mut self, dst: &mut BytesMut) -> io::Result<Option<usize>> {
        let mut chunk = [0u8; 8 * 1024];
        let n = self.inner.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }

        dst.extend_from_slice(&chunk[..n]);
        Ok(Some(n))
    }
}

/// Growable byte window with explicit consumption markers.
///
/// Created once per connection and reused across every protocol unit on it.
/// Markers are rebased, not copied, between units.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    /// Next byte to consume, as an index into `buf`.
    position: usize,
    /// Logical end of the current structural unit, when known.
    unit_end: Option<usize>,
    /// Largest unit a single `ensure_available` call may demand.
    max_unit: usize,
    saw_eof: bool,
}

impl FrameBuffer {
    /// Creates a buffer whose units may not exceed `max_unit` bytes.
    pub fn new(max_unit: usize) -> Self {
        Self { buf: BytesMut::new(), position: 0, unit_end: None, max_unit, saw_eof: false }
    }

    /// Number of valid unconsumed bytes, `limit - position`.
    #[inline]
    pub fn available(&self) -> usize {
        self.buf.len() - self.position
    }

    /// The unconsumed input `[position, limit)`.
    #[inline]
    pub fn window(&self) -> &[u8] {
        &self.buf[self.position..]
    }

    /// True once the source has reported clean end-of-stream.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.saw_eof
    }

    /// Appends bytes arriving from a push-style collaborator (e.g. a
    /// `Decoder` feed). One copy at the buffer-boundary crossing.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.available() == 0 && self.position != 0 {
            // nothing retained, rebase for free
            self.buf.clear();
            self.position = 0;
            self.unit_end = None;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Marks that the source of a push-style feed reached end-of-stream.
    pub fn feed_eof(&mut self) {
        self.saw_eof = true;
    }

    /// Guarantees at least `n` unconsumed bytes are present, pulling from
    /// `src` as needed.
    ///
    /// Returns [`FillResult::Eof`] (not an error) when the stream ends
    /// cleanly first; the caller decides whether that truncates a unit.
    /// Requesting more than the configured maximum unit size is a fatal
    /// [`BufferError::UnitTooLarge`].
    pub fn ensure_available<S: ByteSource>(&mut self, src: &mut S, n: usize) -> Result<FillResult, BufferError> {
        if n > self.max_unit {
            return Err(BufferError::UnitTooLarge { requested: n, max: self.max_unit });
        }

        while self.available() < n {
            if self.saw_eof {
                return Ok(FillResult::Eof);
            }

            self.make_room(n);

            match src.read_available(&mut self.buf)? {
                None => {
                    self.saw_eof = true;
                    return Ok(FillResult::Eof);
                }
                Some(0) => return Ok(FillResult::NeedMore),
                Some(read) => trace!(read, "filled frame buffer"),
            }
        }

        Ok(FillResult::Ready)
    }

    /// Makes space for `n` unconsumed bytes behind `position` without
    /// copying the already-consumed prefix forward.
    fn make_room(&mut self, n: usize) {
        if self.position + n <= self.buf.capacity() {
            return;
        }

        self.compact();

        if n > self.buf.capacity() {
            let grow = cmp::max(self.buf.capacity(), 2 * self.max_unit);
            self.buf.reserve(grow);
        }
    }

    /// Discards the consumed prefix so its storage can be reused. All
    /// markers are rebased; window-relative offsets held by callers stay
    /// valid.
    fn compact(&mut self) {
        if self.position == 0 {
            return;
        }

        self.buf.advance(self.position);
        if let Some(end) = self.unit_end.as_mut() {
            *end -= self.position;
        }
        self.position = 0;
    }

    /// Peeks the byte at window offset `rel` without consuming.
    #[inline]
    pub fn peek_u8(&self, rel: usize) -> Option<u8> {
        self.window().get(rel).copied()
    }

    /// Peeks a big-endian `u16` at window offset `rel`.
    #[inline]
    pub fn peek_u16_be(&self, rel: usize) -> Option<u16> {
        let window = self.window();
        let hi = *window.get(rel)?;
        let lo = *window.get(rel + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Consumes and returns the next byte, if present.
    #[inline]
    pub fn get_u8(&mut self) -> Option<u8> {
        let b = self.peek_u8(0)?;
        self.position += 1;
        Some(b)
    }

    /// Consumes and returns the next big-endian `u16`, if present.
    #[inline]
    pub fn get_u16_be(&mut self) -> Option<u16> {
        let v = self.peek_u16_be(0)?;
        self.position += 2;
        Some(v)
    }

    /// Consumes `n` bytes without extracting them.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.position += n;
    }

    /// Extracts the next `n` unconsumed bytes as an owned, zero-copy
    /// [`Bytes`]. Ranges recorded window-relative during a parse remain
    /// valid as indices into the returned value.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are available; callers must check
    /// first via [`FrameBuffer::ensure_available`] or
    /// [`FrameBuffer::available`].
    pub fn take_bytes(&mut self, n: usize) -> Bytes {
        assert!(n <= self.available(), "take_bytes past the valid window");

        self.compact();
        let unit = self.buf.split_to(n).freeze();
        if let Some(end) = self.unit_end.as_mut() {
            *end = end.saturating_sub(n);
        }
        unit
    }

    /// Records that the current structural unit ends `len` bytes past
    /// `position`.
    pub fn set_unit_end(&mut self, len: usize) {
        debug_assert!(len <= self.max_unit);
        self.unit_end = Some(self.position + len);
    }

    /// Remaining bytes between `position` and the recorded unit end.
    pub fn unit_remaining(&self) -> usize {
        match self.unit_end {
            Some(end) => end.saturating_sub(self.position),
            None => 0,
        }
    }

    /// Skips everything up to the recorded unit end and clears the marker.
    /// Used when a unit completes so the next unit starts clean.
    ///
    /// If the unit's tail has not been buffered yet, consumption stops at
    /// the buffered bytes; `position` never runs past `limit`.
    pub fn seek_to_unit_end(&mut self) {
        if let Some(end) = self.unit_end.take() {
            debug_assert!(end >= self.position);
            self.position = cmp::max(self.position, cmp::min(end, self.buf.len()));
        }
    }

    /// Resets every marker for reuse on a fresh request. Buffered bytes of
    /// a following pipelined unit are retained.
    pub fn recycle(&mut self) {
        self.unit_end = None;
    }
}

#[cfg(test)]
pub(crate) mod test_source {
    use super::ByteSource;
    use bytes::BytesMut;
    use std::collections::VecDeque;
    use std::io;

    /// A scripted source that yields chunks one per call, reporting
    /// "no bytes right now" between them. Mimics arbitrarily fragmented
    /// socket reads.
    #[derive(Debug)]
    pub(crate) struct ChunkSource {
        chunks: VecDeque<Vec<u8>>,
        dry_between: bool,
        serve_next: bool,
    }

    impl ChunkSource {
        pub(crate) fn new<I, C>(chunks: I) -> Self
        where
            I: IntoIterator<Item = C>,
            C: Into<Vec<u8>>,
        {
            Self {
                chunks: chunks.into_iter().map(Into::into).collect(),
                dry_between: false,
                serve_next: true,
            }
        }

        /// Interleave a `Some(0)` ("would block") between every chunk.
        pub(crate) fn dry_between(mut self) -> Self {
            self.dry_between = true;
            self
        }
    }

    impl ByteSource for ChunkSource {
        fn read_available(&mut self, dst: &mut BytesMut) -> io::Result<Option<usize>> {
            if self.dry_between && !self.serve_next {
                self.serve_next = true;
                return Ok(Some(0));
            }

            match self.chunks.pop_front() {
                Some(chunk) => {
                    dst.extend_from_slice(&chunk);
                    self.serve_next = false;
                    Ok(Some(chunk.len()))
                }
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_source::ChunkSource;
    use super::*;

    #[test]
    fn ensure_available_pulls_across_fragments() {
        let mut buffer = FrameBuffer::new(64);
        let mut src = ChunkSource::new([&b"ab"[..], &b"cd"[..], &b"ef"[..]]);

        assert_eq!(buffer.ensure_available(&mut src, 5).unwrap(), FillResult::Ready);
        assert_eq!(buffer.window(), b"abcdef");
    }

    #[test]
    fn ensure_available_reports_need_more_without_moving_cursors() {
        let mut buffer = FrameBuffer::new(64);
        let mut src = ChunkSource::new([&b"ab"[..], &b"cd"[..]]).dry_between();

        // the source goes dry after each fragment, so the first call stops
        // short with a partial fill
        assert_eq!(buffer.ensure_available(&mut src, 4).unwrap(), FillResult::NeedMore);
        assert_eq!(buffer.available(), 2);
        assert_eq!(buffer.ensure_available(&mut src, 4).unwrap(), FillResult::Ready);
        assert_eq!(buffer.ensure_available(&mut src, 5).unwrap(), FillResult::NeedMore);
        assert_eq!(buffer.available(), 4);
        assert_eq!(buffer.window(), b"abcd");
    }

    #[test]
    fn ensure_available_distinguishes_eof_from_need_more() {
        let mut buffer = FrameBuffer::new(64);
        let mut src = ChunkSource::new([&b"abc"[..]]);

        assert_eq!(buffer.ensure_available(&mut src, 3).unwrap(), FillResult::Ready);
        assert_eq!(buffer.ensure_available(&mut src, 4).unwrap(), FillResult::Eof);
        assert!(buffer.is_eof());
        // bytes already read stay intact
        assert_eq!(buffer.window(), b"abc");
    }

    #[test]
    fn oversized_unit_is_fatal_not_need_more() {
        let mut buffer = FrameBuffer::new(8);
        let mut src = ChunkSource::new([&b"abc"[..]]);

        let err = buffer.ensure_available(&mut src, 9).unwrap_err();
        assert!(matches!(err, BufferError::UnitTooLarge { requested: 9, max: 8 }));
    }

    #[test]
    fn growth_preserves_unconsumed_bytes() {
        let mut buffer = FrameBuffer::new(1024);
        let first: Vec<u8> = (0u8..16).collect();
        let mut src = ChunkSource::new([first.clone()]);

        buffer.ensure_available(&mut src, 16).unwrap();
        buffer.advance(10);

        // force repeated growth past the initial allocation
        let big: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        let mut src = ChunkSource::new(big.chunks(100).map(<[u8]>::to_vec));
        buffer.ensure_available(&mut src, 1024).unwrap();

        // the fill stops at the first fragment boundary past the request, so
        // compare against exactly the bytes that were pulled
        let window = buffer.window();
        assert!(window.len() >= 1024);
        let pulled = window.len() - (16 - 10);
        let mut expected: Vec<u8> = first[10..].to_vec();
        expected.extend_from_slice(&big[..pulled]);
        assert_eq!(window, &expected[..]);
    }

    #[test]
    fn take_bytes_rebases_unit_end() {
        let mut buffer = FrameBuffer::new(64);
        buffer.feed(b"abcdef");
        buffer.set_unit_end(6);

        let head = buffer.take_bytes(2);
        assert_eq!(&head[..], b"ab");
        assert_eq!(buffer.unit_remaining(), 4);

        buffer.seek_to_unit_end();
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn seek_to_unit_end_skips_unread_payload() {
        let mut buffer = FrameBuffer::new(64);
        buffer.feed(b"unit-onemore");
        buffer.set_unit_end(8);
        buffer.advance(4);

        buffer.seek_to_unit_end();
        assert_eq!(buffer.window(), b"more");
    }

    #[test]
    fn seek_to_unit_end_stops_at_buffered_bytes() {
        let mut buffer = FrameBuffer::new(64);
        buffer.feed(b"head");
        buffer.set_unit_end(8); // payload tail never arrives

        buffer.seek_to_unit_end();
        assert_eq!(buffer.available(), 0);
        assert_eq!(buffer.window(), b"");
        assert_eq!(buffer.unit_remaining(), 0);
    }

    #[test]
    fn feed_rebases_when_everything_is_consumed() {
        let mut buffer = FrameBuffer::new(64);
        buffer.feed(b"abcd");
        buffer.advance(4);
        buffer.feed(b"efgh");
        assert_eq!(buffer.window(), b"efgh");
    }

    #[test]
    fn read_source_maps_zero_read_to_eof() {
        let data = b"xyz".to_vec();
        let mut src = ReadSource::new(io::Cursor::new(data));
        let mut dst = BytesMut::new();

        assert_eq!(src.read_available(&mut dst).unwrap(), Some(3));
        assert_eq!(src.read_available(&mut dst).unwrap(), None);
        assert_eq!(&dst[..], b"xyz");
    }
}
