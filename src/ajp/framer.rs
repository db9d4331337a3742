//! The AJP connection framer.
//!
//! One [`AjpFramer`] per connection drives the packet cycle: read the
//! 4-byte header, validate magic and declared length, read the payload,
//! dispatch on the type byte. All reads pull through the frame buffer's
//! [`ensure_available`], so partial input surfaces as `Ok(None)` and the
//! next call resumes exactly where the previous one stopped; in particular
//! a header that already passed validation is never re-read or re-checked.
//!
//! Body delivery is request/reply turn-taking: when the forward request
//! declared more content than arrived inline, the framer emits one fixed
//! get-body-chunk control packet and performs exactly one header+payload
//! read cycle for the answering data packet. It never has more than one
//! chunk outstanding.
//!
//! [`ensure_available`]: FrameBuffer::ensure_available

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::ajp::constants::{H_SIZE, MAX_PACKET_SIZE, REQUEST_MAGIC};
use crate::ajp::forward_request::ForwardRequest;
use crate::ajp::packet::{GET_BODY_CHUNK_PACKET, PacketType};
use crate::buffer::{ByteSource, FillResult, FrameBuffer};
use crate::config::AjpConfig;
use crate::error::AjpError;
use crate::protocol::PayloadItem;
use crate::utils::ensure;

/// A structural unit surfaced to the dispatch layer.
#[derive(Debug)]
pub enum AjpEvent {
    /// A complete forward request; body chunks, if any, follow via
    /// [`AjpFramer::read_body_chunk`].
    ForwardRequest(ForwardRequest),
    /// Liveness probe. The caller replies with
    /// [`encode_cpong`](crate::ajp::packet::encode_cpong).
    CPing,
    /// Legacy ping; no reply is defined.
    Ping,
    /// The peer asks the container to shut down.
    Shutdown,
}

/// Where the packet cycle stands, so a resumed call re-enters at the right
/// point instead of re-reading the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Header,
    Payload,
}

/// Incremental decoder for one AJP connection.
#[derive(Debug)]
pub struct AjpFramer {
    buffer: FrameBuffer,
    config: AjpConfig,
    step: Step,
    /// Declared payload length of the packet currently being read.
    packet_length: usize,
    /// A forward request is in flight; packets arrive without a type byte
    /// and are data continuations by convention.
    forward_in_progress: bool,
    expect_content: bool,
    content_bytes_remaining: u64,
    /// Unread data bytes of the current data packet.
    data_packet_remaining: usize,
    /// The next data packet needs no get-body-chunk request (either it is
    /// the inline first chunk, or the request was already sent).
    chunk_pending: bool,
}

impl AjpFramer {
    pub fn new(config: AjpConfig) -> Self {
        Self {
            buffer: FrameBuffer::new(MAX_PACKET_SIZE),
            config,
            step: Step::Header,
            packet_length: 0,
            forward_in_progress: false,
            expect_content: false,
            content_bytes_remaining: 0,
            data_packet_remaining: 0,
            chunk_pending: false,
        }
    }

    /// True once the transport reported clean end-of-stream.
    pub fn is_eof(&self) -> bool {
        self.buffer.is_eof()
    }

    /// True while the current forward request still has body content to
    /// deliver.
    pub fn expects_content(&self) -> bool {
        self.expect_content && self.content_bytes_remaining > 0
    }

    /// Reads the next request-level packet and dispatches it.
    ///
    /// Returns `Ok(None)` when more input is needed, or on clean
    /// end-of-stream between packets (check [`AjpFramer::is_eof`]). Must
    /// not be called while a forward request is in flight; finish it with
    /// [`AjpFramer::end_request`] first.
    pub fn poll_request<S: ByteSource>(&mut self, src: &mut S) -> Result<Option<AjpEvent>, AjpError> {
        debug_assert!(!self.forward_in_progress, "previous request not ended");

        if self.fill_packet(src)?.is_none() {
            return Ok(None);
        }

        ensure!(
            self.packet_length >= 1,
            AjpError::unexpected_type("forward-request, ping or shutdown", "empty packet")
        );
        let type_byte = self.buffer.window()[0];
        self.buffer.advance(1);
        self.step = Step::Header;

        let packet_type = PacketType::from_u8(type_byte)?;
        trace!(packet_type = packet_type.name(), length = self.packet_length, "ajp packet");

        match packet_type {
            PacketType::ForwardRequest => {
                let payload = self.buffer.take_bytes(self.buffer.unit_remaining());
                self.buffer.seek_to_unit_end();
                let request = self.parse_forward_request(payload)?;
                Ok(Some(AjpEvent::ForwardRequest(request)))
            }
            PacketType::CPing => {
                self.buffer.seek_to_unit_end();
                Ok(Some(AjpEvent::CPing))
            }
            PacketType::Ping => {
                self.buffer.seek_to_unit_end();
                Ok(Some(AjpEvent::Ping))
            }
            PacketType::Shutdown => {
                self.buffer.seek_to_unit_end();
                Ok(Some(AjpEvent::Shutdown))
            }
            other => Err(AjpError::unexpected_type("forward-request, ping or shutdown", other.name())),
        }
    }

    fn parse_forward_request(&mut self, payload: Bytes) -> Result<ForwardRequest, AjpError> {
        let request = ForwardRequest::decode(payload, self.config.tomcat_authentication)?;

        if let Some(expected) = &self.config.secret {
            let matches = request
                .secret
                .as_ref()
                .is_some_and(|supplied| supplied[..] == *expected.as_bytes());
            if !matches {
                warn!("forward request rejected: secret mismatch");
                return Err(AjpError::SecretMismatch);
            }
        }

        self.forward_in_progress = true;
        match request.content_length {
            Some(n) if n > 0 => {
                // the first data chunk follows unsolicited
                self.expect_content = true;
                self.content_bytes_remaining = n;
                self.chunk_pending = true;
            }
            _ => {
                self.expect_content = false;
                self.content_bytes_remaining = 0;
            }
        }

        Ok(request)
    }

    /// Delivers the next piece of request body.
    ///
    /// `control` receives any get-body-chunk packet that must be written to
    /// the peer before more data can arrive. Returns `Ok(None)` while the
    /// answering data packet is incomplete, `Chunk` for data, and `Eof`
    /// once the declared content is delivered (or the peer ended the body
    /// early with an empty data packet).
    pub fn read_body_chunk<S: ByteSource>(
        &mut self,
        src: &mut S,
        control: &mut BytesMut,
    ) -> Result<Option<PayloadItem>, AjpError> {
        if !self.expects_content() {
            return Ok(Some(PayloadItem::Eof));
        }

        if self.data_packet_remaining == 0 {
            if !self.chunk_pending {
                control.extend_from_slice(&GET_BODY_CHUNK_PACKET);
                self.chunk_pending = true;
                trace!("requested next body chunk");
            }

            if self.parse_data_chunk(src)?.is_none() {
                return Ok(None);
            }

            if self.data_packet_remaining == 0 {
                // empty data packet: the peer ended the body early
                self.expect_content = false;
                self.content_bytes_remaining = 0;
                self.chunk_pending = false;
                return Ok(Some(PayloadItem::Eof));
            }
        }

        let len = self.data_packet_remaining;
        let bytes = self.buffer.take_bytes(len);
        self.buffer.seek_to_unit_end();
        self.data_packet_remaining = 0;
        self.content_bytes_remaining = self.content_bytes_remaining.saturating_sub(len as u64);
        self.chunk_pending = false;

        trace!(len, remaining = self.content_bytes_remaining, "delivered body chunk");
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    /// Reads and validates one data packet: header, typeless payload, inner
    /// length field.
    fn parse_data_chunk<S: ByteSource>(&mut self, src: &mut S) -> Result<Option<()>, AjpError> {
        let Some(()) = self.fill_packet(src)? else {
            // content was promised, so a clean close here still truncates
            if self.buffer.is_eof() {
                return Err(AjpError::TruncatedStream);
            }
            return Ok(None);
        };
        self.step = Step::Header;

        if self.packet_length == 0 {
            self.data_packet_remaining = 0;
            return Ok(Some(()));
        }

        ensure!(
            self.packet_length >= 2,
            AjpError::DataLengthMismatch { declared: 0, actual: self.packet_length }
        );
        let declared = match self.buffer.get_u16_be() {
            Some(v) => v as usize,
            None => return Ok(None), // unreachable after fill_packet
        };
        let actual = self.packet_length - 2;
        ensure!(declared == actual, AjpError::DataLengthMismatch { declared, actual });

        self.data_packet_remaining = actual;
        Ok(Some(()))
    }

    /// Advances through header and payload reads until a whole packet is
    /// buffered. `Ok(None)` means need more input (or clean EOF at a packet
    /// boundary); EOF inside a packet is [`AjpError::TruncatedStream`].
    fn fill_packet<S: ByteSource>(&mut self, src: &mut S) -> Result<Option<()>, AjpError> {
        loop {
            match self.step {
                Step::Header => {
                    match self.buffer.ensure_available(src, H_SIZE)? {
                        FillResult::Ready => {}
                        FillResult::NeedMore => return Ok(None),
                        FillResult::Eof => {
                            if self.buffer.available() == 0 {
                                return Ok(None);
                            }
                            return Err(AjpError::TruncatedStream);
                        }
                    }

                    let window = self.buffer.window();
                    let magic = u16::from_be_bytes([window[0], window[1]]);
                    ensure!(magic == REQUEST_MAGIC, AjpError::bad_magic(magic));

                    let size = u16::from_be_bytes([window[2], window[3]]) as usize;
                    ensure!(
                        size + H_SIZE <= MAX_PACKET_SIZE,
                        AjpError::packet_too_large(size + H_SIZE, MAX_PACKET_SIZE)
                    );

                    self.buffer.advance(H_SIZE);
                    self.buffer.set_unit_end(size);
                    self.packet_length = size;
                    self.step = Step::Payload;
                }

                Step::Payload => {
                    return match self.buffer.ensure_available(src, self.packet_length)? {
                        FillResult::Ready => Ok(Some(())),
                        FillResult::NeedMore => Ok(None),
                        FillResult::Eof => Err(AjpError::TruncatedStream),
                    };
                }
            }
        }
    }

    /// Finishes the current request: skips to the recorded packet end and
    /// resets every per-request cursor so nothing leaks into the next unit
    /// on this connection.
    pub fn end_request(&mut self) {
        self.buffer.seek_to_unit_end();
        self.step = Step::Header;
        self.packet_length = 0;
        self.forward_in_progress = false;
        self.expect_content = false;
        self.content_bytes_remaining = 0;
        self.data_packet_remaining = 0;
        self.chunk_pending = false;
    }

    /// Prepares the framer for reuse on a fresh connection state.
    pub fn recycle(&mut self) {
        self.end_request();
        self.buffer.recycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ajp::constants::{JK_AJP13_CPING_REQUEST, JK_AJP13_SHUTDOWN, SC_M_GET, SC_M_POST};
    use crate::ajp::forward_request::test_encode::ForwardRequestBuilder;
    use crate::ajp::packet::encode_request_packet;
    use crate::buffer::test_source::ChunkSource;
    use http::Method;

    fn packet(payload: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        encode_request_packet(payload, &mut out);
        out.to_vec()
    }

    fn data_packet(data: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(data.len() + 2);
        payload.extend_from_slice(&(data.len() as u16).to_be_bytes());
        payload.extend_from_slice(data);
        packet(&payload)
    }

    #[test]
    fn cping_is_dispatched() {
        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([packet(&[JK_AJP13_CPING_REQUEST])]);

        let event = framer.poll_request(&mut src).unwrap().unwrap();
        assert!(matches!(event, AjpEvent::CPing));
    }

    #[test]
    fn shutdown_is_dispatched() {
        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([packet(&[JK_AJP13_SHUTDOWN])]);

        let event = framer.poll_request(&mut src).unwrap().unwrap();
        assert!(matches!(event, AjpEvent::Shutdown));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([vec![0x12, 0x43, 0x00, 0x01, 0x0A]]);

        assert!(matches!(framer.poll_request(&mut src), Err(AjpError::BadMagic { found: 0x1243 })));
    }

    #[test]
    fn oversized_declared_length_is_fatal() {
        let mut framer = AjpFramer::new(AjpConfig::default());
        // declared length 8189 + 4-byte header exceeds 8192
        let mut src = ChunkSource::new([vec![0x12, 0x34, 0x1F, 0xFD, 0x0A]]);

        assert!(matches!(framer.poll_request(&mut src), Err(AjpError::PacketTooLarge { .. })));
    }

    #[test]
    fn partial_packet_is_incomplete_not_malformed() {
        let mut framer = AjpFramer::new(AjpConfig::default());
        // header declares 5 payload bytes; only 4 arrive
        let mut src = ChunkSource::new([vec![0x12, 0x34, 0x00, 0x05, 1, 2, 3, 4]]).dry_between();

        assert!(framer.poll_request(&mut src).unwrap().is_none());
        assert!(!framer.is_eof());
    }

    #[test]
    fn forward_request_round_trip() {
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/docs/index.html")
            .coded_header(0xA00B, "localhost:8009")
            .header("x-trace", "abc123")
            .query_string("version=2")
            .build();

        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([packet(&payload)]);

        let event = framer.poll_request(&mut src).unwrap().unwrap();
        let AjpEvent::ForwardRequest(request) = event else { panic!("expected forward request") };

        assert_eq!(request.method, Method::GET);
        assert_eq!(&request.request_uri[..], b"/docs/index.html");
        assert_eq!(request.headers.get(http::header::HOST).unwrap(), "localhost:8009");
        assert_eq!(request.headers.get("x-trace").unwrap(), "abc123");
        assert_eq!(request.query_string.as_deref(), Some(&b"version=2"[..]));
        assert!(!framer.expects_content());
    }

    #[test]
    fn forward_request_split_at_every_byte() {
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/split").coded_header(0xA00B, "h").build();
        let raw = packet(&payload);

        for split in 1..raw.len() {
            let mut framer = AjpFramer::new(AjpConfig::default());
            let mut src =
                ChunkSource::new([raw[..split].to_vec(), raw[split..].to_vec()]).dry_between();

            let first = framer.poll_request(&mut src).unwrap();
            let event = match first {
                Some(event) => event,
                None => framer.poll_request(&mut src).unwrap().expect("second feed completes"),
            };
            let AjpEvent::ForwardRequest(request) = event else { panic!("expected forward request") };
            assert_eq!(&request.request_uri[..], b"/split", "split at {split}");
        }
    }

    #[test]
    fn inline_body_chunk_needs_no_control_packet() {
        let payload = ForwardRequestBuilder::new(SC_M_POST, "/upload")
            .coded_header(0xA008, "5")
            .build();
        let mut raw = packet(&payload);
        raw.extend_from_slice(&data_packet(b"hello"));

        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([raw]);

        let event = framer.poll_request(&mut src).unwrap().unwrap();
        assert!(matches!(event, AjpEvent::ForwardRequest(_)));
        assert!(framer.expects_content());

        let mut control = BytesMut::new();
        let item = framer.read_body_chunk(&mut src, &mut control).unwrap().unwrap();
        assert_eq!(&item.into_bytes().unwrap()[..], b"hello");
        assert!(control.is_empty(), "first chunk arrives unsolicited");

        let item = framer.read_body_chunk(&mut src, &mut control).unwrap().unwrap();
        assert!(item.is_eof());
    }

    #[test]
    fn second_chunk_requires_get_body_chunk_turn() {
        let payload = ForwardRequestBuilder::new(SC_M_POST, "/upload")
            .coded_header(0xA008, "10")
            .build();
        let mut first = packet(&payload);
        first.extend_from_slice(&data_packet(b"hello"));

        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([first, data_packet(b"world")]).dry_between();

        framer.poll_request(&mut src).unwrap().unwrap();

        let mut control = BytesMut::new();
        let item = framer.read_body_chunk(&mut src, &mut control).unwrap().unwrap();
        assert_eq!(&item.into_bytes().unwrap()[..], b"hello");
        assert!(control.is_empty());

        // source runs dry before the second packet: the control request goes
        // out exactly once across however many retries
        let mut pending = framer.read_body_chunk(&mut src, &mut control).unwrap();
        assert_eq!(&control[..], &GET_BODY_CHUNK_PACKET);
        while pending.is_none() {
            pending = framer.read_body_chunk(&mut src, &mut control).unwrap();
        }
        assert_eq!(&control[..], &GET_BODY_CHUNK_PACKET, "only one outstanding request");
        assert_eq!(&pending.unwrap().into_bytes().unwrap()[..], b"world");

        let item = framer.read_body_chunk(&mut src, &mut control).unwrap().unwrap();
        assert!(item.is_eof());
    }

    #[test]
    fn empty_data_packet_ends_body_early() {
        let payload = ForwardRequestBuilder::new(SC_M_POST, "/upload")
            .coded_header(0xA008, "100")
            .build();
        let mut raw = packet(&payload);
        raw.extend_from_slice(&packet(&[])); // zero-length data packet

        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([raw]);

        framer.poll_request(&mut src).unwrap().unwrap();
        let mut control = BytesMut::new();
        let item = framer.read_body_chunk(&mut src, &mut control).unwrap().unwrap();
        assert!(item.is_eof());
        assert!(!framer.expects_content());
    }

    #[test]
    fn mismatched_inner_length_is_fatal() {
        let payload = ForwardRequestBuilder::new(SC_M_POST, "/upload")
            .coded_header(0xA008, "5")
            .build();
        let mut raw = packet(&payload);
        // inner length claims 3, outer header carries 5 data bytes
        let mut bogus = Vec::new();
        bogus.extend_from_slice(&3u16.to_be_bytes());
        bogus.extend_from_slice(b"hello");
        raw.extend_from_slice(&packet(&bogus));

        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([raw]);

        framer.poll_request(&mut src).unwrap().unwrap();
        let mut control = BytesMut::new();
        assert!(matches!(
            framer.read_body_chunk(&mut src, &mut control),
            Err(AjpError::DataLengthMismatch { declared: 3, actual: 5 })
        ));
    }

    #[test]
    fn secret_mismatch_is_fatal() {
        let config = AjpConfig::default().with_secret("expected");
        let mut framer = AjpFramer::new(config);

        let payload = ForwardRequestBuilder::new(SC_M_GET, "/").secret("wrong").build();
        let mut src = ChunkSource::new([packet(&payload)]);
        assert!(matches!(framer.poll_request(&mut src), Err(AjpError::SecretMismatch)));

        let config = AjpConfig::default().with_secret("expected");
        let mut framer = AjpFramer::new(config);
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/").build();
        let mut src = ChunkSource::new([packet(&payload)]);
        assert!(matches!(framer.poll_request(&mut src), Err(AjpError::SecretMismatch)));
    }

    #[test]
    fn matching_secret_is_accepted() {
        let config = AjpConfig::default().with_secret("expected");
        let mut framer = AjpFramer::new(config);

        let payload = ForwardRequestBuilder::new(SC_M_GET, "/").secret("expected").build();
        let mut src = ChunkSource::new([packet(&payload)]);
        assert!(matches!(framer.poll_request(&mut src), Ok(Some(AjpEvent::ForwardRequest(_)))));
    }

    #[test]
    fn end_request_resets_for_the_next_unit() {
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/one").build();
        let mut raw = packet(&payload);
        raw.extend_from_slice(&packet(&[JK_AJP13_CPING_REQUEST]));

        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([raw]);

        let event = framer.poll_request(&mut src).unwrap().unwrap();
        assert!(matches!(event, AjpEvent::ForwardRequest(_)));
        framer.end_request();

        let event = framer.poll_request(&mut src).unwrap().unwrap();
        assert!(matches!(event, AjpEvent::CPing));
    }

    #[test]
    fn clean_eof_between_packets_is_not_an_error() {
        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([packet(&[JK_AJP13_CPING_REQUEST])]);

        framer.poll_request(&mut src).unwrap().unwrap();
        framer.end_request();
        assert!(framer.poll_request(&mut src).unwrap().is_none());
        assert!(framer.is_eof());
    }

    #[test]
    fn eof_inside_a_packet_is_truncated_stream() {
        let mut framer = AjpFramer::new(AjpConfig::default());
        let mut src = ChunkSource::new([vec![0x12, 0x34, 0x00, 0x05, 1, 2]]);

        assert!(matches!(framer.poll_request(&mut src), Err(AjpError::TruncatedStream)));
    }
}
