//! Packet-level framing: type dispatch and reply serialization.

use bytes::{BufMut, BytesMut};

use crate::ajp::constants::{
    JK_AJP13_CPING_REQUEST, JK_AJP13_CPONG_REPLY, JK_AJP13_FORWARD_REQUEST, JK_AJP13_GET_BODY_CHUNK,
    JK_AJP13_PING_REQUEST, JK_AJP13_SHUTDOWN, MAX_READ_SIZE, REPLY_MAGIC, REQUEST_MAGIC,
};
use crate::error::AjpError;

/// The discriminator carried in the first payload byte of a peer packet.
///
/// A packet arriving while a forward request is in flight carries no type
/// byte at all; it is a [`PacketType::Data`] continuation by protocol
/// convention, so `Data` never appears on the wire as a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    ForwardRequest,
    Shutdown,
    /// Legacy ping, no reply defined.
    Ping,
    CPong,
    /// Liveness probe; the container answers with a cpong reply.
    CPing,
    /// Body continuation, inferred from context rather than a wire byte.
    Data,
}

impl PacketType {
    pub fn from_u8(byte: u8) -> Result<Self, AjpError> {
        match byte {
            JK_AJP13_FORWARD_REQUEST => Ok(Self::ForwardRequest),
            JK_AJP13_SHUTDOWN => Ok(Self::Shutdown),
            JK_AJP13_PING_REQUEST => Ok(Self::Ping),
            JK_AJP13_CPONG_REPLY => Ok(Self::CPong),
            JK_AJP13_CPING_REQUEST => Ok(Self::CPing),
            other => Err(AjpError::UnknownPacketType(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ForwardRequest => "forward-request",
            Self::Shutdown => "shutdown",
            Self::Ping => "ping",
            Self::CPong => "cpong",
            Self::CPing => "cping",
            Self::Data => "data",
        }
    }
}

/// Frames a container -> peer packet: `A` `B` magic + length + payload.
pub fn encode_reply_packet(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(4 + payload.len());
    dst.put_slice(&REPLY_MAGIC);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
}

/// Frames a peer -> container packet: `0x12 0x34` magic + length + payload.
/// The container never sends these; peers (and tests) do.
pub fn encode_request_packet(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(4 + payload.len());
    dst.put_u16(REQUEST_MAGIC);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
}

/// The fixed get-body-chunk control packet, always requesting
/// [`MAX_READ_SIZE`] bytes.
pub const GET_BODY_CHUNK_PACKET: [u8; 7] = [
    REPLY_MAGIC[0],
    REPLY_MAGIC[1],
    0x00,
    0x03,
    JK_AJP13_GET_BODY_CHUNK,
    (MAX_READ_SIZE >> 8) as u8,
    (MAX_READ_SIZE & 0xFF) as u8,
];

/// Writes the cpong reply answering a cping probe.
pub fn encode_cpong(dst: &mut BytesMut) {
    encode_reply_packet(&[JK_AJP13_CPONG_REPLY], dst);
}
