//! AJP/1.3 binary protocol support.
//!
//! AJP frames everything in packets: a 4-byte header (`0x12 0x34` magic
//! plus a big-endian payload length, capped at 8 KiB total) followed by
//! the payload, whose first byte names the packet type — except for body
//! continuations during a forward request, which carry no type byte at
//! all.
//!
//! - [`framer::AjpFramer`]: per-connection packet cycle and body flow
//!   control
//! - [`forward_request::ForwardRequest`]: the embedded HTTP request head
//! - [`packet`]: type dispatch and reply serialization
//! - [`constants`]: the wire vocabulary

pub mod constants;
pub mod forward_request;
pub mod framer;
pub mod packet;

pub use forward_request::ForwardRequest;
pub use framer::{AjpEvent, AjpFramer};
pub use packet::{GET_BODY_CHUNK_PACKET, PacketType, encode_cpong, encode_reply_packet, encode_request_packet};
