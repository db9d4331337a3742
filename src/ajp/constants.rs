//! AJP/1.3 wire constants.

/// Magic prefix of packets flowing peer -> container.
pub const REQUEST_MAGIC: u16 = 0x1234;

/// Magic prefix of packets flowing container -> peer, the bytes `A` `B`.
pub const REPLY_MAGIC: [u8; 2] = *b"AB";

/// Packet header size: 2 bytes magic + 2 bytes big-endian payload length.
pub const H_SIZE: usize = 4;

/// Hard upper bound on `header + payload` for a single packet.
pub const MAX_PACKET_SIZE: usize = 8 * 1024;

/// Largest body chunk ever requested from the peer: a full packet minus the
/// header and the inner 2-byte length field.
pub const MAX_READ_SIZE: usize = MAX_PACKET_SIZE - H_SIZE - 2;

/// Peer -> container packet type bytes.
pub const JK_AJP13_FORWARD_REQUEST: u8 = 2;
pub const JK_AJP13_SHUTDOWN: u8 = 7;
pub const JK_AJP13_PING_REQUEST: u8 = 8;
pub const JK_AJP13_CPONG_REPLY: u8 = 9;
pub const JK_AJP13_CPING_REQUEST: u8 = 10;

/// Container -> peer packet type bytes.
pub const JK_AJP13_SEND_BODY_CHUNK: u8 = 3;
pub const JK_AJP13_SEND_HEADERS: u8 = 4;
pub const JK_AJP13_END_RESPONSE: u8 = 5;
pub const JK_AJP13_GET_BODY_CHUNK: u8 = 6;

/// Coded request method bytes in a forward request.
pub const SC_M_OPTIONS: u8 = 1;
pub const SC_M_GET: u8 = 2;
pub const SC_M_HEAD: u8 = 3;
pub const SC_M_POST: u8 = 4;
pub const SC_M_PUT: u8 = 5;
pub const SC_M_DELETE: u8 = 6;
pub const SC_M_TRACE: u8 = 7;
pub const SC_M_PROPFIND: u8 = 8;
pub const SC_M_PROPPATCH: u8 = 9;
pub const SC_M_MKCOL: u8 = 10;
pub const SC_M_COPY: u8 = 11;
pub const SC_M_MOVE: u8 = 12;
pub const SC_M_LOCK: u8 = 13;
pub const SC_M_UNLOCK: u8 = 14;
pub const SC_M_ACL: u8 = 15;
pub const SC_M_REPORT: u8 = 16;
pub const SC_M_VERSION_CONTROL: u8 = 17;
pub const SC_M_CHECKIN: u8 = 18;
pub const SC_M_CHECKOUT: u8 = 19;
pub const SC_M_UNCHECKOUT: u8 = 20;
pub const SC_M_SEARCH: u8 = 21;
pub const SC_M_MKWORKSPACE: u8 = 22;
pub const SC_M_UPDATE: u8 = 23;
pub const SC_M_LABEL: u8 = 24;
pub const SC_M_MERGE: u8 = 25;
pub const SC_M_BASELINE_CONTROL: u8 = 26;
pub const SC_M_MKACTIVITY: u8 = 27;
/// The actual method name travels in the stored-method attribute.
pub const SC_M_JK_STORED: u8 = 0xFF;

/// Request header names carried as `0xA0xx` codes instead of strings,
/// indexed by the low byte (1-based).
pub const SC_REQ_HEADER_NAMES: [&str; 14] = [
    "accept",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "authorization",
    "connection",
    "content-type",
    "content-length",
    "cookie",
    "cookie2",
    "host",
    "pragma",
    "referer",
    "user-agent",
];

/// High byte marking a coded header name.
pub const SC_REQ_HEADER_PREFIX: u8 = 0xA0;

/// Forward-request attribute codes.
pub const SC_A_CONTEXT: u8 = 1;
pub const SC_A_SERVLET_PATH: u8 = 2;
pub const SC_A_REMOTE_USER: u8 = 3;
pub const SC_A_AUTH_TYPE: u8 = 4;
pub const SC_A_QUERY_STRING: u8 = 5;
pub const SC_A_JVM_ROUTE: u8 = 6;
pub const SC_A_SSL_CERT: u8 = 7;
pub const SC_A_SSL_CIPHER: u8 = 8;
pub const SC_A_SSL_SESSION: u8 = 9;
pub const SC_A_REQ_ATTRIBUTE: u8 = 10;
pub const SC_A_SSL_KEY_SIZE: u8 = 11;
pub const SC_A_SECRET: u8 = 12;
pub const SC_A_STORED_METHOD: u8 = 13;
pub const SC_A_ARE_DONE: u8 = 0xFF;

/// Sentinel length meaning "null string" in the forward-request encoding.
pub const NULL_STRING_LEN: u16 = 0xFFFF;
