//! Decoding of the forward-request packet payload.
//!
//! The payload embeds a complete HTTP request head in AJP's binary
//! encoding: a coded method byte, a run of length-prefixed strings, the
//! header set (names either `0xA0xx`-coded or literal), and an attribute
//! list terminated by `0xFF`. Everything string-shaped is taken as a
//! zero-copy slice of the packet payload; header values share the
//! payload's storage via [`HeaderValue::from_maybe_shared`].
//!
//! Strings on the wire are a `u16` length, the bytes, and a trailing NUL
//! that is not counted in the length; the sentinel length `0xFFFF` encodes
//! a null string.

use bytes::{Buf, Bytes};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tracing::trace;

use crate::ajp::constants::{
    NULL_STRING_LEN, SC_A_ARE_DONE, SC_A_AUTH_TYPE, SC_A_CONTEXT, SC_A_JVM_ROUTE, SC_A_QUERY_STRING,
    SC_A_REMOTE_USER, SC_A_REQ_ATTRIBUTE, SC_A_SECRET, SC_A_SERVLET_PATH, SC_A_SSL_CERT, SC_A_SSL_CIPHER,
    SC_A_SSL_KEY_SIZE, SC_A_SSL_SESSION, SC_A_STORED_METHOD, SC_M_ACL, SC_M_BASELINE_CONTROL, SC_M_CHECKIN,
    SC_M_CHECKOUT, SC_M_COPY, SC_M_DELETE, SC_M_GET, SC_M_HEAD, SC_M_JK_STORED, SC_M_LABEL, SC_M_LOCK,
    SC_M_MERGE, SC_M_MKACTIVITY, SC_M_MKCOL, SC_M_MKWORKSPACE, SC_M_MOVE, SC_M_OPTIONS, SC_M_POST,
    SC_M_PROPFIND, SC_M_PROPPATCH, SC_M_PUT, SC_M_REPORT, SC_M_SEARCH, SC_M_TRACE, SC_M_UNCHECKOUT,
    SC_M_UNLOCK, SC_M_UPDATE, SC_M_VERSION_CONTROL, SC_REQ_HEADER_NAMES, SC_REQ_HEADER_PREFIX,
};
use crate::error::AjpError;
use crate::utils::ensure;

/// A fully decoded forward request.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub protocol: Bytes,
    pub request_uri: Bytes,
    pub remote_addr: Bytes,
    pub remote_host: Option<Bytes>,
    pub server_name: Bytes,
    pub server_port: u16,
    pub is_ssl: bool,
    pub headers: HeaderMap,
    /// Declared body length, parsed from the content-length header.
    pub content_length: Option<u64>,
    pub query_string: Option<Bytes>,
    pub remote_user: Option<Bytes>,
    pub auth_type: Option<Bytes>,
    pub jvm_route: Option<Bytes>,
    pub ssl_cert: Option<Bytes>,
    pub ssl_cipher: Option<Bytes>,
    pub ssl_session: Option<Bytes>,
    pub ssl_key_size: Option<u16>,
    pub secret: Option<Bytes>,
    /// Generic request attributes, name-value pairs in arrival order.
    pub attributes: Vec<(Bytes, Bytes)>,
}

impl ForwardRequest {
    /// Decodes the payload following the forward-request type byte.
    ///
    /// With `tomcat_authentication` set, peer-supplied remote-user and
    /// auth-type attributes are dropped: the container owns authentication
    /// and must not trust the proxy's identity claims.
    pub fn decode(payload: Bytes, tomcat_authentication: bool) -> Result<Self, AjpError> {
        let mut reader = PayloadReader::new(payload);

        let method_code = reader.read_u8()?;
        let protocol = reader.read_required_string("protocol")?;
        let request_uri = reader.read_required_string("request uri")?;
        let remote_addr = reader.read_required_string("remote address")?;
        let remote_host = reader.read_string()?;
        let server_name = reader.read_required_string("server name")?;
        let server_port = reader.read_u16()?;
        let is_ssl = reader.read_u8()? != 0;

        let headers = reader.read_headers()?;
        let content_length = content_length_of(&headers)?;

        let mut request = Self {
            method: Method::GET, // placeholder until the code is resolved
            protocol,
            request_uri,
            remote_addr,
            remote_host,
            server_name,
            server_port,
            is_ssl,
            headers,
            content_length,
            query_string: None,
            remote_user: None,
            auth_type: None,
            jvm_route: None,
            ssl_cert: None,
            ssl_cipher: None,
            ssl_session: None,
            ssl_key_size: None,
            secret: None,
            attributes: Vec::new(),
        };
        reader.read_attributes(&mut request, tomcat_authentication)?;

        request.method = match method_from_code(method_code) {
            Some(method) => method,
            None if method_code == SC_M_JK_STORED => {
                let stored = request
                    .attributes
                    .iter()
                    .position(|(name, _)| &name[..] == STORED_METHOD_KEY)
                    .map(|i| request.attributes.remove(i).1);
                let Some(stored) = stored else {
                    return Err(AjpError::malformed_forward_request(
                        "stored-method code without a stored-method attribute",
                    ));
                };
                Method::from_bytes(&stored)
                    .map_err(|_| AjpError::malformed_forward_request("unparsable stored method"))?
            }
            None => {
                return Err(AjpError::malformed_forward_request(format!(
                    "unknown method code {method_code:#04x}"
                )));
            }
        };

        trace!(method = %request.method, uri = ?request.request_uri, "decoded forward request");
        Ok(request)
    }
}

/// Key under which a stored method travels in the attribute list until the
/// method code is resolved.
const STORED_METHOD_KEY: &[u8] = b"\0stored-method";

fn method_from_code(code: u8) -> Option<Method> {
    let name = match code {
        SC_M_OPTIONS => "OPTIONS",
        SC_M_GET => "GET",
        SC_M_HEAD => "HEAD",
        SC_M_POST => "POST",
        SC_M_PUT => "PUT",
        SC_M_DELETE => "DELETE",
        SC_M_TRACE => "TRACE",
        SC_M_PROPFIND => "PROPFIND",
        SC_M_PROPPATCH => "PROPPATCH",
        SC_M_MKCOL => "MKCOL",
        SC_M_COPY => "COPY",
        SC_M_MOVE => "MOVE",
        SC_M_LOCK => "LOCK",
        SC_M_UNLOCK => "UNLOCK",
        SC_M_ACL => "ACL",
        SC_M_REPORT => "REPORT",
        SC_M_VERSION_CONTROL => "VERSION-CONTROL",
        SC_M_CHECKIN => "CHECKIN",
        SC_M_CHECKOUT => "CHECKOUT",
        SC_M_UNCHECKOUT => "UNCHECKOUT",
        SC_M_SEARCH => "SEARCH",
        SC_M_MKWORKSPACE => "MKWORKSPACE",
        SC_M_UPDATE => "UPDATE",
        SC_M_LABEL => "LABEL",
        SC_M_MERGE => "MERGE",
        SC_M_BASELINE_CONTROL => "BASELINE-CONTROL",
        SC_M_MKACTIVITY => "MKACTIVITY",
        _ => return None,
    };
    Method::from_bytes(name.as_bytes()).ok()
}

fn content_length_of(headers: &HeaderMap) -> Result<Option<u64>, AjpError> {
    let Some(value) = headers.get(http::header::CONTENT_LENGTH) else {
        return Ok(None);
    };
    let s = value
        .to_str()
        .map_err(|_| AjpError::malformed_forward_request("non-ascii content-length"))?;
    let n = s
        .trim()
        .parse::<u64>()
        .map_err(|_| AjpError::malformed_forward_request(format!("content-length {s:?} is not u64")))?;
    Ok(Some(n))
}

/// Cursor over the packet payload. All reads are zero-copy slices; running
/// past the end is a malformed packet, never "need more input", because the
/// framer only hands over complete payloads.
struct PayloadReader {
    payload: Bytes,
    pos: usize,
}

impl PayloadReader {
    fn new(payload: Bytes) -> Self {
        Self { payload, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, AjpError> {
        let Some(&byte) = self.payload.get(self.pos) else {
            return Err(AjpError::malformed_forward_request("payload ended inside a field"));
        };
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, AjpError> {
        ensure!(
            self.pos + 2 <= self.payload.len(),
            AjpError::malformed_forward_request("payload ended inside a field")
        );
        let mut field = &self.payload[self.pos..];
        let value = field.get_u16();
        self.pos += 2;
        Ok(value)
    }

    /// Reads a length-prefixed NUL-terminated string; `None` for the null
    /// sentinel.
    fn read_string(&mut self) -> Result<Option<Bytes>, AjpError> {
        let len = self.read_u16()?;
        if len == NULL_STRING_LEN {
            return Ok(None);
        }

        let len = len as usize;
        // the trailing NUL is not counted in len
        ensure!(
            self.pos + len + 1 <= self.payload.len(),
            AjpError::malformed_forward_request("payload ended inside a string")
        );
        let bytes = self.payload.slice(self.pos..self.pos + len);
        ensure!(
            self.payload[self.pos + len] == 0,
            AjpError::malformed_forward_request("string missing NUL terminator")
        );
        self.pos += len + 1;
        Ok(Some(bytes))
    }

    fn read_required_string(&mut self, what: &'static str) -> Result<Bytes, AjpError> {
        self.read_string()?
            .ok_or_else(|| AjpError::malformed_forward_request(format!("null {what}")))
    }

    fn read_headers(&mut self) -> Result<HeaderMap, AjpError> {
        let count = self.read_u16()? as usize;
        let mut headers = HeaderMap::with_capacity(count);

        for _ in 0..count {
            let name = match self.peek_u8()? {
                SC_REQ_HEADER_PREFIX => {
                    let code = self.read_u16()?;
                    let index = (code & 0xFF) as usize;
                    ensure!(
                        (1..=SC_REQ_HEADER_NAMES.len()).contains(&index),
                        AjpError::malformed_forward_request(format!("unknown header code {code:#06x}"))
                    );
                    HeaderName::from_static(SC_REQ_HEADER_NAMES[index - 1])
                }
                _ => {
                    let raw = self.read_required_string("header name")?;
                    HeaderName::from_bytes(&raw)
                        .map_err(|e| AjpError::malformed_forward_request(e))?
                }
            };

            let value = self.read_string()?.unwrap_or_else(Bytes::new);
            let value = HeaderValue::from_maybe_shared(value)
                .map_err(|e| AjpError::malformed_forward_request(e))?;
            headers.append(name, value);
        }

        Ok(headers)
    }

    fn read_attributes(
        &mut self,
        request: &mut ForwardRequest,
        tomcat_authentication: bool,
    ) -> Result<(), AjpError> {
        loop {
            let code = match self.read_u8() {
                Ok(code) => code,
                // a packet may simply end instead of sending the terminator
                Err(_) => return Ok(()),
            };

            match code {
                SC_A_ARE_DONE => return Ok(()),
                SC_A_QUERY_STRING => request.query_string = self.read_string()?,
                SC_A_REMOTE_USER => {
                    let user = self.read_string()?;
                    if !tomcat_authentication {
                        request.remote_user = user;
                    }
                }
                SC_A_AUTH_TYPE => {
                    let auth = self.read_string()?;
                    if !tomcat_authentication {
                        request.auth_type = auth;
                    }
                }
                SC_A_JVM_ROUTE => request.jvm_route = self.read_string()?,
                SC_A_SSL_CERT => request.ssl_cert = self.read_string()?,
                SC_A_SSL_CIPHER => request.ssl_cipher = self.read_string()?,
                SC_A_SSL_SESSION => request.ssl_session = self.read_string()?,
                SC_A_SSL_KEY_SIZE => request.ssl_key_size = Some(self.read_u16()?),
                SC_A_SECRET => request.secret = self.read_string()?,
                SC_A_STORED_METHOD => {
                    let method = self.read_required_string("stored method")?;
                    request.attributes.push((Bytes::from_static(STORED_METHOD_KEY), method));
                }
                SC_A_CONTEXT | SC_A_SERVLET_PATH => {
                    // defined by the protocol but never sent by known peers;
                    // keep the value as a generic attribute
                    let name = Bytes::from_static(if code == SC_A_CONTEXT { b"context" } else { b"servlet-path" });
                    let value = self.read_string()?.unwrap_or_else(Bytes::new);
                    request.attributes.push((name, value));
                }
                SC_A_REQ_ATTRIBUTE => {
                    let name = self.read_required_string("attribute name")?;
                    let value = self.read_string()?.unwrap_or_else(Bytes::new);
                    request.attributes.push((name, value));
                }
                other => {
                    return Err(AjpError::malformed_forward_request(format!(
                        "unknown attribute code {other:#04x}"
                    )));
                }
            }
        }
    }

    fn peek_u8(&self) -> Result<u8, AjpError> {
        self.payload
            .get(self.pos)
            .copied()
            .ok_or_else(|| AjpError::malformed_forward_request("payload ended inside a field"))
    }
}


#[cfg(test)]
mod tests {
    use super::test_encode::ForwardRequestBuilder;
    use super::*;

    fn decode_payload(packet_payload: &[u8], tomcat_authentication: bool) -> Result<ForwardRequest, AjpError> {
        // skip the type byte, as the framer does
        ForwardRequest::decode(Bytes::copy_from_slice(&packet_payload[1..]), tomcat_authentication)
    }

    #[test]
    fn minimal_get_request() {
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/index.html")
            .coded_header(0xA00B, "localhost") // host
            .build();

        let request = decode_payload(&payload, true).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(&request.request_uri[..], b"/index.html");
        assert_eq!(&request.protocol[..], b"HTTP/1.1");
        assert_eq!(request.server_port, 8009);
        assert!(!request.is_ssl);
        assert_eq!(request.headers.get(http::header::HOST).unwrap(), "localhost");
        assert_eq!(request.content_length, None);
        assert!(request.remote_host.is_none());
    }

    #[test]
    fn post_with_content_length_and_query() {
        let payload = ForwardRequestBuilder::new(SC_M_POST, "/submit")
            .coded_header(0xA008, "42") // content-length
            .header("x-custom", "yes")
            .query_string("a=1&b=2")
            .build();

        let request = decode_payload(&payload, true).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.content_length, Some(42));
        assert_eq!(request.query_string.as_deref(), Some(&b"a=1&b=2"[..]));
        assert_eq!(request.headers.get("x-custom").unwrap(), "yes");
    }

    #[test]
    fn secret_attribute_is_surfaced() {
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/").secret("s3cret").build();
        let request = decode_payload(&payload, true).unwrap();
        assert_eq!(request.secret.as_deref(), Some(&b"s3cret"[..]));
    }

    #[test]
    fn tomcat_authentication_drops_peer_identity() {
        use crate::ajp::constants::{SC_A_ARE_DONE, SC_A_AUTH_TYPE, SC_A_REMOTE_USER};
        use bytes::BufMut;

        let mut payload = ForwardRequestBuilder::new(SC_M_GET, "/").build();
        // splice identity attributes in front of the terminator
        payload.pop();
        let mut tail = bytes::BytesMut::new();
        tail.put_u8(SC_A_REMOTE_USER);
        super::test_encode::put_string(&mut tail, Some("mallory"));
        tail.put_u8(SC_A_AUTH_TYPE);
        super::test_encode::put_string(&mut tail, Some("BASIC"));
        tail.put_u8(SC_A_ARE_DONE);
        payload.extend_from_slice(&tail);

        let trusted = decode_payload(&payload, false).unwrap();
        assert_eq!(trusted.remote_user.as_deref(), Some(&b"mallory"[..]));
        assert_eq!(trusted.auth_type.as_deref(), Some(&b"BASIC"[..]));

        let owned = decode_payload(&payload, true).unwrap();
        assert!(owned.remote_user.is_none());
        assert!(owned.auth_type.is_none());
    }

    #[test]
    fn unknown_method_code_is_malformed() {
        let mut payload = ForwardRequestBuilder::new(SC_M_GET, "/").build();
        payload[1] = 0x63;
        assert!(matches!(
            decode_payload(&payload, true),
            Err(AjpError::MalformedForwardRequest { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/index.html").build();
        let cut = &payload[..payload.len() / 2];
        assert!(matches!(decode_payload(cut, true), Err(AjpError::MalformedForwardRequest { .. })));
    }

    #[test]
    fn unknown_header_code_is_malformed() {
        let payload = ForwardRequestBuilder::new(SC_M_GET, "/").coded_header(0xA0FF, "x").build();
        assert!(matches!(decode_payload(&payload, true), Err(AjpError::MalformedForwardRequest { .. })));
    }
}
