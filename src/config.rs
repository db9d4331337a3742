//! Configuration surface consumed by the codec.
//!
//! Loading values from files or system properties is the caller's concern;
//! the codec only sees this plain struct.

/// Maximum size in bytes allowed for an HTTP header section.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Configuration for the AJP framer and the HTTP parsers.
#[derive(Debug, Clone)]
pub struct AjpConfig {
    /// Shared secret the peer must present in its forward-request
    /// attributes. `None` disables the check.
    pub secret: Option<String>,

    /// When `true` (the default, matching `tomcatAuthentication`), the
    /// container owns authentication: remote-user and auth-type attributes
    /// supplied by the peer are ignored. When `false` they are honored.
    pub tomcat_authentication: bool,

    /// Maximum size of an HTTP header section before the parser declares a
    /// fatal policy violation.
    pub max_header_size: usize,
}

impl Default for AjpConfig {
    fn default() -> Self {
        Self { secret: None, tomcat_authentication: true, max_header_size: DEFAULT_MAX_HEADER_BYTES }
    }
}

impl AjpConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_tomcat_authentication(mut self, enabled: bool) -> Self {
        self.tomcat_authentication = enabled;
        self
    }

    pub fn with_max_header_size(mut self, max: usize) -> Self {
        self.max_header_size = max;
        self
    }
}
