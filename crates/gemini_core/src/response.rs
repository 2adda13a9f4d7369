//! The response value type: a status, a meta string, and an optional body.
//!
//! The body is kept as raw bytes rather than `String`: the static-file and proxy
//! handlers must round-trip binary resources (images, etc.) verbatim. The *client*
//! protocol engine still enforces the wire-level "body must be valid UTF-8" rule
//! before ever constructing a `Response` from bytes it has read off the wire;
//! server-built responses (file contents, proxied bytes) are not re-validated.

use crate::status::{self, Status};

pub const MAX_META_BYTES: usize = 1024;

/// An immutable Gemini response. Construct with [`Response::new`] or one of the
/// convenience constructors; there is no setter, once built a response never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    meta: String,
    body: Option<Vec<u8>>,
    url: Option<String>,
}

impl Response {
    /// Builds a response, enforcing that a body is present iff `status` is in 20-29 and
    /// that `meta` fits the wire limit.
    pub fn new(status: Status, meta: impl Into<String>, body: Option<Vec<u8>>) -> Self {
        let meta = meta.into();
        debug_assert!(
            meta.len() <= MAX_META_BYTES,
            "meta exceeds {MAX_META_BYTES} bytes"
        );
        let body = if status::is_success(status) { body } else { None };
        Response {
            status,
            meta,
            body,
            url: None,
        }
    }

    pub fn success(mime_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Response::new(status::SUCCESS, mime_type, Some(body.into()))
    }

    pub fn redirect_temporary(target_uri: impl Into<String>) -> Self {
        Response::new(status::REDIRECT_TEMPORARY, target_uri, None)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Response::new(status::NOT_FOUND, message, None)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Response::new(status::BAD_REQUEST, message, None)
    }

    pub fn temporary_failure(message: impl Into<String>) -> Self {
        Response::new(status::TEMPORARY_FAILURE, message, None)
    }

    /// Attaches the originating URI, used only for logging.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Lossy UTF-8 view of the body, convenient for gemtext content.
    pub fn body_text(&self) -> Option<std::borrow::Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_success(&self) -> bool {
        status::is_success(self.status)
    }

    pub fn is_redirect(&self) -> bool {
        status::is_redirect(self.status)
    }

    pub fn is_error(&self) -> bool {
        status::is_error(self.status)
    }

    /// For a redirect response, `meta` is the target URI.
    pub fn redirect_target(&self) -> Option<&str> {
        self.is_redirect().then(|| self.meta.as_str())
    }

    /// Parses `type/subtype[; charset=...]` out of `meta` for 2x responses.
    pub fn mime_type(&self) -> Option<&str> {
        self.is_success()
            .then(|| self.meta.split(';').next().unwrap_or(&self.meta).trim())
    }

    pub fn charset(&self) -> Option<&str> {
        if !self.is_success() {
            return None;
        }
        self.meta
            .split(';')
            .skip(1)
            .find_map(|param| {
                let param = param.trim();
                param
                    .strip_prefix("charset=")
                    .map(|c| c.trim_matches('"'))
            })
            .or(Some("utf-8"))
    }

    /// Serialize the wire header line (without body): `"<status> <meta>\r\n"`.
    pub fn header_line(&self) -> String {
        format!("{:02} {}\r\n", self.status, self.meta)
    }
}
