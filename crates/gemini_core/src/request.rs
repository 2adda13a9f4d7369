//! The request value type.
//!
//! The parsed URI fields are fixed at construction. The client-certificate fields are
//! populated once, by the server engine, between the TLS handshake and pipeline dispatch.
//! [`Request::from_line`] produces a request with no certificate attached;
//! [`Request::with_client_cert`] consumes it and returns a new, fully-populated `Request`
//! rather than mutating a value that might already be shared with a handler.

use crate::fingerprint::fingerprint_der;
use crate::uri::{GeminiUri, UriError};

#[derive(Debug, Clone)]
pub struct Request {
    raw: String,
    uri: GeminiUri,
    client_cert_der: Option<Vec<u8>>,
    client_cert_fingerprint: Option<String>,
    titan_body: Option<Vec<u8>>,
}

impl Request {
    pub fn from_line(raw: &str) -> Result<Self, UriError> {
        let uri = GeminiUri::parse(raw.trim_end_matches(['\r', '\n']), &["gemini"])?;
        Ok(Request {
            raw: raw.to_owned(),
            uri,
            client_cert_der: None,
            client_cert_fingerprint: None,
            titan_body: None,
        })
    }

    pub fn from_uri(uri: GeminiUri) -> Self {
        let raw = uri.serialize();
        Request {
            raw,
            uri,
            client_cert_der: None,
            client_cert_fingerprint: None,
            titan_body: None,
        }
    }

    /// Attach the peer certificate captured by the server engine after the handshake.
    /// `cert_der` is `None` when no client certificate was presented; the fingerprint
    /// field is set iff a certificate was presented.
    pub fn with_client_cert(mut self, cert_der: Option<Vec<u8>>) -> Self {
        self.client_cert_fingerprint = cert_der.as_deref().map(fingerprint_der);
        self.client_cert_der = cert_der;
        self
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn uri(&self) -> &GeminiUri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.uri.path
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query.as_deref()
    }

    /// Attach the raw bytes read off the wire for a Titan upload, once the server
    /// engine has read exactly the number of bytes the request's `;size=` parameter
    /// declared.
    pub fn with_titan_body(mut self, body: Vec<u8>) -> Self {
        self.titan_body = Some(body);
        self
    }

    pub fn titan_body(&self) -> Option<&[u8]> {
        self.titan_body.as_deref()
    }

    pub fn client_cert_der(&self) -> Option<&[u8]> {
        self.client_cert_der.as_deref()
    }

    pub fn client_cert_fingerprint(&self) -> Option<&str> {
        self.client_cert_fingerprint.as_deref()
    }

    pub fn normalized_uri(&self) -> String {
        self.uri.serialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_absent_without_cert() {
        let req = Request::from_line("gemini://example.com/").unwrap();
        assert!(req.client_cert_fingerprint().is_none());
    }

    #[test]
    fn fingerprint_present_iff_cert_present() {
        let req = Request::from_line("gemini://example.com/")
            .unwrap()
            .with_client_cert(Some(vec![1, 2, 3]));
        assert!(req.client_cert_der().is_some());
        assert!(req.client_cert_fingerprint().unwrap().starts_with("sha256:"));
    }

    #[test]
    fn from_line_trims_crlf() {
        let req = Request::from_line("gemini://example.com/path\r\n").unwrap();
        assert_eq!(req.path(), "/path");
    }
}
