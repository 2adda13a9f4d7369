//! Parsing and normalization of `gemini://` (and, for Titan uploads, `titan://`) URIs.

use thiserror::Error;

/// Maximum serialized length of a URI *including* the trailing CR LF, per the wire protocol.
pub const MAX_URI_LINE_BYTES: usize = 1024;

pub const DEFAULT_GEMINI_PORT: u16 = 1965;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("empty request line")]
    Empty,
    #[error("unsupported scheme: {0:?}")]
    UnsupportedScheme(String),
    #[error("missing hostname")]
    MissingHost,
    #[error("userinfo is not allowed in a Gemini URI")]
    UserinfoNotAllowed,
    #[error("fragments are not allowed in a Gemini URI")]
    FragmentNotAllowed,
    #[error("port {0} is out of range (must be 1-65535)")]
    PortOutOfRange(u32),
    #[error("URI exceeds {MAX_URI_LINE_BYTES} bytes including CRLF")]
    TooLong,
    #[error("URI is not valid: {0}")]
    Malformed(String),
}

/// A parsed, normalized request URI.
///
/// `to_string()`/[`GeminiUri::serialize`] always produce the canonical form: default port
/// omitted, path defaulted to `/`, query preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiUri {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
}

impl GeminiUri {
    /// Parse a request line's URI. `allowed_schemes` is usually `&["gemini"]`; the Titan
    /// upload handler additionally accepts `"titan"`.
    pub fn parse(raw: &str, allowed_schemes: &[&str]) -> Result<Self, UriError> {
        if raw.is_empty() {
            return Err(UriError::Empty);
        }
        if raw.len() + 2 > MAX_URI_LINE_BYTES {
            return Err(UriError::TooLong);
        }

        let parsed = url::Url::parse(raw).map_err(|e| UriError::Malformed(e.to_string()))?;

        let scheme = parsed.scheme().to_owned();
        if !allowed_schemes.contains(&scheme.as_str()) {
            return Err(UriError::UnsupportedScheme(scheme));
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(UriError::UserinfoNotAllowed);
        }
        if parsed.fragment().is_some() {
            return Err(UriError::FragmentNotAllowed);
        }

        let host = parsed.host_str().ok_or(UriError::MissingHost)?.to_owned();
        if host.is_empty() {
            return Err(UriError::MissingHost);
        }

        let port = match parsed.port() {
            Some(p) => p,
            None => DEFAULT_GEMINI_PORT,
        };
        if port == 0 {
            return Err(UriError::PortOutOfRange(0));
        }

        let path = if parsed.path().is_empty() {
            "/".to_owned()
        } else {
            parsed.path().to_owned()
        };
        let query = parsed.query().map(|q| q.to_owned());

        let uri = GeminiUri {
            scheme,
            host,
            port,
            path,
            query,
        };

        let serialized = uri.serialize();
        if serialized.len() + 2 > MAX_URI_LINE_BYTES {
            return Err(UriError::TooLong);
        }

        Ok(uri)
    }

    /// Canonical serialized form: `scheme://host[:port]path[?query]`, default port omitted.
    pub fn serialize(&self) -> String {
        let mut out = format!("{}://{}", self.scheme, self.host);
        if self.port != DEFAULT_GEMINI_PORT {
            out.push(':');
            out.push_str(&self.port.to_string());
        }
        out.push_str(&self.path);
        if let Some(q) = &self.query {
            out.push('?');
            out.push_str(q);
        }
        out
    }

    /// `host:port`, the key used by the TOFU store and TLS connect calls.
    pub fn authority(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

impl std::fmt::Display for GeminiUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_uri() {
        let u = GeminiUri::parse("gemini://example.com/", &["gemini"]).unwrap();
        assert_eq!(u.host, "example.com");
        assert_eq!(u.port, DEFAULT_GEMINI_PORT);
        assert_eq!(u.path, "/");
        assert_eq!(u.query, None);
    }

    #[test]
    fn defaults_empty_path_to_slash() {
        let u = GeminiUri::parse("gemini://example.com", &["gemini"]).unwrap();
        assert_eq!(u.path, "/");
    }

    #[test]
    fn strips_default_port_on_serialize() {
        let u = GeminiUri::parse("gemini://example.com:1965/foo", &["gemini"]).unwrap();
        assert_eq!(u.serialize(), "gemini://example.com/foo");
    }

    #[test]
    fn keeps_nondefault_port() {
        let u = GeminiUri::parse("gemini://example.com:1966/foo", &["gemini"]).unwrap();
        assert_eq!(u.serialize(), "gemini://example.com:1966/foo");
    }

    #[test]
    fn rejects_wrong_scheme() {
        let err = GeminiUri::parse("http://example.com/", &["gemini"]).unwrap_err();
        assert_eq!(err, UriError::UnsupportedScheme("http".into()));
    }

    #[test]
    fn rejects_userinfo() {
        let err = GeminiUri::parse("gemini://user@example.com/", &["gemini"]).unwrap_err();
        assert_eq!(err, UriError::UserinfoNotAllowed);
    }

    #[test]
    fn rejects_fragment() {
        let err = GeminiUri::parse("gemini://example.com/#frag", &["gemini"]).unwrap_err();
        assert_eq!(err, UriError::FragmentNotAllowed);
    }

    #[test]
    fn rejects_oversize_uri() {
        let path = "a".repeat(MAX_URI_LINE_BYTES);
        let raw = format!("gemini://example.com/{path}");
        assert_eq!(
            GeminiUri::parse(&raw, &["gemini"]).unwrap_err(),
            UriError::TooLong
        );
    }

    #[test]
    fn preserves_query_verbatim() {
        let u = GeminiUri::parse("gemini://example.com/search?hello%20world", &["gemini"])
            .unwrap();
        assert_eq!(u.query.as_deref(), Some("hello%20world"));
        assert_eq!(u.serialize(), "gemini://example.com/search?hello%20world");
    }

    #[test]
    fn normalize_is_idempotent() {
        let u = GeminiUri::parse("gemini://example.com:1965/a/b?c", &["gemini"]).unwrap();
        let once = u.serialize();
        let twice = GeminiUri::parse(&once, &["gemini"]).unwrap().serialize();
        assert_eq!(once, twice);
    }

    #[test]
    fn titan_scheme_allowed_when_listed() {
        let u = GeminiUri::parse(
            "titan://example.com/upload.txt;size=5;mime=text/plain",
            &["gemini", "titan"],
        )
        .unwrap();
        assert_eq!(u.scheme, "titan");
    }
}
