//! Declarative location configuration: one prefix maps to one handler kind
//! (static files, reverse proxy, or Titan upload), validated at load time rather than
//! at first request.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Static,
    Proxy,
    Titan,
}

#[derive(Debug, Error)]
pub enum LocationConfigError {
    #[error("unknown handler type {0:?}")]
    UnknownHandlerType(String),
    #[error("static handler requires document_root")]
    MissingDocumentRoot,
    #[error("document root does not exist: {0:?}")]
    DocumentRootMissing(PathBuf),
    #[error("document root is not a directory: {0:?}")]
    DocumentRootNotADirectory(PathBuf),
    #[error("proxy handler requires upstream")]
    MissingUpstream,
    #[error("proxy upstream must use the gemini:// scheme, got {0:?}")]
    UpstreamNotGemini(String),
    #[error("titan handler requires document_root")]
    MissingTitanDocumentRoot,
}

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub prefix: String,
    pub handler_type: HandlerType,
    pub document_root: Option<PathBuf>,
    pub enable_directory_listing: bool,
    pub upstream: Option<String>,
    pub strip_prefix: bool,
    pub timeout: Duration,
    pub titan_token: Option<String>,
    pub titan_max_size_bytes: usize,
}

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_TITAN_MAX_SIZE_BYTES: usize = 10 * 1024 * 1024;

impl LocationConfig {
    fn normalize_prefix(prefix: &str) -> String {
        if prefix.starts_with('/') {
            prefix.to_owned()
        } else {
            format!("/{prefix}")
        }
    }

    pub fn static_files(prefix: impl Into<String>, document_root: impl Into<PathBuf>) -> Result<Self, LocationConfigError> {
        let document_root = document_root.into();
        if !document_root.exists() {
            return Err(LocationConfigError::DocumentRootMissing(document_root));
        }
        if !document_root.is_dir() {
            return Err(LocationConfigError::DocumentRootNotADirectory(document_root));
        }
        Ok(LocationConfig {
            prefix: Self::normalize_prefix(&prefix.into()),
            handler_type: HandlerType::Static,
            document_root: Some(document_root),
            enable_directory_listing: false,
            upstream: None,
            strip_prefix: false,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            titan_token: None,
            titan_max_size_bytes: DEFAULT_TITAN_MAX_SIZE_BYTES,
        })
    }

    pub fn proxy(prefix: impl Into<String>, upstream: impl Into<String>) -> Result<Self, LocationConfigError> {
        let upstream = upstream.into().trim_end_matches('/').to_owned();
        if !upstream.starts_with("gemini://") {
            return Err(LocationConfigError::UpstreamNotGemini(upstream));
        }
        Ok(LocationConfig {
            prefix: Self::normalize_prefix(&prefix.into()),
            handler_type: HandlerType::Proxy,
            document_root: None,
            enable_directory_listing: false,
            upstream: Some(upstream),
            strip_prefix: false,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            titan_token: None,
            titan_max_size_bytes: DEFAULT_TITAN_MAX_SIZE_BYTES,
        })
    }

    pub fn titan(prefix: impl Into<String>, document_root: impl Into<PathBuf>) -> Result<Self, LocationConfigError> {
        let document_root = document_root.into();
        if !document_root.exists() || !document_root.is_dir() {
            return Err(LocationConfigError::MissingTitanDocumentRoot);
        }
        Ok(LocationConfig {
            prefix: Self::normalize_prefix(&prefix.into()),
            handler_type: HandlerType::Titan,
            document_root: Some(document_root),
            enable_directory_listing: false,
            upstream: None,
            strip_prefix: false,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            titan_token: None,
            titan_max_size_bytes: DEFAULT_TITAN_MAX_SIZE_BYTES,
        })
    }

    pub fn with_strip_prefix(mut self, strip: bool) -> Self {
        self.strip_prefix = strip;
        self
    }

    pub fn with_directory_listing(mut self, enable: bool) -> Self {
        self.enable_directory_listing = enable;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_titan_token(mut self, token: impl Into<String>) -> Self {
        self.titan_token = Some(token.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_location_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LocationConfig::static_files("/static/", dir.path()).unwrap();
        assert_eq!(config.handler_type, HandlerType::Static);
        assert_eq!(config.document_root, Some(dir.path().to_owned()));

        let err = LocationConfig::static_files("/", "/nonexistent/xyz").unwrap_err();
        assert!(matches!(err, LocationConfigError::DocumentRootMissing(_)));
    }

    #[test]
    fn prefix_without_leading_slash_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let config = LocationConfig::static_files("static/", dir.path()).unwrap();
        assert_eq!(config.prefix, "/static/");
    }

    #[test]
    fn proxy_requires_gemini_scheme() {
        let err = LocationConfig::proxy("/api/", "https://backend:443").unwrap_err();
        assert!(matches!(err, LocationConfigError::UpstreamNotGemini(_)));
    }

    #[test]
    fn proxy_strips_trailing_slash_from_upstream() {
        let config = LocationConfig::proxy("/", "gemini://backend:1965/").unwrap();
        assert_eq!(config.upstream.as_deref(), Some("gemini://backend:1965"));
    }
}
