//! Client-certificate authorization: require a certificate, optionally restrict to a
//! fingerprint whitelist. The TLS layer accepts any syntactically valid client
//! certificate (`tls::server::AcceptAnyClientCert`); authorization happens here.

use std::collections::HashSet;
use std::net::IpAddr;

use async_trait::async_trait;

use crate::response::Response;
use crate::server::middleware::{Decision, Middleware};

#[derive(Debug, Clone, Default)]
pub struct CertificateAuthConfig {
    pub require_cert: bool,
    pub allowed_fingerprints: Option<HashSet<String>>,
    /// Path-prefix rules that override `require_cert` for matching requests, checked in
    /// order; the first matching prefix wins. A prefix without a trailing slash still
    /// only matches on a `/`-boundary, same as the router's prefix routes.
    pub path_overrides: Vec<(String, bool)>,
}

impl CertificateAuthConfig {
    fn prefix_matches(prefix: &str, path: &str) -> bool {
        let trimmed = prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            return true;
        }
        path == trimmed || path.strip_prefix(trimmed).is_some_and(|rest| rest.starts_with('/'))
    }

    /// Whether a presented or missing certificate matters at all for `path`: either a
    /// path override says so, or (absent any matching override) the global
    /// `require_cert`/whitelist configuration does.
    fn cert_mandatory_for(&self, path: &str) -> bool {
        for (prefix, required) in &self.path_overrides {
            if Self::prefix_matches(prefix, path) {
                return *required;
            }
        }
        self.require_cert || self.allowed_fingerprints.is_some()
    }
}

pub struct CertificateAuth {
    config: CertificateAuthConfig,
}

impl CertificateAuth {
    pub fn new(config: CertificateAuthConfig) -> Self {
        CertificateAuth { config }
    }
}

/// Pulls the path back out of the normalized `scheme://host:port/path?query` string the
/// server engine passes to middleware, since the router works in terms of paths but the
/// `Middleware` trait is handed the full URI.
fn path_from_uri(uri: &str) -> &str {
    let rest = match uri.find("://") {
        Some(idx) => &uri[idx + 3..],
        None => uri,
    };
    let path = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    };
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

#[async_trait]
impl Middleware for CertificateAuth {
    async fn process_request(
        &self,
        uri: &str,
        _remote_addr: IpAddr,
        client_cert_fingerprint: Option<&str>,
    ) -> Decision {
        let path = path_from_uri(uri);
        let cert_is_mandatory = self.config.cert_mandatory_for(path);

        let fingerprint = match client_cert_fingerprint {
            Some(fp) => fp,
            None => {
                return if cert_is_mandatory {
                    Decision::Deny(Response::new(60, "Client certificate required", None))
                } else {
                    Decision::Allow
                }
            }
        };

        match &self.config.allowed_fingerprints {
            Some(allowed) if !allowed.contains(fingerprint) => {
                Decision::Deny(Response::new(61, "Certificate not authorized", None))
            }
            _ => Decision::Allow,
        }
    }
}
